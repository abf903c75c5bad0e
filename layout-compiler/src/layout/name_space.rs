use std::collections::{BTreeSet, HashMap};

use crate::ClassData;

/// The global member name space of a class.
///
/// Sorted union of every member name and base slot name the class has in any
/// version. Built once before resolution and read-only afterwards, so every
/// table row has the same slots in the same order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberNames {
    names: Vec<String>,
    slots: HashMap<String, usize>,
}

impl MemberNames {
    pub fn collect(class: &ClassData) -> Self {
        let mut names = BTreeSet::new();
        class.collect_names(&mut names);
        Self::from_sorted(names)
    }

    fn from_sorted(names: BTreeSet<String>) -> Self {
        let names = names.into_iter().collect::<Vec<_>>();
        let slots = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        Self { names, slots }
    }

    #[inline]
    pub fn slot(&self, name: &str) -> Option<usize> {
        self.slots.get(name).copied()
    }

    #[inline]
    pub fn name(&self, slot: usize) -> Option<&str> {
        self.names.get(slot).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
