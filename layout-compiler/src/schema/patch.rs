use error_stack::{report, Result, ResultExt};

use super::{ClassMember, Inheritable, Shape};
use crate::LayoutError;

/// Payload of a patch operation: a member or a base class
#[derive(Debug, Clone, PartialEq)]
pub enum PatchItem {
    Member(ClassMember),
    Base(Inheritable),
}

impl PatchItem {
    pub fn member(name: impl Into<String>, shape: impl Into<Shape>) -> Self {
        Self::Member(ClassMember::new(name, shape))
    }

    pub fn base(base: impl Into<Inheritable>) -> Self {
        Self::Base(base.into())
    }
}

/// Name of the entry a `delete` removes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchKey {
    Member(String),
    /// Name of the base class
    Base(String),
}

/// One edit of a member or base list
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOp {
    /// Insert the items right after the named entry, keeping their order
    InsertAfter(String, Vec<PatchItem>),
    /// Substitute the entry with the same name. No-op if there is none
    Replace(Vec<PatchItem>),
    /// Remove the first entry with the name. No-op if there is none
    Delete(Vec<PatchKey>),
    Append(Vec<PatchItem>),
    /// Insert at the front, keeping the order of the items
    Prepend(Vec<PatchItem>),
}

/// Edits that turn the schema of the previous version into the schema of `version`
#[derive(Debug, Clone, PartialEq)]
pub struct ClassPatch {
    pub version: String,
    pub ops: Vec<PatchOp>,
}

impl ClassPatch {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ops: Vec::new(),
        }
    }

    pub fn insert_after(
        mut self,
        anchor: impl Into<String>,
        items: impl IntoIterator<Item = PatchItem>,
    ) -> Self {
        self.ops
            .push(PatchOp::InsertAfter(anchor.into(), items.into_iter().collect()));
        self
    }

    pub fn replace(mut self, items: impl IntoIterator<Item = PatchItem>) -> Self {
        self.ops.push(PatchOp::Replace(items.into_iter().collect()));
        self
    }

    pub fn delete(mut self, keys: impl IntoIterator<Item = PatchKey>) -> Self {
        self.ops.push(PatchOp::Delete(keys.into_iter().collect()));
        self
    }

    pub fn delete_member(self, name: impl Into<String>) -> Self {
        self.delete([PatchKey::Member(name.into())])
    }

    pub fn append(mut self, items: impl IntoIterator<Item = PatchItem>) -> Self {
        self.ops.push(PatchOp::Append(items.into_iter().collect()));
        self
    }

    pub fn prepend(mut self, items: impl IntoIterator<Item = PatchItem>) -> Self {
        self.ops.push(PatchOp::Prepend(items.into_iter().collect()));
        self
    }

    /// Every item this patch can introduce
    pub fn items(&self) -> impl Iterator<Item = &PatchItem> {
        self.ops.iter().flat_map(|op| match op {
            PatchOp::InsertAfter(_, items)
            | PatchOp::Replace(items)
            | PatchOp::Append(items)
            | PatchOp::Prepend(items) => items.as_slice(),
            PatchOp::Delete(_) => [].as_slice(),
        })
    }
}

/// An entry of a list that patches can edit
pub trait PatchEntry: Clone {
    fn entry_name(&self) -> &str;
    /// Pick out items of this kind, skipping the other kind
    fn from_item(item: &PatchItem) -> Option<&Self>;
    fn from_key(key: &PatchKey) -> Option<&str>;
}

impl PatchEntry for ClassMember {
    fn entry_name(&self) -> &str {
        &self.name
    }

    fn from_item(item: &PatchItem) -> Option<&Self> {
        match item {
            PatchItem::Member(m) => Some(m),
            PatchItem::Base(_) => None,
        }
    }

    fn from_key(key: &PatchKey) -> Option<&str> {
        match key {
            PatchKey::Member(name) => Some(name),
            PatchKey::Base(_) => None,
        }
    }
}

impl PatchEntry for Inheritable {
    fn entry_name(&self) -> &str {
        self.name()
    }

    fn from_item(item: &PatchItem) -> Option<&Self> {
        match item {
            PatchItem::Base(b) => Some(b),
            PatchItem::Member(_) => None,
        }
    }

    fn from_key(key: &PatchKey) -> Option<&str> {
        match key {
            PatchKey::Base(name) => Some(name),
            PatchKey::Member(_) => None,
        }
    }
}

/// Apply the member edits of a patch, left to right
pub fn apply_member_patch(
    patch: &ClassPatch,
    members: &mut Vec<ClassMember>,
) -> Result<(), LayoutError> {
    apply_patch(patch, members)
}

/// Apply the base class edits of a patch, left to right
pub fn apply_base_patch(
    patch: &ClassPatch,
    bases: &mut Vec<Inheritable>,
) -> Result<(), LayoutError> {
    apply_patch(patch, bases)
}

/// Apply edits of one kind to `list`.
///
/// `replace` and `delete` on a name that is not in the list are silent no-ops.
/// A missing `insert_after` anchor
/// is an error, but only when there is something of this kind to insert.
pub fn apply_patch<T: PatchEntry>(patch: &ClassPatch, list: &mut Vec<T>) -> Result<(), LayoutError> {
    for op in &patch.ops {
        match op {
            PatchOp::InsertAfter(anchor, items) => {
                let mut items = items.iter().filter_map(T::from_item).peekable();
                if items.peek().is_none() {
                    continue;
                }
                let mut cursor = match list.iter().position(|e| e.entry_name() == anchor) {
                    Some(i) => i,
                    None => {
                        return Err(report!(LayoutError::MissingAnchor(anchor.clone())))
                            .attach_printable_lazy(|| {
                                format!("In patch for version `{}`", patch.version)
                            });
                    }
                };
                for item in items {
                    cursor += 1;
                    list.insert(cursor, item.clone());
                }
            }
            PatchOp::Replace(items) => {
                for item in items.iter().filter_map(T::from_item) {
                    if let Some(slot) = list
                        .iter_mut()
                        .find(|e| e.entry_name() == item.entry_name())
                    {
                        *slot = item.clone();
                    }
                }
            }
            PatchOp::Delete(keys) => {
                for key in keys.iter().filter_map(T::from_key) {
                    if let Some(i) = list.iter().position(|e| e.entry_name() == key) {
                        list.remove(i);
                    }
                }
            }
            PatchOp::Append(items) => {
                list.extend(items.iter().filter_map(T::from_item).cloned());
            }
            PatchOp::Prepend(items) => {
                for (i, item) in items.iter().filter_map(T::from_item).enumerate() {
                    list.insert(i, item.clone());
                }
            }
        }
    }
    Ok(())
}
