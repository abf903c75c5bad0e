use std::collections::BTreeSet;
use std::sync::Arc;

use error_stack::{report, Result, ResultExt};

use super::{apply_base_patch, apply_member_patch, ClassPatch, PatchItem, Shape};
use crate::{LayoutError, VersionId, VersionList};

/// A named field of a class
#[derive(Debug, Clone, PartialEq)]
pub struct ClassMember {
    pub name: String,
    pub shape: Shape,
}

impl ClassMember {
    pub fn new(name: impl Into<String>, shape: impl Into<Shape>) -> Self {
        Self {
            name: name.into(),
            shape: shape.into(),
        }
    }
}

/// A base class reference
#[derive(Debug, Clone, PartialEq)]
pub struct Inheritable(pub Arc<ClassData>);

impl Inheritable {
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Name of the slot the base occupies in the member name space
    pub fn slot_name(&self) -> String {
        base_slot_name(self.name())
    }
}

impl From<Arc<ClassData>> for Inheritable {
    fn from(class: Arc<ClassData>) -> Self {
        Self(class)
    }
}

/// Slot name for a base class
pub fn base_slot_name(class_name: &str) -> String {
    format!("base{class_name}")
}

/// A class described by its base schema and the patches of later versions
#[derive(Debug, Clone, PartialEq)]
pub struct ClassData {
    pub name: String,
    pub bases: Vec<Inheritable>,
    pub members: Vec<ClassMember>,
    /// Ordered by version, strictly ascending
    pub patches: Vec<ClassPatch>,
}

impl ClassData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bases: Vec::new(),
            members: Vec::new(),
            patches: Vec::new(),
        }
    }

    pub fn with_base(mut self, base: impl Into<Inheritable>) -> Self {
        self.bases.push(base.into());
        self
    }

    pub fn with_member(mut self, name: impl Into<String>, shape: impl Into<Shape>) -> Self {
        self.members.push(ClassMember::new(name, shape));
        self
    }

    pub fn with_patch(mut self, patch: ClassPatch) -> Self {
        self.patches.push(patch);
        self
    }

    /// Bases and members as of `version`.
    ///
    /// Replays the base schema through every patch up to and including the
    /// version. Nothing is cached: each call starts from the base schema.
    pub fn entries_at(
        &self,
        versions: &VersionList,
        version: VersionId,
    ) -> Result<(Vec<Inheritable>, Vec<ClassMember>), LayoutError> {
        let mut bases = self.bases.clone();
        let mut members = self.members.clone();
        let mut last: Option<VersionId> = None;
        for patch in &self.patches {
            let id = versions
                .index_of(&patch.version)
                .ok_or_else(|| report!(LayoutError::UnknownVersion(patch.version.clone())))
                .attach_printable_lazy(|| format!("In class `{}`", self.name))?;
            if let Some(last) = last {
                if id <= last {
                    return Err(report!(LayoutError::PatchOrder(patch.version.clone())))
                        .attach_printable(format!("In class `{}`", self.name))
                        .attach_printable(format!(
                            "Follows a patch for version `{}`",
                            versions.name(last)
                        ));
                }
            }
            last = Some(id);
            if id > version {
                break;
            }
            apply_base_patch(patch, &mut bases)
                .attach_printable_lazy(|| format!("While patching bases of `{}`", self.name))?;
            apply_member_patch(patch, &mut members)
                .attach_printable_lazy(|| format!("While patching members of `{}`", self.name))?;
        }
        Ok((bases, members))
    }

    /// Members as of `version`
    pub fn members_at(
        &self,
        versions: &VersionList,
        version: VersionId,
    ) -> Result<Vec<ClassMember>, LayoutError> {
        Ok(self.entries_at(versions, version)?.1)
    }

    /// Bases as of `version`
    pub fn bases_at(
        &self,
        versions: &VersionList,
        version: VersionId,
    ) -> Result<Vec<Inheritable>, LayoutError> {
        Ok(self.entries_at(versions, version)?.0)
    }

    /// Add every member name and base slot name the class can ever have,
    /// in the base schema or in any patch
    pub fn collect_names(&self, names: &mut BTreeSet<String>) {
        for base in &self.bases {
            names.insert(base.slot_name());
        }
        for member in &self.members {
            names.insert(member.name.clone());
        }
        for item in self.patches.iter().flat_map(|p| p.items()) {
            match item {
                PatchItem::Member(m) => names.insert(m.name.clone()),
                PatchItem::Base(b) => names.insert(b.slot_name()),
            };
        }
    }
}
