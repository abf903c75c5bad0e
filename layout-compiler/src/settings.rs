use std::collections::HashSet;

use error_stack::{report, Result};
use serde::{Deserialize, Serialize};

use crate::LayoutError;

/// Width of pointers in the target binary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerWidth {
    X86,
    X64,
}

impl PointerWidth {
    /// Size of a pointer in bytes
    pub fn size(self) -> usize {
        match self {
            Self::X86 => 4,
            Self::X64 => 8,
        }
    }
}

impl std::fmt::Display for PointerWidth {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::X86 => write!(f, "x86"),
            Self::X64 => write!(f, "x64"),
        }
    }
}

/// Base class layout convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseLayout {
    /// Trailing padding of a base is never reused
    Msvc,
    /// Trailing padding of a base is reused by the next member (Itanium ABI)
    Gnu,
}

impl std::fmt::Display for BaseLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Msvc => write!(f, "msvc"),
            Self::Gnu => write!(f, "gnu"),
        }
    }
}

/// ABI parameters for one resolution pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Abi {
    pub pointer_width: PointerWidth,
    pub base_layout: BaseLayout,
    /// If pointers get a swap class matching their width
    pub swap_pointers: bool,
}

impl Abi {
    pub fn new(pointer_width: PointerWidth, base_layout: BaseLayout) -> Self {
        Self {
            pointer_width,
            base_layout,
            swap_pointers: true,
        }
    }

    #[inline]
    pub fn is_gnu(&self) -> bool {
        self.base_layout == BaseLayout::Gnu
    }
}

impl std::fmt::Display for Abi {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}-{}", self.base_layout, self.pointer_width)
    }
}

/// Index of a version in a [`VersionList`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct VersionId(usize);

impl VersionId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// The ordered set of version markers a schema is compiled for.
///
/// Patch order, table row ranges and accessor suffixes are all decided by
/// this order, so it is fixed once and shared by every pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionList {
    names: Vec<String>,
}

impl VersionList {
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Result<Self, LayoutError> {
        let names = names.into_iter().map(Into::into).collect::<Vec<String>>();
        if names.is_empty() {
            return Err(report!(LayoutError::NoVersions));
        }
        let mut seen = HashSet::new();
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(report!(LayoutError::DuplicateVersion(name.clone())));
            }
        }
        Ok(Self { names })
    }

    pub fn index_of(&self, name: &str) -> Option<VersionId> {
        self.names.iter().position(|n| n == name).map(VersionId)
    }

    /// Name of the version. Panics if the id is not from this list
    pub fn name(&self, id: VersionId) -> &str {
        &self.names[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = (VersionId, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, n)| (VersionId(i), n.as_str()))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Compilation settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// Version markers, in ascending order
    pub versions: Vec<String>,
    pub x86: bool,
    pub x64: bool,
    pub msvc: bool,
    pub gnu: bool,
    /// Give pointers no swap class
    pub ignore_pointer_endianness: bool,
    /// Path of the runtime module the generated code imports from
    pub runtime_path: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            versions: Vec::new(),
            x86: false,
            x64: true,
            msvc: true,
            gnu: false,
            ignore_pointer_endianness: false,
            runtime_path: "layout_runtime".to_string(),
        }
    }
}

impl Settings {
    pub fn with_versions<S: Into<String>>(versions: impl IntoIterator<Item = S>) -> Self {
        Self {
            versions: versions.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Check the settings and build the version list
    pub fn validate(&self) -> Result<VersionList, LayoutError> {
        if !self.x86 && !self.x64 {
            return Err(report!(LayoutError::NoPointerWidth));
        }
        if !self.msvc && !self.gnu {
            return Err(report!(LayoutError::NoBaseLayout));
        }
        VersionList::new(self.versions.iter().cloned())
    }

    /// Requested pointer widths, 64-bit first
    pub fn pointer_widths(&self) -> Vec<PointerWidth> {
        let mut out = Vec::with_capacity(2);
        if self.x64 {
            out.push(PointerWidth::X64);
        }
        if self.x86 {
            out.push(PointerWidth::X86);
        }
        out
    }

    /// Requested base layouts, MSVC first
    pub fn base_layouts(&self) -> Vec<BaseLayout> {
        let mut out = Vec::with_capacity(2);
        if self.msvc {
            out.push(BaseLayout::Msvc);
        }
        if self.gnu {
            out.push(BaseLayout::Gnu);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_versions() {
        let err = VersionList::new(["V1", "V2", "V1"]).unwrap_err();
        assert!(matches!(
            err.current_context(),
            LayoutError::DuplicateVersion(v) if v == "V1"
        ));
    }

    #[test]
    fn rejects_missing_axes() {
        let mut settings = Settings::with_versions(["V1"]);
        settings.x64 = false;
        let err = settings.validate().unwrap_err();
        assert!(matches!(err.current_context(), LayoutError::NoPointerWidth));

        let mut settings = Settings::with_versions(["V1"]);
        settings.msvc = false;
        let err = settings.validate().unwrap_err();
        assert!(matches!(err.current_context(), LayoutError::NoBaseLayout));

        let err = Settings::default().validate().unwrap_err();
        assert!(matches!(err.current_context(), LayoutError::NoVersions));
    }

    #[test]
    fn axis_order_is_fixed() {
        let settings = Settings {
            x86: true,
            gnu: true,
            ..Settings::with_versions(["V1"])
        };
        assert_eq!(
            settings.pointer_widths(),
            vec![PointerWidth::X64, PointerWidth::X86]
        );
        assert_eq!(
            settings.base_layouts(),
            vec![BaseLayout::Msvc, BaseLayout::Gnu]
        );
    }
}
