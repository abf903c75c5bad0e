#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    // type registration
    #[error("Type `{0}` has zero size or zero alignment")]
    ZeroSizedType(String),
    #[error("Type `{0}` has an alignment that is not a power of two")]
    BadAlignment(String),

    // patching
    #[error("Anchor `{0}` for insert_after was not found")]
    MissingAnchor(String),
    #[error("Patch refers to unknown version `{0}`")]
    UnknownVersion(String),
    #[error("Patch for version `{0}` is out of order")]
    PatchOrder(String),

    // settings
    #[error("Version `{0}` is listed more than once")]
    DuplicateVersion(String),
    #[error("No versions were specified")]
    NoVersions,
    #[error("No pointer width was requested")]
    NoPointerWidth,
    #[error("No base class layout was requested")]
    NoBaseLayout,

    // resolution
    #[error("Name `{0}` has no slot in the member name space")]
    UnknownSlot(String),
    #[error("Offset of `{0}` does not fit in a table entry")]
    OffsetOverflow(String),
    #[error("A layout worker panicked before delivering its rows")]
    Worker,

    // code generation
    #[error("Class `{0}` maps to a module name that is already taken")]
    ModuleNameTaken(String),
}
