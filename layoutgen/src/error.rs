#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Schema document not found.")]
    SchemaNotFound,
    #[error("Failed to read schema document")]
    ReadSchema,
    #[error("Failed to parse schema document")]
    ParseSchema,
    #[error("Failed to build schema")]
    BuildSchema,
    #[error("Type `{0}` is not a primitive, a registered type or an earlier class")]
    UnknownType(String),
    #[error("Class `{0}` is not defined before it is used")]
    UnknownClass(String),
    #[error("Failed to compile schema")]
    Compile,
    #[error("Failed to write output")]
    WriteOutput,
}
