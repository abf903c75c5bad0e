use std::path::PathBuf;

/// File name of the schema document searched for by [`find_schema`]
pub const SCHEMA_FILE: &str = "layout-schema.yaml";

/// Try to find the schema document in the current directory or one of its
/// parents
pub fn find_schema() -> Option<PathBuf> {
    let current = dunce::canonicalize(".").ok()?;
    find_schema_from(current)
}

/// Same as [`find_schema`], starting from `dir`
pub fn find_schema_from(dir: impl Into<PathBuf>) -> Option<PathBuf> {
    let mut current = dir.into();
    loop {
        if !current.exists() {
            return None;
        }
        let schema = current.join(SCHEMA_FILE);
        if schema.is_file() {
            return Some(schema);
        }
        current = current.parent()?.to_path_buf();
    }
}
