use std::path::PathBuf;

use error_stack::{Result, ResultExt};

use crate::error::Error;
use crate::schema::{schema_path, SchemaDoc, SettingsArgs};

#[derive(Debug, Clone, clap::Parser)]
pub struct CompileCLI {
    /// (Optional) Path of the schema document.
    ///
    /// If not specified, `layout-schema.yaml` is searched for in the current
    /// directory and its parents
    pub schema: Option<String>,
    /// Output path of the generated source file.
    ///
    /// If not specified, it will be set to `layouts.rs` next to the schema document
    #[clap(short, long)]
    pub output: Option<String>,
    #[clap(flatten)]
    pub settings: SettingsArgs,
}

pub fn run_cli(cli: CompileCLI) -> Result<(), Error> {
    let path = schema_path(cli.schema)?;
    let output = cli
        .output
        .map_or_else(|| path.with_file_name("layouts.rs"), PathBuf::from);
    let mut schema = SchemaDoc::load(&path)?.build()?;
    cli.settings.apply(&mut schema.settings);
    tracing::info!(
        "compiling {} classes from {} for {} versions",
        schema.classes.len(),
        path.display(),
        schema.settings.versions.len()
    );

    let compilation = layout_compiler::compile_all(&schema.classes, &schema.settings)
        .change_context(Error::Compile)?;
    let rows = compilation
        .classes
        .iter()
        .map(|c| c.table.rows.len())
        .sum::<usize>();

    common::ensure_parent_exists(&output)
        .change_context(Error::WriteOutput)
        .attach_printable_lazy(|| format!("Path: {}", output.display()))?;
    std::fs::write(&output, compilation.source)
        .change_context(Error::WriteOutput)
        .attach_printable_lazy(|| format!("Path: {}", output.display()))?;
    tracing::info!(
        "wrote {} classes ({} layout rows) to {}",
        compilation.classes.len(),
        rows,
        output.display()
    );
    Ok(())
}
