use error_stack::{report, Result, ResultExt};
use layout_compiler::{BaseLayout, Compilation, LookupFlags, PointerWidth, SwapClass};
use serde::Serialize;

use crate::error::Error;
use crate::schema::{schema_path, SchemaDoc, SettingsArgs};

#[derive(Debug, Clone, clap::Parser)]
pub struct DumpCLI {
    /// (Optional) Path of the schema document.
    ///
    /// If not specified, `layout-schema.yaml` is searched for in the current
    /// directory and its parents
    pub schema: Option<String>,
    /// Only dump the class with this name
    #[clap(short, long)]
    pub class: Option<String>,
    #[clap(flatten)]
    pub settings: SettingsArgs,
}

#[derive(Debug, Serialize)]
pub struct ClassDump<'a> {
    pub class: &'a str,
    pub slots: Vec<&'a str>,
    pub pointer_dependent: bool,
    pub layout_dependent: bool,
    /// Bases and members of each version, after patching
    pub versions: Vec<VersionDump<'a>>,
    pub rows: Vec<RowDump<'a>>,
}

#[derive(Debug, Serialize)]
pub struct VersionDump<'a> {
    pub version: &'a str,
    pub bases: Vec<String>,
    pub members: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RowDump<'a> {
    pub version_begin: &'a str,
    pub version_end: &'a str,
    pub pointer_width: PointerWidth,
    pub base_layout: BaseLayout,
    pub total_size: usize,
    pub offsets: &'a [i32],
    pub swaps: &'a [SwapClass],
    pub packed_swaps: Vec<u16>,
}

pub fn run_cli(cli: DumpCLI) -> Result<(), Error> {
    let path = schema_path(cli.schema)?;
    let mut schema = SchemaDoc::load(&path)?.build()?;
    cli.settings.apply(&mut schema.settings);
    let classes = match &cli.class {
        Some(name) => {
            let class = schema
                .classes
                .iter()
                .find(|c| &c.name == name)
                .cloned()
                .ok_or_else(|| report!(Error::UnknownClass(name.clone())))?;
            vec![class]
        }
        None => schema.classes.clone(),
    };
    let compilation = layout_compiler::compile_all(&classes, &schema.settings)
        .change_context(Error::Compile)?;
    let dumps = dump_compilation(&compilation, &classes)?;
    let json = serde_json::to_string_pretty(&dumps).change_context(Error::WriteOutput)?;
    println!("{}", json);
    Ok(())
}

fn dump_compilation<'a>(
    compilation: &'a Compilation,
    classes: &[std::sync::Arc<layout_compiler::ClassData>],
) -> Result<Vec<ClassDump<'a>>, Error> {
    let versions = &compilation.versions;
    let mut out = Vec::with_capacity(classes.len());
    for (class, compiled) in classes.iter().zip(&compilation.classes) {
        let mut by_version = Vec::with_capacity(versions.len());
        for (id, version) in versions.iter() {
            let bases = class
                .bases_at(versions, id)
                .change_context(Error::Compile)?
                .iter()
                .map(|b| b.name().to_string())
                .collect();
            let members = class
                .members_at(versions, id)
                .change_context(Error::Compile)?
                .into_iter()
                .map(|m| m.name)
                .collect();
            by_version.push(VersionDump {
                version,
                bases,
                members,
            });
        }
        let rows = compiled
            .table
            .rows
            .iter()
            .map(|row| RowDump {
                version_begin: versions.name(row.version_begin),
                version_end: versions.name(row.version_end),
                pointer_width: row.pointer_width,
                base_layout: row.base_layout,
                total_size: row.total_size,
                offsets: &row.offsets,
                swaps: &row.swaps,
                packed_swaps: row.packed_swaps(),
            })
            .collect();
        out.push(ClassDump {
            class: &compiled.name,
            slots: compiled.names.iter().collect(),
            pointer_dependent: compiled.table.flags.contains(LookupFlags::PTR),
            layout_dependent: compiled.table.flags.contains(LookupFlags::PADDING),
            versions: by_version,
            rows,
        });
    }
    Ok(out)
}
