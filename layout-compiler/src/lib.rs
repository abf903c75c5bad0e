//! Compiles versioned class schemas into offset tables and accessor code.
//!
//! A class is a base schema plus one patch per version that changed it. For
//! every requested version, pointer width and base class layout the class is
//! resolved into member offsets, and the results are deduplicated and
//! compacted into version ranges.
use std::sync::Arc;

use error_stack::{report, Result, ResultExt};

pub mod error;
pub use error::LayoutError;
mod settings;
pub use settings::*;
mod schema;
pub use schema::*;
mod layout;
pub use layout::*;
mod codegen;
pub use codegen::*;

/// Output of compiling one class
#[derive(Debug, Clone)]
pub struct CompiledClass {
    pub name: String,
    pub names: Arc<MemberNames>,
    pub table: LayoutTable,
    /// Generated module of the class
    pub source: String,
}

/// Output of compiling a whole schema
#[derive(Debug, Clone)]
pub struct Compilation {
    pub versions: Arc<VersionList>,
    pub classes: Vec<CompiledClass>,
    /// Generated file with every class module
    pub source: String,
}

/// Compile a single class
pub fn compile(class: &Arc<ClassData>, settings: &Settings) -> Result<CompiledClass, LayoutError> {
    let versions = Arc::new(settings.validate()?);
    compile_class(class, &versions, settings)
}

/// Compile every class and put the generated modules in one file
pub fn compile_all(
    classes: &[Arc<ClassData>],
    settings: &Settings,
) -> Result<Compilation, LayoutError> {
    let versions = Arc::new(settings.validate()?);
    let mut modules = IdentSet::with_reserved(&["rt", "version"]);
    for class in classes {
        if modules.claim(&class.name) != ident(&class.name) {
            return Err(report!(LayoutError::ModuleNameTaken(class.name.clone())));
        }
    }
    let mut compiled = Vec::with_capacity(classes.len());
    for class in classes {
        compiled.push(compile_class(class, &versions, settings)?);
    }
    let sources = compiled
        .iter()
        .map(|c| c.source.clone())
        .collect::<Vec<_>>();
    let source = emit_file(&versions, settings, &sources);
    Ok(Compilation {
        versions,
        classes: compiled,
        source,
    })
}

fn compile_class(
    class: &Arc<ClassData>,
    versions: &Arc<VersionList>,
    settings: &Settings,
) -> Result<CompiledClass, LayoutError> {
    let names = Arc::new(MemberNames::collect(class));
    let table = LayoutTable::build(class, &names, versions, settings)?;
    let source = emit_class(class, &names, versions, &table)
        .attach_printable_lazy(|| format!("While compiling `{}`", class.name))?;
    Ok(CompiledClass {
        name: class.name.clone(),
        names,
        table,
        source,
    })
}
