use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use error_stack::{report, Result, ResultExt};
use layout_compiler::{
    BaseLayout, ClassData, ClassPatch, NamedType, PatchItem, PatchKey, PointerWidth, Settings,
    Shape, SwapClass, TypePrim,
};
use serde::Deserialize;

use crate::error::Error;

/// The schema document, as written in YAML
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SchemaDoc {
    pub settings: SettingsDoc,
    pub types: Vec<TypeDoc>,
    pub classes: Vec<ClassDoc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SettingsDoc {
    pub versions: Vec<String>,
    pub pointer_widths: Vec<PointerWidth>,
    pub layouts: Vec<BaseLayout>,
    pub ignore_pointer_endianness: bool,
    pub runtime_path: Option<String>,
}

impl Default for SettingsDoc {
    fn default() -> Self {
        Self {
            versions: Vec::new(),
            pointer_widths: vec![PointerWidth::X64],
            layouts: vec![BaseLayout::Msvc],
            ignore_pointer_endianness: false,
            runtime_path: None,
        }
    }
}

impl SettingsDoc {
    pub fn to_settings(&self) -> Settings {
        let mut settings = Settings::with_versions(self.versions.iter().cloned());
        settings.x86 = self.pointer_widths.contains(&PointerWidth::X86);
        settings.x64 = self.pointer_widths.contains(&PointerWidth::X64);
        settings.msvc = self.layouts.contains(&BaseLayout::Msvc);
        settings.gnu = self.layouts.contains(&BaseLayout::Gnu);
        settings.ignore_pointer_endianness = self.ignore_pointer_endianness;
        if let Some(path) = &self.runtime_path {
            settings.runtime_path = path.clone();
        }
        settings
    }
}

/// A registered type with a fixed layout
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TypeDoc {
    pub name: String,
    pub size: usize,
    pub align: usize,
    #[serde(default)]
    pub swap: SwapClass,
}

/// Reference to a type: a name, or a pointer/array/template of other types
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TypeRef {
    Name(String),
    Pointer { pointer: Box<TypeRef> },
    Array { array: ArrayRef },
    Template { template: TemplateRef },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ArrayRef {
    pub of: Box<TypeRef>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TemplateRef {
    pub name: String,
    #[serde(default)]
    pub args: Vec<TypeRef>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MemberDoc {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClassDoc {
    pub name: String,
    #[serde(default)]
    pub bases: Vec<String>,
    #[serde(default)]
    pub members: Vec<MemberDoc>,
    #[serde(default)]
    pub patches: Vec<PatchDoc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PatchDoc {
    pub version: String,
    #[serde(default)]
    pub ops: Vec<OpDoc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OpDoc {
    InsertAfter {
        insert_after: String,
        items: Vec<ItemDoc>,
    },
    Replace {
        replace: Vec<ItemDoc>,
    },
    Delete {
        delete: Vec<KeyDoc>,
    },
    Append {
        append: Vec<ItemDoc>,
    },
    Prepend {
        prepend: Vec<ItemDoc>,
    },
}

/// Patch payload: `{ member: { name, type } }` or `{ base: Name }`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ItemDoc {
    Member { member: MemberDoc },
    Base { base: String },
}

/// Delete key: `{ member: name }` or `{ base: Name }`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum KeyDoc {
    Member { member: String },
    Base { base: String },
}

/// The schema built from a document, ready to compile
#[derive(Debug, Clone)]
pub struct Schema {
    pub settings: Settings,
    /// In document order
    pub classes: Vec<Arc<ClassData>>,
}

impl SchemaDoc {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)
            .change_context(Error::ReadSchema)
            .attach_printable_lazy(|| format!("Path: {}", path.display()))?;
        Self::parse(&text).attach_printable_lazy(|| format!("Path: {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self, Error> {
        serde_yaml::from_str(text).change_context(Error::ParseSchema)
    }

    /// Build the in-memory classes. A class can only refer to classes
    /// defined before it in the document
    pub fn build(&self) -> Result<Schema, Error> {
        let mut scope = Scope::default();
        for ty in &self.types {
            let named = NamedType::new(&ty.name, ty.size, ty.align, ty.swap)
                .change_context(Error::BuildSchema)?;
            scope.types.insert(ty.name.clone(), named);
        }
        let mut classes = Vec::with_capacity(self.classes.len());
        for class in &self.classes {
            let data = Arc::new(
                scope
                    .class_data(class)
                    .attach_printable_lazy(|| format!("While building class `{}`", class.name))?,
            );
            tracing::debug!(
                "built class `{}` with {} patches",
                data.name,
                data.patches.len()
            );
            scope.classes.insert(class.name.clone(), Arc::clone(&data));
            classes.push(data);
        }
        Ok(Schema {
            settings: self.settings.to_settings(),
            classes,
        })
    }
}

#[derive(Default)]
struct Scope {
    types: HashMap<String, NamedType>,
    classes: HashMap<String, Arc<ClassData>>,
}

impl Scope {
    fn class(&self, name: &str) -> Result<Arc<ClassData>, Error> {
        self.classes
            .get(name)
            .cloned()
            .ok_or_else(|| report!(Error::UnknownClass(name.to_string())))
    }

    fn shape(&self, ty: &TypeRef) -> Result<Shape, Error> {
        match ty {
            TypeRef::Name(name) => {
                if let Some(p) = TypePrim::from_name(name) {
                    return Ok(p.into());
                }
                if let Some(n) = self.types.get(name) {
                    return Ok(Shape::named(n.clone()));
                }
                if let Some(c) = self.classes.get(name) {
                    return Ok(Arc::clone(c).into());
                }
                Err(report!(Error::UnknownType(name.clone())))
            }
            TypeRef::Pointer { pointer } => Ok(Shape::pointer(self.shape(pointer)?)),
            TypeRef::Array { array } => Ok(Shape::array(self.shape(&array.of)?, array.count)),
            TypeRef::Template { template } => {
                let args = template
                    .args
                    .iter()
                    .map(|a| self.shape(a))
                    .collect::<Result<Vec<_>, Error>>()?;
                Ok(Shape::template(&template.name, args))
            }
        }
    }

    fn item(&self, item: &ItemDoc) -> Result<PatchItem, Error> {
        match item {
            ItemDoc::Member { member } => {
                let shape = self
                    .shape(&member.ty)
                    .attach_printable_lazy(|| format!("Type of member `{}`", member.name))?;
                Ok(PatchItem::member(&member.name, shape))
            }
            ItemDoc::Base { base } => Ok(PatchItem::base(self.class(base)?)),
        }
    }

    fn items(&self, items: &[ItemDoc]) -> Result<Vec<PatchItem>, Error> {
        items.iter().map(|i| self.item(i)).collect()
    }

    fn class_data(&self, doc: &ClassDoc) -> Result<ClassData, Error> {
        let mut class = ClassData::new(&doc.name);
        for base in &doc.bases {
            class = class.with_base(self.class(base)?);
        }
        for member in &doc.members {
            let shape = self
                .shape(&member.ty)
                .attach_printable_lazy(|| format!("Type of member `{}`", member.name))?;
            class = class.with_member(&member.name, shape);
        }
        for patch in &doc.patches {
            let mut out = ClassPatch::new(&patch.version);
            for op in &patch.ops {
                out = match op {
                    OpDoc::InsertAfter {
                        insert_after,
                        items,
                    } => out.insert_after(insert_after, self.items(items)?),
                    OpDoc::Replace { replace } => out.replace(self.items(replace)?),
                    OpDoc::Delete { delete } => out.delete(delete.iter().map(|k| match k {
                        KeyDoc::Member { member } => PatchKey::Member(member.clone()),
                        KeyDoc::Base { base } => PatchKey::Base(base.clone()),
                    })),
                    OpDoc::Append { append } => out.append(self.items(append)?),
                    OpDoc::Prepend { prepend } => out.prepend(self.items(prepend)?),
                };
            }
            class = class.with_patch(out);
        }
        Ok(class)
    }
}

/// Use the given schema path, or search for the schema document
pub fn schema_path(arg: Option<String>) -> Result<PathBuf, Error> {
    match arg {
        Some(path) => Ok(PathBuf::from(path)),
        None => common::find_schema()
            .ok_or(Error::SchemaNotFound)
            .attach_printable_lazy(|| {
                format!(
                    "Please run inside a directory with `{}` or specify the path manually",
                    common::SCHEMA_FILE
                )
            }),
    }
}

/// ABI flags that override the `settings:` of the document
#[derive(Debug, Clone, Default, clap::Args)]
pub struct SettingsArgs {
    /// Compile for 32-bit pointers. Combine with --x64 to compile for both
    #[clap(long)]
    pub x86: bool,
    /// Compile for 64-bit pointers
    #[clap(long)]
    pub x64: bool,
    /// Compile for the MSVC base class layout
    #[clap(long)]
    pub msvc: bool,
    /// Compile for the GNU base class layout, where members can be placed
    /// in the trailing padding of a base. Combine with --msvc to compile for both
    #[clap(long)]
    pub gnu: bool,
    /// Do not byte swap pointers
    #[clap(long)]
    pub ignore_pointer_endianness: bool,
}

impl SettingsArgs {
    pub fn apply(&self, settings: &mut Settings) {
        if self.x86 || self.x64 {
            settings.x86 = self.x86;
            settings.x64 = self.x64;
        }
        if self.msvc || self.gnu {
            settings.msvc = self.msvc;
            settings.gnu = self.gnu;
        }
        if self.ignore_pointer_endianness {
            settings.ignore_pointer_endianness = true;
        }
    }
}
