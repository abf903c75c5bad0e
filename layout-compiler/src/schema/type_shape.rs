use std::sync::Arc;

use error_stack::{report, Result, ResultExt};

use super::{ClassData, NamedType, SwapClass, TypePrim};
use crate::{Abi, LayoutError, VersionId, VersionList};

/// Round `value` up to a multiple of `alignment`. An alignment of 0 or 1 is a no-op
#[inline]
pub fn align_up(value: usize, alignment: usize) -> usize {
    if alignment <= 1 {
        return value;
    }
    let rem = value % alignment;
    if rem == 0 {
        value
    } else {
        value + alignment - rem
    }
}

/// Placement of a shape or class in a byte buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    /// First byte, inclusive
    pub begin: usize,
    /// Last byte, exclusive. Includes trailing padding for classes
    pub end: usize,
    pub alignment: usize,
    /// Bytes at the end that are only there for alignment
    pub trailing_padding: usize,
}

impl Location {
    /// Place the value at `begin` with the given size and alignment
    pub fn sized(begin: usize, size: usize, alignment: usize) -> Self {
        Self {
            begin,
            end: begin + size,
            alignment,
            trailing_padding: 0,
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.end - self.begin
    }

    /// Move a location computed at offset 0 onto `offset`, aligned
    pub fn rebase(self, offset: usize) -> Self {
        let begin = align_up(offset, self.alignment);
        Self {
            begin,
            end: begin + self.end,
            alignment: self.alignment,
            trailing_padding: self.trailing_padding,
        }
    }
}

/// What a layout is being computed for: one version under one ABI
#[derive(Debug, Clone, Copy)]
pub struct LayoutCtx<'a> {
    pub versions: &'a VersionList,
    pub version: VersionId,
    pub abi: Abi,
}

impl<'a> LayoutCtx<'a> {
    pub fn version_name(&self) -> &'a str {
        self.versions.name(self.version)
    }
}

/// Physical shape of a field
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Built-in primitive
    Prim(TypePrim),
    /// Registered type with a fixed layout
    Named(Arc<NamedType>),
    /// T*, sized by the ABI pointer width
    Pointer(Box<Shape>),
    /// T[count], stored inline
    InlineArray(Box<Shape>, usize),
    /// Generic wrapper laid out like its first argument
    Template(TemplateLink),
    /// Another class stored by value
    Class(Arc<ClassData>),
}

/// Instance of a generic type
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateLink {
    pub name: String,
    pub args: Vec<Shape>,
}

impl Shape {
    pub fn pointer(to: impl Into<Shape>) -> Self {
        Self::Pointer(Box::new(to.into()))
    }

    pub fn array(of: impl Into<Shape>, count: usize) -> Self {
        Self::InlineArray(Box::new(of.into()), count)
    }

    pub fn template(name: impl Into<String>, args: Vec<Shape>) -> Self {
        Self::Template(TemplateLink {
            name: name.into(),
            args,
        })
    }

    pub fn named(ty: NamedType) -> Self {
        Self::Named(Arc::new(ty))
    }

    /// If accessors can read the value directly, without a layout lookup
    pub fn is_plain(&self) -> bool {
        matches!(self, Self::Prim(_) | Self::Named(_))
    }

    /// Place the shape at the first suitably aligned offset at or after `offset`
    pub fn locate(&self, offset: usize, ctx: &LayoutCtx) -> Result<Location, LayoutError> {
        match self {
            Self::Prim(p) => Ok(Location::sized(
                align_up(offset, p.alignment()),
                p.size(),
                p.alignment(),
            )),
            Self::Named(n) => Ok(Location::sized(
                align_up(offset, n.alignment),
                n.size,
                n.alignment,
            )),
            Self::Pointer(_) => {
                let x64 = ctx.abi.pointer_width.size() == 8;
                Self::Prim(TypePrim::pointer_repr(x64)).locate(offset, ctx)
            }
            Self::InlineArray(elem, count) => {
                let loc = elem.locate(offset, ctx)?;
                Ok(Location::sized(
                    loc.begin,
                    loc.size() * count,
                    loc.alignment,
                ))
            }
            Self::Template(link) => {
                let inner = match link.args.first() {
                    Some(x) => x,
                    None => {
                        return Err(report!(LayoutError::ZeroSizedType(link.name.clone())))
                            .attach_printable("Template instance has no arguments");
                    }
                };
                let natural = inner.locate(0, ctx)?;
                Ok(natural.rebase(offset))
            }
            Self::Class(class) => crate::layout::locate_class(class, offset, ctx),
        }
    }

    pub fn swap_class(&self, abi: &Abi) -> SwapClass {
        match self {
            Self::Prim(p) => p.swap_class(),
            Self::Named(n) => n.swap,
            Self::Pointer(_) => {
                if !abi.swap_pointers {
                    return SwapClass::None;
                }
                match abi.pointer_width.size() {
                    8 => SwapClass::S64,
                    _ => SwapClass::S32,
                }
            }
            // arrays and composites are swapped item by item by the consumer
            Self::InlineArray(_, _) | Self::Template(_) | Self::Class(_) => SwapClass::None,
        }
    }
}

impl From<TypePrim> for Shape {
    fn from(p: TypePrim) -> Self {
        Self::Prim(p)
    }
}

impl From<Arc<ClassData>> for Shape {
    fn from(class: Arc<ClassData>) -> Self {
        Self::Class(class)
    }
}

impl From<NamedType> for Shape {
    fn from(ty: NamedType) -> Self {
        Self::named(ty)
    }
}
