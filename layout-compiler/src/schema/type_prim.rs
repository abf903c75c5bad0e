use error_stack::{report, Result, ResultExt};
use serde::{Deserialize, Serialize};

use crate::LayoutError;

/// Byte-swap width needed to correct a field's endianness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapClass {
    #[default]
    None = 0,
    S16 = 1,
    S32 = 2,
    S64 = 3,
}

impl SwapClass {
    /// The 2-bit code stored in packed swap groups
    #[inline]
    pub fn bits(self) -> u16 {
        self as u16
    }

    /// Decode a 2-bit code. Only the low 2 bits are looked at
    pub fn from_bits(bits: u16) -> Self {
        match bits & 3 {
            1 => Self::S16,
            2 => Self::S32,
            3 => Self::S64,
            _ => Self::None,
        }
    }
}

/// Primitive types in the built-in catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypePrim {
    /// Boolean
    Bool,
    /// Unsigned, 8-bit
    U8,
    /// Signed, 8-bit
    I8,
    /// Unsigned, 16-bit
    U16,
    /// Signed, 16-bit
    I16,
    /// Unsigned, 32-bit
    U32,
    /// Signed, 32-bit
    I32,
    /// Unsigned, 64-bit
    U64,
    /// Signed, 64-bit
    I64,
    /// Floating point, 32-bit
    F32,
    /// Floating point, 64-bit
    F64,
    /// 2 floats
    Vector2,
    /// 3 floats
    Vector,
    /// 4 floats
    Vector4,
    /// 4 floats, 16-byte aligned
    Vector4A16,
}

impl TypePrim {
    /// Size of the type in bytes
    pub fn size(&self) -> usize {
        match self {
            Self::Bool | Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::U64 | Self::I64 | Self::F64 | Self::Vector2 => 8,
            Self::Vector => 12,
            Self::Vector4 | Self::Vector4A16 => 16,
        }
    }

    pub fn alignment(&self) -> usize {
        match self {
            Self::Vector2 | Self::Vector | Self::Vector4 => 4,
            Self::Vector4A16 => 16,
            _ => self.size(),
        }
    }

    /// Vectors are swapped component-wise by the consumer, not as a unit
    pub fn swap_class(&self) -> SwapClass {
        match self {
            Self::U16 | Self::I16 => SwapClass::S16,
            Self::U32 | Self::I32 | Self::F32 => SwapClass::S32,
            Self::U64 | Self::I64 | Self::F64 => SwapClass::S64,
            _ => SwapClass::None,
        }
    }

    /// If the type is a Rust scalar (not a vector type)
    pub fn is_scalar(&self) -> bool {
        !matches!(
            self,
            Self::Vector2 | Self::Vector | Self::Vector4 | Self::Vector4A16
        )
    }

    /// The unsigned integer that has the same layout as a pointer
    pub fn pointer_repr(x64: bool) -> Self {
        if x64 {
            Self::U64
        } else {
            Self::U32
        }
    }

    /// Look up a catalog entry by name. Accepts the Rust names and the
    /// `uint32`/`float` style aliases
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => Self::Bool,
            "u8" | "uint8" => Self::U8,
            "i8" | "int8" => Self::I8,
            "u16" | "uint16" => Self::U16,
            "i16" | "int16" => Self::I16,
            "u32" | "uint32" => Self::U32,
            "i32" | "int32" => Self::I32,
            "u64" | "uint64" => Self::U64,
            "i64" | "int64" => Self::I64,
            "f32" | "float" => Self::F32,
            "f64" | "double" => Self::F64,
            "Vector2" => Self::Vector2,
            "Vector" => Self::Vector,
            "Vector4" => Self::Vector4,
            "Vector4A16" => Self::Vector4A16,
            _ => return None,
        })
    }
}

impl std::fmt::Display for TypePrim {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            TypePrim::Bool => write!(f, "bool"),
            TypePrim::U8 => write!(f, "u8"),
            TypePrim::I8 => write!(f, "i8"),
            TypePrim::U16 => write!(f, "u16"),
            TypePrim::I16 => write!(f, "i16"),
            TypePrim::U32 => write!(f, "u32"),
            TypePrim::I32 => write!(f, "i32"),
            TypePrim::U64 => write!(f, "u64"),
            TypePrim::I64 => write!(f, "i64"),
            TypePrim::F32 => write!(f, "f32"),
            TypePrim::F64 => write!(f, "f64"),
            TypePrim::Vector2 => write!(f, "Vector2"),
            TypePrim::Vector => write!(f, "Vector"),
            TypePrim::Vector4 => write!(f, "Vector4"),
            TypePrim::Vector4A16 => write!(f, "Vector4A16"),
        }
    }
}

/// A user registered type with a fixed layout
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamedType {
    pub name: String,
    pub size: usize,
    pub alignment: usize,
    pub swap: SwapClass,
}

impl NamedType {
    pub fn new(
        name: impl Into<String>,
        size: usize,
        alignment: usize,
        swap: SwapClass,
    ) -> Result<Self, LayoutError> {
        let name = name.into();
        if size == 0 || alignment == 0 {
            return Err(report!(LayoutError::ZeroSizedType(name)))
                .attach_printable(format!("size={size}, alignment={alignment}"));
        }
        if !alignment.is_power_of_two() {
            return Err(report!(LayoutError::BadAlignment(name)))
                .attach_printable(format!("alignment={alignment}"));
        }
        Ok(Self {
            name,
            size,
            alignment,
            swap,
        })
    }
}
