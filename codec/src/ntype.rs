use serde::{Serialize, Serializer};
use std::fmt;

/// Type keywords in code order. The position of a keyword is its wire code,
/// so this table must never be reordered.
pub const TYPE_KEYWORDS: [&str; 19] = [
    "",
    "BOOL",
    "UINT",
    "UINT-8",
    "UINT-16",
    "UINT-32",
    "UINT-64",
    "SINT",
    "SINT-8",
    "SINT-16",
    "SINT-32",
    "SINT-64",
    "FLOAT",
    "FLOAT-32",
    "FLOAT-64",
    "UTF8",
    "BLOB",
    "COLLECTION",
    "VARIADIC",
];

/// The closed set of node types a schema can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum TypeCode {
    /// No type: the schema root, or a node whose type is still to be inherited.
    #[default]
    None = 0,
    Bool = 1,
    Uint = 2,
    Uint8 = 3,
    Uint16 = 4,
    Uint32 = 5,
    Uint64 = 6,
    Sint = 7,
    Sint8 = 8,
    Sint16 = 9,
    Sint32 = 10,
    Sint64 = 11,
    Float = 12,
    Float32 = 13,
    Float64 = 14,
    Utf8 = 15,
    Blob = 16,
    Collection = 17,
    Variadic = 18,
}

const ALL: [TypeCode; 19] = [
    TypeCode::None,
    TypeCode::Bool,
    TypeCode::Uint,
    TypeCode::Uint8,
    TypeCode::Uint16,
    TypeCode::Uint32,
    TypeCode::Uint64,
    TypeCode::Sint,
    TypeCode::Sint8,
    TypeCode::Sint16,
    TypeCode::Sint32,
    TypeCode::Sint64,
    TypeCode::Float,
    TypeCode::Float32,
    TypeCode::Float64,
    TypeCode::Utf8,
    TypeCode::Blob,
    TypeCode::Collection,
    TypeCode::Variadic,
];

impl TypeCode {
    /// Decode an externally supplied type code.
    pub fn from_code(code: u64) -> Option<TypeCode> {
        usize::try_from(code).ok().and_then(|i| ALL.get(i).copied())
    }

    /// Look up a type keyword. The empty keyword maps to `TypeCode::None`.
    pub fn from_keyword(keyword: &str) -> Option<TypeCode> {
        TYPE_KEYWORDS
            .iter()
            .position(|&k| k == keyword)
            .map(|i| ALL[i])
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn keyword(self) -> &'static str {
        TYPE_KEYWORDS[self as usize]
    }

    /// COLLECTION and VARIADIC open a nested scope.
    pub fn is_composite(self) -> bool {
        matches!(self, TypeCode::Collection | TypeCode::Variadic)
    }

    pub fn is_primitive(self) -> bool {
        !self.is_composite() && self != TypeCode::None
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            TypeCode::Sint | TypeCode::Sint8 | TypeCode::Sint16 | TypeCode::Sint32 | TypeCode::Sint64
        )
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            TypeCode::Uint | TypeCode::Uint8 | TypeCode::Uint16 | TypeCode::Uint32 | TypeCode::Uint64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, TypeCode::Float | TypeCode::Float32 | TypeCode::Float64)
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Serialized as its keyword, `""` for `None`.
impl Serialize for TypeCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.keyword())
    }
}
