//! Typed value model: the closed set of scalar/array/string kinds
//!
//! Values are constructed from raw little-endian bytes and are immutable
//! afterwards. Comparisons elsewhere always operate on the raw byte
//! reinterpretation, never on display strings.

use super::error::{MemoryResult, ScanError};
use super::hexfloat;
use serde::{Deserialize, Serialize};

/// Maximum stored length for the array kind
pub const MAX_ARRAY_LEN: usize = 64;

/// Maximum stored length for the C-string kind (excluding the terminator)
pub const MAX_CSTRING_LEN: usize = 255;

/// The closed set of value kinds a scan or watch can use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Bytes,
    CString,
}

impl ValueKind {
    /// Fixed byte width of the kind, `None` for the variable-length kinds
    pub fn byte_width(&self) -> Option<usize> {
        match self {
            ValueKind::I8 | ValueKind::U8 => Some(1),
            ValueKind::I16 | ValueKind::U16 => Some(2),
            ValueKind::I32 | ValueKind::U32 | ValueKind::F32 => Some(4),
            ValueKind::I64 | ValueKind::U64 | ValueKind::F64 => Some(8),
            ValueKind::Bytes | ValueKind::CString => None,
        }
    }

    /// True for the integer kinds
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ValueKind::I8
                | ValueKind::U8
                | ValueKind::I16
                | ValueKind::U16
                | ValueKind::I32
                | ValueKind::U32
                | ValueKind::I64
                | ValueKind::U64
        )
    }

    /// True for the float kinds
    pub fn is_float(&self) -> bool {
        matches!(self, ValueKind::F32 | ValueKind::F64)
    }
}

/// A value read from target memory, tagged with its kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypedValue {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Bytes(Vec<u8>),
    CString(Vec<u8>),
}

macro_rules! scalar_from_bytes {
    ($bytes:expr, $ty:ty, $variant:ident) => {{
        let width = std::mem::size_of::<$ty>();
        if $bytes.len() < width {
            return None;
        }
        let mut raw = [0u8; std::mem::size_of::<$ty>()];
        raw.copy_from_slice(&$bytes[..width]);
        Some(TypedValue::$variant(<$ty>::from_le_bytes(raw)))
    }};
}

impl TypedValue {
    /// The kind tag of this value
    pub fn kind(&self) -> ValueKind {
        match self {
            TypedValue::I8(_) => ValueKind::I8,
            TypedValue::U8(_) => ValueKind::U8,
            TypedValue::I16(_) => ValueKind::I16,
            TypedValue::U16(_) => ValueKind::U16,
            TypedValue::I32(_) => ValueKind::I32,
            TypedValue::U32(_) => ValueKind::U32,
            TypedValue::I64(_) => ValueKind::I64,
            TypedValue::U64(_) => ValueKind::U64,
            TypedValue::F32(_) => ValueKind::F32,
            TypedValue::F64(_) => ValueKind::F64,
            TypedValue::Bytes(_) => ValueKind::Bytes,
            TypedValue::CString(_) => ValueKind::CString,
        }
    }

    /// Stored byte length of this value
    pub fn byte_len(&self) -> usize {
        match self {
            TypedValue::Bytes(b) | TypedValue::CString(b) => b.len(),
            other => other.kind().byte_width().unwrap_or(0),
        }
    }

    /// Serializes the value to little-endian bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            TypedValue::I8(v) => v.to_le_bytes().to_vec(),
            TypedValue::U8(v) => v.to_le_bytes().to_vec(),
            TypedValue::I16(v) => v.to_le_bytes().to_vec(),
            TypedValue::U16(v) => v.to_le_bytes().to_vec(),
            TypedValue::I32(v) => v.to_le_bytes().to_vec(),
            TypedValue::U32(v) => v.to_le_bytes().to_vec(),
            TypedValue::I64(v) => v.to_le_bytes().to_vec(),
            TypedValue::U64(v) => v.to_le_bytes().to_vec(),
            TypedValue::F32(v) => v.to_le_bytes().to_vec(),
            TypedValue::F64(v) => v.to_le_bytes().to_vec(),
            TypedValue::Bytes(b) | TypedValue::CString(b) => b.clone(),
        }
    }

    /// Builds a value from raw bytes; returns `None` when the slice is
    /// shorter than the kind's width. Array/string kinds take the whole
    /// slice, clamped to their bound (strings stop at the first NUL).
    pub fn from_bytes(bytes: &[u8], kind: ValueKind) -> Option<Self> {
        match kind {
            ValueKind::I8 => scalar_from_bytes!(bytes, i8, I8),
            ValueKind::U8 => scalar_from_bytes!(bytes, u8, U8),
            ValueKind::I16 => scalar_from_bytes!(bytes, i16, I16),
            ValueKind::U16 => scalar_from_bytes!(bytes, u16, U16),
            ValueKind::I32 => scalar_from_bytes!(bytes, i32, I32),
            ValueKind::U32 => scalar_from_bytes!(bytes, u32, U32),
            ValueKind::I64 => scalar_from_bytes!(bytes, i64, I64),
            ValueKind::U64 => scalar_from_bytes!(bytes, u64, U64),
            ValueKind::F32 => scalar_from_bytes!(bytes, f32, F32),
            ValueKind::F64 => scalar_from_bytes!(bytes, f64, F64),
            ValueKind::Bytes => {
                let len = bytes.len().min(MAX_ARRAY_LEN);
                Some(TypedValue::Bytes(bytes[..len].to_vec()))
            }
            ValueKind::CString => {
                let len = bytes.len().min(MAX_CSTRING_LEN);
                let nul = bytes[..len].iter().position(|&b| b == 0).unwrap_or(len);
                Some(TypedValue::CString(bytes[..nul].to_vec()))
            }
        }
    }

    /// Parses a value from user text in the given base
    pub fn from_string(s: &str, kind: ValueKind, hex: bool) -> MemoryResult<Self> {
        let trimmed = s.trim();
        let parse_err = || ScanError::Parse(format!("cannot parse {:?} from \"{}\"", kind, s));

        match kind {
            ValueKind::I8 => parse_signed::<i8, u8>(trimmed, hex).map(TypedValue::I8),
            ValueKind::U8 => parse_unsigned::<u8>(trimmed, hex).map(TypedValue::U8),
            ValueKind::I16 => parse_signed::<i16, u16>(trimmed, hex).map(TypedValue::I16),
            ValueKind::U16 => parse_unsigned::<u16>(trimmed, hex).map(TypedValue::U16),
            ValueKind::I32 => parse_signed::<i32, u32>(trimmed, hex).map(TypedValue::I32),
            ValueKind::U32 => parse_unsigned::<u32>(trimmed, hex).map(TypedValue::U32),
            ValueKind::I64 => parse_signed::<i64, u64>(trimmed, hex).map(TypedValue::I64),
            ValueKind::U64 => parse_unsigned::<u64>(trimmed, hex).map(TypedValue::U64),
            ValueKind::F32 => {
                if hex {
                    hexfloat::parse_hex_f32(trimmed)
                        .map(TypedValue::F32)
                        .ok_or_else(parse_err)
                } else {
                    trimmed
                        .parse::<f32>()
                        .map(TypedValue::F32)
                        .map_err(|_| parse_err())
                }
            }
            ValueKind::F64 => {
                if hex {
                    hexfloat::parse_hex_f64(trimmed)
                        .map(TypedValue::F64)
                        .ok_or_else(parse_err)
                } else {
                    trimmed
                        .parse::<f64>()
                        .map(TypedValue::F64)
                        .map_err(|_| parse_err())
                }
            }
            ValueKind::Bytes => {
                let radix = if hex { 16 } else { 10 };
                let mut bytes = Vec::new();
                for token in trimmed.split_whitespace() {
                    let byte =
                        u8::from_str_radix(token, radix).map_err(|_| parse_err())?;
                    bytes.push(byte);
                    if bytes.len() > MAX_ARRAY_LEN {
                        return Err(ScanError::Parse(format!(
                            "byte array longer than {} elements",
                            MAX_ARRAY_LEN
                        )));
                    }
                }
                Ok(TypedValue::Bytes(bytes))
            }
            ValueKind::CString => {
                let raw = s.as_bytes();
                let nul = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                let len = nul.min(MAX_CSTRING_LEN);
                Ok(TypedValue::CString(raw[..len].to_vec()))
            }
        }
    }

    /// Formats the value for display; hex mode shows integers as bare hex
    /// digits of their width and floats as hex-floats
    pub fn to_display_string(&self, hex: bool) -> String {
        match self {
            TypedValue::I8(v) => format_int(*v as u8 as u64, *v as i64, hex),
            TypedValue::U8(v) => format_int(*v as u64, *v as i64, hex),
            TypedValue::I16(v) => format_int(*v as u16 as u64, *v as i64, hex),
            TypedValue::U16(v) => format_int(*v as u64, *v as i64, hex),
            TypedValue::I32(v) => format_int(*v as u32 as u64, *v as i64, hex),
            TypedValue::U32(v) => format_int(*v as u64, *v as i64, hex),
            TypedValue::I64(v) => format_int(*v as u64, *v, hex),
            TypedValue::U64(v) => {
                if hex {
                    format!("{:x}", v)
                } else {
                    format!("{}", v)
                }
            }
            TypedValue::F32(v) => {
                if hex {
                    hexfloat::format_hex_f32(*v)
                } else {
                    format!("{}", v)
                }
            }
            TypedValue::F64(v) => {
                if hex {
                    hexfloat::format_hex_f64(*v)
                } else {
                    format!("{}", v)
                }
            }
            TypedValue::Bytes(b) => {
                let tokens: Vec<String> = b
                    .iter()
                    .map(|byte| {
                        if hex {
                            format!("{:x}", byte)
                        } else {
                            format!("{}", byte)
                        }
                    })
                    .collect();
                tokens.join(" ")
            }
            TypedValue::CString(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }
}

fn format_int(unsigned: u64, signed: i64, hex: bool) -> String {
    if hex {
        format!("{:x}", unsigned)
    } else {
        format!("{}", signed)
    }
}

fn parse_unsigned<T>(s: &str, hex: bool) -> MemoryResult<T>
where
    T: TryFrom<u64>,
{
    let s = s.strip_prefix("0x").unwrap_or(s);
    let radix = if hex { 16 } else { 10 };
    let wide = u64::from_str_radix(s, radix)
        .map_err(|_| ScanError::Parse(format!("invalid integer \"{}\"", s)))?;
    T::try_from(wide).map_err(|_| ScanError::Parse(format!("integer out of range: {}", s)))
}

/// Signed parse: decimal uses the signed range; hex parses the same-width
/// unsigned pattern and reinterprets, so "ff" is `-1i8`
fn parse_signed<S, U>(s: &str, hex: bool) -> MemoryResult<S>
where
    S: std::str::FromStr + FromUnsigned<U>,
    U: TryFrom<u64>,
{
    if hex {
        let raw: U = parse_unsigned::<U>(s, true)?;
        Ok(S::from_unsigned(raw))
    } else {
        s.parse::<S>()
            .map_err(|_| ScanError::Parse(format!("invalid integer \"{}\"", s)))
    }
}

trait FromUnsigned<U> {
    fn from_unsigned(raw: U) -> Self;
}

macro_rules! impl_from_unsigned {
    ($($signed:ty => $unsigned:ty),*) => {
        $(impl FromUnsigned<$unsigned> for $signed {
            fn from_unsigned(raw: $unsigned) -> Self {
                raw as $signed
            }
        })*
    };
}

impl_from_unsigned!(i8 => u8, i16 => u16, i32 => u32, i64 => u64);
