//! Core data types shared across the engine

pub mod address;
pub mod compare;
pub mod error;
pub mod hexfloat;
pub mod value;

pub use address::{Address, PAGE_SIZE};
pub use compare::{CompareOp, CompareSpec, Comparator};
pub use error::{MemoryResult, ScanError};
pub use value::{TypedValue, ValueKind, MAX_ARRAY_LEN, MAX_CSTRING_LEN};
