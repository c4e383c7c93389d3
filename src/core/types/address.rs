//! Memory address wrapper type with hex parsing and alignment helpers

use super::error::{MemoryResult, ScanError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Size of one native memory page on the scanned targets
pub const PAGE_SIZE: usize = 4096;

/// An address in the target process's address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub usize);

impl Address {
    /// Creates a new address from a usize value
    pub const fn new(value: usize) -> Self {
        Address(value)
    }

    /// Creates a null address
    pub const fn null() -> Self {
        Address(0)
    }

    /// Checks if the address is null
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the address is aligned to the given boundary
    pub const fn is_aligned(&self, alignment: usize) -> bool {
        alignment != 0 && self.0 % alignment == 0
    }

    /// Aligns the address down to the given power-of-two boundary
    pub const fn align_down(&self, alignment: usize) -> Self {
        if alignment == 0 {
            return *self;
        }
        Address(self.0 & !(alignment - 1))
    }

    /// Aligns the address up to the given power-of-two boundary
    pub const fn align_up(&self, alignment: usize) -> Self {
        if alignment == 0 {
            return *self;
        }
        Address((self.0 + alignment - 1) & !(alignment - 1))
    }

    /// Base address of the page containing this address
    pub const fn page_base(&self) -> Self {
        Address(self.0 & !(PAGE_SIZE - 1))
    }

    /// Adds a signed offset to the address
    pub const fn offset(&self, offset: isize) -> Self {
        Address((self.0 as isize + offset) as usize)
    }

    /// Adds an unsigned offset to the address
    pub const fn add(&self, offset: usize) -> Self {
        Address(self.0 + offset)
    }

    /// Returns the raw usize value
    pub const fn as_usize(&self) -> usize {
        self.0
    }

    /// Returns the address as a u64, as stored in address files
    pub const fn as_u64(&self) -> u64 {
        self.0 as u64
    }
}

impl FromStr for Address {
    type Err = ScanError;

    fn from_str(s: &str) -> MemoryResult<Self> {
        let s = s.trim();

        let value = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            usize::from_str_radix(hex, 16)
        } else if s.chars().any(|c| c.is_ascii_alphabetic()) {
            // Bare hex like "7fff0000"
            usize::from_str_radix(s, 16)
        } else {
            s.parse::<usize>()
        };

        value
            .map(Address::new)
            .map_err(|_| ScanError::Parse(format!("invalid address: {}", s)))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl From<usize> for Address {
    fn from(value: usize) -> Self {
        Address::new(value)
    }
}

impl From<u64> for Address {
    fn from(value: u64) -> Self {
        Address::new(value as usize)
    }
}
