//! Memory region model: one contiguous mapped range and its derived kind

use crate::core::types::Address;
use serde::{Deserialize, Serialize};

/// Purpose classification of a mapped region
///
/// Derived from protection bits, filename heuristics and positional context
/// during the layout walk; the OS does not report it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    Text,
    DataRO,
    DataRW,
    Bss,
    Heap,
    FileMappingRO,
    FileMappingRW,
    AnonymousRO,
    AnonymousRW,
    Stack,
    Special,
    Unmapped,
}

impl RegionKind {
    /// Bit used by [`KindMask`]
    pub const fn bit(self) -> u32 {
        1 << self as u32
    }

    /// True for regions whose load address is fixed relative to a module,
    /// making pointers found there reproducible across runs
    pub fn is_static(self) -> bool {
        matches!(self, RegionKind::DataRW | RegionKind::Bss | RegionKind::Stack)
    }
}

/// Bitmask over [`RegionKind`] values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindMask(pub u32);

impl KindMask {
    /// Every kind
    pub const ALL: KindMask = KindMask(!0);

    /// Kinds eligible to contain pointers
    pub const POINTER_CARRIERS: KindMask = KindMask(
        RegionKind::DataRW.bit()
            | RegionKind::Bss.bit()
            | RegionKind::Heap.bit()
            | RegionKind::AnonymousRW.bit()
            | RegionKind::FileMappingRW.bit()
            | RegionKind::Stack.bit(),
    );

    /// An empty mask
    pub const NONE: KindMask = KindMask(0);

    /// Mask containing a single kind
    pub const fn only(kind: RegionKind) -> Self {
        KindMask(kind.bit())
    }

    /// Union with another mask
    pub const fn with(self, kind: RegionKind) -> Self {
        KindMask(self.0 | kind.bit())
    }

    /// Membership test
    pub const fn contains(self, kind: RegionKind) -> bool {
        self.0 & kind.bit() != 0
    }
}

/// Region properties excluded from a walk regardless of kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludeFlags {
    pub special: bool,
    pub read_only: bool,
    pub executable: bool,
}

/// Filter applied to a layout walk
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LayoutFilter {
    pub kinds: KindMask,
    pub exclude: ExcludeFlags,
}

impl LayoutFilter {
    /// Accepts every region
    pub fn all() -> Self {
        LayoutFilter {
            kinds: KindMask::ALL,
            exclude: ExcludeFlags::default(),
        }
    }

    /// Accepts only the given kinds
    pub fn kinds(kinds: KindMask) -> Self {
        LayoutFilter {
            kinds,
            exclude: ExcludeFlags::default(),
        }
    }

    /// True when a region passes the filter
    pub fn matches(&self, region: &MemoryRegion) -> bool {
        if !self.kinds.contains(region.kind) {
            return false;
        }
        if self.exclude.special
            && matches!(region.kind, RegionKind::Special | RegionKind::Unmapped)
        {
            return false;
        }
        if self.exclude.read_only && !region.writable {
            return false;
        }
        if self.exclude.executable && region.executable {
            return false;
        }
        true
    }
}

/// One contiguous mapped range in the target's address space
///
/// Rebuilt on every fresh layout read; never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRegion {
    pub start: Address,
    pub end: Address,
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
    pub shared: bool,
    /// Backing file path, empty for anonymous mappings
    pub file: String,
    pub file_offset: u64,
    pub kind: RegionKind,
}

impl MemoryRegion {
    /// Region size in bytes
    pub fn size(&self) -> u64 {
        (self.end.as_usize() - self.start.as_usize()) as u64
    }

    /// True when the address falls inside `[start, end)`
    pub fn contains(&self, addr: Address) -> bool {
        addr >= self.start && addr < self.end
    }

    /// Intersects the region with an address range, returning `None` when
    /// nothing remains
    pub fn clamp(&self, range_start: Address, range_end: Address) -> Option<MemoryRegion> {
        let start = self.start.max(range_start);
        let end = self.end.min(range_end);
        if start >= end {
            return None;
        }
        let mut clamped = self.clone();
        clamped.start = start;
        clamped.end = end;
        Some(clamped)
    }
}
