//! ramscan: live process-memory scanning and pointer-chain discovery
//!
//! The scanning core of a Linux game-instrumentation harness. A
//! [`scan::ScanSession`] tracks one search target across repeated passes
//! over a running, externally-owned process; [`pointer::PointerLocator`]
//! turns a found address into restart-stable pointer chains rooted in
//! static module data.

pub mod access;
pub mod config;
pub mod core;
pub mod layout;
pub mod pointer;
pub mod scan;

pub use crate::core::types::{
    Address, CompareOp, CompareSpec, Comparator, MemoryResult, ScanError, TypedValue, ValueKind,
};
pub use access::{MemorySource, ProcessMemory};
pub use config::ScanConfig;
pub use layout::{
    ExcludeFlags, KindMask, LayoutFilter, LayoutSource, MemoryRegion, ProcMaps, RegionKind,
    StaticLayout,
};
pub use pointer::{ModuleMap, PointerChainResult, PointerIndex, PointerLocator};
pub use scan::{ResultDensity, ScanParams, ScanSession, StopHandle};
