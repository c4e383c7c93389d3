//! Layout sources: live `/proc` walks and the seam the rest of the engine
//! depends on

use super::parser::RegionIter;
use super::region::{LayoutFilter, MemoryRegion};
use crate::core::types::{MemoryResult, ScanError};
use std::fs::File;
use std::io::BufReader;

/// Provider of a target's memory layout
///
/// The session controller, the pointer locator and the tests all consume
/// layouts through this trait.
pub trait LayoutSource: Send + Sync {
    /// Returns the filtered regions in ascending-address order
    fn regions(&self, filter: &LayoutFilter) -> MemoryResult<Vec<MemoryRegion>>;

    /// Total byte size of the filtered regions, without materializing them
    fn total_size(&self, filter: &LayoutFilter) -> MemoryResult<u64> {
        Ok(self.regions(filter)?.iter().map(|r| r.size()).sum())
    }
}

/// Live layout of a running process, re-parsed from `/proc/<pid>/maps` on
/// every walk
#[derive(Debug, Clone)]
pub struct ProcMaps {
    pid: i32,
}

impl ProcMaps {
    pub fn new(pid: i32) -> Self {
        ProcMaps { pid }
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// Starts a fresh lazy walk over the live mapping source
    pub fn iter(&self, filter: LayoutFilter) -> MemoryResult<RegionIter<BufReader<File>>> {
        let path = format!("/proc/{}/maps", self.pid);
        let file = File::open(&path)
            .map_err(|e| ScanError::layout_unavailable(self.pid, e.to_string()))?;
        Ok(RegionIter::new(BufReader::new(file), filter))
    }
}

impl LayoutSource for ProcMaps {
    fn regions(&self, filter: &LayoutFilter) -> MemoryResult<Vec<MemoryRegion>> {
        Ok(self.iter(*filter)?.collect())
    }

    fn total_size(&self, filter: &LayoutFilter) -> MemoryResult<u64> {
        Ok(self.iter(*filter)?.map(|r| r.size()).sum())
    }
}

/// A fixed region list, used where the layout is known up front
#[derive(Debug, Clone)]
pub struct StaticLayout {
    regions: Vec<MemoryRegion>,
}

impl StaticLayout {
    pub fn new(mut regions: Vec<MemoryRegion>) -> Self {
        regions.sort_by_key(|r| r.start);
        StaticLayout { regions }
    }
}

impl LayoutSource for StaticLayout {
    fn regions(&self, filter: &LayoutFilter) -> MemoryResult<Vec<MemoryRegion>> {
        Ok(self
            .regions
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }
}
