//! Work partitioning: splitting a scan pass between workers

use crate::core::types::{Address, PAGE_SIZE};
use crate::layout::MemoryRegion;

/// One worker's contiguous byte-range assignment over the region walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WorkerAssignment {
    pub index: usize,
    /// First region touched by this assignment
    pub first_region: usize,
    /// Last region touched (inclusive)
    pub last_region: usize,
    /// Start address inside the first region
    pub start: Address,
    /// End address inside the last region
    pub end: Address,
    /// Byte offset of this assignment within the whole walk, which is also
    /// its offset into the previous pass's dense value file
    pub byte_offset: u64,
    pub byte_len: u64,
}

/// One worker's slice of a sparse pass's entry list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EntrySlice {
    pub index: usize,
    pub first_entry: u64,
    pub entry_count: u64,
}

/// Splits the region walk into up to `worker_count` contiguous byte ranges.
///
/// Each quota is the total divided by the worker count, rounded down to a
/// page multiple (which also snaps every boundary to any element width);
/// ranges cross region boundaries as needed and the last worker absorbs the
/// remainder. A quota that rounds to zero degrades to a single worker.
pub(crate) fn partition_regions(
    regions: &[MemoryRegion],
    total_size: u64,
    worker_count: usize,
) -> Vec<WorkerAssignment> {
    debug_assert!(!regions.is_empty());
    debug_assert!(total_size > 0);
    debug_assert_eq!(
        total_size,
        regions.iter().map(|r| r.size()).sum::<u64>()
    );

    let block = (total_size / worker_count.max(1) as u64) & !(PAGE_SIZE as u64 - 1);
    let count = if block == 0 { 1 } else { worker_count };

    let mut assignments = Vec::with_capacity(count);
    let mut region = 0usize;
    let mut offset = 0u64;
    let mut consumed = 0u64;

    for index in 0..count {
        // Normalize the cursor off a fully consumed region
        while offset == regions[region].size() && region + 1 < regions.len() {
            region += 1;
            offset = 0;
        }

        let quota = if index == count - 1 {
            total_size - consumed
        } else {
            block
        };

        let first_region = region;
        let start = regions[region].start.add(offset as usize);
        let mut bytes = quota;
        let mut last_region = region;
        let mut end = start;

        while bytes > 0 {
            let take = (regions[region].size() - offset).min(bytes);
            offset += take;
            bytes -= take;
            last_region = region;
            end = regions[region].start.add(offset as usize);
            if bytes > 0 {
                region += 1;
                offset = 0;
            }
        }

        assignments.push(WorkerAssignment {
            index,
            first_region,
            last_region,
            start,
            end,
            byte_offset: consumed,
            byte_len: quota,
        });
        consumed += quota;
    }

    assignments
}

/// Splits a sparse pass's entries evenly; the last worker absorbs the
/// remainder, and a zero quota degrades to a single worker
pub(crate) fn partition_entries(entry_count: u64, worker_count: usize) -> Vec<EntrySlice> {
    let base = entry_count / worker_count.max(1) as u64;
    let count = if base == 0 { 1 } else { worker_count };

    let mut slices = Vec::with_capacity(count);
    let mut first = 0u64;
    for index in 0..count {
        let len = if index == count - 1 {
            entry_count - first
        } else {
            base
        };
        slices.push(EntrySlice {
            index,
            first_entry: first,
            entry_count: len,
        });
        first += len;
    }
    slices
}

/// The per-region `(start, end)` spans an assignment covers, in walk order
pub(crate) fn assignment_spans(
    regions: &[MemoryRegion],
    assignment: &WorkerAssignment,
) -> Vec<(Address, Address)> {
    let mut spans = Vec::new();
    for r in assignment.first_region..=assignment.last_region {
        let beg = if r == assignment.first_region {
            assignment.start
        } else {
            regions[r].start
        };
        let end = if r == assignment.last_region {
            assignment.end
        } else {
            regions[r].end
        };
        if beg < end {
            spans.push((beg, end));
        }
    }
    spans
}
