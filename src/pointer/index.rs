//! Reverse pointer indexes over the target's memory
//!
//! One build streams every pointer-eligible region and records each
//! pointer-width-aligned word whose value lands inside a non-static
//! region. Entries are keyed by the pointed-to value and split into a
//! static index (module-relative storage, reproducible across runs) and a
//! dynamic one. Rebuilt from a fresh read on every discovery request,
//! never updated incrementally.

use crate::access::MemorySource;
use crate::core::types::{Address, MemoryResult, PAGE_SIZE};
use crate::layout::{KindMask, LayoutFilter, LayoutSource, MemoryRegion};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// The static/dynamic reverse indexes of one build
#[derive(Debug, Default)]
pub struct PointerIndex {
    pub(crate) static_map: BTreeMap<u64, Vec<Address>>,
    pub(crate) dynamic_map: BTreeMap<u64, Vec<Address>>,
}

impl PointerIndex {
    /// Entries stored in static regions
    pub fn static_len(&self) -> usize {
        self.static_map.values().map(|v| v.len()).sum()
    }

    /// Entries stored in heap/anonymous/file-backed writable regions
    pub fn dynamic_len(&self) -> usize {
        self.dynamic_map.values().map(|v| v.len()).sum()
    }
}

/// Builds pointer indexes and resolves pointer chains for one target
pub struct PointerLocator {
    memory: Arc<dyn MemorySource>,
    layout: Arc<dyn LayoutSource>,
}

impl PointerLocator {
    pub fn new(memory: Arc<dyn MemorySource>, layout: Arc<dyn LayoutSource>) -> Self {
        PointerLocator { memory, layout }
    }

    pub(crate) fn layout(&self) -> &Arc<dyn LayoutSource> {
        &self.layout
    }

    /// Builds the reverse indexes from a fresh read of the filtered layout
    pub fn locate_pointers(
        &self,
        address_range: Option<(Address, Address)>,
    ) -> MemoryResult<PointerIndex> {
        self.locate_pointers_with_progress(address_range, |_| {})
    }

    pub fn locate_pointers_with_progress(
        &self,
        address_range: Option<(Address, Address)>,
        mut progress: impl FnMut(u64),
    ) -> MemoryResult<PointerIndex> {
        let filter = LayoutFilter::kinds(KindMask::POINTER_CARRIERS);
        let mut regions = self.layout.regions(&filter)?;
        regions.retain(|r| r.readable);
        if let Some((range_start, range_end)) = address_range {
            regions = regions
                .iter()
                .filter_map(|r| r.clamp(range_start, range_end))
                .collect();
        }

        // Pointer values are only interesting when they land in a
        // non-static region; the list stays sorted by start address so the
        // membership test is a binary search
        let targets: Vec<&MemoryRegion> =
            regions.iter().filter(|r| !r.kind.is_static()).collect();

        let width = self.memory.pointer_width();
        let mut index = PointerIndex::default();
        let mut chunk = vec![0u8; PAGE_SIZE];
        let mut processed = 0u64;

        for region in &regions {
            let mut cur = region.start;
            while cur < region.end {
                let len = PAGE_SIZE.min(region.end.as_usize() - cur.as_usize());
                let read = self.memory.read(cur, &mut chunk[..len])?;

                let mut offset = 0;
                while offset + width <= read {
                    let word = load_word(&chunk[offset..offset + width], width);
                    if word_in_targets(word, &targets) {
                        let storage = cur.add(offset);
                        let map = if region.kind.is_static() {
                            &mut index.static_map
                        } else {
                            &mut index.dynamic_map
                        };
                        map.entry(word).or_default().push(storage);
                    }
                    offset += width;
                }

                processed += len as u64;
                progress(processed);
                cur = cur.add(len);
            }
        }

        info!(
            static_entries = index.static_len(),
            dynamic_entries = index.dynamic_len(),
            "pointer indexes built"
        );
        debug!(regions = regions.len(), bytes = processed, "pointer walk");
        Ok(index)
    }
}

fn load_word(bytes: &[u8], width: usize) -> u64 {
    match width {
        4 => u32::from_le_bytes(bytes[..4].try_into().unwrap_or([0; 4])) as u64,
        _ => u64::from_le_bytes(bytes[..8].try_into().unwrap_or([0; 8])),
    }
}

/// Membership test against the sorted non-static regions
fn word_in_targets(word: u64, targets: &[&MemoryRegion]) -> bool {
    let addr = Address::new(word as usize);
    let idx = targets.partition_point(|r| r.end <= addr);
    idx < targets.len() && targets[idx].contains(addr)
}
