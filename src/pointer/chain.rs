//! Bounded recursive pointer-chain search over the reverse indexes

use super::index::{PointerIndex, PointerLocator};
use super::modules::ModuleMap;
use crate::core::types::{Address, MemoryResult};
use crate::layout::LayoutFilter;
use serde::{Deserialize, Serialize};

/// One discovered chain from a static root to the target address
///
/// Offsets are recorded innermost-first as discovered; callers reverse
/// them for presentation (see [`PointerChainResult::offsets_root_to_target`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerChainResult {
    pub root_address: Address,
    /// Hop offsets, innermost-first
    pub offsets: Vec<i64>,
    /// The root resolved to `(file, signed_offset)` when possible
    pub root_file: Option<(String, i64)>,
}

impl PointerChainResult {
    /// Offsets in presentation order: the first entry is added to the root
    /// before the first dereference, the last is added to reach the target
    pub fn offsets_root_to_target(&self) -> Vec<i64> {
        let mut offsets = self.offsets.clone();
        offsets.reverse();
        offsets
    }
}

impl PointerLocator {
    /// Searches for chains of at most `max_depth` hops ending at `target`,
    /// allowing per-hop offsets up to `max_offset`
    ///
    /// At each level, every static-index hit in `[target - max_offset,
    /// target]` terminates a chain; dynamic hits recurse on their storage
    /// address while depth remains. No ordering is guaranteed among hits of
    /// one level and duplicate chains are not deduplicated here.
    pub fn find_chains(
        &self,
        index: &PointerIndex,
        target: Address,
        max_depth: usize,
        max_offset: usize,
    ) -> MemoryResult<Vec<PointerChainResult>> {
        let modules = ModuleMap::from_regions(&self.layout().regions(&LayoutFilter::all())?);
        let mut chains = Vec::new();
        let mut offsets = Vec::new();
        recursive_find(
            index,
            &modules,
            target.as_u64(),
            0,
            max_depth,
            max_offset as u64,
            &mut offsets,
            &mut chains,
        );
        Ok(chains)
    }
}

#[allow(clippy::too_many_arguments)]
fn recursive_find(
    index: &PointerIndex,
    modules: &ModuleMap,
    target: u64,
    depth: usize,
    max_depth: usize,
    max_offset: u64,
    offsets: &mut Vec<i64>,
    chains: &mut Vec<PointerChainResult>,
) {
    let low = target.saturating_sub(max_offset);

    // Every static hit is a terminal chain: the stored word sits at a
    // reproducible address, read directly off the root
    for (&key, storages) in index.static_map.range(low..=target) {
        for &root in storages {
            let mut chain_offsets = offsets.clone();
            chain_offsets.push((target - key) as i64);
            chain_offsets.push(0);
            chains.push(PointerChainResult {
                root_address: root,
                offsets: chain_offsets,
                root_file: modules.file_and_offset(root),
            });
        }
    }

    if depth + 1 >= max_depth {
        return;
    }

    for (&key, storages) in index.dynamic_map.range(low..=target) {
        for &storage in storages {
            offsets.push((target - key) as i64);
            recursive_find(
                index,
                modules,
                storage.as_u64(),
                depth + 1,
                max_depth,
                max_offset,
                offsets,
                chains,
            );
            offsets.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_reverse_for_presentation() {
        let chain = PointerChainResult {
            root_address: Address::new(0x400000),
            offsets: vec![0x8, 0x10, 0x0],
            root_file: Some(("game".to_string(), 0x1000)),
        };
        assert_eq!(chain.offsets_root_to_target(), vec![0x0, 0x10, 0x8]);
    }
}
