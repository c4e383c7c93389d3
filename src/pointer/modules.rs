//! Module address spans for resolving pointer roots to file+offset

use crate::core::types::Address;
use crate::layout::{MemoryRegion, RegionKind};
use std::collections::BTreeMap;
use std::path::Path;

fn basename(path: &str) -> String {
    if path.starts_with('[') {
        return path.to_string();
    }
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Address span of every mapped file, built from one layout walk
///
/// Consecutive sections of the same file merge into one span; a module's
/// BSS extends the span of the file preceding it.
#[derive(Debug, Clone, Default)]
pub struct ModuleMap {
    modules: BTreeMap<String, (Address, Address)>,
}

impl ModuleMap {
    pub fn from_regions(regions: &[MemoryRegion]) -> Self {
        let mut modules: BTreeMap<String, (Address, Address)> = BTreeMap::new();
        let mut previous_file = String::new();
        let mut previous_stored = false;

        for region in regions {
            // BSS belongs to the module mapped just before it
            if region.kind == RegionKind::Bss {
                if let Some(span) = modules.get_mut(&previous_file) {
                    span.1 = region.end;
                    previous_stored = true;
                }
                continue;
            }

            let file = basename(&region.file);
            if file.is_empty() {
                previous_file.clear();
                previous_stored = false;
                continue;
            }

            if previous_file != file {
                modules.insert(file.clone(), (region.start, region.end));
                previous_stored = true;
            } else if previous_stored {
                if let Some(span) = modules.get_mut(&file) {
                    span.1 = region.end;
                }
            }
            previous_file = file;
        }

        ModuleMap { modules }
    }

    /// Load address of a file, if mapped
    pub fn base_address(&self, file: &str) -> Option<Address> {
        self.modules.get(file).map(|span| span.0)
    }

    /// Resolves an address to `(file, signed_offset)`; stack addresses use
    /// a negative offset from the stack end, which is the stable side
    pub fn file_and_offset(&self, addr: Address) -> Option<(String, i64)> {
        for (file, (start, end)) in &self.modules {
            if addr >= *start && addr < *end {
                let offset = if file.starts_with("[stack") {
                    addr.as_usize() as i64 - end.as_usize() as i64
                } else {
                    addr.as_usize() as i64 - start.as_usize() as i64
                };
                return Some((file.clone(), offset));
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
