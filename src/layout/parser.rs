//! `/proc/<pid>/maps` line parsing and stateful region classification

use super::region::{LayoutFilter, MemoryRegion, RegionKind};
use crate::core::types::Address;
use std::io::BufRead;
use tracing::warn;

/// One parsed maps line before classification
#[derive(Debug, Clone)]
struct RawRegion {
    start: usize,
    end: usize,
    readable: bool,
    writable: bool,
    executable: bool,
    shared: bool,
    file_offset: u64,
    file: String,
}

fn parse_maps_line(line: &str) -> Option<RawRegion> {
    // start-end perms offset dev inode [path]
    let mut fields = line.split_whitespace();
    let range = fields.next()?;
    let perms = fields.next()?;
    let offset = fields.next()?;
    let _dev = fields.next()?;
    let _inode = fields.next()?;
    let file = fields.next().unwrap_or("").to_string();

    let (start, end) = range.split_once('-')?;
    let start = usize::from_str_radix(start, 16).ok()?;
    let end = usize::from_str_radix(end, 16).ok()?;
    if end < start {
        return None;
    }

    let perms = perms.as_bytes();
    if perms.len() < 4 {
        return None;
    }

    Some(RawRegion {
        start,
        end,
        readable: perms[0] == b'r',
        writable: perms[1] == b'w',
        executable: perms[2] == b'x',
        shared: perms[3] == b's',
        file_offset: u64::from_str_radix(offset, 16).unwrap_or(0),
        file,
    })
}

/// Classifies regions while walking a layout in ascending-address order
///
/// Classification is stateful across the whole walk: a module's writable
/// data continues into an anonymous BSS mapping, and once `[heap]` has been
/// passed every empty-name writable mapping counts as a heap-adjacent
/// anonymous area for the remainder of the walk.
#[derive(Debug, Default)]
struct Classifier {
    heap_seen: bool,
    current_module: Option<String>,
    prev_was_module_file: bool,
}

impl Classifier {
    fn classify(&mut self, raw: &RawRegion) -> RegionKind {
        let kind = if raw.file == "[heap]" {
            self.heap_seen = true;
            RegionKind::Heap
        } else if raw.file.starts_with("[stack") {
            RegionKind::Stack
        } else if raw.file.starts_with('[') {
            RegionKind::Special
        } else if !raw.file.is_empty() {
            if raw.executable {
                self.current_module = Some(raw.file.clone());
                RegionKind::Text
            } else if self.current_module.as_deref() == Some(raw.file.as_str()) {
                if raw.writable {
                    RegionKind::DataRW
                } else {
                    RegionKind::DataRO
                }
            } else if raw.writable {
                RegionKind::FileMappingRW
            } else {
                RegionKind::FileMappingRO
            }
        } else if !raw.readable {
            RegionKind::Unmapped
        } else if raw.writable {
            if self.prev_was_module_file && !self.heap_seen {
                RegionKind::Bss
            } else {
                RegionKind::AnonymousRW
            }
        } else {
            RegionKind::AnonymousRO
        };

        self.prev_was_module_file = matches!(
            kind,
            RegionKind::Text | RegionKind::DataRO | RegionKind::DataRW
        );
        kind
    }
}

/// Lazy iterator over classified, filtered regions of one maps source
///
/// The classifier sees every line so positional context is preserved; the
/// filter is applied afterwards. Malformed lines are skipped.
pub struct RegionIter<B: BufRead> {
    source: B,
    filter: LayoutFilter,
    classifier: Classifier,
    line: String,
}

impl<B: BufRead> RegionIter<B> {
    pub fn new(source: B, filter: LayoutFilter) -> Self {
        RegionIter {
            source,
            filter,
            classifier: Classifier::default(),
            line: String::new(),
        }
    }
}

impl<B: BufRead> Iterator for RegionIter<B> {
    type Item = MemoryRegion;

    fn next(&mut self) -> Option<MemoryRegion> {
        loop {
            self.line.clear();
            match self.source.read_line(&mut self.line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => {
                    warn!("maps read failed mid-walk: {}", e);
                    return None;
                }
            }

            let trimmed = self.line.trim_end();
            if trimmed.is_empty() {
                continue;
            }
            let raw = match parse_maps_line(trimmed) {
                Some(raw) => raw,
                None => {
                    warn!("skipping malformed maps line: {}", trimmed);
                    continue;
                }
            };

            let kind = self.classifier.classify(&raw);
            let region = MemoryRegion {
                start: Address::new(raw.start),
                end: Address::new(raw.end),
                readable: raw.readable,
                writable: raw.writable,
                executable: raw.executable,
                shared: raw.shared,
                file: raw.file,
                file_offset: raw.file_offset,
                kind,
            };

            if self.filter.matches(&region) {
                return Some(region);
            }
        }
    }
}
