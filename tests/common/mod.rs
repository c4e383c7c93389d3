//! Shared test fixtures: a synthetic address space and layout builders

#![allow(dead_code)]

use ramscan::{Address, MemoryRegion, MemoryResult, MemorySource, RegionKind};
use std::sync::RwLock;

type ReadHook = Box<dyn Fn(usize) + Send + Sync>;

struct Segment {
    start: usize,
    data: RwLock<Vec<u8>>,
}

/// An in-process stand-in for a target address space
///
/// Reads and writes behave like the real primitives: gaps yield zero-length
/// transfers, spans past a segment end yield partial ones.
pub struct TestMemory {
    segments: Vec<Segment>,
    pointer_width: usize,
    read_hook: RwLock<Option<ReadHook>>,
}

impl TestMemory {
    pub fn new(pointer_width: usize) -> Self {
        TestMemory {
            segments: Vec::new(),
            pointer_width,
            read_hook: RwLock::new(None),
        }
    }

    pub fn add_segment(&mut self, start: usize, data: Vec<u8>) {
        self.segments.push(Segment {
            start,
            data: RwLock::new(data),
        });
        self.segments.sort_by_key(|s| s.start);
    }

    /// Overwrites bytes inside an existing segment
    pub fn poke(&self, addr: usize, bytes: &[u8]) {
        for segment in &self.segments {
            let mut data = segment.data.write().unwrap();
            if addr >= segment.start && addr + bytes.len() <= segment.start + data.len() {
                let offset = addr - segment.start;
                data[offset..offset + bytes.len()].copy_from_slice(bytes);
                return;
            }
        }
        panic!("poke outside any segment: {:#x}", addr);
    }

    /// Installs a callback invoked with the address of every read
    pub fn set_read_hook(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        *self.read_hook.write().unwrap() = Some(Box::new(hook));
    }

    pub fn clear_read_hook(&self) {
        *self.read_hook.write().unwrap() = None;
    }
}

impl MemorySource for TestMemory {
    fn read(&self, addr: Address, buf: &mut [u8]) -> MemoryResult<usize> {
        if let Some(hook) = self.read_hook.read().unwrap().as_ref() {
            hook(addr.as_usize());
        }
        let addr = addr.as_usize();
        for segment in &self.segments {
            let data = segment.data.read().unwrap();
            let end = segment.start + data.len();
            if addr >= segment.start && addr < end {
                let offset = addr - segment.start;
                let len = buf.len().min(end - addr);
                buf[..len].copy_from_slice(&data[offset..offset + len]);
                return Ok(len);
            }
        }
        Ok(0)
    }

    fn write(&self, addr: Address, data: &[u8]) -> MemoryResult<usize> {
        let addr = addr.as_usize();
        for segment in &self.segments {
            let mut stored = segment.data.write().unwrap();
            let end = segment.start + stored.len();
            if addr >= segment.start && addr < end {
                let offset = addr - segment.start;
                let len = data.len().min(end - addr);
                stored[offset..offset + len].copy_from_slice(&data[..len]);
                return Ok(len);
            }
        }
        Ok(0)
    }

    fn pointer_width(&self) -> usize {
        self.pointer_width
    }
}

/// Builds a readable region with the given kind and optional backing file
pub fn make_region(start: usize, end: usize, kind: RegionKind, file: &str) -> MemoryRegion {
    MemoryRegion {
        start: Address::new(start),
        end: Address::new(end),
        readable: true,
        writable: !matches!(kind, RegionKind::Text | RegionKind::DataRO),
        executable: matches!(kind, RegionKind::Text),
        shared: false,
        file: file.to_string(),
        file_offset: 0,
        kind,
    }
}

/// A zero-filled byte buffer with little-endian words planted at offsets
pub fn buffer_with_words(size: usize, words: &[(usize, u64)], word_width: usize) -> Vec<u8> {
    let mut data = vec![0u8; size];
    for &(offset, value) in words {
        let bytes = value.to_le_bytes();
        data[offset..offset + word_width].copy_from_slice(&bytes[..word_width]);
    }
    data
}

pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
