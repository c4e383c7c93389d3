//! Scan worker: executes one assignment of a scan pass
//!
//! A worker owns its two output temp files exclusively. The previous
//! pass's session files are opened read-only and concurrently by all
//! workers, each at a disjoint offset derived from its assignment. The
//! stop flag is checked between chunks, never mid-chunk, so a cancelled
//! worker still leaves complete, self-consistent chunk output.

use crate::access::MemorySource;
use crate::core::types::{Address, Comparator, MemoryResult, ScanError, PAGE_SIZE};
use crate::layout::MemoryRegion;
use crate::scan::files::WorkerOutput;
use crate::scan::partition::{assignment_spans, EntrySlice, WorkerAssignment};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Chunk size of first-pass streaming
pub(crate) const DENSE_CHUNK: usize = 4096;

/// Chunk size of next-from-region streaming
pub(crate) const REGION_CHUNK: usize = 1024 * 1024;

/// Output entries buffered before one file append
const BATCH_ENTRIES: usize = 4096;

/// Candidate addresses loaded per batch in next-from-address mode
const ADDRESS_CHUNK_ENTRIES: usize = 65536;

/// The four execution modes of a scan pass
#[derive(Debug, Clone)]
pub(crate) enum WorkerTask {
    /// Dump every chunk of the assigned range verbatim
    FirstDense { assignment: WorkerAssignment },
    /// Test every aligned element of the assigned range against the
    /// configured constant
    FirstSparse { assignment: WorkerAssignment },
    /// Re-read the assigned range and compare against the previous dense
    /// dump (or the constant), producing sparse output
    NextFromRegion { assignment: WorkerAssignment },
    /// Re-read only the previously matched addresses in the assigned
    /// entry slice
    NextFromAddress { entries: EntrySlice },
}

/// Counters the controller polls while a worker runs
///
/// Workers only increment, the controller only reads; no locking needed.
#[derive(Debug, Default)]
pub(crate) struct WorkerShared {
    pub bytes_processed: AtomicU64,
    pub finished: AtomicBool,
}

pub(crate) struct ScanWorker {
    pub index: usize,
    pub task: WorkerTask,
    pub regions: Arc<Vec<MemoryRegion>>,
    pub memory: Arc<dyn MemorySource>,
    pub comparator: Arc<Comparator>,
    pub width: usize,
    pub alignment: usize,
    /// Compare fresh reads against the constant instead of the recorded
    /// previous value
    pub use_constant: bool,
    pub prev_values_path: PathBuf,
    pub prev_addresses_path: PathBuf,
    pub out_values_path: PathBuf,
    pub out_addresses_path: PathBuf,
    pub stop: Arc<AtomicBool>,
    pub shared: Arc<WorkerShared>,
}

/// Raises the finished flag on every exit path, unwinding included, so
/// the controller's poll loop always terminates
struct FinishGuard(Arc<WorkerShared>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.finished.store(true, Ordering::SeqCst);
    }
}

impl ScanWorker {
    /// Runs the assignment to completion (or cancellation)
    pub fn run(self) -> MemoryResult<WorkerOutput> {
        let _guard = FinishGuard(self.shared.clone());
        let result = self.execute();
        if let Err(e) = &result {
            debug!(worker = self.index, error = %e, "worker failed");
        }
        result
    }

    fn execute(&self) -> MemoryResult<WorkerOutput> {
        match &self.task {
            WorkerTask::FirstDense { assignment } => self.first_dense(assignment),
            WorkerTask::FirstSparse { assignment } => self.first_sparse(assignment),
            WorkerTask::NextFromRegion { assignment } => self.next_from_region(assignment),
            WorkerTask::NextFromAddress { entries } => self.next_from_address(entries),
        }
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    fn first_dense(&self, assignment: &WorkerAssignment) -> MemoryResult<WorkerOutput> {
        let mut out = File::create(&self.out_values_path)
            .map_err(|e| ScanError::output("creating worker value file", e))?;
        let mut chunk = vec![0u8; DENSE_CHUNK];
        let mut value_bytes = 0u64;

        'walk: for (beg, end) in assignment_spans(&self.regions, assignment) {
            let mut cur = beg;
            while cur < end {
                if self.stopped() {
                    break 'walk;
                }
                let len = DENSE_CHUNK.min(end.as_usize() - cur.as_usize());
                let read = self.memory.read(cur, &mut chunk[..len])?;
                if read < len {
                    // Unreadable tail becomes zeros so file offsets stay
                    // aligned with the memory walk
                    chunk[read..len].fill(0);
                }
                out.write_all(&chunk[..len])
                    .map_err(|e| ScanError::output("appending dense chunk", e))?;
                value_bytes += len as u64;
                self.shared
                    .bytes_processed
                    .fetch_add(len as u64, Ordering::Relaxed);
                cur = cur.add(len);
            }
        }

        Ok(WorkerOutput {
            index: self.index,
            value_bytes,
            entry_count: 0,
        })
    }

    fn first_sparse(&self, assignment: &WorkerAssignment) -> MemoryResult<WorkerOutput> {
        let mut batch = OutputBatch::create(
            &self.out_values_path,
            &self.out_addresses_path,
            self.width,
        )?;
        let mut chunk = vec![0u8; DENSE_CHUNK];

        'walk: for (beg, end) in assignment_spans(&self.regions, assignment) {
            let mut cur = beg;
            while cur < end {
                if self.stopped() {
                    break 'walk;
                }
                let len = DENSE_CHUNK.min(end.as_usize() - cur.as_usize());
                let read = self.memory.read(cur, &mut chunk[..len])?;

                let mut v = 0;
                while v + self.width <= read {
                    let candidate = &chunk[v..v + self.width];
                    if self.comparator.check_constant(candidate) {
                        batch.push(cur.add(v), candidate)?;
                    }
                    v += self.alignment;
                }

                self.shared
                    .bytes_processed
                    .fetch_add(len as u64, Ordering::Relaxed);
                cur = cur.add(len);
            }
        }

        batch.finish(self.index)
    }

    fn next_from_region(&self, assignment: &WorkerAssignment) -> MemoryResult<WorkerOutput> {
        let mut prev = File::open(&self.prev_values_path)
            .map_err(|e| ScanError::input("opening previous value file", e))?;
        prev.seek(SeekFrom::Start(assignment.byte_offset))
            .map_err(|e| ScanError::input("seeking previous value file", e))?;

        let mut batch = OutputBatch::create(
            &self.out_values_path,
            &self.out_addresses_path,
            self.width,
        )?;
        let mut new_chunk = vec![0u8; REGION_CHUNK];
        let mut old_chunk = vec![0u8; REGION_CHUNK];

        'walk: for (beg, end) in assignment_spans(&self.regions, assignment) {
            let mut cur = beg;
            while cur < end {
                if self.stopped() {
                    break 'walk;
                }
                let len = REGION_CHUNK.min(end.as_usize() - cur.as_usize());
                prev.read_exact(&mut old_chunk[..len])
                    .map_err(|e| ScanError::input("reading previous value file", e))?;
                let read = self.memory.read(cur, &mut new_chunk[..len])?;

                let mut v = 0;
                while v + self.width <= len {
                    // Elements past the readable prefix are non-matches
                    if v + self.width <= read {
                        let candidate = &new_chunk[v..v + self.width];
                        let matched = if self.use_constant {
                            self.comparator.check_constant(candidate)
                        } else {
                            self.comparator
                                .check_previous(candidate, &old_chunk[v..v + self.width])
                        };
                        if matched {
                            batch.push(cur.add(v), candidate)?;
                        }
                    }
                    v += self.alignment;
                }

                self.shared
                    .bytes_processed
                    .fetch_add(len as u64, Ordering::Relaxed);
                cur = cur.add(len);
            }
        }

        batch.finish(self.index)
    }

    fn next_from_address(&self, entries: &EntrySlice) -> MemoryResult<WorkerOutput> {
        let width = self.width;

        let mut addr_file = File::open(&self.prev_addresses_path)
            .map_err(|e| ScanError::input("opening previous address file", e))?;
        addr_file
            .seek(SeekFrom::Start(entries.first_entry * 8))
            .map_err(|e| ScanError::input("seeking previous address file", e))?;
        let mut val_file = File::open(&self.prev_values_path)
            .map_err(|e| ScanError::input("opening previous value file", e))?;
        val_file
            .seek(SeekFrom::Start(entries.first_entry * width as u64))
            .map_err(|e| ScanError::input("seeking previous value file", e))?;

        let mut batch = OutputBatch::create(
            &self.out_values_path,
            &self.out_addresses_path,
            width,
        )?;

        let mut addr_bytes = vec![0u8; ADDRESS_CHUNK_ENTRIES * 8];
        let mut val_bytes = vec![0u8; ADDRESS_CHUNK_ENTRIES * width];
        let mut addrs = Vec::with_capacity(ADDRESS_CHUNK_ENTRIES);
        // One page plus one trailing element is the widest possible group
        let mut page_buf = vec![0u8; PAGE_SIZE + width];

        let mut remaining = entries.entry_count;
        while remaining > 0 {
            if self.stopped() {
                break;
            }
            let count = (ADDRESS_CHUNK_ENTRIES as u64).min(remaining) as usize;
            addr_file
                .read_exact(&mut addr_bytes[..count * 8])
                .map_err(|e| ScanError::input("reading previous address file", e))?;
            val_file
                .read_exact(&mut val_bytes[..count * width])
                .map_err(|e| ScanError::input("reading previous value file", e))?;

            addrs.clear();
            for entry in addr_bytes[..count * 8].chunks_exact(8) {
                let word = u64::from_le_bytes(entry.try_into().unwrap_or([0; 8]));
                addrs.push(Address::new(word as usize));
            }

            // Group consecutive candidates sharing a memory page and read
            // the whole span once instead of one read per address
            let mut i = 0;
            while i < count {
                let page = addrs[i].page_base();
                let mut j = i + 1;
                while j < count && addrs[j].page_base() == page && addrs[j] >= addrs[j - 1] {
                    j += 1;
                }

                let first = addrs[i];
                let span = addrs[j - 1].as_usize() - first.as_usize() + width;
                let read = self.memory.read(first, &mut page_buf[..span])?;

                for k in i..j {
                    let offset = addrs[k].as_usize() - first.as_usize();
                    if offset + width > read {
                        continue;
                    }
                    let candidate = &page_buf[offset..offset + width];
                    let matched = if self.use_constant {
                        self.comparator.check_constant(candidate)
                    } else {
                        self.comparator
                            .check_previous(candidate, &val_bytes[k * width..(k + 1) * width])
                    };
                    if matched {
                        batch.push(addrs[k], candidate)?;
                    }
                }

                self.shared
                    .bytes_processed
                    .fetch_add(((j - i) * width) as u64, Ordering::Relaxed);
                i = j;
            }

            remaining -= count as u64;
        }

        batch.finish(self.index)
    }
}

/// Batched writer for a worker's sparse `(address, value)` output
struct OutputBatch {
    values: File,
    addresses: File,
    value_buf: Vec<u8>,
    addr_buf: Vec<u8>,
    width: usize,
    entry_count: u64,
}

impl OutputBatch {
    fn create(values_path: &PathBuf, addresses_path: &PathBuf, width: usize) -> MemoryResult<Self> {
        let values = File::create(values_path)
            .map_err(|e| ScanError::output("creating worker value file", e))?;
        let addresses = File::create(addresses_path)
            .map_err(|e| ScanError::output("creating worker address file", e))?;
        Ok(OutputBatch {
            values,
            addresses,
            value_buf: Vec::with_capacity(BATCH_ENTRIES * width),
            addr_buf: Vec::with_capacity(BATCH_ENTRIES * 8),
            width,
            entry_count: 0,
        })
    }

    fn push(&mut self, addr: Address, value: &[u8]) -> MemoryResult<()> {
        self.addr_buf.extend_from_slice(&addr.as_u64().to_le_bytes());
        self.value_buf.extend_from_slice(value);
        self.entry_count += 1;
        if self.addr_buf.len() >= BATCH_ENTRIES * 8 {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> MemoryResult<()> {
        if !self.addr_buf.is_empty() {
            self.addresses
                .write_all(&self.addr_buf)
                .map_err(|e| ScanError::output("appending address batch", e))?;
            self.values
                .write_all(&self.value_buf)
                .map_err(|e| ScanError::output("appending value batch", e))?;
            self.addr_buf.clear();
            self.value_buf.clear();
        }
        Ok(())
    }

    fn finish(mut self, index: usize) -> MemoryResult<WorkerOutput> {
        self.flush()?;
        Ok(WorkerOutput {
            index,
            value_bytes: self.entry_count * self.width as u64,
            entry_count: self.entry_count,
        })
    }
}
