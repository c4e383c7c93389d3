//! Scan session controller
//!
//! Orchestrates one scanning target across repeated passes: reads the
//! layout, partitions work, spawns workers, polls their progress, merges
//! their output into the session files and exposes paged results. All scan
//! state lives in the session value; a failed or cancelled pass leaves the
//! session exactly as it was before the pass started.

use crate::access::MemorySource;
use crate::config::ScanConfig;
use crate::core::types::{
    Address, CompareSpec, Comparator, MemoryResult, ScanError, TypedValue, ValueKind,
};
use crate::layout::{ExcludeFlags, KindMask, LayoutFilter, LayoutSource, MemoryRegion};
use crate::scan::files::SessionFiles;
use crate::scan::partition::{partition_entries, partition_regions};
use crate::scan::worker::{ScanWorker, WorkerShared, WorkerTask};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Static parameters of one scanning target, fixed at `first_scan`
#[derive(Debug, Clone)]
pub struct ScanParams {
    /// Region kinds included in the walk
    pub kinds: KindMask,
    pub exclude: ExcludeFlags,
    pub kind: ValueKind,
    /// Element step; 0 means the element width
    pub alignment: usize,
    /// Optional `[start, end)` clamp over the walked regions
    pub address_range: Option<(Address, Address)>,
}

impl ScanParams {
    pub fn new(kind: ValueKind) -> Self {
        ScanParams {
            kinds: KindMask::ALL,
            exclude: ExcludeFlags::default(),
            kind,
            alignment: 0,
            address_range: None,
        }
    }
}

/// Shape of the session's current result set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultDensity {
    /// No scan has completed yet
    Empty,
    /// Full memory dump, one implicit entry per aligned offset
    Dense,
    /// Explicit `(address, value)` pairs
    Sparse,
}

/// Cancels a running scan cooperatively
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Requests cancellation; workers stop at their next chunk boundary
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy)]
enum PassMode {
    FirstDense,
    FirstSparse,
    NextFromRegion,
    NextFromAddress,
}

struct PassOutcome {
    value_bytes: u64,
    entry_count: u64,
}

/// One scanning target's state across passes
pub struct ScanSession {
    memory: Arc<dyn MemorySource>,
    layout: Arc<dyn LayoutSource>,
    config: ScanConfig,
    files: SessionFiles,
    stop: Arc<AtomicBool>,

    kind: ValueKind,
    width: usize,
    alignment: usize,
    density: ResultDensity,
    regions: Arc<Vec<MemoryRegion>>,
    /// Byte size of the current result set (dense: scanned bytes, sparse:
    /// value-file bytes)
    total_size: u64,
    /// In-memory copies, present only for sparse results below the display
    /// threshold
    addresses: Vec<Address>,
    values: Vec<u8>,
}

impl ScanSession {
    /// Creates a session writing its files under `scan_dir`
    pub fn new(
        memory: Arc<dyn MemorySource>,
        layout: Arc<dyn LayoutSource>,
        config: ScanConfig,
        scan_dir: &Path,
    ) -> MemoryResult<Self> {
        config.validate()?;
        std::fs::create_dir_all(scan_dir)
            .map_err(|e| ScanError::output("creating scan directory", e))?;
        Ok(ScanSession {
            memory,
            layout,
            config,
            files: SessionFiles::new(scan_dir),
            stop: Arc::new(AtomicBool::new(false)),
            kind: ValueKind::U32,
            width: 4,
            alignment: 4,
            density: ResultDensity::Empty,
            regions: Arc::new(Vec::new()),
            total_size: 0,
            addresses: Vec::new(),
            values: Vec::new(),
        })
    }

    /// Handle for cancelling a running scan from another thread
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.stop.clone())
    }

    /// Discards all results and returns the session to its empty state
    pub fn clear(&mut self) {
        self.density = ResultDensity::Empty;
        self.total_size = 0;
        self.regions = Arc::new(Vec::new());
        self.addresses.clear();
        self.values.clear();
        self.files.remove_session_files();
    }

    /// Starts a new scanning target over the filtered layout
    ///
    /// With no constant in the spec (an unknown-value first scan) every
    /// worker dumps memory densely; with a constant, workers filter
    /// immediately and the session starts sparse.
    pub fn first_scan(&mut self, params: &ScanParams, spec: &CompareSpec) -> MemoryResult<()> {
        self.first_scan_with_progress(params, spec, |_| {})
    }

    pub fn first_scan_with_progress(
        &mut self,
        params: &ScanParams,
        spec: &CompareSpec,
        progress: impl FnMut(u64),
    ) -> MemoryResult<()> {
        self.stop.store(false, Ordering::SeqCst);

        if spec.kind != params.kind {
            return Err(ScanError::Config(format!(
                "compare kind {:?} does not match scan kind {:?}",
                spec.kind, params.kind
            )));
        }
        let width = spec.element_width()?;
        // Worker boundaries are page-snapped, so the element grid stays
        // consistent across workers only for power-of-two steps
        let alignment = match params.alignment {
            0 if width.is_power_of_two() => width,
            0 => 1,
            a if a.is_power_of_two() && a <= crate::core::types::PAGE_SIZE => a,
            a => {
                return Err(ScanError::Config(format!(
                    "alignment {} must be a power of two up to the page size",
                    a
                )))
            }
        };

        let filter = LayoutFilter {
            kinds: params.kinds,
            exclude: params.exclude,
        };
        let mut regions = self.layout.regions(&filter)?;
        regions.retain(|r| r.readable);
        if let Some((range_start, range_end)) = params.address_range {
            regions = regions
                .iter()
                .filter_map(|r| r.clamp(range_start, range_end))
                .collect();
        }
        let scan_bytes: u64 = regions.iter().map(|r| r.size()).sum();

        let dense = spec.constant.is_none();
        let target_density = if dense {
            ResultDensity::Dense
        } else {
            ResultDensity::Sparse
        };
        info!(
            kind = ?params.kind,
            regions = regions.len(),
            bytes = scan_bytes,
            dense,
            "first scan"
        );

        if scan_bytes == 0 {
            self.files.write_empty(!dense)?;
            self.kind = params.kind;
            self.width = width;
            self.alignment = alignment;
            self.density = target_density;
            self.regions = Arc::new(regions);
            self.total_size = 0;
            self.addresses.clear();
            self.values.clear();
            return Ok(());
        }

        let regions = Arc::new(regions);
        let mode = if dense {
            PassMode::FirstDense
        } else {
            PassMode::FirstSparse
        };
        let outcome = self.run_pass(mode, &regions, width, alignment, spec, progress)?;

        self.kind = params.kind;
        self.width = width;
        self.alignment = alignment;
        self.density = target_density;
        self.regions = regions;
        self.total_size = outcome.value_bytes;
        self.load_display_copies()
    }

    /// Refines the current result set with another pass
    ///
    /// A dense session re-reads its regions against the recorded dump; a
    /// sparse session re-reads only the previously matched addresses.
    /// Density only ever moves dense to sparse.
    pub fn next_scan(&mut self, spec: &CompareSpec) -> MemoryResult<()> {
        self.next_scan_with_progress(spec, |_| {})
    }

    pub fn next_scan_with_progress(
        &mut self,
        spec: &CompareSpec,
        progress: impl FnMut(u64),
    ) -> MemoryResult<()> {
        self.stop.store(false, Ordering::SeqCst);

        if self.density == ResultDensity::Empty {
            return Err(ScanError::Input(
                "no previous scan to refine".to_string(),
            ));
        }
        let width = spec.element_width()?;
        if width != self.width {
            return Err(ScanError::Config(format!(
                "element width {} does not match the session's {}",
                width, self.width
            )));
        }

        let mode = if self.density == ResultDensity::Dense {
            PassMode::NextFromRegion
        } else {
            PassMode::NextFromAddress
        };
        let regions = self.regions.clone();
        let outcome = self.run_pass(mode, &regions, width, self.alignment, spec, progress)?;

        info!(entries = outcome.entry_count, "scan pass complete");
        self.kind = spec.kind;
        self.total_size = outcome.value_bytes;
        self.density = ResultDensity::Sparse;
        self.load_display_copies()
    }

    fn run_pass(
        &self,
        mode: PassMode,
        regions: &Arc<Vec<MemoryRegion>>,
        width: usize,
        alignment: usize,
        spec: &CompareSpec,
        mut progress: impl FnMut(u64),
    ) -> MemoryResult<PassOutcome> {
        // Reconfigured every pass: operator, kind or constant may change
        let comparator = Arc::new(Comparator::configure(spec)?);
        let use_constant = spec.constant.is_some();

        let tasks: Vec<WorkerTask> = match mode {
            PassMode::FirstDense | PassMode::FirstSparse | PassMode::NextFromRegion => {
                let total: u64 = regions.iter().map(|r| r.size()).sum();
                if total == 0 {
                    self.files.write_empty(!matches!(mode, PassMode::FirstDense))?;
                    return Ok(PassOutcome {
                        value_bytes: 0,
                        entry_count: 0,
                    });
                }
                partition_regions(regions, total, self.config.worker_threads)
                    .into_iter()
                    .map(|assignment| match mode {
                        PassMode::FirstDense => WorkerTask::FirstDense { assignment },
                        PassMode::FirstSparse => WorkerTask::FirstSparse { assignment },
                        _ => WorkerTask::NextFromRegion { assignment },
                    })
                    .collect()
            }
            PassMode::NextFromAddress => {
                partition_entries(self.total_size / width as u64, self.config.worker_threads)
                    .into_iter()
                    .map(|entries| WorkerTask::NextFromAddress { entries })
                    .collect()
            }
        };

        let worker_count = tasks.len();
        let shared: Vec<Arc<WorkerShared>> = (0..worker_count)
            .map(|_| Arc::new(WorkerShared::default()))
            .collect();

        debug!(workers = worker_count, ?mode, "starting scan pass");
        let mut handles = Vec::with_capacity(worker_count);
        for (index, task) in tasks.into_iter().enumerate() {
            let worker = ScanWorker {
                index,
                task,
                regions: regions.clone(),
                memory: self.memory.clone(),
                comparator: comparator.clone(),
                width,
                alignment,
                use_constant,
                prev_values_path: self.files.values_path(),
                prev_addresses_path: self.files.addresses_path(),
                out_values_path: self.files.worker_values_path(index),
                out_addresses_path: self.files.worker_addresses_path(index),
                stop: self.stop.clone(),
                shared: shared[index].clone(),
            };
            handles.push(thread::spawn(move || worker.run()));
        }

        // The controller never blocks on a join directly while workers run;
        // it polls the monotonic counters so the caller sees live progress
        let interval = Duration::from_millis(self.config.progress_interval_ms);
        loop {
            let finished = shared.iter().all(|s| s.finished.load(Ordering::SeqCst));
            let processed: u64 = shared
                .iter()
                .map(|s| s.bytes_processed.load(Ordering::Relaxed))
                .sum();
            progress(processed);
            if finished {
                break;
            }
            thread::sleep(interval);
        }

        // All finished flags are up: join for error collection
        let mut outputs = Vec::with_capacity(worker_count);
        let mut first_error: Option<ScanError> = None;
        for handle in handles {
            match handle.join() {
                Ok(Ok(output)) => outputs.push(output),
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(_) => {
                    if first_error.is_none() {
                        first_error =
                            Some(ScanError::Output("worker thread panicked".to_string()));
                    }
                }
            }
        }

        if let Some(e) = first_error {
            self.files.cleanup_worker_files(worker_count);
            return Err(e);
        }
        if self.stop.load(Ordering::SeqCst) {
            // A cancelled pass is necessarily inconsistent across workers;
            // discard everything rather than merging it
            info!("scan cancelled, discarding partial output");
            self.files.cleanup_worker_files(worker_count);
            return Err(ScanError::Stopped);
        }

        outputs.sort_by_key(|o| o.index);
        let sparse = !matches!(mode, PassMode::FirstDense);
        let merge_result = self.files.merge(&outputs, sparse);
        self.files.cleanup_worker_files(worker_count);
        let value_bytes = merge_result?;
        let entry_count = outputs.iter().map(|o| o.entry_count).sum();

        Ok(PassOutcome {
            value_bytes,
            entry_count,
        })
    }

    /// Loads merged results into memory when the sparse entry count is
    /// below the display threshold
    fn load_display_copies(&mut self) -> MemoryResult<()> {
        self.addresses.clear();
        self.values.clear();
        if self.density != ResultDensity::Sparse {
            return Ok(());
        }
        let count = self.result_count();
        if count == 0 || count >= self.config.display_threshold {
            return Ok(());
        }

        let addr_bytes = std::fs::read(self.files.addresses_path())
            .map_err(|e| ScanError::input("loading addresses.bin", e))?;
        let value_bytes = std::fs::read(self.files.values_path())
            .map_err(|e| ScanError::input("loading memory.bin", e))?;
        if addr_bytes.len() as u64 != count * 8 || value_bytes.len() as u64 != self.total_size {
            return Err(ScanError::Input(
                "merged session files do not match the recorded sizes".to_string(),
            ));
        }

        self.addresses = addr_bytes
            .chunks_exact(8)
            .map(|c| Address::new(u64::from_le_bytes(c.try_into().unwrap_or([0; 8])) as usize))
            .collect();
        self.values = value_bytes;
        Ok(())
    }

    /// Shape of the current result set
    pub fn result_density(&self) -> ResultDensity {
        self.density
    }

    /// Number of result entries (dense: one per aligned offset)
    pub fn result_count(&self) -> u64 {
        match self.density {
            ResultDensity::Empty => 0,
            ResultDensity::Dense => self.total_size / self.alignment.max(1) as u64,
            ResultDensity::Sparse => self.total_size / self.width as u64,
        }
    }

    /// Byte size of the current result set
    pub fn result_byte_size(&self) -> u64 {
        self.total_size
    }

    /// Value kind of the current target
    pub fn value_kind(&self) -> ValueKind {
        self.kind
    }

    /// Address of the i-th sparse result
    pub fn address_at(&self, index: u64) -> MemoryResult<Option<Address>> {
        if self.density != ResultDensity::Sparse || index >= self.result_count() {
            return Ok(None);
        }
        if !self.addresses.is_empty() {
            return Ok(Some(self.addresses[index as usize]));
        }
        let mut file = File::open(self.files.addresses_path())
            .map_err(|e| ScanError::input("opening addresses.bin", e))?;
        file.seek(SeekFrom::Start(index * 8))
            .map_err(|e| ScanError::input("seeking addresses.bin", e))?;
        let mut buf = [0u8; 8];
        file.read_exact(&mut buf)
            .map_err(|e| ScanError::input("reading addresses.bin", e))?;
        Ok(Some(Address::new(u64::from_le_bytes(buf) as usize)))
    }

    /// Value the i-th result held when it was last matched
    pub fn previous_value_at(&self, index: u64) -> MemoryResult<Option<TypedValue>> {
        if self.density != ResultDensity::Sparse || index >= self.result_count() {
            return Ok(None);
        }
        let width = self.width;
        let bytes = if !self.values.is_empty() {
            let start = index as usize * width;
            self.values[start..start + width].to_vec()
        } else {
            let mut file = File::open(self.files.values_path())
                .map_err(|e| ScanError::input("opening memory.bin", e))?;
            file.seek(SeekFrom::Start(index * width as u64))
                .map_err(|e| ScanError::input("seeking memory.bin", e))?;
            let mut buf = vec![0u8; width];
            file.read_exact(&mut buf)
                .map_err(|e| ScanError::input("reading memory.bin", e))?;
            buf
        };
        Ok(TypedValue::from_bytes(&bytes, self.kind))
    }

    /// Value the i-th result holds right now, re-read from live memory
    /// (never cached)
    pub fn current_value_at(&self, index: u64) -> MemoryResult<Option<TypedValue>> {
        let addr = match self.address_at(index)? {
            Some(addr) => addr,
            None => return Ok(None),
        };
        Ok(self
            .memory
            .read_exact(addr, self.width)
            .and_then(|bytes| TypedValue::from_bytes(&bytes, self.kind)))
    }
}
