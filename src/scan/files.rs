//! Session and worker file management
//!
//! Workers own their `memory-<idx>.tmp` / `addresses-<idx>.tmp` files
//! exclusively; the merged `memory.bin` / `addresses.bin` are written only
//! by the controller, strictly after all workers have joined. Merging goes
//! through `.merge` temporaries and commits by rename, so a failed or
//! cancelled pass leaves the previous pass's files intact.

use crate::core::types::{MemoryResult, ScanError};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Size of one stored address entry in `addresses.bin`
pub(crate) const ADDRESS_ENTRY_SIZE: u64 = 8;

/// What one worker reports after finishing its assignment
#[derive(Debug, Clone, Copy)]
pub(crate) struct WorkerOutput {
    pub index: usize,
    /// Bytes appended to the worker's value file
    pub value_bytes: u64,
    /// Entries appended to the worker's address file (sparse modes)
    pub entry_count: u64,
}

/// Paths of one scan session's files inside its temporary directory
#[derive(Debug, Clone)]
pub(crate) struct SessionFiles {
    dir: PathBuf,
}

impl SessionFiles {
    pub fn new(dir: &Path) -> Self {
        SessionFiles {
            dir: dir.to_path_buf(),
        }
    }

    pub fn values_path(&self) -> PathBuf {
        self.dir.join("memory.bin")
    }

    pub fn addresses_path(&self) -> PathBuf {
        self.dir.join("addresses.bin")
    }

    pub fn worker_values_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("memory-{}.tmp", index))
    }

    pub fn worker_addresses_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("addresses-{}.tmp", index))
    }

    /// Concatenates worker files into the session files in worker-index
    /// order, verifying each worker's reported byte count against what was
    /// actually appended. Returns the merged value-file size.
    pub fn merge(&self, outputs: &[WorkerOutput], sparse: bool) -> MemoryResult<u64> {
        let values_merge = self.dir.join("memory.bin.merge");
        let addresses_merge = self.dir.join("addresses.bin.merge");

        let result = self.merge_inner(outputs, sparse, &values_merge, &addresses_merge);
        if result.is_err() {
            let _ = fs::remove_file(&values_merge);
            let _ = fs::remove_file(&addresses_merge);
        }
        result
    }

    fn merge_inner(
        &self,
        outputs: &[WorkerOutput],
        sparse: bool,
        values_merge: &Path,
        addresses_merge: &Path,
    ) -> MemoryResult<u64> {
        let mut values_out = File::create(values_merge)
            .map_err(|e| ScanError::output("creating value merge file", e))?;
        let mut addresses_out = if sparse {
            Some(
                File::create(addresses_merge)
                    .map_err(|e| ScanError::output("creating address merge file", e))?,
            )
        } else {
            None
        };

        let mut total_values = 0u64;
        for output in outputs {
            let copied = append_file(&self.worker_values_path(output.index), &mut values_out)?;
            if copied != output.value_bytes {
                return Err(ScanError::Output(format!(
                    "worker {} value file holds {} bytes, reported {}",
                    output.index, copied, output.value_bytes
                )));
            }
            total_values += copied;

            if let Some(out) = addresses_out.as_mut() {
                let copied = append_file(&self.worker_addresses_path(output.index), out)?;
                let expected = output.entry_count * ADDRESS_ENTRY_SIZE;
                if copied != expected {
                    return Err(ScanError::Output(format!(
                        "worker {} address file holds {} bytes, expected {}",
                        output.index, copied, expected
                    )));
                }
            }
        }

        drop(values_out);
        drop(addresses_out);

        fs::rename(values_merge, self.values_path())
            .map_err(|e| ScanError::output("committing memory.bin", e))?;
        if sparse {
            fs::rename(addresses_merge, self.addresses_path())
                .map_err(|e| ScanError::output("committing addresses.bin", e))?;
        } else {
            // A dense pass has no address list; drop any stale one
            let _ = fs::remove_file(self.addresses_path());
        }

        debug!(bytes = total_values, sparse, "merged worker output");
        Ok(total_values)
    }

    /// Writes empty session files, used when a scan covers no memory
    pub fn write_empty(&self, sparse: bool) -> MemoryResult<()> {
        fs::write(self.values_path(), [])
            .map_err(|e| ScanError::output("creating empty memory.bin", e))?;
        if sparse {
            fs::write(self.addresses_path(), [])
                .map_err(|e| ScanError::output("creating empty addresses.bin", e))?;
        } else {
            let _ = fs::remove_file(self.addresses_path());
        }
        Ok(())
    }

    /// Removes worker temp files for the given worker count
    pub fn cleanup_worker_files(&self, worker_count: usize) {
        for index in 0..worker_count {
            for path in [
                self.worker_values_path(index),
                self.worker_addresses_path(index),
            ] {
                if let Err(e) = fs::remove_file(&path) {
                    if e.kind() != io::ErrorKind::NotFound {
                        warn!("could not remove {}: {}", path.display(), e);
                    }
                }
            }
        }
    }

    /// Removes the merged session files
    pub fn remove_session_files(&self) {
        for path in [self.values_path(), self.addresses_path()] {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("could not remove {}: {}", path.display(), e);
                }
            }
        }
    }
}

fn append_file(from: &Path, to: &mut File) -> MemoryResult<u64> {
    let mut input = File::open(from)
        .map_err(|e| ScanError::output(format!("opening {}", from.display()), e))?;
    io::copy(&mut input, to).map_err(|e| ScanError::output("appending worker file", e))
}
