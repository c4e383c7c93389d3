//! Cross-process memory access
//!
//! Every other component reads and writes target memory through
//! [`MemorySource`] only; nothing else issues raw OS calls. Reads and
//! writes are partial-failure tolerant: an unreadable page yields a short
//! or zero-length transfer, not an error. Only total failures (target gone,
//! access revoked) surface as [`ScanError::Process`].

use crate::core::types::{Address, MemoryResult, ScanError};
use nix::errno::Errno;
use nix::sys::uio::{process_vm_readv, process_vm_writev, RemoteIoVec};
use nix::unistd::Pid;
use std::io::{IoSlice, IoSliceMut};

/// Read/write primitives against one address space
pub trait MemorySource: Send + Sync {
    /// Reads up to `buf.len()` bytes at `addr`, returning how many bytes
    /// were actually transferred (possibly zero)
    fn read(&self, addr: Address, buf: &mut [u8]) -> MemoryResult<usize>;

    /// Writes up to `data.len()` bytes at `addr`, returning how many bytes
    /// were actually transferred
    fn write(&self, addr: Address, data: &[u8]) -> MemoryResult<usize>;

    /// Pointer width of the target in bytes (4 or 8)
    fn pointer_width(&self) -> usize;

    /// Reads one pointer-sized word, `None` unless fully readable
    fn read_address(&self, addr: Address) -> Option<Address> {
        let mut buf = [0u8; 8];
        let width = self.pointer_width();
        match self.read(addr, &mut buf[..width]) {
            Ok(n) if n == width => {}
            _ => return None,
        }
        let value = match width {
            4 => u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as u64,
            8 => u64::from_le_bytes(buf),
            _ => return None,
        };
        Some(Address::new(value as usize))
    }

    /// Reads exactly `len` bytes, `None` on any short read
    fn read_exact(&self, addr: Address, len: usize) -> Option<Vec<u8>> {
        let mut buf = vec![0u8; len];
        match self.read(addr, &mut buf) {
            Ok(n) if n == len => Some(buf),
            _ => None,
        }
    }
}

/// Memory of a live process, accessed with `process_vm_readv`/`writev`
#[derive(Debug, Clone)]
pub struct ProcessMemory {
    pid: i32,
    pointer_width: usize,
}

impl ProcessMemory {
    /// Attaches to a process with an explicit target pointer width
    pub fn new(pid: i32, pointer_width: usize) -> Self {
        ProcessMemory { pid, pointer_width }
    }

    /// Attaches assuming the target shares the host pointer width
    pub fn from_pid(pid: i32) -> Self {
        ProcessMemory::new(pid, std::mem::size_of::<usize>())
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    fn map_errno(&self, errno: Errno) -> Option<ScanError> {
        match errno {
            Errno::ESRCH => Some(ScanError::Process(format!(
                "process {} no longer exists",
                self.pid
            ))),
            Errno::EPERM => Some(ScanError::Process(format!(
                "access to process {} denied",
                self.pid
            ))),
            // Page-level faults are ordinary partial failures
            _ => None,
        }
    }
}

impl MemorySource for ProcessMemory {
    fn read(&self, addr: Address, buf: &mut [u8]) -> MemoryResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let remote = [RemoteIoVec {
            base: addr.as_usize(),
            len: buf.len(),
        }];
        let mut local = [IoSliceMut::new(buf)];
        match process_vm_readv(Pid::from_raw(self.pid), &mut local, &remote) {
            Ok(n) => Ok(n),
            Err(errno) => match self.map_errno(errno) {
                Some(err) => Err(err),
                None => Ok(0),
            },
        }
    }

    fn write(&self, addr: Address, data: &[u8]) -> MemoryResult<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let remote = [RemoteIoVec {
            base: addr.as_usize(),
            len: data.len(),
        }];
        let local = [IoSlice::new(data)];
        match process_vm_writev(Pid::from_raw(self.pid), &local, &remote) {
            Ok(n) => Ok(n),
            Err(errno) => match self.map_errno(errno) {
                Some(err) => Err(err),
                None => Ok(0),
            },
        }
    }

    fn pointer_width(&self) -> usize {
        self.pointer_width
    }
}
