//! Scan sessions: controller, workers, partitioning and session files

mod files;
mod partition;
mod session;
mod worker;

pub use session::{ResultDensity, ScanParams, ScanSession, StopHandle};
