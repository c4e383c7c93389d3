//! Error taxonomy for scan and pointer operations

use thiserror::Error;

/// Main error type for the scanning engine
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("memory layout unavailable for pid {pid}: {reason}")]
    LayoutUnavailable { pid: i32, reason: String },

    #[error("scan stopped by request")]
    Stopped,

    #[error("scan output error: {0}")]
    Output(String),

    #[error("scan input error: {0}")]
    Input(String),

    #[error("target process error: {0}")]
    Process(String),

    #[error("value parse error: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type alias for engine operations
pub type MemoryResult<T> = Result<T, ScanError>;

impl ScanError {
    /// Creates a layout-unavailable error for a process
    pub fn layout_unavailable(pid: i32, reason: impl Into<String>) -> Self {
        ScanError::LayoutUnavailable {
            pid,
            reason: reason.into(),
        }
    }

    /// Creates an output error from a failed temp-file or merge operation
    pub fn output(context: impl Into<String>, err: std::io::Error) -> Self {
        ScanError::Output(format!("{}: {}", context.into(), err))
    }

    /// Creates an input error from a failed read of a previous pass's data
    pub fn input(context: impl Into<String>, err: std::io::Error) -> Self {
        ScanError::Input(format!("{}: {}", context.into(), err))
    }

    /// True when the session state was rolled back and a retry is sensible
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ScanError::Stopped)
    }
}
