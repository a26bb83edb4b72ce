//! Engine errors and CLI exit codes.

use std::path::PathBuf;

use serde::Serialize;

/// Errors returned by the [`Engine`](crate::engine::Engine) facade.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// The scan root does not exist or is not a directory.
    #[error("Invalid scan root: {0}")]
    InvalidPath(PathBuf),

    /// A job is already running; the request was rejected.
    #[error("A scan job is already running")]
    JobAlreadyRunning,

    /// No completed result is available.
    #[error("No scan result is available")]
    NotReady,

    /// The job could not proceed at all.
    #[error("Pipeline fault: {0}")]
    PipelineFault(String),

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Exit codes for the CLI.
///
/// - 0: Scan completed and duplicates were found
/// - 1: General error
/// - 2: Scan completed, no duplicates
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: Scan completed and duplicates were found.
    Success = 0,
    /// General error: An unexpected error occurred.
    GeneralError = 1,
    /// No duplicates: Scan completed but no duplicates were found.
    NoDuplicates = 2,
    /// Interrupted: Scan was cancelled (Ctrl+C).
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "DE000",
            Self::GeneralError => "DE001",
            Self::NoDuplicates => "DE002",
            Self::Interrupted => "DE130",
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "DE001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: err.to_string(),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
