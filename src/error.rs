//! Structured error handling and exit codes.

use serde::Serialize;

/// Exit codes for the nmdedupe application.
///
/// - 0: Success (all qualifying duplicates linked, or nothing to do)
/// - 1: General error (bad configuration, unreadable root, store write failure)
/// - 3: Partial success (some duplicates could not be linked)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: The run completed without link failures.
    Success = 0,
    /// General error: The run could not complete.
    GeneralError = 1,
    /// Partial success: The run completed but some duplicates failed to link.
    PartialSuccess = 3,
    /// Interrupted: The run was cancelled by the user (Ctrl+C).
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
            Self::Success => "ND000",
            Self::GeneralError => "ND001",
            Self::PartialSuccess => "ND003",
            Self::Interrupted => "ND130",
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "ND001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message, including its causes
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
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
