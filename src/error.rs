//! Process exit codes and structured error output.

use serde::Serialize;

/// Exit codes for the `rustthumb` binary.
///
/// - 0: Success
/// - 1: General error (unexpected failure)
/// - 2: No thumbnail could be produced for the requested file
/// - 3: Partial success (some files in a precache batch failed)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Completed normally.
    Success = 0,
    /// An unexpected error occurred.
    GeneralError = 1,
    /// The file has no thumbnail (unsupported type, missing tool, or failed generation).
    NoThumbnail = 2,
    /// Completed, but some files failed.
    PartialSuccess = 3,
    /// Cancelled by Ctrl+C.
    Interrupted = 130,
}

impl ExitCode {
    /// Numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "RT000",
            Self::GeneralError => "RT001",
            Self::NoThumbnail => "RT002",
            Self::PartialSuccess => "RT003",
            Self::Interrupted => "RT130",
        }
    }
}

/// Error report printed with `--json-errors`.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// Code prefix, e.g. "RT001"
    pub code: String,
    /// Process exit code
    pub exit_code: i32,
    /// Human-readable message including the cause chain
    pub message: String,
    /// Whether the run was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Describe `err`, which ends the process with `exit_code`.
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
