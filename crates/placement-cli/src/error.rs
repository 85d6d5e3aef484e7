/// CLI error types with associated exit codes.
///
/// [`CliError`] is the top-level error type for the `placement` binary.
/// Every variant maps to a stable exit code (1 or 2) via
/// [`CliError::exit_code`]:
///
/// - Exit code **2** — input failure: the tool could not read the input at
///   all. These errors terminate early before any domain logic runs.
/// - Exit code **1** — logical failure: the tool ran to completion but the
///   result is a well-defined failure (a bad config, an insufficient-nodes
///   selection, etc.).
use std::fmt;
use std::path::PathBuf;

use placement_core::PlacementError;

/// All error conditions that the `placement` CLI can produce.
#[derive(Debug)]
pub enum CliError {
    // --- Exit code 2: input failures ---
    /// A file argument could not be found on the filesystem.
    FileNotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// The process lacks permission to read a file.
    PermissionDenied {
        /// The path that could not be read.
        path: PathBuf,
    },

    /// The input exceeds the configured `--max-file-size` limit.
    FileTooLarge {
        /// A human-readable label for the source (`"-"` for stdin, or the
        /// filesystem path).
        source: String,
        /// The configured size limit in bytes.
        limit: u64,
        /// The actual size in bytes, if known (disk files only).
        actual: Option<u64>,
    },

    /// The input bytes are not valid UTF-8.
    InvalidUtf8 {
        /// A human-readable label for the source.
        source: String,
        /// The byte offset of the first invalid byte sequence.
        byte_offset: usize,
    },

    /// An I/O error occurred while reading from stdin.
    StdinReadError {
        /// The underlying I/O error message.
        detail: String,
    },

    /// A generic I/O error not covered by the more specific variants above.
    IoError {
        /// A human-readable label for the source.
        source: String,
        /// The underlying I/O error message.
        detail: String,
    },

    /// The node-snapshot argument was not a valid JSON node array.
    InvalidNodes {
        /// Description of what went wrong.
        detail: String,
    },

    // --- Exit code 1: logical failures ---
    /// Loading or compiling a placement config failed.
    Placement(PlacementError),
}

impl CliError {
    /// Returns the process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::FileNotFound { .. }
            | Self::PermissionDenied { .. }
            | Self::FileTooLarge { .. }
            | Self::InvalidUtf8 { .. }
            | Self::StdinReadError { .. }
            | Self::IoError { .. }
            | Self::InvalidNodes { .. } => 2,

            Self::Placement(_) => 1,
        }
    }

    /// Returns a human-readable error message suitable for printing to stderr.
    pub fn message(&self) -> String {
        match self {
            Self::FileNotFound { path } => format!("error: file not found: {}", path.display()),
            Self::PermissionDenied { path } => format!("error: permission denied: {}", path.display()),
            Self::FileTooLarge {
                source,
                limit,
                actual: Some(actual),
            } => format!("error: file too large: {source} is {actual} bytes, limit is {limit} bytes"),
            Self::FileTooLarge { source, limit, actual: None } => {
                format!("error: file too large: {source} exceeded limit of {limit} bytes")
            }
            Self::InvalidUtf8 { source, byte_offset } => {
                format!("error: invalid UTF-8 in {source}: first invalid byte at offset {byte_offset}")
            }
            Self::StdinReadError { detail } => format!("error: failed to read stdin: {detail}"),
            Self::IoError { source, detail } => format!("error: I/O error reading {source}: {detail}"),
            Self::InvalidNodes { detail } => format!("error: invalid node snapshot: {detail}"),
            Self::Placement(e) => format!("error: {e}"),
        }
    }
}

impl From<PlacementError> for CliError {
    fn from(e: PlacementError) -> Self {
        Self::Placement(e)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for CliError {}
