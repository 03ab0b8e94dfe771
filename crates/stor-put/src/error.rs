//! Error types for uploads
//!
//! Failures fall into three classes:
//!
//! - **Configuration**: the inputs cannot work together; detected before
//!   anything is sent.
//! - **Fatal**: the store rejected the write for a logical reason, or the
//!   source could not be read. Retrying cannot help.
//! - **Retryable**: everything else. Retried until the attempt budget is
//!   spent; [`UploadError::Exhausted`] then carries the last cause.

use stor_client::{ClientError, ErrorKind};
use thiserror::Error;

/// Result type alias using `UploadError`
pub type Result<T> = std::result::Result<T, UploadError>;

/// Invalid combination of inputs
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Destination is a directory but there is no file name to append
    #[error("{path} is a directory and standard input has no file name to append")]
    DirectoryTargetWithoutName { path: String },

    /// Hashing reads the source twice
    #[error("--md5 needs a file source; standard input can only be read once")]
    HashRequiresFile,

    /// Malformed `Name: value` header
    #[error("invalid header {0:?}: expected \"Name: value\"")]
    InvalidHeader(String),

    /// Zero copies requested
    #[error("copies must be at least 1")]
    InvalidCopies,

    /// Empty destination path
    #[error("destination path is empty")]
    EmptyDestination,

    /// Size hint disagrees with the file on disk
    #[error("--size {given} does not match {path} ({actual} bytes)")]
    SizeMismatch {
        path: String,
        given: u64,
        actual: u64,
    },

    /// Retry knobs out of range
    #[error("invalid retry policy: {0}")]
    InvalidRetryPolicy(String),
}

/// Which class of failure an [`UploadError`] belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Configuration,
    Fatal,
    Retryable,
}

/// Terminal upload failure
#[derive(Error, Debug)]
pub enum UploadError {
    /// Rejected before any network attempt
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The store refused the write for a reason retries cannot fix
    #[error("{kind}: {source}")]
    Rejected {
        kind: ErrorKind,
        #[source]
        source: ClientError,
    },

    /// The source could not be read
    #[error("cannot read {origin}: {source}")]
    Source {
        origin: String,
        #[source]
        source: std::io::Error,
    },

    /// Every attempt failed with a retryable error
    #[error("giving up after {attempts} attempt(s): {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: ClientError,
    },
}

impl UploadError {
    /// Build a source read error
    pub fn read_failure(origin: impl Into<String>, source: std::io::Error) -> Self {
        Self::Source {
            origin: origin.into(),
            source,
        }
    }

    /// Map onto the configuration / fatal / retryable taxonomy
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Config(_) => FailureClass::Configuration,
            Self::Rejected { .. } | Self::Source { .. } => FailureClass::Fatal,
            Self::Exhausted { .. } => FailureClass::Retryable,
        }
    }

    /// The store error behind this failure, if any
    pub fn client_error(&self) -> Option<&ClientError> {
        match self {
            Self::Rejected { source, .. } | Self::Exhausted { source, .. } => Some(source),
            _ => None,
        }
    }
}
