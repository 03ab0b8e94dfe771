//! Client error types

use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    /// HTTP transport error (connect, timeout, body stream)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Error response from the store
    #[error("{code}: {message}")]
    Store {
        status: u16,
        code: String,
        message: String,
        request_id: Option<String>,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid response
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The client was already closed
    #[error("client is closed")]
    Closed,
}

/// Stable classification of a [`ClientError`].
///
/// Callers decide what to do with a failure from this tag rather than by
/// inspecting codes or messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A conditional request was not satisfied
    PreconditionFailed,
    /// The operation targeted a directory
    DirectoryConflict,
    /// The operation targeted the root directory
    RootDirectory,
    /// Nothing exists at the path
    NotFound,
    /// Anything else: transport failures, timeouts, server errors
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PreconditionFailed => "precondition not met",
            Self::DirectoryConflict => "directory-target conflict",
            Self::RootDirectory => "root directory write",
            Self::NotFound => "not found",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

impl ClientError {
    /// Build a store error from a response body.
    ///
    /// The store answers errors with `{"code": "...", "message": "..."}`;
    /// anything else falls back to `HTTP<status>` and the raw body.
    pub fn from_store_body(body: &str, status: u16, request_id: Option<String>) -> Self {
        let parsed: Option<ErrorBody> = serde_json::from_str(body).ok();
        let (code, message) = match parsed {
            Some(ErrorBody { code, message }) => (code, message),
            None => (None, None),
        };

        let code = code.unwrap_or_else(|| format!("HTTP{}", status));
        let message = message.unwrap_or_else(|| {
            let raw = body.trim();
            if raw.is_empty() {
                format!("request failed with status {}", status)
            } else {
                raw.to_string()
            }
        });

        Self::Store {
            status,
            code,
            message,
            request_id,
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Store { status, code, .. } => match code.as_str() {
                "PreconditionFailed" => ErrorKind::PreconditionFailed,
                "OperationNotAllowedOnDirectory" => ErrorKind::DirectoryConflict,
                "OperationNotAllowedOnRootDirectory" => ErrorKind::RootDirectory,
                "ResourceNotFound" | "NotFound" => ErrorKind::NotFound,
                _ => match status {
                    412 => ErrorKind::PreconditionFailed,
                    404 => ErrorKind::NotFound,
                    _ => ErrorKind::Other,
                },
            },
            _ => ErrorKind::Other,
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Request id reported by the store, if any
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Store { request_id, .. } => request_id.as_deref(),
            _ => None,
        }
    }
}
