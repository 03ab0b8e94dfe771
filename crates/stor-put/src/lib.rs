//! # stor-put
//!
//! Upload one file, or standard input, to an HTTP object store.
//!
//! This crate provides:
//! - **Path resolution**: a destination that is a directory gets the
//!   source's file name appended
//! - **Content hashing**: optional MD5 sent as `content-md5` so the store
//!   can verify what it received
//! - **Progress**: byte counts reported per attempt
//! - **Retries**: bounded exponential backoff for transient failures
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  stor-put (CLI)                     │
//! └─────────────────────────┬───────────────────────────┘
//!                           │ UploadRequest
//! ┌─────────────────────────▼───────────────────────────┐
//! │                     Uploader                        │
//! │   validate │ size check │ md5 │ content type        │
//! ├─────────────────────────────────────────────────────┤
//! │                 RetryController                     │
//! │     Idle → Attempting ⇄ BackingOff → terminal       │
//! ├─────────────────────────────────────────────────────┤
//! │                  UploadAttempt                      │
//! │   probe │ resolve │ open source │ progress │ put    │
//! ├─────────────────────────────────────────────────────┤
//! │                   stor-client                       │
//! │              (HEAD / PUT over HTTP)                 │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod attempt;
pub mod config;
pub mod error;
pub mod hashing;
pub mod progress;
pub mod request;
pub mod resolver;
pub mod retry;
pub mod source;
pub mod upload;

pub use attempt::{AttemptOutcome, UploadAttempt, Uploaded};
pub use config::UploadConfig;
pub use error::{ConfigError, FailureClass, Result, UploadError};
pub use hashing::{hash_source, ContentDigest, Md5Hasher, CONTENT_MD5_HEADER};
pub use progress::{ProgressMode, ProgressReporter, ProgressSink, TerminalProgress};
pub use request::{parse_header, UploadRequest};
pub use resolver::resolve_destination;
pub use retry::{Attempt, BackoffRecord, BackoffState, RetryController, RetryPolicy, RetryState};
pub use source::Source;
pub use upload::{UploadReport, Uploader};
