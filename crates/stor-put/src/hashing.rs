//! Content hashing for conditional puts
//!
//! With `--md5` the source is streamed once up front and its MD5 is sent
//! as `content-md5`. The store rejects the write with a precondition
//! failure if what it received hashes differently.

use crate::{ConfigError, Result, Source, UploadError, source::reader_stream};
use base64::Engine;
use futures::TryStreamExt;
use md5::{Digest, Md5};

/// Header carrying the precomputed digest
pub const CONTENT_MD5_HEADER: &str = "content-md5";

/// Digest of a whole source
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentDigest {
    /// Base64-encoded MD5
    pub md5: String,
    /// Number of bytes hashed
    pub bytes: u64,
}

/// Calculate an MD5 hash incrementally
pub struct Md5Hasher {
    hasher: Md5,
    bytes_processed: u64,
}

impl Md5Hasher {
    pub fn new() -> Self {
        Self {
            hasher: Md5::new(),
            bytes_processed: 0,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.bytes_processed += data.len() as u64;
    }

    /// Finalize into the base64 form used by `content-md5`
    pub fn finalize(self) -> ContentDigest {
        ContentDigest {
            md5: base64::engine::general_purpose::STANDARD.encode(self.hasher.finalize()),
            bytes: self.bytes_processed,
        }
    }

    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed
    }
}

impl Default for Md5Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Base64 MD5 of an in-memory buffer
pub fn md5_base64(data: &[u8]) -> String {
    let mut hasher = Md5Hasher::new();
    hasher.update(data);
    hasher.finalize().md5
}

/// Stream a file source once and digest it
pub async fn hash_source(source: &Source) -> Result<ContentDigest> {
    let path = source.path().ok_or(ConfigError::HashRequiresFile)?;

    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| UploadError::read_failure(source.describe(), e))?;

    let mut hasher = Md5Hasher::new();
    let mut chunks = reader_stream(file);
    while let Some(chunk) = chunks
        .try_next()
        .await
        .map_err(|e| UploadError::read_failure(source.describe(), e))?
    {
        hasher.update(&chunk);
    }

    Ok(hasher.finalize())
}
