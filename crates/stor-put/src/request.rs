//! What to upload and how

use crate::{ConfigError, Source};
use std::collections::BTreeMap;
use stor_client::is_valid_header;

/// An upload, fixed before the first attempt
#[derive(Clone, Debug)]
pub struct UploadRequest {
    /// Path as given by the user; may name a directory
    pub destination: String,
    /// Where the bytes come from
    pub source: Source,
    /// Byte count, when known
    pub size: Option<u64>,
    /// Extra headers, names lower-cased
    pub headers: BTreeMap<String, String>,
    /// Number of replicas the store should keep
    pub copies: u32,
    /// Create missing parent directories
    pub create_parents: bool,
    /// Precompute the MD5 and send it for server-side verification
    pub compute_md5: bool,
}

impl UploadRequest {
    pub fn new(destination: impl Into<String>, source: Source) -> Self {
        Self {
            destination: destination.into(),
            source,
            size: None,
            headers: BTreeMap::new(),
            copies: 2,
            create_parents: false,
            compute_md5: false,
        }
    }

    /// Add a header. A later header with the same name replaces an earlier one.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Attach role tags as a single `role-tag` header
    pub fn with_role_tags<S: AsRef<str>>(self, tags: &[S]) -> Self {
        if tags.is_empty() {
            return self;
        }
        let joined = tags
            .iter()
            .map(|t| t.as_ref().trim())
            .collect::<Vec<_>>()
            .join(",");
        self.with_header("role-tag", joined)
    }

    pub fn with_copies(mut self, copies: u32) -> Self {
        self.copies = copies;
        self
    }

    pub fn with_parents(mut self, create_parents: bool) -> Self {
        self.create_parents = create_parents;
        self
    }

    pub fn with_md5(mut self, compute_md5: bool) -> Self {
        self.compute_md5 = compute_md5;
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Check what can be checked without touching the source or the store
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.destination.trim().is_empty() {
            return Err(ConfigError::EmptyDestination);
        }
        if self.copies == 0 {
            return Err(ConfigError::InvalidCopies);
        }
        if self.compute_md5 && !self.source.is_replayable() {
            return Err(ConfigError::HashRequiresFile);
        }
        if let Some((name, value)) = self
            .headers
            .iter()
            .find(|(name, value)| !is_valid_header(name, value))
        {
            return Err(ConfigError::InvalidHeader(format!("{}: {}", name, value)));
        }
        Ok(())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(&name.to_ascii_lowercase())
    }
}

/// Parse a `Name: value` header argument
pub fn parse_header(raw: &str) -> Result<(String, String), ConfigError> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| ConfigError::InvalidHeader(raw.to_string()))?;

    let (name, value) = (name.trim(), value.trim());
    if !is_valid_header(name, value) {
        return Err(ConfigError::InvalidHeader(raw.to_string()));
    }

    Ok((name.to_ascii_lowercase(), value.to_string()))
}
