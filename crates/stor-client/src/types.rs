//! Common types for the store client

use bytes::Bytes;
use futures::stream::BoxStream;
use reqwest::header::{HeaderName, HeaderValue};
use std::collections::BTreeMap;

/// Request body for [`put`](crate::StoreClient::put): a stream of byte chunks.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Content type the store uses for directory entries
pub const DIRECTORY_CONTENT_TYPE: &str = "application/json; type=directory";

/// What currently lives at a path
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExistenceProbe {
    /// Nothing exists at the path
    NotFound,
    /// An object with the given content type
    ExistingObject(String),
    /// A directory
    ExistingDirectory,
}

impl ExistenceProbe {
    /// Classify an entry from its `Content-Type`
    pub fn from_content_type(content_type: &str) -> Self {
        let is_directory = content_type
            .split(';')
            .skip(1)
            .any(|param| param.trim() == "type=directory");

        if is_directory {
            Self::ExistingDirectory
        } else {
            Self::ExistingObject(content_type.to_string())
        }
    }

    /// Check if the path is a directory
    pub fn is_directory(&self) -> bool {
        matches!(self, Self::ExistingDirectory)
    }
}

/// Options for a put
#[derive(Clone, Debug)]
pub struct PutOptions {
    /// Headers sent verbatim with the object
    pub headers: BTreeMap<String, String>,
    /// Number of replicas the store should keep
    pub copies: u32,
    /// Create missing parent directories first
    pub create_parents: bool,
    /// Body length, when known up front
    pub content_length: Option<u64>,
}

impl Default for PutOptions {
    fn default() -> Self {
        Self {
            headers: BTreeMap::new(),
            copies: 2,
            create_parents: false,
            content_length: None,
        }
    }
}

impl PutOptions {
    /// Create default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the replica count
    pub fn with_copies(mut self, copies: u32) -> Self {
        self.copies = copies;
        self
    }

    /// Create missing parent directories
    pub fn with_parents(mut self, create_parents: bool) -> Self {
        self.create_parents = create_parents;
        self
    }

    /// Set the body length
    pub fn with_content_length(mut self, length: u64) -> Self {
        self.content_length = Some(length);
        self
    }
}

/// Put result
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PutResult {
    /// ETag of the stored object
    pub etag: Option<String>,
    /// MD5 the store computed over the received bytes (base64)
    pub computed_md5: Option<String>,
    /// Request id reported by the store
    pub request_id: Option<String>,
}

/// Whether `name: value` can be sent as an HTTP header
pub fn is_valid_header(name: &str, value: &str) -> bool {
    HeaderName::from_bytes(name.as_bytes()).is_ok() && HeaderValue::from_str(value).is_ok()
}
