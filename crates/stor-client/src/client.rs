//! Main client implementation

use crate::{
    Config, ClientError, Result,
    types::*,
};
use async_trait::async_trait;
use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    Client, RequestBuilder, Response,
};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, instrument};

/// The store capabilities the upload tooling relies on
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Look up what lives at `path`. A missing path is `Ok(NotFound)`.
    async fn probe(&self, path: &str) -> Result<ExistenceProbe>;

    /// Stream `body` to `path`
    async fn put(&self, path: &str, body: ByteStream, options: &PutOptions) -> Result<PutResult>;

    /// Release the client. Later calls fail with [`ClientError::Closed`].
    fn close(&self);
}

/// HTTP store client
pub struct HttpStoreClient {
    config: Config,
    http: Client,
    closed: AtomicBool,
}

impl HttpStoreClient {
    /// Create a new client with the given configuration
    pub fn new(config: Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let user_agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|e| ClientError::Config(format!("invalid user agent: {}", e)))?;
        headers.insert(header::USER_AGENT, user_agent);

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .default_headers(headers)
            .build()
            .map_err(ClientError::Http)?;

        Ok(Self {
            config,
            http,
            closed: AtomicBool::new(false),
        })
    }

    /// Create with endpoint URL
    pub fn with_endpoint(endpoint: &str) -> Result<Self> {
        Self::new(Config::new(endpoint))
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Check whether [`close`](StoreClient::close) has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // ==================== Helper Methods ====================

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        Ok(())
    }

    async fn mkdirp(&self, path: &str) -> Result<()> {
        for dir in parent_directories(path) {
            let req = self
                .http
                .put(self.config.url_for(&dir))
                .header(header::CONTENT_TYPE, DIRECTORY_CONTENT_TYPE);
            self.send("PUT", &dir, req).await?;
        }
        Ok(())
    }

    async fn send(&self, method: &str, path: &str, req: RequestBuilder) -> Result<Response> {
        self.ensure_open()?;

        debug!("Sending {} request for {}", method, path);
        let response = req.send().await?;

        // Check for errors
        let status = response.status();
        if !status.is_success() {
            let request_id = header_string(response.headers(), "x-request-id");
            let text = response.text().await.unwrap_or_default();
            return Err(ClientError::from_store_body(&text, status.as_u16(), request_id));
        }

        Ok(response)
    }
}

#[async_trait]
impl StoreClient for HttpStoreClient {
    #[instrument(skip(self))]
    async fn probe(&self, path: &str) -> Result<ExistenceProbe> {
        let req = self.http.head(self.config.url_for(path));
        match self.send("HEAD", path, req).await {
            Ok(response) => {
                let content_type =
                    header_string(response.headers(), header::CONTENT_TYPE.as_str())
                        .unwrap_or_default();
                Ok(ExistenceProbe::from_content_type(&content_type))
            }
            Err(e) if e.is_not_found() => Ok(ExistenceProbe::NotFound),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, body, options), fields(copies = options.copies))]
    async fn put(&self, path: &str, body: ByteStream, options: &PutOptions) -> Result<PutResult> {
        self.ensure_open()?;

        if options.create_parents {
            self.mkdirp(path).await?;
        }

        let mut req = self
            .http
            .put(self.config.url_for(path))
            .header("durability-level", options.copies.to_string());

        for (name, value) in &options.headers {
            req = req.header(name.as_str(), value.as_str());
        }

        if let Some(length) = options.content_length {
            req = req.header(header::CONTENT_LENGTH, length);
        }

        req = req.body(reqwest::Body::wrap_stream(body));

        let response = self.send("PUT", path, req).await?;
        let headers = response.headers();

        Ok(PutResult {
            etag: header_string(headers, header::ETAG.as_str())
                .map(|s| s.trim_matches('"').to_string()),
            computed_md5: header_string(headers, "computed-md5"),
            request_id: header_string(headers, "x-request-id"),
        })
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("Client already closed");
        } else {
            debug!("Closed client for {}", self.config.endpoint);
        }
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Directories that must exist before `path` can be written, shallowest
/// first. The first two segments (`/<account>/<top>`) always exist.
fn parent_directories(path: &str) -> Vec<String> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() <= 3 {
        return Vec::new();
    }

    (3..segments.len())
        .map(|depth| format!("/{}", segments[..depth].join("/")))
        .collect()
}
