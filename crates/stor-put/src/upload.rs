//! Upload orchestration
//!
//! Validate, hash (optional), then hand an [`UploadAttempt`] to the
//! [`RetryController`]. The store client is closed exactly once, whatever
//! the outcome.

use crate::{
    attempt::UploadAttempt,
    hashing::{hash_source, CONTENT_MD5_HEADER},
    progress::ProgressReporter,
    retry::{BackoffRecord, RetryController, RetryPolicy},
    source::SourceHandle,
    ConfigError, Result, UploadRequest,
};
use stor_client::{PutOptions, PutResult, StoreClient};
use tracing::{debug, info};

/// Summary of a successful upload
#[derive(Clone, Debug)]
pub struct UploadReport {
    /// Final object path
    pub path: String,
    /// Attempts it took
    pub attempts: u32,
    /// Backoffs taken before the successful attempt
    pub backoffs: Vec<BackoffRecord>,
    /// What the store returned
    pub result: PutResult,
}

/// Uploads one request against a store client
pub struct Uploader<'a, C: ?Sized> {
    client: &'a C,
    policy: RetryPolicy,
    progress: Option<&'a dyn ProgressReporter>,
}

impl<'a, C> Uploader<'a, C>
where
    C: StoreClient + ?Sized,
{
    pub fn new(client: &'a C, policy: RetryPolicy) -> Self {
        Self {
            client,
            policy,
            progress: None,
        }
    }

    /// Report progress through `reporter`
    pub fn with_progress(mut self, reporter: &'a dyn ProgressReporter) -> Self {
        self.progress = Some(reporter);
        self
    }

    /// Run the upload to completion, then close the client
    pub async fn upload(self, request: UploadRequest) -> Result<UploadReport> {
        let result = self.run(request).await;
        self.client.close();
        result
    }

    async fn run(&self, request: UploadRequest) -> Result<UploadReport> {
        request.validate()?;

        let options = self.prepare_options(&request).await?;

        let policy = if request.source.is_replayable() {
            self.policy.clone()
        } else {
            debug!("{} cannot be replayed, allowing a single attempt", request.source.describe());
            self.policy.clone().with_max_attempts(1)
        };

        let mut attempt = UploadAttempt::new(
            self.client,
            &request.destination,
            &options,
            SourceHandle::new(request.source.clone()),
        );
        if let Some(reporter) = self.progress {
            attempt = attempt.with_progress(reporter);
        }

        let mut controller = RetryController::new(&policy);
        let uploaded = controller.run(&mut attempt).await?;

        info!(
            path = %uploaded.path,
            attempts = controller.attempts(),
            "Upload complete"
        );

        Ok(UploadReport {
            path: uploaded.path,
            attempts: controller.attempts(),
            backoffs: controller.history().to_vec(),
            result: uploaded.result,
        })
    }

    /// Headers and length shared by every attempt
    async fn prepare_options(&self, request: &UploadRequest) -> Result<PutOptions> {
        let content_length = match request.source.file_size().await? {
            Some(actual) => {
                if let Some(given) = request.size.filter(|given| *given != actual) {
                    return Err(ConfigError::SizeMismatch {
                        path: request.source.describe(),
                        given,
                        actual,
                    }
                    .into());
                }
                Some(actual)
            }
            None => request.size,
        };

        let mut options = PutOptions {
            headers: request.headers.clone(),
            copies: request.copies,
            create_parents: request.create_parents,
            content_length,
        };

        if request.compute_md5 {
            let digest = hash_source(&request.source).await?;
            debug!("Computed {} for {} bytes", CONTENT_MD5_HEADER, digest.bytes);
            options
                .headers
                .insert(CONTENT_MD5_HEADER.to_string(), digest.md5);
        }

        if !request.has_header("content-type") {
            let guessed = request
                .source
                .path()
                .and_then(|path| mime_guess::from_path(path).first());
            if let Some(mime) = guessed {
                options
                    .headers
                    .insert("content-type".to_string(), mime.essence_str().to_string());
            }
        }

        Ok(options)
    }
}
