//! A single upload attempt

use crate::{
    progress::{ProgressReporter, ProgressStream},
    resolver::resolve_destination,
    retry::Attempt,
    source::SourceHandle,
    UploadError,
};
use async_trait::async_trait;
use futures::StreamExt;
use stor_client::{ClientError, ErrorKind, PutOptions, PutResult, StoreClient};
use tracing::debug;

/// Result of one attempt, as seen by the retry controller
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    Success(T),
    /// Transient; another attempt may succeed
    Retryable(ClientError),
    /// Stop now
    Fatal(UploadError),
}

impl<T> AttemptOutcome<T> {
    /// Sort a store error into fatal or retryable
    pub fn from_client_error(error: ClientError) -> Self {
        match error.kind() {
            kind @ (ErrorKind::PreconditionFailed
            | ErrorKind::DirectoryConflict
            | ErrorKind::RootDirectory) => Self::Fatal(UploadError::Rejected {
                kind,
                source: error,
            }),
            _ => Self::Retryable(error),
        }
    }
}

/// What a successful attempt produced
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Uploaded {
    /// Final object path
    pub path: String,
    pub result: PutResult,
}

/// Probes, opens, wraps and puts. The destination is probed until it has
/// been resolved once; later attempts reuse the resolved path.
pub struct UploadAttempt<'a, C: ?Sized> {
    client: &'a C,
    destination: &'a str,
    options: &'a PutOptions,
    source: SourceHandle,
    progress: Option<&'a dyn ProgressReporter>,
    total_size: Option<u64>,
    resolved: Option<String>,
}

impl<'a, C> UploadAttempt<'a, C>
where
    C: StoreClient + ?Sized,
{
    pub fn new(
        client: &'a C,
        destination: &'a str,
        options: &'a PutOptions,
        source: SourceHandle,
    ) -> Self {
        Self {
            client,
            destination,
            options,
            source,
            progress: None,
            total_size: options.content_length,
            resolved: None,
        }
    }

    /// Report progress of every attempt
    pub fn with_progress(mut self, reporter: &'a dyn ProgressReporter) -> Self {
        self.progress = Some(reporter);
        self
    }

    async fn resolve(&mut self) -> Result<String, AttemptOutcome<Uploaded>> {
        if let Some(path) = &self.resolved {
            return Ok(path.clone());
        }

        let probe = self
            .client
            .probe(self.destination)
            .await
            .map_err(AttemptOutcome::from_client_error)?;
        debug!("Probed {}: {:?}", self.destination, probe);

        let name = self.source.source().file_name();
        let path = resolve_destination(self.destination, &probe, name.as_deref())
            .map_err(|e| AttemptOutcome::Fatal(e.into()))?;
        self.resolved = Some(path.clone());
        Ok(path)
    }
}

#[async_trait]
impl<'a, C> Attempt for UploadAttempt<'a, C>
where
    C: StoreClient + ?Sized,
{
    type Output = Uploaded;

    async fn attempt(&mut self, number: u32) -> AttemptOutcome<Uploaded> {
        let path = match self.resolve().await {
            Ok(path) => path,
            Err(outcome) => return outcome,
        };

        let body = match self.source.open().await {
            Ok(body) => body,
            Err(e) => return AttemptOutcome::Fatal(e),
        };

        let body = match self.progress {
            Some(reporter) => {
                let sink = reporter.begin(&path, self.total_size);
                ProgressStream::new(body, sink, self.total_size).boxed()
            }
            None => body,
        };

        debug!("Attempt {}: putting {}", number, path);
        let outcome = self.client.put(&path, body, self.options).await;

        // The client only saw a broken body; the cause is local
        if let Some(e) = self.source.take_read_error() {
            return AttemptOutcome::Fatal(e);
        }

        match outcome {
            Ok(result) => AttemptOutcome::Success(Uploaded { path, result }),
            Err(e) => AttemptOutcome::from_client_error(e),
        }
    }
}
