//! Upload scenarios against an in-process store

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stor_client::{
    ByteStream, ClientError, ErrorKind, ExistenceProbe, PutOptions, PutResult, StoreClient,
};
use stor_put::{
    ConfigError, FailureClass, ProgressReporter, ProgressSink, RetryPolicy, Source, UploadError,
    UploadRequest, Uploader,
};
use tempfile::NamedTempFile;

// ==================== Fake Store ====================

struct RecordedPut {
    path: String,
    body: Vec<u8>,
    options: PutOptions,
}

/// Fails probes as scripted, then answers them all the same way, and
/// replays scripted put results
struct FakeStore {
    probe: ExistenceProbe,
    probe_failures: Mutex<VecDeque<ClientError>>,
    results: Mutex<VecDeque<Result<PutResult, ClientError>>>,
    drain_bodies: bool,
    puts: Mutex<Vec<RecordedPut>>,
    probes: AtomicU32,
    closes: AtomicU32,
}

impl FakeStore {
    fn new(probe: ExistenceProbe, results: Vec<Result<PutResult, ClientError>>) -> Self {
        Self {
            probe,
            probe_failures: Mutex::new(VecDeque::new()),
            results: Mutex::new(results.into()),
            drain_bodies: true,
            puts: Mutex::new(Vec::new()),
            probes: AtomicU32::new(0),
            closes: AtomicU32::new(0),
        }
    }

    /// Fail the next probes with these errors, in order
    fn with_probe_failures(self, failures: Vec<ClientError>) -> Self {
        *self.probe_failures.lock().unwrap() = failures.into();
        self
    }

    /// Leave bodies unread, for sources that must not be consumed
    fn without_draining(mut self) -> Self {
        self.drain_bodies = false;
        self
    }

    fn probes(&self) -> u32 {
        self.probes.load(Ordering::SeqCst)
    }

    fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }

    fn put_paths(&self) -> Vec<String> {
        self.puts.lock().unwrap().iter().map(|p| p.path.clone()).collect()
    }
}

#[async_trait]
impl StoreClient for FakeStore {
    async fn probe(&self, _path: &str) -> stor_client::Result<ExistenceProbe> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        match self.probe_failures.lock().unwrap().pop_front() {
            Some(e) => Err(e),
            None => Ok(self.probe.clone()),
        }
    }

    async fn put(
        &self,
        path: &str,
        body: ByteStream,
        options: &PutOptions,
    ) -> stor_client::Result<PutResult> {
        let body = if self.drain_bodies {
            let chunks: Vec<Bytes> = body
                .try_collect()
                .await
                .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
            chunks.concat()
        } else {
            Vec::new()
        };

        self.puts.lock().unwrap().push(RecordedPut {
            path: path.to_string(),
            body,
            options: options.clone(),
        });

        self.results
            .lock()
            .unwrap()
            .pop_front()
            .expect("more puts than scripted")
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

fn transient() -> ClientError {
    ClientError::from_store_body("", 503, None)
}

fn precondition() -> ClientError {
    ClientError::from_store_body(
        r#"{"code":"PreconditionFailed","message":"if-match failed"}"#,
        412,
        None,
    )
}

fn stored(etag: &str) -> Result<PutResult, ClientError> {
    Ok(PutResult {
        etag: Some(etag.to_string()),
        ..Default::default()
    })
}

fn file_with(contents: &[u8]) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .prefix("report")
        .suffix(".txt")
        .tempfile()
        .unwrap();
    file.write_all(contents).unwrap();
    file
}

fn file_source(file: &NamedTempFile) -> Source {
    Source::File(file.path().to_path_buf())
}

// ==================== Progress Recorder ====================

#[derive(Debug, Default, Clone, PartialEq)]
struct SinkLog {
    path: String,
    total: Option<u64>,
    bytes: u64,
    ends: u32,
}

#[derive(Default)]
struct Recorder {
    logs: Arc<Mutex<Vec<SinkLog>>>,
}

struct RecordingSink {
    logs: Arc<Mutex<Vec<SinkLog>>>,
    index: usize,
}

impl ProgressReporter for Recorder {
    fn begin(&self, path: &str, total: Option<u64>) -> Box<dyn ProgressSink> {
        let mut logs = self.logs.lock().unwrap();
        logs.push(SinkLog {
            path: path.to_string(),
            total,
            ..Default::default()
        });
        Box::new(RecordingSink {
            logs: self.logs.clone(),
            index: logs.len() - 1,
        })
    }
}

impl ProgressSink for RecordingSink {
    fn advance(&mut self, bytes: u64) {
        self.logs.lock().unwrap()[self.index].bytes += bytes;
    }

    fn end(&mut self) {
        self.logs.lock().unwrap()[self.index].ends += 1;
    }
}

// ==================== Scenarios ====================

#[tokio::test(start_paused = true)]
async fn test_directory_destination_gets_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("report.txt");
    std::fs::write(&local, [b'x'; 500]).unwrap();
    let store = FakeStore::new(ExistenceProbe::ExistingDirectory, vec![stored("e1")]);

    let request = UploadRequest::new("/user/stor/dir", Source::File(local)).with_copies(2);
    let report = Uploader::new(&store, RetryPolicy::default())
        .upload(request)
        .await
        .unwrap();

    let expected = "/user/stor/dir/report.txt";
    assert_eq!(report.path, expected);
    assert_eq!(report.attempts, 1);
    assert!(report.backoffs.is_empty());
    assert_eq!(report.result.etag.as_deref(), Some("e1"));

    let puts = store.puts.lock().unwrap();
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0].path, expected);
    assert_eq!(puts[0].body.len(), 500);
    assert_eq!(puts[0].options.copies, 2);
    assert_eq!(puts[0].options.content_length, Some(500));
    assert!(!puts[0].options.headers.contains_key("content-md5"));
    assert_eq!(puts[0].options.headers["content-type"], "text/plain");
    assert_eq!(store.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_precondition_failure_is_not_retried() {
    let file = file_with(b"payload");
    let store = FakeStore::new(ExistenceProbe::NotFound, vec![Err(precondition())]);

    let err = Uploader::new(&store, RetryPolicy::default())
        .upload(UploadRequest::new("/user/stor/a.txt", file_source(&file)).with_md5(true))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        UploadError::Rejected {
            kind: ErrorKind::PreconditionFailed,
            ..
        }
    ));
    assert_eq!(err.class(), FailureClass::Fatal);
    assert_eq!(store.put_paths().len(), 1);
    assert_eq!(store.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_then_success() {
    let file = file_with(b"payload");
    let store = FakeStore::new(
        ExistenceProbe::NotFound,
        vec![Err(transient()), Err(transient()), stored("e3")],
    );

    let started = tokio::time::Instant::now();
    let report = Uploader::new(&store, RetryPolicy::default())
        .upload(UploadRequest::new("/user/stor/a.txt", file_source(&file)))
        .await
        .unwrap();

    assert_eq!(report.attempts, 3);
    let delays: Vec<_> = report.backoffs.iter().map(|b| b.delay).collect();
    assert_eq!(
        delays,
        vec![Duration::from_millis(1000), Duration::from_millis(2000)]
    );
    assert!(started.elapsed() >= Duration::from_millis(3000));

    // Every attempt sends the whole file again
    let puts = store.puts.lock().unwrap();
    assert_eq!(puts.len(), 3);
    assert!(puts.iter().all(|p| p.body == b"payload"));
    drop(puts);

    // The destination is resolved once
    assert_eq!(store.probes(), 1);
    assert_eq!(store.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_after_three_transient_failures() {
    let file = file_with(b"payload");
    let store = FakeStore::new(
        ExistenceProbe::NotFound,
        vec![Err(transient()), Err(transient()), Err(transient())],
    );

    let err = Uploader::new(&store, RetryPolicy::default())
        .upload(UploadRequest::new("/user/stor/a.txt", file_source(&file)))
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Exhausted { attempts: 3, .. }));
    assert_eq!(err.class(), FailureClass::Retryable);
    assert_eq!(store.put_paths().len(), 3);
    assert_eq!(store.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stdin_into_directory_is_config_error() {
    let store = FakeStore::new(ExistenceProbe::ExistingDirectory, vec![]);

    let err = Uploader::new(&store, RetryPolicy::default())
        .upload(UploadRequest::new("/user/stor/dir", Source::Stdin))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        UploadError::Config(ConfigError::DirectoryTargetWithoutName { .. })
    ));
    assert_eq!(err.class(), FailureClass::Configuration);
    assert!(store.put_paths().is_empty());
    assert_eq!(store.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stdin_gets_a_single_attempt() {
    let store =
        FakeStore::new(ExistenceProbe::NotFound, vec![Err(transient())]).without_draining();

    let err = Uploader::new(&store, RetryPolicy::default())
        .upload(UploadRequest::new("/user/stor/piped.log", Source::Stdin))
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Exhausted { attempts: 1, .. }));
    assert_eq!(store.put_paths(), vec!["/user/stor/piped.log".to_string()]);
    assert_eq!(store.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_md5_header_sent() {
    let file = file_with(b"hello world");
    let store = FakeStore::new(ExistenceProbe::NotFound, vec![stored("e1")]);

    Uploader::new(&store, RetryPolicy::default())
        .upload(UploadRequest::new("/user/stor/hello.txt", file_source(&file)).with_md5(true))
        .await
        .unwrap();

    let puts = store.puts.lock().unwrap();
    assert_eq!(
        puts[0].options.headers["content-md5"],
        "XrY7u+Ae7tCTyyK7j1rNww=="
    );
}

#[tokio::test(start_paused = true)]
async fn test_headers_and_content_type_override() {
    let file = file_with(b"{}");
    let store = FakeStore::new(ExistenceProbe::NotFound, vec![stored("e1")]);

    let request = UploadRequest::new("/user/stor/a.txt", file_source(&file))
        .with_header("Content-Type", "application/json")
        .with_role_tags(&["ops"])
        .with_parents(true);
    Uploader::new(&store, RetryPolicy::default())
        .upload(request)
        .await
        .unwrap();

    let puts = store.puts.lock().unwrap();
    assert_eq!(puts[0].options.headers["content-type"], "application/json");
    assert_eq!(puts[0].options.headers["role-tag"], "ops");
    assert!(puts[0].options.create_parents);
}

#[tokio::test(start_paused = true)]
async fn test_config_errors_stop_before_the_store() {
    let file = file_with(b"12345");

    let store = FakeStore::new(ExistenceProbe::NotFound, vec![]);
    let err = Uploader::new(&store, RetryPolicy::default())
        .upload(UploadRequest::new("/user/stor/a.txt", file_source(&file)).with_size(10))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        UploadError::Config(ConfigError::SizeMismatch {
            given: 10,
            actual: 5,
            ..
        })
    ));
    assert_eq!(store.probes(), 0);
    assert_eq!(store.closes(), 1);

    let store = FakeStore::new(ExistenceProbe::NotFound, vec![]);
    let err = Uploader::new(&store, RetryPolicy::default())
        .upload(UploadRequest::new("/user/stor/a.txt", file_source(&file)).with_copies(0))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Config(ConfigError::InvalidCopies)));
    assert_eq!(store.probes(), 0);
    assert_eq!(store.closes(), 1);

    let store = FakeStore::new(ExistenceProbe::NotFound, vec![]);
    let err = Uploader::new(&store, RetryPolicy::default())
        .upload(UploadRequest::new("/user/stor/a.txt", Source::Stdin).with_md5(true))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Config(ConfigError::HashRequiresFile)));
    assert_eq!(store.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_file_is_fatal() {
    let store = FakeStore::new(ExistenceProbe::NotFound, vec![]);

    let err = Uploader::new(&store, RetryPolicy::default())
        .upload(UploadRequest::new(
            "/user/stor/a.txt",
            Source::File("/nonexistent/stor-put/a.txt".into()),
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Source { .. }));
    assert_eq!(err.class(), FailureClass::Fatal);
    assert!(store.put_paths().is_empty());
    assert_eq!(store.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_progress_restarts_each_attempt() {
    let file = file_with(&[7u8; 500]);
    let store = FakeStore::new(ExistenceProbe::NotFound, vec![Err(transient()), stored("e2")]);
    let recorder = Recorder::default();

    Uploader::new(&store, RetryPolicy::default())
        .with_progress(&recorder)
        .upload(UploadRequest::new("/user/stor/a.txt", file_source(&file)))
        .await
        .unwrap();

    let logs = recorder.logs.lock().unwrap();
    assert_eq!(logs.len(), 2);
    for log in logs.iter() {
        assert_eq!(log.path, "/user/stor/a.txt");
        assert_eq!(log.total, Some(500));
        assert_eq!(log.bytes, 500);
        assert_eq!(log.ends, 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_transient_probe_failure_is_retried() {
    let file = file_with(b"payload");
    let store = FakeStore::new(ExistenceProbe::NotFound, vec![stored("e1")])
        .with_probe_failures(vec![transient()]);

    let report = Uploader::new(&store, RetryPolicy::default())
        .upload(UploadRequest::new("/user/stor/a.txt", file_source(&file)))
        .await
        .unwrap();

    assert_eq!(report.attempts, 2);
    assert_eq!(report.backoffs.len(), 1);
    assert_eq!(report.backoffs[0].delay, Duration::from_millis(1000));
    assert_eq!(store.probes(), 2);
    assert_eq!(store.put_paths(), vec!["/user/stor/a.txt".to_string()]);
    assert_eq!(store.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_precondition_on_probe_is_fatal() {
    let file = file_with(b"payload");
    let store =
        FakeStore::new(ExistenceProbe::NotFound, vec![]).with_probe_failures(vec![precondition()]);

    let err = Uploader::new(&store, RetryPolicy::default())
        .upload(UploadRequest::new("/user/stor/a.txt", file_source(&file)))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        UploadError::Rejected {
            kind: ErrorKind::PreconditionFailed,
            ..
        }
    ));
    assert_eq!(err.class(), FailureClass::Fatal);
    assert_eq!(store.probes(), 1);
    assert!(store.put_paths().is_empty());
    assert_eq!(store.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_directory_source_fails_without_retry() {
    let dir = tempfile::tempdir().unwrap();
    let store = FakeStore::new(ExistenceProbe::NotFound, vec![]);

    let err = Uploader::new(&store, RetryPolicy::default())
        .upload(UploadRequest::new(
            "/user/stor/a.txt",
            Source::File(dir.path().to_path_buf()),
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Source { .. }));
    assert_eq!(err.class(), FailureClass::Fatal);
    assert_eq!(store.probes(), 0);
    assert!(store.put_paths().is_empty());
    assert_eq!(store.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unsendable_header_value_is_config_error() {
    let file = file_with(b"payload");
    let store = FakeStore::new(ExistenceProbe::NotFound, vec![]);

    let err = Uploader::new(&store, RetryPolicy::default())
        .upload(
            UploadRequest::new("/user/stor/a.txt", file_source(&file))
                .with_header("x-meta", "a\u{1}b"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Config(ConfigError::InvalidHeader(_))));
    assert_eq!(err.class(), FailureClass::Configuration);
    assert_eq!(store.probes(), 0);
    assert!(store.put_paths().is_empty());
    assert_eq!(store.closes(), 1);
}

// A regular file whose first read fails with EIO
#[cfg(target_os = "linux")]
#[tokio::test(start_paused = true)]
async fn test_read_error_during_put_is_fatal() {
    let store = FakeStore::new(ExistenceProbe::NotFound, vec![stored("e1")]);

    let err = Uploader::new(&store, RetryPolicy::default())
        .upload(UploadRequest::new(
            "/user/stor/a.bin",
            Source::File("/proc/self/mem".into()),
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Source { .. }));
    assert_eq!(err.class(), FailureClass::Fatal);
    assert!(err.to_string().starts_with("cannot read /proc/self/mem"));
    // The store gave up on the body once, and nothing was retried
    assert!(store.put_paths().is_empty());
    assert_eq!(store.probes(), 1);
    assert_eq!(store.closes(), 1);
}
