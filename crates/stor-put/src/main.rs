//! stor-put - upload a file or standard input to an object store

use anyhow::anyhow;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use stor_client::{Config, HttpStoreClient};
use stor_put::{
    parse_header, ProgressMode, RetryPolicy, Source, TerminalProgress, UploadConfig,
    UploadRequest, Uploader,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "stor-put")]
#[command(about = "Upload a file or standard input to an object store")]
#[command(version)]
struct Args {
    /// Destination object or directory path
    path: String,

    /// File to upload (standard input when omitted)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Number of copies the store should keep
    #[arg(short, long, default_value_t = 2)]
    copies: u32,

    /// Extra request header, as "Name: value" (repeatable)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Send the content MD5 so the store can verify it
    #[arg(long)]
    md5: bool,

    /// Create missing parent directories
    #[arg(short, long)]
    parents: bool,

    /// Print nothing on success
    #[arg(short, long, conflicts_with = "progress")]
    quiet: bool,

    /// Draw a progress bar even when stderr is not a terminal
    #[arg(long)]
    progress: bool,

    /// Role tag to attach to the object (repeatable)
    #[arg(long = "role-tag")]
    role_tags: Vec<String>,

    /// Content length, when it cannot be read from the file
    #[arg(short, long)]
    size: Option<u64>,

    /// Object store URL
    #[arg(long, default_value = "http://localhost:8080", env = "STOR_URL")]
    url: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 60, env = "STOR_TIMEOUT_SECS")]
    timeout_secs: u64,

    /// Total attempts, including the first
    #[arg(long, default_value_t = 3, env = "STOR_MAX_ATTEMPTS")]
    attempts: u32,

    /// Enable debug logging
    #[arg(short, long, env = "STOR_DEBUG")]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("stor_put={},stor_client={}", log_level, log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let quiet = args.quiet;
    match run(args).await {
        Ok(path) => {
            if !quiet {
                println!("{}", path);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("stor-put: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<String> {
    let progress = if args.quiet {
        ProgressMode::Never
    } else if args.progress {
        ProgressMode::Always
    } else {
        ProgressMode::Auto
    };
    let config = UploadConfig::default()
        .with_max_attempts(args.attempts)
        .with_progress(progress);
    let policy = RetryPolicy::try_from(&config)?;

    let source = match args.file {
        Some(path) => Source::File(path),
        None => Source::Stdin,
    };

    let mut request = UploadRequest::new(args.path, source)
        .with_copies(args.copies)
        .with_parents(args.parents)
        .with_md5(args.md5)
        .with_role_tags(&args.role_tags);
    for raw in &args.headers {
        let (name, value) = parse_header(raw)?;
        request = request.with_header(name, value);
    }
    if let Some(size) = args.size {
        request = request.with_size(size);
    }

    let client = HttpStoreClient::new(
        Config::new(args.url).with_timeout(Duration::from_secs(args.timeout_secs)),
    )
    .map_err(|e| anyhow!("cannot create store client: {}", e))?;

    let reporter = TerminalProgress::new();
    let mut uploader = Uploader::new(&client, policy);
    if config.progress.should_draw_on_stderr() {
        uploader = uploader.with_progress(&reporter);
    }

    let report = uploader.upload(request).await?;
    tracing::debug!(
        attempts = report.attempts,
        etag = ?report.result.etag,
        "Stored {}",
        report.path
    );
    Ok(report.path)
}
