//! Upload progress reporting
//!
//! [`ProgressStream`] sits between the source and the store client and
//! tells a [`ProgressSink`] how many bytes went by. It never changes,
//! delays or drops a chunk.

use bytes::Bytes;
use futures::{ready, Stream};
use pin_project_lite::pin_project;
use serde::{Deserialize, Serialize};
use std::io::{self, IsTerminal, Write};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// Receives progress for one attempt
pub trait ProgressSink: Send {
    /// `bytes` more bytes were read from the source
    fn advance(&mut self, bytes: u64);

    /// The attempt's stream is finished. Called exactly once.
    fn end(&mut self);
}

/// Creates a fresh [`ProgressSink`] per attempt
pub trait ProgressReporter: Send + Sync {
    fn begin(&self, path: &str, total: Option<u64>) -> Box<dyn ProgressSink>;
}

/// When to draw progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressMode {
    /// Draw only when stderr is a terminal
    #[default]
    Auto,
    /// Always draw
    Always,
    /// Never draw
    Never,
}

impl ProgressMode {
    pub fn should_draw(self, is_terminal: bool) -> bool {
        match self {
            Self::Auto => is_terminal,
            Self::Always => true,
            Self::Never => false,
        }
    }

    /// Decide against the real stderr
    pub fn should_draw_on_stderr(self) -> bool {
        self.should_draw(io::stderr().is_terminal())
    }
}

/// Bytes moved so far in the current attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressState {
    pub bytes_transferred: u64,
    pub total_size: Option<u64>,
}

pin_project! {
    /// Wraps a byte stream and reports each chunk to a sink
    pub struct ProgressStream<S> {
        #[pin]
        inner: S,
        sink: Box<dyn ProgressSink>,
        state: ProgressState,
        ended: bool,
    }

    impl<S> PinnedDrop for ProgressStream<S> {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            if !*this.ended {
                *this.ended = true;
                this.sink.end();
            }
        }
    }
}

impl<S> ProgressStream<S> {
    pub fn new(inner: S, sink: Box<dyn ProgressSink>, total_size: Option<u64>) -> Self {
        Self {
            inner,
            sink,
            state: ProgressState {
                bytes_transferred: 0,
                total_size,
            },
            ended: false,
        }
    }

    pub fn state(&self) -> ProgressState {
        self.state
    }
}

impl<S> Stream for ProgressStream<S>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        match ready!(this.inner.poll_next(cx)) {
            Some(Ok(chunk)) => {
                let n = chunk.len() as u64;
                this.state.bytes_transferred += n;
                this.sink.advance(n);
                Poll::Ready(Some(Ok(chunk)))
            }
            Some(Err(e)) => Poll::Ready(Some(Err(e))),
            None => {
                if !*this.ended {
                    *this.ended = true;
                    this.sink.end();
                }
                Poll::Ready(None)
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

// ==================== Terminal Rendering ====================

const BAR_WIDTH: usize = 30;
const REDRAW_INTERVAL: Duration = Duration::from_millis(100);

/// Draws a single-line progress bar on stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalProgress;

impl TerminalProgress {
    pub fn new() -> Self {
        Self
    }
}

impl ProgressReporter for TerminalProgress {
    fn begin(&self, path: &str, total: Option<u64>) -> Box<dyn ProgressSink> {
        Box::new(TerminalBar {
            label: crate::resolver::basename(path).to_string(),
            total,
            transferred: 0,
            last_draw: None,
        })
    }
}

struct TerminalBar {
    label: String,
    total: Option<u64>,
    transferred: u64,
    last_draw: Option<Instant>,
}

impl TerminalBar {
    fn draw(&mut self) {
        let line = render_line(&self.label, self.transferred, self.total);
        let mut stderr = io::stderr().lock();
        // Drawing is best effort
        let _ = write!(stderr, "\r{}", line);
        let _ = stderr.flush();
        self.last_draw = Some(Instant::now());
    }
}

impl ProgressSink for TerminalBar {
    fn advance(&mut self, bytes: u64) {
        self.transferred += bytes;
        let due = self
            .last_draw
            .map_or(true, |at| at.elapsed() >= REDRAW_INTERVAL);
        if due {
            self.draw();
        }
    }

    fn end(&mut self) {
        self.draw();
        let _ = writeln!(io::stderr());
    }
}

/// One line of progress output, without the leading carriage return
pub fn render_line(label: &str, transferred: u64, total: Option<u64>) -> String {
    match total {
        Some(total) => {
            let fraction = if total == 0 {
                1.0
            } else {
                (transferred as f64 / total as f64).min(1.0)
            };
            let filled = (fraction * BAR_WIDTH as f64).round() as usize;
            format!(
                "{} [{}{}] {:>3}% {}/{}",
                label,
                "=".repeat(filled),
                " ".repeat(BAR_WIDTH - filled),
                (fraction * 100.0).floor() as u64,
                human_bytes(transferred),
                human_bytes(total)
            )
        }
        None => format!("{} {}", label, human_bytes(transferred)),
    }
}

/// Format a byte count with binary units
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
