//! Background readers for the engine's output channels.
//!
//! Both drains live as long as the engine keeps its end of the pipe open and
//! stop on their own at end-of-stream. The result drain feeds the bounded
//! handoff queue; the diagnostic drain only logs.

use regex::Regex;
use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Banner SnpEff prints on stdout in cancer mode.
pub const PEDIGREE_BANNER: &str = "Reading cancer samples pedigree from VCF header";

/// Decides which engine output lines are results.
#[derive(Debug, Clone)]
pub struct LineFilter {
    skip: Regex,
}

impl LineFilter {
    /// Skip lines starting with `#` or containing any of `banners`.
    pub fn new<S: AsRef<str>>(banners: &[S]) -> Result<Self, regex::Error> {
        let mut pattern = String::from("^#");
        for banner in banners {
            pattern.push('|');
            pattern.push_str(&regex::escape(banner.as_ref()));
        }
        Ok(Self {
            skip: Regex::new(&pattern)?,
        })
    }

    pub fn is_skip_line(&self, line: &str) -> bool {
        self.skip.is_match(line)
    }
}

impl Default for LineFilter {
    fn default() -> Self {
        Self {
            skip: Regex::new(&format!("^#|{}", regex::escape(PEDIGREE_BANNER)))
                .expect("static skip pattern"),
        }
    }
}

/// Receiver of engine diagnostic lines.
pub trait DiagnosticSink: Send + Sync + 'static {
    fn on_line(&self, line: &str);
}

/// Logs every diagnostic line under the `engine` target.
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn on_line(&self, line: &str) {
        info!(target: "engine", "{line}");
    }
}

impl DiagnosticSink for mpsc::UnboundedSender<String> {
    fn on_line(&self, line: &str) {
        // receiver may be gone in tests
        let _ = self.send(line.to_string());
    }
}

/// What a drain saw before its channel closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub forwarded: u64,
    pub skipped: u64,
}

/// Next line without its terminator, or `None` at end-of-stream.
///
/// Bytes that are not valid UTF-8 are replaced rather than failing the
/// read, so a stray byte from the engine never ends a drain.
async fn next_lossy_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

/// Read `reader` line by line, drop skip lines, push the rest onto `queue`.
///
/// The push waits while the queue is full, which in turn stops reading from
/// the engine's stdout until the consumer catches up.
pub fn spawn_result_drain<R>(
    reader: R,
    filter: LineFilter,
    queue: mpsc::Sender<String>,
) -> JoinHandle<DrainStats>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut stats = DrainStats::default();
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            match next_lossy_line(&mut reader, &mut buf).await {
                Ok(Some(line)) => {
                    if filter.is_skip_line(&line) {
                        debug!(target: "engine", "skipping engine line: {line}");
                        stats.skipped += 1;
                        continue;
                    }
                    if queue.send(line).await.is_err() {
                        debug!("handoff queue closed; result drain stopping");
                        break;
                    }
                    stats.forwarded += 1;
                }
                Ok(None) => break,
                Err(err) => {
                    warn!("error reading engine stdout: {err}");
                    break;
                }
            }
        }
        debug!(
            forwarded = stats.forwarded,
            skipped = stats.skipped,
            "engine stdout reached end of stream"
        );
        stats
    })
}

/// Forward every line of `reader` to `sink` until end-of-stream.
pub fn spawn_diagnostic_drain<R, S>(reader: R, sink: S) -> JoinHandle<DrainStats>
where
    R: AsyncRead + Unpin + Send + 'static,
    S: DiagnosticSink,
{
    tokio::spawn(async move {
        let mut stats = DrainStats::default();
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            match next_lossy_line(&mut reader, &mut buf).await {
                Ok(Some(line)) => {
                    sink.on_line(&line);
                    stats.forwarded += 1;
                }
                Ok(None) => break,
                Err(err) => {
                    warn!("error reading engine stderr: {err}");
                    break;
                }
            }
        }
        debug!(lines = stats.forwarded, "engine stderr reached end of stream");
        stats
    })
}
