use std::io::ErrorKind;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::drain::{
    DiagnosticSink, DrainStats, LineFilter, TracingSink, spawn_diagnostic_drain,
    spawn_result_drain,
};
use crate::error::{Channel, EngineError, EngineStatus};
use crate::process::{EngineCommand, EngineProcess};

pub const DEFAULT_PREDICTION_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_EXIT_GRACE: Duration = Duration::from_secs(5);

/// Tuning knobs for a bridge session.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// How long `predict` waits for the engine's answer.
    pub prediction_timeout: Duration,
    /// Bound of the handoff queue between the result drain and `predict`.
    pub queue_capacity: usize,
    /// How long to wait for the engine to exit after stdin is closed, or
    /// after its stdout closed mid-session.
    pub exit_grace: Duration,
    pub filter: LineFilter,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            prediction_timeout: DEFAULT_PREDICTION_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            exit_grace: DEFAULT_EXIT_GRACE,
            filter: LineFilter::default(),
        }
    }
}

/// Synchronous-looking request/response façade over the engine.
///
/// One line in, one line out. Correlation is purely positional: the Nth
/// result dequeued answers the Nth record written, which holds as long as
/// the engine answers in input order. `predict` takes `&mut self`, so a
/// second request can never be in flight.
pub struct PredictionBridge {
    process: EngineProcess,
    stdin: Option<ChildStdin>,
    results: mpsc::Receiver<String>,
    result_drain: JoinHandle<DrainStats>,
    diagnostic_drain: JoinHandle<DrainStats>,
    settings: BridgeSettings,
    defunct: bool,
    predictions: u64,
}

impl PredictionBridge {
    /// Start the engine with engine stderr going to the tracing log.
    pub fn start(command: &EngineCommand, settings: BridgeSettings) -> Result<Self, EngineError> {
        Self::start_with_sink(command, settings, TracingSink)
    }

    /// Start the engine and both drains. The drains are running before this
    /// returns, so nothing the engine prints at startup is missed.
    pub fn start_with_sink<S: DiagnosticSink>(
        command: &EngineCommand,
        settings: BridgeSettings,
        sink: S,
    ) -> Result<Self, EngineError> {
        let (process, channels) = EngineProcess::start(command)?;

        let (tx, rx) = mpsc::channel::<String>(settings.queue_capacity.max(1));
        let result_drain = spawn_result_drain(channels.stdout, settings.filter.clone(), tx);
        let diagnostic_drain = spawn_diagnostic_drain(channels.stderr, sink);

        Ok(Self {
            process,
            stdin: Some(channels.stdin),
            results: rx,
            result_drain,
            diagnostic_drain,
            settings,
            defunct: false,
            predictions: 0,
        })
    }

    /// Write protocol preamble lines (the header) without waiting for any
    /// answer.
    pub async fn send_preamble<I, S>(&mut self, lines: I) -> Result<(), EngineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ensure_usable()?;
        for line in lines {
            if let Err(err) = self.write_line(line.as_ref()).await {
                return Err(self.fail(err).await);
            }
        }
        if let Err(err) = self.flush().await {
            return Err(self.fail(err).await);
        }
        Ok(())
    }

    /// Send one record and wait for its annotated counterpart.
    pub async fn predict(&mut self, line: &str) -> Result<String, EngineError> {
        self.ensure_usable()?;

        let written = match self.write_line(line).await {
            Ok(()) => self.flush().await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            return Err(self.fail(err).await);
        }

        let timeout = self.settings.prediction_timeout;
        match tokio::time::timeout(timeout, self.results.recv()).await {
            Ok(Some(result)) => {
                self.predictions += 1;
                info!("{result}");
                Ok(result)
            }
            Ok(None) => {
                let status = self.process.wait(self.settings.exit_grace).await;
                let err = EngineError::StreamClosed {
                    channel: Channel::Stdout,
                    status,
                };
                Err(self.fail(err).await)
            }
            Err(_) => {
                let status = self.process.status();
                let err = EngineError::PredictionTimeout {
                    waited: timeout,
                    status,
                };
                Err(self.fail(err).await)
            }
        }
    }

    /// Results queued by the drain and not yet consumed.
    pub fn pending(&self) -> usize {
        self.results.len()
    }

    /// Number of successful predictions so far.
    pub fn predictions(&self) -> u64 {
        self.predictions
    }

    pub fn is_defunct(&self) -> bool {
        self.defunct
    }

    pub fn status(&mut self) -> EngineStatus {
        self.process.status()
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    /// Close stdin, let the engine finish, and join the drains.
    pub async fn shutdown(mut self) -> EngineStatus {
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(err) = stdin.shutdown().await {
                debug!("closing engine stdin: {err}");
            }
        }

        // results nobody asked for would otherwise keep the drain blocked
        self.results.close();

        let mut status = self.process.wait(self.settings.exit_grace).await;
        if status.is_alive() {
            warn!(
                "engine did not exit within {:?} after stdin was closed; killing it",
                self.settings.exit_grace
            );
            status = self.process.kill().await;
        }

        match (&mut self.result_drain).await {
            Ok(stats) => debug!(
                forwarded = stats.forwarded,
                skipped = stats.skipped,
                "result drain finished"
            ),
            Err(err) => warn!("result drain task failed: {err}"),
        }
        if let Err(err) = (&mut self.diagnostic_drain).await {
            warn!("diagnostic drain task failed: {err}");
        }

        info!(predictions = self.predictions, "engine session ended ({status})");
        status
    }

    fn ensure_usable(&self) -> Result<(), EngineError> {
        if self.defunct {
            Err(EngineError::Defunct)
        } else {
            Ok(())
        }
    }

    async fn write_line(&mut self, line: &str) -> Result<(), EngineError> {
        let stdin = self.stdin.as_mut().ok_or(EngineError::Defunct)?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), EngineError> {
        let stdin = self.stdin.as_mut().ok_or(EngineError::Defunct)?;
        stdin.flush().await?;
        Ok(())
    }

    /// Mark the session as failed, turning a broken pipe into `StreamClosed`.
    async fn fail(&mut self, err: EngineError) -> EngineError {
        self.defunct = true;
        let err = match err {
            EngineError::Io(io) if io.kind() == ErrorKind::BrokenPipe => {
                let status = self.process.wait(self.settings.exit_grace).await;
                EngineError::StreamClosed {
                    channel: Channel::Stdin,
                    status,
                }
            }
            other => other,
        };
        error!("{err}");
        err
    }
}
