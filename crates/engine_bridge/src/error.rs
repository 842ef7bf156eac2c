use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use strum_macros::{AsRefStr, Display};
use thiserror::Error;

/// One of the three stdio channels of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Channel {
    Stdin,
    Stdout,
    Stderr,
}

/// Liveness snapshot of the engine process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Running,
    /// `None` when the process was terminated by a signal.
    Exited(Option<i32>),
}

impl EngineStatus {
    pub fn is_alive(&self) -> bool {
        matches!(self, EngineStatus::Running)
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            EngineStatus::Exited(code) => *code,
            EngineStatus::Running => None,
        }
    }
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineStatus::Running => f.write_str("<still running!>"),
            EngineStatus::Exited(Some(code)) => write!(f, "exit code = {code}"),
            EngineStatus::Exited(None) => f.write_str("terminated by signal"),
        }
    }
}

/// Errors raised while driving the engine. None of them are recoverable:
/// once a bridge has returned one, the session is over.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine process could not be spawned.
    #[error("failed to launch engine `{}`: {source}", .program.display())]
    Launch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No result arrived within the prediction timeout.
    #[error(
        "timeout after waiting {} for next prediction from engine process ({status})",
        format_wait(.waited)
    )]
    PredictionTimeout {
        waited: Duration,
        status: EngineStatus,
    },

    /// A channel reached end-of-stream (or a broken pipe) mid-session.
    #[error("engine {channel} closed unexpectedly ({status})")]
    StreamClosed {
        channel: Channel,
        status: EngineStatus,
    },

    /// A previous call already failed; start a new bridge.
    #[error("engine session already failed and cannot be resumed")]
    Defunct,

    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Engine status captured when the error was raised, if any.
    pub fn status(&self) -> Option<EngineStatus> {
        match self {
            EngineError::PredictionTimeout { status, .. }
            | EngineError::StreamClosed { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn format_wait(waited: &Duration) -> String {
    let secs = waited.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        format!("{} min", secs / 60)
    } else {
        format!("{} ms", waited.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_names_minutes_and_liveness() {
        let err = EngineError::PredictionTimeout {
            waited: Duration::from_secs(300),
            status: EngineStatus::Running,
        };
        assert_eq!(
            err.to_string(),
            "timeout after waiting 5 min for next prediction from engine process (<still running!>)"
        );
    }

    #[test]
    fn stream_closed_message_names_exit_code() {
        let err = EngineError::StreamClosed {
            channel: Channel::Stdout,
            status: EngineStatus::Exited(Some(3)),
        };
        assert_eq!(err.to_string(), "engine stdout closed unexpectedly (exit code = 3)");
        assert_eq!(err.status().and_then(|s| s.exit_code()), Some(3));
    }
}
