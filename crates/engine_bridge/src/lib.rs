pub mod bridge;
pub mod drain;
pub mod error;
pub mod process;

pub use bridge::{BridgeSettings, PredictionBridge};
pub use drain::{DiagnosticSink, LineFilter, TracingSink};
pub use error::{Channel, EngineError, EngineStatus};
pub use process::{EngineCommand, EngineProcess};
