//! Engine error taxonomy.
//!
//! No error here is fatal to the process. The worst outcome is an
//! unresponsive session (for example a Failed clip blocking completion)
//! that needs external intervention.

use thiserror::Error;

/// Errors surfaced by the recording engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Request/response transport or response-decode error. Always
    /// recoverable; surfaced to the caller as a rejected operation.
    #[error("communication failure during {operation}: {reason}")]
    Communication {
        operation: &'static str,
        reason: String,
    },

    /// Real-time channel error. Moves connection status to Failed but
    /// never tears down session state.
    #[error("real-time channel failure: {0}")]
    Channel(String),

    /// Capture device or pipeline error. Logged; the affected source is
    /// skipped rather than failing the whole operation.
    #[error("capture pipeline failure: {0}")]
    Pipeline(String),

    /// Terminal per-clip upload error. No automatic retry.
    #[error("upload failed: {0}")]
    Upload(String),

    /// The engine task is gone; commands can no longer be delivered.
    #[error("engine is no longer running")]
    Unavailable,
}

impl EngineError {
    pub fn communication(operation: &'static str, reason: impl ToString) -> Self {
        EngineError::Communication {
            operation,
            reason: reason.to_string(),
        }
    }
}
