//! Errors surfaced by the environment and its simulator engines.

use thiserror::Error;

/// Failures of the environment adapter.
///
/// None of these are recovered locally: every variant propagates to the
/// caller, which is expected to abort the current run.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The engine could not be started, stopped answering, or exited.
    #[error("simulator engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The engine answered, but not with what the call requires.
    #[error("malformed simulator response: {0}")]
    MalformedResponse(String),

    /// The engine reported an error of its own.
    #[error("simulator engine failed: {0}")]
    EngineFailure(String),

    /// The caller passed an action the environment cannot apply.
    #[error("invalid action: {0}")]
    InvalidAction(String),
}

impl EnvError {
    pub(crate) fn unavailable(context: &str, err: std::io::Error) -> Self {
        Self::EngineUnavailable(format!("{context}: {err}"))
    }
}
