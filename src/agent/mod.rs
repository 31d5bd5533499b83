use uuid::Uuid;

pub mod engine;
pub mod gate;
pub mod tools;

/// Failures that escape to the transport boundary. Everything recoverable
/// inside the model/tool loop (policy violations, rejected names, bad SQL,
/// the loop cap) is converted into model-visible text instead.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("unknown thread: {0}")]
    SessionNotFound(Uuid),
    #[error("turn timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
