use crate::gateway::GatewayError;

/// Errors surfaced by engine operations.
///
/// Polls never return these to a caller; they are logged and the next tick
/// retries. User actions return them so a UI can report the failure.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    /// The player sent data the engine cannot interpret (e.g. a zero sample rate)
    #[error("player data contract violation: {0}")]
    DataContract(String),
    #[error("no sink at position {0}")]
    NoSuchSink(usize),
}

pub type SyncResult<T> = Result<T, SyncError>;
