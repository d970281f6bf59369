use thiserror::Error;

/// Errors surfaced by the synchronization engine.
///
/// Transport and protocol failures are absorbed internally and turned into
/// notifications; permission and state errors are returned to the caller of
/// the API that detected them.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Connect/send failure. Non-fatal, triggers the reconnect policy.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed or unknown inbound message. Logged and dropped.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Edit/invite attempted without the required role. Not retried.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Operation referencing an unknown session or user.
    #[error("invalid state: {0}")]
    State(String),

    /// Configuration could not be loaded from the environment.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Profile persistence failed.
    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
