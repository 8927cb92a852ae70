//! Error type surfaced by the player's public entry points.

use thiserror::Error;

/// Errors returned by [`crate::player::AudioPlayer`] operations.
///
/// Commands routed through the queue are fire-and-forget: once enqueued, their
/// failures are logged by the worker and never reach the caller. Only
/// synchronous checks (argument validation, queue backpressure, the direct PCM
/// path) produce these values.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// Null/empty/oversized argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The player (channel, engine or a buffer) is not available.
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// Media file access failed.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// The decode/output engine reported an error.
    #[error("engine failure: {0}")]
    Engine(String),

    /// The output device rejected samples.
    #[error("output device failure: {0}")]
    Output(String),

    /// The command queue stayed full for the allowed wait.
    #[error("command queue full")]
    QueueFull,
}

pub type Result<T, E = PlayerError> = std::result::Result<T, E>;

impl PlayerError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub(crate) fn unavailable(msg: impl Into<String>) -> Self {
        Self::ResourceUnavailable(msg.into())
    }
}
