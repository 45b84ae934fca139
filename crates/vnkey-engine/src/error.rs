use std::{io, result::Result as StdResult};

use thiserror::Error;

/// Convenient result type for the engine crate.
pub type Result<T> = StdResult<T, Error>;

/// Unified error type for the vnkey engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Errors originating from the event tap layer.
    #[error("Event tap error: {0}")]
    Tap(#[from] mac_eventtap::Error),

    /// A synthesized event could not be posted.
    #[error("Key injection error: {0}")]
    Inject(#[from] keysynth::Error),

    /// I/O failure while reading or writing persisted state.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Settings could not be parsed or serialized.
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    /// The notification channel has been closed by the receiver.
    #[error("Notification channel closed")]
    ChannelClosed,

    /// Generic error with context.
    #[error("Engine error: {0}")]
    Msg(String),
}
