//! Error types and result alias for the mac-eventtap crate.
use std::result::Result as StdResult;

use thiserror::Error;

/// Convenient result type used throughout this crate.
pub type Result<T> = StdResult<T, Error>;

/// Error variants produced by this crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Event tap could not be created at any location.
    #[error("Event tap failed to start")]
    EventTapStart,
    /// The tap's run loop source could not be created.
    #[error("Failed to create run loop source")]
    RunLoopSource,
    /// Missing or denied system permission.
    #[error("Permission denied: {0}")]
    PermissionDenied(&'static str),
}
