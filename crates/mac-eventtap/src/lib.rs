//! Lifecycle of a macOS keyboard event tap.
//!
//! The tap is owned by a [`TapManager`], which creates it (system-wide
//! first, then session), re-enables it when the OS switches it off, probes
//! its health on a key-down cadence, and flips into a fail-open state when
//! the Accessibility permission disappears. Work that must not run on the
//! callback thread is queued for a [`Supervisor`].
//!
//! Native calls sit behind [`TapBackend`]. On macOS [`MacBackend`] drives
//! CoreGraphics; tests use [`MockBackend`].
#![warn(missing_docs)]
#![warn(unsafe_op_in_unsafe_fn)]

mod error;
mod event;
mod lifecycle;
mod policy;
mod supervisor;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
#[cfg(target_os = "macos")]
mod sys;

pub use error::{Error, Result};
pub use event::{DisableReason, EventHandler, EventKind, TapEvent, Verdict};
pub use lifecycle::{
    Command, TapBackend, TapControl, TapLocation, TapManager, TapObserver, TapStatus,
};
#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockBackend;
pub use policy::{
    DEFAULT_RAMP_THRESHOLD, FAST_INTERVAL, HealthCounters, HealthStep, SLOW_INTERVAL,
};
pub use supervisor::Supervisor;
#[cfg(target_os = "macos")]
pub use sys::MacBackend;
