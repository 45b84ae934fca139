//! vnkey engine
//!
//! Input-interception core of a Vietnamese input method. Every keyboard,
//! modifier and mouse event seen by the tap flows through [`Pipeline`]:
//! - fail-open gates (permission lost, tap disabled, self-injected events)
//! - modifier tracking: hotkeys, pause key, restore-on-tap
//! - runtime context of the target app (launchers, terminals, browsers)
//! - the typing engine, whose signal is planned into backspaces and text
//! - synthesized output paced for the target
//!
//! The Vietnamese transformation itself, accessibility queries and storage
//! are collaborators behind [`TypingEngine`], [`Accessibility`] and
//! [`Persistence`].
#![warn(missing_docs)]

pub mod apps;
pub mod cli;
mod config;
pub mod context;
mod deps;
mod error;
pub mod layout;
pub mod modifier;
mod notification;
pub mod output;
mod pipeline;
pub mod planner;
mod signal;
pub mod smart_switch;
pub mod sync_key;
pub mod text_replacement;
pub mod uppercase;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use config::{EmojiHotkey, Hotkey, Settings, SettingsHandle};
pub use deps::{Accessibility, FilePersistence, NoAccessibility, Persistence, TypingEngine};
pub use error::{Error, Result};
pub use notification::{Notice, Notifier};
pub use pipeline::Pipeline;
pub use signal::{
    CAPS_MASK, CHAR_CODE_MASK, CapsStatus, CodeTable, EngineInput, EngineSignal, ExtCode,
    InputKind, Language, MAX_BUFF, PURE_CHARACTER_MASK, SignalCode,
};
pub use smart_switch::SmartSwitchStore;
