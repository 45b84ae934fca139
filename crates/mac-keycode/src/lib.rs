//! mac-keycode: virtual keycodes, event flags and the US layout for macOS.
//!
//! - `Key`: the macOS virtual keycodes the input pipeline cares about, with
//!   their exact hardware values.
//! - `CgFlags`: the CoreGraphics event-flag bits.
//! - `Modifier`: modifier keys with conversions to flags and keycodes.
//! - Layout helpers: `Key::to_char` maps a key to the character it produces
//!   on a US ANSI keyboard.

mod key;
pub use key::{Key, Scancode};

mod flags;
pub use flags::CgFlags;

mod modifiers;
pub use modifiers::Modifier;

mod layout;
