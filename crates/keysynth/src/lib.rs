//! Posts synthesized keystrokes on behalf of the input pipeline.
//!
//! A `KeySynth` turns the pipeline's edit plans into CoreGraphics keyboard
//! events: runs of backspaces, Unicode strings, raw key codes, the
//! shift+left-arrow selection used by the browser fix, and the "empty
//! character" probe. Every event is stamped with [`eventtag::VNKEY_TAG`] so
//! our own tap lets it through.
//!
//! The OS boundary sits behind the [`Poster`] trait; tests swap in a
//! [`RecordingPoster`] and assert on the exact event sequence.
#![warn(missing_docs)]
#![warn(unsafe_op_in_unsafe_fn)]
use std::{fmt, sync::Arc, thread, time::Duration};

use mac_keycode::{CgFlags, Key, Scancode};
use tracing::{trace, warn};

mod error;
pub use error::{Error, Result};

#[cfg(target_os = "macos")]
mod mac;

/// Narrow no-break space, inserted and then deleted to break an
/// autocomplete suggestion before a correction is typed.
pub const EMPTY_CHARACTER: u16 = 0x202F;

/// Opaque event-tap proxy handle captured from a tap callback.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct TapProxy(pub usize);

/// Where a synthesized event is injected.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum PostTarget {
    /// The HID system tap, seen by every tap including ours.
    #[default]
    Hid,
    /// The login-session tap.
    Session,
    /// Directly after the tap the proxy belongs to.
    Proxy(TapProxy),
}

/// Low-level event posting seam.
pub trait Poster: Send + Sync {
    /// Post a single key-down or key-up with explicit flags.
    fn post_key(&self, target: PostTarget, key: Scancode, down: bool, flags: CgFlags)
    -> Result<()>;

    /// Post a key-down/key-up pair whose payload is the given UTF-16 units.
    fn post_unicode(&self, target: PostTarget, units: &[u16]) -> Result<()>;
}

/// Delays applied around a run of backspaces.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct BackspaceTiming {
    /// Pause between consecutive backspaces.
    pub between: Duration,
    /// Pause after the last backspace, before text follows.
    pub after: Duration,
}

/// Stateless facade over a [`Poster`].
#[derive(Clone)]
pub struct KeySynth {
    poster: Arc<dyn Poster>,
}

#[cfg(target_os = "macos")]
impl Default for KeySynth {
    fn default() -> Self {
        Self::new()
    }
}

impl KeySynth {
    /// Create a synthesizer that posts through CoreGraphics.
    #[cfg(target_os = "macos")]
    pub fn new() -> Self {
        Self {
            poster: Arc::new(mac::MacPoster::default()),
        }
    }

    /// Create a synthesizer over a custom poster.
    pub fn with_poster(poster: Arc<dyn Poster>) -> Self {
        Self { poster }
    }

    /// Tap a key: down then up with the same flags.
    pub fn send_key(&self, target: PostTarget, key: Scancode, flags: CgFlags) -> Result<()> {
        trace!(key, flags = flags.bits(), ?target, "send_key");
        self.poster.post_key(target, key, true, flags)?;
        self.poster.post_key(target, key, false, flags)
    }

    /// One Delete keystroke.
    pub fn send_backspace(&self, target: PostTarget) -> Result<()> {
        self.send_key(target, Key::Delete.scancode(), CgFlags::empty())
    }

    /// `count` Delete keystrokes with the given pacing.
    pub fn send_backspaces(
        &self,
        target: PostTarget,
        count: usize,
        timing: BackspaceTiming,
    ) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        trace!(count, ?timing, "send_backspaces");
        for i in 0..count {
            self.send_backspace(target)?;
            if i + 1 < count && !timing.between.is_zero() {
                thread::sleep(timing.between);
            }
        }
        if !timing.after.is_zero() {
            thread::sleep(timing.after);
        }
        Ok(())
    }

    /// Extend the selection one character left: Shift down, Left, Shift up.
    pub fn send_shift_left(&self, target: PostTarget) -> Result<()> {
        let shift = Key::Shift.scancode();
        let left = Key::LeftArrow.scancode();
        let held = CgFlags::SHIFT;
        self.poster.post_key(target, shift, true, held)?;
        self.poster.post_key(target, left, true, held | CgFlags::NUMERIC_PAD)?;
        self.poster.post_key(target, left, false, held | CgFlags::NUMERIC_PAD)?;
        self.poster.post_key(target, shift, false, CgFlags::empty())
    }

    /// Insert [`EMPTY_CHARACTER`].
    pub fn send_empty_character(&self, target: PostTarget) -> Result<()> {
        self.poster.post_unicode(target, &[EMPTY_CHARACTER])
    }

    /// Insert one UTF-16 unit.
    pub fn send_unit(&self, target: PostTarget, unit: u16) -> Result<()> {
        self.poster.post_unicode(target, &[unit])
    }

    /// Insert `units` in chunks of `chunk` with `delay` between chunks.
    /// A chunk size of zero sends everything at once.
    pub fn send_units(
        &self,
        target: PostTarget,
        units: &[u16],
        chunk: usize,
        delay: Duration,
    ) -> Result<()> {
        if units.is_empty() {
            return Ok(());
        }
        let chunk = if chunk == 0 { units.len() } else { chunk };
        let mut parts = units.chunks(chunk).peekable();
        while let Some(part) = parts.next() {
            self.poster.post_unicode(target, part)?;
            if parts.peek().is_some() && !delay.is_zero() {
                thread::sleep(delay);
            }
        }
        Ok(())
    }

    /// Insert a string.
    pub fn send_text(&self, target: PostTarget, text: &str) -> Result<()> {
        let units: Vec<u16> = text.encode_utf16().collect();
        self.send_units(target, &units, 0, Duration::ZERO)
    }
}

impl fmt::Debug for KeySynth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySynth").finish_non_exhaustive()
    }
}

/// Log a failed post and keep going; the caller has already decided the
/// event's fate and a lost synthetic key must not stall the callback.
pub fn log_failure(what: &'static str, res: Result<()>) {
    if let Err(e) = res {
        warn!(error = %e, what, "synthesized_event_failed");
    }
}

/// One recorded call to a [`Poster`].
#[cfg(any(test, feature = "test-utils"))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Posted {
    /// A key event.
    Key {
        /// Injection point.
        target: PostTarget,
        /// Virtual keycode.
        key: Scancode,
        /// Key-down when true.
        down: bool,
        /// Flags on the event.
        flags: CgFlags,
    },
    /// A Unicode payload event.
    Unicode {
        /// Injection point.
        target: PostTarget,
        /// UTF-16 payload.
        units: Vec<u16>,
    },
}

/// Poster that records every call in order.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Default)]
pub struct RecordingPoster {
    /// Recorded calls.
    log: parking_lot::Mutex<Vec<Posted>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl RecordingPoster {
    /// Snapshot of everything posted so far.
    pub fn events(&self) -> Vec<Posted> {
        self.log.lock().clone()
    }

    /// Number of Delete key-downs posted.
    pub fn backspaces(&self) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|p| {
                matches!(p, Posted::Key { key, down: true, .. } if *key == Key::Delete.scancode())
            })
            .count()
    }

    /// All Unicode payloads concatenated.
    pub fn text(&self) -> String {
        let units: Vec<u16> = self
            .log
            .lock()
            .iter()
            .filter_map(|p| match p {
                Posted::Unicode { units, .. } => Some(units.clone()),
                Posted::Key { .. } => None,
            })
            .flatten()
            .collect();
        String::from_utf16_lossy(&units)
    }

    /// Key-downs of the given key.
    pub fn key_downs(&self, key: Key) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|p| matches!(p, Posted::Key { key: k, down: true, .. } if *k == key.scancode()))
            .count()
    }

    /// Forget everything recorded.
    pub fn clear(&self) {
        self.log.lock().clear();
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Poster for RecordingPoster {
    fn post_key(
        &self,
        target: PostTarget,
        key: Scancode,
        down: bool,
        flags: CgFlags,
    ) -> Result<()> {
        self.log.lock().push(Posted::Key {
            target,
            key,
            down,
            flags,
        });
        Ok(())
    }

    fn post_unicode(&self, target: PostTarget, units: &[u16]) -> Result<()> {
        self.log.lock().push(Posted::Unicode {
            target,
            units: units.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn synth() -> (Arc<RecordingPoster>, KeySynth) {
        let poster = Arc::new(RecordingPoster::default());
        (poster.clone(), KeySynth::with_poster(poster))
    }

    #[test]
    fn send_key_is_down_then_up() {
        let (poster, ks) = synth();
        ks.send_key(PostTarget::Session, Key::A.scancode(), CgFlags::SHIFT)
            .unwrap();
        let ev = poster.events();
        assert_eq!(ev.len(), 2);
        assert!(matches!(ev[0], Posted::Key { down: true, target: PostTarget::Session, .. }));
        assert!(matches!(ev[1], Posted::Key { down: false, flags, .. } if flags == CgFlags::SHIFT));
    }

    #[test]
    fn shift_left_wraps_arrow_in_shift() {
        let (poster, ks) = synth();
        ks.send_shift_left(PostTarget::Hid).unwrap();
        let keys: Vec<(Scancode, bool)> = poster
            .events()
            .into_iter()
            .filter_map(|p| match p {
                Posted::Key { key, down, .. } => Some((key, down)),
                Posted::Unicode { .. } => None,
            })
            .collect();
        assert_eq!(
            keys,
            vec![
                (Key::Shift.scancode(), true),
                (Key::LeftArrow.scancode(), true),
                (Key::LeftArrow.scancode(), false),
                (Key::Shift.scancode(), false),
            ]
        );
    }

    #[test]
    fn empty_character_is_narrow_nbsp() {
        let (poster, ks) = synth();
        ks.send_empty_character(PostTarget::Hid).unwrap();
        assert_eq!(poster.text(), "\u{202F}");
    }

    #[test]
    fn chunked_units_preserve_text() {
        let (poster, ks) = synth();
        let units: Vec<u16> = "việt".encode_utf16().collect();
        ks.send_units(PostTarget::Hid, &units, 1, Duration::ZERO)
            .unwrap();
        assert_eq!(poster.events().len(), units.len());
        assert_eq!(poster.text(), "việt");
    }

    #[test]
    fn zero_backspaces_posts_nothing() {
        let (poster, ks) = synth();
        ks.send_backspaces(PostTarget::Hid, 0, BackspaceTiming::default())
            .unwrap();
        assert!(poster.events().is_empty());
    }

    proptest! {
        #[test]
        fn backspace_runs_post_exact_count(n in 0usize..40) {
            let (poster, ks) = synth();
            ks.send_backspaces(PostTarget::Hid, n, BackspaceTiming::default()).unwrap();
            prop_assert_eq!(poster.backspaces(), n);
            prop_assert_eq!(poster.events().len(), n * 2);
        }
    }
}
