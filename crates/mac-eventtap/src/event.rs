//! Platform-neutral view of one tapped event.

use keysynth::TapProxy;
use mac_keycode::{CgFlags, Key, Scancode};

/// The event types the tap subscribes to, plus the two OS notices that a tap
/// has been switched off.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum EventKind {
    /// A key went down (including auto-repeat).
    KeyDown,
    /// A key went up.
    KeyUp,
    /// A modifier key changed the flag state.
    FlagsChanged,
    /// Primary mouse button pressed.
    LeftMouseDown,
    /// Secondary mouse button pressed.
    RightMouseDown,
    /// The OS disabled the tap because a callback ran too long.
    TapDisabledByTimeout,
    /// The OS disabled the tap because of secure input or a user action.
    TapDisabledByUserInput,
    /// Anything else delivered to the callback.
    Other,
}

impl EventKind {
    /// Map a raw `CGEventType` value.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::LeftMouseDown,
            3 => Self::RightMouseDown,
            10 => Self::KeyDown,
            11 => Self::KeyUp,
            12 => Self::FlagsChanged,
            0xFFFF_FFFE => Self::TapDisabledByTimeout,
            0xFFFF_FFFF => Self::TapDisabledByUserInput,
            _ => Self::Other,
        }
    }

    /// The reason carried by an OS disable notice.
    pub fn disable_reason(self) -> Option<DisableReason> {
        match self {
            Self::TapDisabledByTimeout => Some(DisableReason::Timeout),
            Self::TapDisabledByUserInput => Some(DisableReason::UserInput),
            _ => None,
        }
    }

    /// Mouse-button presses.
    pub fn is_mouse(self) -> bool {
        matches!(self, Self::LeftMouseDown | Self::RightMouseDown)
    }
}

/// Why the OS disabled the tap.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DisableReason {
    /// Callback exceeded the OS deadline.
    Timeout,
    /// Secure input or user action.
    UserInput,
}

/// Snapshot of the fields the pipeline reads, plus the edits it may make
/// before the event is passed on.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TapEvent {
    /// Event type.
    pub kind: EventKind,
    /// Virtual keycode (zero for mouse events).
    pub key: Scancode,
    /// Current modifier flags. Edits are written back on pass-through.
    pub flags: CgFlags,
    /// Keyboard auto-repeat.
    pub autorepeat: bool,
    /// `EventSourceUserData` field.
    pub user_data: i64,
    /// Pid of the posting process (zero for hardware).
    pub source_pid: u32,
    /// Pid of the process the event is routed to.
    pub target_pid: i32,
    /// Proxy for re-injecting on the same tap.
    pub proxy: Option<TapProxy>,
    /// Replacement Unicode payload, written back on pass-through.
    pub unicode: Option<Vec<u16>>,
    /// First character the active layout produced for a key event.
    pub typed: Option<char>,
}

impl TapEvent {
    /// A hardware event of `kind` with every other field zeroed.
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            key: 0,
            flags: CgFlags::empty(),
            autorepeat: false,
            user_data: 0,
            source_pid: 0,
            target_pid: 0,
            proxy: None,
            unicode: None,
            typed: None,
        }
    }

    /// A hardware key event.
    pub fn key(kind: EventKind, key: Key, flags: CgFlags) -> Self {
        Self {
            key: key.scancode(),
            flags,
            ..Self::new(kind)
        }
    }

    /// The keycode as a known [`Key`].
    pub fn known_key(&self) -> Option<Key> {
        Key::from_scancode(self.key)
    }

    /// True when this event was produced by this process.
    pub fn is_self_injected(&self, own_pid: u32) -> bool {
        eventtag::is_self_injected(self.user_data, self.source_pid, own_pid)
    }
}

/// What the tap does with an event after the handler has seen it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Verdict {
    /// Deliver the (possibly edited) event.
    Pass,
    /// Drop the event; the OS never delivers it.
    Swallow,
}

/// Receives every tapped event on the callback thread.
pub trait EventHandler: Send + Sync {
    /// Decide an event's fate. Runs under the OS callback deadline.
    fn handle(&self, event: &mut TapEvent) -> Verdict;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_types_map() {
        assert_eq!(EventKind::from_raw(10), EventKind::KeyDown);
        assert_eq!(EventKind::from_raw(12), EventKind::FlagsChanged);
        assert_eq!(
            EventKind::from_raw(0xFFFF_FFFE).disable_reason(),
            Some(DisableReason::Timeout)
        );
        assert_eq!(EventKind::from_raw(22), EventKind::Other);
        assert!(EventKind::from_raw(3).is_mouse());
    }

    #[test]
    fn tagged_event_is_self_injected() {
        let mut ev = TapEvent::key(EventKind::KeyDown, Key::A, CgFlags::empty());
        assert!(!ev.is_self_injected(99));
        ev.user_data = eventtag::VNKEY_TAG;
        assert!(ev.is_self_injected(99));
    }
}
