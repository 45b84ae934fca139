//! CoreGraphics implementation of [`Poster`].

use core_graphics::{
    event as cge,
    event_source::{CGEventSource, CGEventSourceStateID},
};
use mac_keycode::{CgFlags, Scancode};
use tracing::{trace, warn};

use crate::{Error, PostTarget, Poster, Result};

/// Posts tagged events through CoreGraphics.
#[derive(Default)]
pub(crate) struct MacPoster;

impl MacPoster {
    /// Create an event source, mapping failures to a permission error when
    /// Accessibility has been revoked.
    fn source() -> Result<CGEventSource> {
        CGEventSource::new(CGEventSourceStateID::HIDSystemState).map_err(|_| {
            if permissions::accessibility_ok() {
                Error::EventSource
            } else {
                warn!("accessibility_permission_missing_for_event_source");
                Error::PermissionDenied("Accessibility")
            }
        })
    }

    /// Build a tagged keyboard event.
    fn build(key: Scancode, down: bool) -> Result<cge::CGEvent> {
        let e = cge::CGEvent::new_keyboard_event(Self::source()?, key, down).map_err(|_| {
            if permissions::accessibility_ok() {
                Error::EventCreate
            } else {
                warn!("accessibility_permission_missing_for_event_create");
                Error::PermissionDenied("Accessibility")
            }
        })?;
        e.set_integer_value_field(cge::EventField::EVENT_SOURCE_USER_DATA, eventtag::VNKEY_TAG);
        Ok(e)
    }

    /// Deliver a built event to its target.
    fn deliver(target: PostTarget, e: &cge::CGEvent) {
        match target {
            PostTarget::Hid => e.post(cge::CGEventTapLocation::HID),
            PostTarget::Session => e.post(cge::CGEventTapLocation::Session),
            PostTarget::Proxy(p) => e.post_from_tap(p.0 as cge::CGEventTapProxy),
        }
    }
}

impl Poster for MacPoster {
    fn post_key(
        &self,
        target: PostTarget,
        key: Scancode,
        down: bool,
        flags: CgFlags,
    ) -> Result<()> {
        trace!(key, down, flags = flags.bits(), ?target, "post_key");
        let e = Self::build(key, down)?;
        e.set_flags(cge::CGEventFlags::from_bits_retain(flags.bits()));
        Self::deliver(target, &e);
        Ok(())
    }

    fn post_unicode(&self, target: PostTarget, units: &[u16]) -> Result<()> {
        trace!(len = units.len(), ?target, "post_unicode");
        for down in [true, false] {
            let e = Self::build(0, down)?;
            e.set_flags(cge::CGEventFlags::empty());
            e.set_string_from_utf16_unchecked(units);
            Self::deliver(target, &e);
        }
        Ok(())
    }
}
