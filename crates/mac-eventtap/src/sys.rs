//! CoreGraphics event tap backend.
//!
//! The tap is created through raw `CGEventTapCreate` so the callback can
//! return NULL to swallow an event; wrappers that map "drop" back to the
//! original event reference still let the keystroke through. The tap's run
//! loop source is attached to the main run loop in the common modes, so the
//! host must run the main run loop.

use std::{
    ffi::{c_ulong, c_void},
    mem::ManuallyDrop,
    ptr,
    sync::Arc,
};

use core_foundation::{
    base::TCFType,
    mach_port::{CFMachPort, CFMachPortRef},
    runloop::{CFRunLoop, CFRunLoopSource, kCFRunLoopCommonModes},
};
use core_graphics::event::{
    CGEvent, CGEventFlags, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement,
    CGEventTapProxy,
};
use foreign_types::ForeignType;
use keysynth::TapProxy;
use mac_keycode::CgFlags;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{Error, EventHandler, EventKind, Result, TapBackend, TapEvent, TapLocation, Verdict};

/// `CGEventMask`.
type CGEventMask = u64;

/// Raw tap callback. The event type is taken as its raw value because the
/// two tap-disabled notices are not valid `CGEventType` discriminants.
type RawTapCallback = unsafe extern "C" fn(
    proxy: CGEventTapProxy,
    event_type: u32,
    event: *mut c_void,
    user_info: *mut c_void,
) -> *mut c_void;

#[link(name = "CoreGraphics", kind = "framework")]
unsafe extern "C" {
    fn CGEventTapCreate(
        tap: CGEventTapLocation,
        place: CGEventTapPlacement,
        options: CGEventTapOptions,
        events_of_interest: CGEventMask,
        callback: RawTapCallback,
        user_info: *mut c_void,
    ) -> CFMachPortRef;

    fn CGEventTapEnable(tap: CFMachPortRef, enable: bool);

    fn CGEventTapIsEnabled(tap: CFMachPortRef) -> bool;
}

#[link(name = "CoreGraphics", kind = "framework")]
unsafe extern "C" {
    fn CGEventKeyboardGetUnicodeString(
        event: *mut c_void,
        max_len: c_ulong,
        actual_len: *mut c_ulong,
        buf: *mut u16,
    );
}

#[link(name = "CoreFoundation", kind = "framework")]
unsafe extern "C" {
    fn CFMachPortInvalidate(port: CFMachPortRef);
}

const FIELD_KEYBOARD_EVENT_AUTOREPEAT: u32 = 8;
const FIELD_KEYBOARD_EVENT_KEYCODE: u32 = 9;
const FIELD_EVENT_TARGET_UNIX_PROCESS_ID: u32 = 40;

/// Key down/up, flags changed, and both mouse-down types.
const EVENT_MASK: CGEventMask = (1 << 1) | (1 << 3) | (1 << 10) | (1 << 11) | (1 << 12);

/// State the C callback reads. Lives as long as the backend.
struct CallbackCtx {
    /// Receives every event.
    handler: Arc<dyn EventHandler>,
}

/// A created tap and the run loop source attached for it.
struct LiveTap {
    /// The tap's mach port.
    port: CFMachPort,
    /// Source added to the main run loop.
    source: CFRunLoopSource,
}

/// Real event tap.
pub struct MacBackend {
    /// Leaked callback context, reclaimed in `Drop`.
    ctx: *mut CallbackCtx,
    /// The live tap, if any.
    tap: Mutex<Option<LiveTap>>,
}

// SAFETY: `ctx` is written once at construction and only read afterwards;
// `CallbackCtx` holds a `Send + Sync` handler. The CoreFoundation handles in
// `tap` are only touched under the mutex, and CF objects are thread-safe for
// the retain/release and run loop calls made here.
unsafe impl Send for MacBackend {}
// SAFETY: see above.
unsafe impl Sync for MacBackend {}

impl MacBackend {
    /// Create a backend that routes events to `handler`.
    pub fn new(handler: Arc<dyn EventHandler>) -> Self {
        let ctx = Box::into_raw(Box::new(CallbackCtx { handler }));
        Self {
            ctx,
            tap: Mutex::new(None),
        }
    }
}

impl TapBackend for MacBackend {
    fn create(&self, location: TapLocation) -> Result<()> {
        if !permissions::accessibility_ok() {
            warn!("accessibility_permission_missing");
            return Err(Error::PermissionDenied("Accessibility"));
        }
        let mut slot = self.tap.lock();
        if let Some(old) = slot.take() {
            teardown(old);
        }
        let cg_location = match location {
            TapLocation::Hid => CGEventTapLocation::HID,
            TapLocation::Session => CGEventTapLocation::Session,
        };
        debug!(?location, "creating_event_tap");
        // SAFETY: the callback matches the C signature and `ctx` outlives
        // every tap created from it.
        let port_ref = unsafe {
            CGEventTapCreate(
                cg_location,
                CGEventTapPlacement::HeadInsertEventTap,
                CGEventTapOptions::Default,
                EVENT_MASK,
                tap_callback,
                self.ctx.cast::<c_void>(),
            )
        };
        if port_ref.is_null() {
            return Err(Error::EventTapStart);
        }
        // SAFETY: `CGEventTapCreate` returns a +1 reference.
        let port = unsafe { CFMachPort::wrap_under_create_rule(port_ref) };
        let source = port
            .create_runloop_source(0)
            .map_err(|_| Error::RunLoopSource)?;
        // SAFETY: reading an immutable CF constant.
        CFRunLoop::get_main().add_source(&source, unsafe { kCFRunLoopCommonModes });
        // SAFETY: `port` is a valid tap.
        unsafe { CGEventTapEnable(port.as_concrete_TypeRef(), false) };
        *slot = Some(LiveTap { port, source });
        Ok(())
    }

    fn set_enabled(&self, enabled: bool) {
        if let Some(t) = self.tap.lock().as_ref() {
            // SAFETY: `t.port` is a valid tap while held in the slot.
            unsafe { CGEventTapEnable(t.port.as_concrete_TypeRef(), enabled) };
        }
    }

    fn is_enabled(&self) -> bool {
        self.tap
            .lock()
            .as_ref()
            // SAFETY: `t.port` is a valid tap while held in the slot.
            .is_some_and(|t| unsafe { CGEventTapIsEnabled(t.port.as_concrete_TypeRef()) })
    }

    fn destroy(&self) {
        if let Some(t) = self.tap.lock().take() {
            teardown(t);
            debug!("event_tap_destroyed");
        }
    }
}

impl Drop for MacBackend {
    fn drop(&mut self) {
        self.destroy();
        // SAFETY: produced by `Box::into_raw` in `new`; no tap references it
        // after `destroy`.
        drop(unsafe { Box::from_raw(self.ctx) });
    }
}

/// Disable, detach and invalidate a tap.
fn teardown(t: LiveTap) {
    let port = t.port.as_concrete_TypeRef();
    // SAFETY: `port` is valid until `t` is dropped below.
    unsafe { CGEventTapEnable(port, false) };
    // SAFETY: reading an immutable CF constant.
    CFRunLoop::get_main().remove_source(&t.source, unsafe { kCFRunLoopCommonModes });
    // SAFETY: as above.
    unsafe { CFMachPortInvalidate(port) };
}

/// Read the fields the pipeline needs.
fn read_event(kind: EventKind, event: &CGEvent, proxy: CGEventTapProxy) -> TapEvent {
    let mut ev = TapEvent::new(kind);
    ev.key = event.get_integer_value_field(FIELD_KEYBOARD_EVENT_KEYCODE) as u16;
    ev.flags = CgFlags::from_raw(event.get_flags().bits());
    ev.autorepeat = event.get_integer_value_field(FIELD_KEYBOARD_EVENT_AUTOREPEAT) != 0;
    ev.user_data = event.get_integer_value_field(eventtag::FIELD_EVENT_SOURCE_USER_DATA);
    ev.source_pid =
        event.get_integer_value_field(eventtag::FIELD_EVENT_SOURCE_UNIX_PROCESS_ID) as u32;
    ev.target_pid = event.get_integer_value_field(FIELD_EVENT_TARGET_UNIX_PROCESS_ID) as i32;
    ev.proxy = (!proxy.is_null()).then(|| TapProxy(proxy as usize));
    if matches!(kind, EventKind::KeyDown | EventKind::KeyUp) {
        ev.typed = typed_char(event);
    }
    ev
}

/// The first character of the event's Unicode payload.
fn typed_char(event: &CGEvent) -> Option<char> {
    let mut buf = [0u16; 4];
    let mut len: c_ulong = 0;
    // SAFETY: `buf` holds `buf.len()` units and `len` is a valid out pointer.
    unsafe {
        CGEventKeyboardGetUnicodeString(
            event.as_ptr().cast(),
            buf.len() as c_ulong,
            &mut len,
            buf.as_mut_ptr(),
        );
    }
    let len = (len as usize).min(buf.len());
    char::decode_utf16(buf[..len].iter().copied())
        .next()
        .and_then(|r| r.ok())
}

/// Apply the handler's edits to a passed-through event.
fn write_back(event: &CGEvent, before: CgFlags, ev: &TapEvent) {
    if ev.flags != before {
        event.set_flags(CGEventFlags::from_bits_truncate(ev.flags.bits()));
    }
    if let Some(units) = ev.unicode.as_deref() {
        event.set_string_from_utf16_unchecked(units);
    }
}

/// C entry point for every tapped event.
///
/// Returns the event pointer to pass it on, NULL to swallow it.
unsafe extern "C" fn tap_callback(
    proxy: CGEventTapProxy,
    event_type: u32,
    event_ref: *mut c_void,
    user_info: *mut c_void,
) -> *mut c_void {
    if user_info.is_null() {
        return event_ref;
    }
    // SAFETY: `user_info` is the backend's `ctx`, alive for every tap.
    let ctx = unsafe { &*user_info.cast::<CallbackCtx>() };
    let kind = EventKind::from_raw(event_type);

    if event_ref.is_null() {
        let mut ev = TapEvent::new(kind);
        ctx.handler.handle(&mut ev);
        return event_ref;
    }

    // The OS owns the event; never release it from here.
    // SAFETY: non-null `CGEventRef` supplied by the tap.
    let event = ManuallyDrop::new(unsafe { CGEvent::from_ptr(event_ref.cast()) });
    let mut ev = read_event(kind, &event, proxy);
    let before = ev.flags;
    match ctx.handler.handle(&mut ev) {
        Verdict::Swallow => {
            trace!(?kind, key = ev.key, "event_swallowed");
            ptr::null_mut()
        }
        Verdict::Pass => {
            write_back(&event, before, &ev);
            event_ref
        }
    }
}
