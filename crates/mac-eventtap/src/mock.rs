//! In-memory [`TapBackend`] for tests.

use std::collections::HashSet;

use parking_lot::Mutex;

use crate::{Error, Result, TapBackend, TapLocation};

/// A call made against the mock.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BackendCall {
    /// `create(location)`.
    Create(TapLocation),
    /// `set_enabled(flag)`.
    SetEnabled(bool),
    /// `destroy()`.
    Destroy,
}

/// Mutable mock state.
#[derive(Default)]
struct MockState {
    /// Location of the live tap, if any.
    location: Option<TapLocation>,
    /// Enabled flag of the live tap.
    enabled: bool,
    /// When set, `set_enabled(true)` does not stick.
    stuck_disabled: bool,
    /// Locations whose creation fails.
    denied: HashSet<TapLocation>,
    /// Successful creations.
    creates: usize,
    /// Call log.
    calls: Vec<BackendCall>,
}

/// Backend that simulates a tap without touching the OS.
#[derive(Default)]
pub struct MockBackend {
    /// Shared state.
    state: Mutex<MockState>,
}

impl MockBackend {
    /// Make creation at `location` fail.
    pub fn deny_location(&self, location: TapLocation) {
        self.state.lock().denied.insert(location);
    }

    /// Simulate a tap the OS keeps switched off (`stuck = true`), or release it.
    /// Forcing also disables the live tap.
    pub fn force_disabled(&self, stuck: bool) {
        let mut st = self.state.lock();
        st.stuck_disabled = stuck;
        st.enabled = false;
    }

    /// Location of the live tap.
    pub fn location(&self) -> Option<TapLocation> {
        self.state.lock().location
    }

    /// Number of successful creations.
    pub fn creates(&self) -> usize {
        self.state.lock().creates
    }

    /// Every call so far.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().calls.clone()
    }
}

impl TapBackend for MockBackend {
    fn create(&self, location: TapLocation) -> Result<()> {
        let mut st = self.state.lock();
        st.calls.push(BackendCall::Create(location));
        if st.denied.contains(&location) {
            return Err(Error::EventTapStart);
        }
        st.location = Some(location);
        st.enabled = false;
        st.creates += 1;
        Ok(())
    }

    fn set_enabled(&self, enabled: bool) {
        let mut st = self.state.lock();
        st.calls.push(BackendCall::SetEnabled(enabled));
        if st.location.is_some() {
            st.enabled = enabled && !st.stuck_disabled;
        }
    }

    fn is_enabled(&self) -> bool {
        let st = self.state.lock();
        st.location.is_some() && st.enabled
    }

    fn destroy(&self) {
        let mut st = self.state.lock();
        st.calls.push(BackendCall::Destroy);
        st.location = None;
        st.enabled = false;
    }
}
