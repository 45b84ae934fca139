//! Tap session lifecycle: create, stop, recover, and the fail-open gate.
//!
//! `TapManager` owns the one tap a process runs. The OS may switch the tap
//! off at any time; the manager re-enables it in place and, when that does
//! not stick, asks the supervisor thread to tear it down and build a new
//! one. Recreation never runs on the callback thread.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    DisableReason, EventKind, Result,
    policy::{DEFAULT_RAMP_THRESHOLD, HealthCounters, HealthStep},
};

/// Where a tap is installed.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TapLocation {
    /// System-wide, before events reach the window server's session.
    Hid,
    /// The login session.
    Session,
}

/// OS operations on the native tap handle.
pub trait TapBackend: Send + Sync + 'static {
    /// Create the tap at `location` and attach it to its run loop, disabled.
    fn create(&self, location: TapLocation) -> Result<()>;
    /// Enable or disable the live tap. No-op without a tap.
    fn set_enabled(&self, enabled: bool);
    /// Whether a live tap exists and is enabled.
    fn is_enabled(&self) -> bool;
    /// Disable, detach, invalidate and release the tap. No-op without a tap.
    fn destroy(&self);
}

/// Callbacks for lifecycle transitions. Invoked without any manager lock held.
pub trait TapObserver: Send + Sync {
    /// A tap was created and enabled, either first start or a recreation.
    fn on_started(&self) {}
    /// Accessibility was revoked; every event now passes through.
    fn on_permission_lost(&self) {}
    /// Accessibility came back; the host may call `initialize` again.
    fn on_permission_restored(&self) {}
    /// An OS disable or failed health probe was handled.
    fn on_recovered(&self, _reenable_count: u64, _recreate_count: u64) {}
}

/// Work deferred off the callback thread.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Command {
    /// Tear the tap down and build a new one.
    Recreate,
    /// Stop the supervisor.
    Shutdown,
}

/// Counters and flags describing the current session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TapStatus {
    /// A tap was created and not yet stopped.
    pub initialized: bool,
    /// Fail-open gate; sticky until the next `initialize`.
    pub permission_lost: bool,
    /// In-place re-enables performed.
    pub reenable_count: u64,
    /// Full recreations performed.
    pub recreate_count: u64,
    /// Health-check counters.
    pub health: HealthCounters,
}

/// Read side of the lifecycle used by the event pipeline.
pub trait TapControl: Send + Sync {
    /// Fail-open gate, checked first for every event.
    fn has_permission_lost(&self) -> bool;
    /// Whether the tap is live and enabled.
    fn is_enabled(&self) -> bool;
    /// React to an OS disable notice delivered through the callback.
    fn handle_disabled_by_os(&self, reason: DisableReason);
    /// Count an event and probe the tap at check points. Returns false when
    /// a probe found the tap disabled.
    fn health_check(&self, kind: EventKind) -> bool;
}

/// Owner of the process-wide tap session.
pub struct TapManager<B: TapBackend> {
    /// Native operations.
    backend: B,
    /// Session state, held only briefly.
    status: Mutex<TapStatus>,
    /// Mirror of `status.permission_lost` for the lock-free gate.
    permission_lost: AtomicBool,
    /// Healthy checks needed before slowing the health cadence.
    ramp_threshold: u32,
    /// Deferred work for the supervisor.
    commands: (Sender<Command>, Receiver<Command>),
    /// Lifecycle listeners.
    observers: Mutex<Vec<Arc<dyn TapObserver>>>,
}

impl<B: TapBackend> TapManager<B> {
    /// Create a manager in the `Uninitialized` state.
    pub fn new(backend: B) -> Self {
        Self::with_ramp_threshold(backend, DEFAULT_RAMP_THRESHOLD)
    }

    /// Create a manager with a custom health ramp threshold.
    pub fn with_ramp_threshold(backend: B, ramp_threshold: u32) -> Self {
        Self {
            backend,
            status: Mutex::new(TapStatus::default()),
            permission_lost: AtomicBool::new(false),
            ramp_threshold: ramp_threshold.max(1),
            commands: unbounded(),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Register a lifecycle listener.
    pub fn add_observer(&self, observer: Arc<dyn TapObserver>) {
        self.observers.lock().push(observer);
    }

    /// The native backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Snapshot of the session state.
    pub fn status(&self) -> TapStatus {
        *self.status.lock()
    }

    /// Channel the supervisor drains.
    pub(crate) fn command_receiver(&self) -> Receiver<Command> {
        self.commands.1.clone()
    }

    /// Queue work for the supervisor.
    pub(crate) fn send_command(&self, cmd: Command) {
        // The manager holds a receiver, so the channel cannot disconnect.
        let _ignored = self.commands.0.send(cmd);
    }

    /// Create and enable the tap. Returns true on success or when already
    /// running. Clears a sticky permission-lost flag.
    ///
    /// Tries the system-wide location first and falls back to the session.
    pub fn initialize(&self) -> bool {
        {
            let mut st = self.status.lock();
            if st.initialized {
                return true;
            }
            st.permission_lost = false;
            self.permission_lost.store(false, Ordering::SeqCst);

            let created = match self.backend.create(TapLocation::Hid) {
                Ok(()) => Ok(TapLocation::Hid),
                Err(e) => {
                    warn!(error = %e, "hid_tap_create_failed_trying_session");
                    self.backend
                        .create(TapLocation::Session)
                        .map(|()| TapLocation::Session)
                }
            };
            match created {
                Ok(location) => {
                    self.backend.set_enabled(true);
                    st.initialized = true;
                    st.health = HealthCounters::default();
                    info!(?location, "event_tap_started");
                }
                Err(e) => {
                    warn!(error = %e, "event_tap_create_failed");
                    return false;
                }
            }
        }
        self.notify(|o| o.on_started());
        true
    }

    /// Tear the tap down. Returns true when a tap was running.
    pub fn stop(&self) -> bool {
        let mut st = self.status.lock();
        let was = st.initialized;
        self.backend.destroy();
        st.initialized = false;
        st.permission_lost = false;
        self.permission_lost.store(false, Ordering::SeqCst);
        debug!(was_running = was, "event_tap_stopped");
        was
    }

    /// Enter the fail-open state: disable and invalidate the tap. Every
    /// subsequent event passes through until `initialize` is called again.
    pub fn mark_permission_lost(&self) {
        {
            let mut st = self.status.lock();
            if st.permission_lost {
                return;
            }
            st.permission_lost = true;
            self.permission_lost.store(true, Ordering::SeqCst);
            self.backend.destroy();
            st.initialized = false;
        }
        warn!("accessibility_permission_lost_passing_through");
        self.notify(|o| o.on_permission_lost());
    }

    /// Report that the permission is available again. Does not clear the
    /// gate; that takes an explicit `initialize`.
    pub fn report_permission_restored(&self) {
        if self.has_permission_lost() {
            info!("accessibility_permission_restored");
            self.notify(|o| o.on_permission_restored());
        }
    }

    /// Re-enable in place; if the tap is still off, schedule a recreation.
    pub fn ensure_alive(&self) {
        let (reenable, recreate) = {
            let mut st = self.status.lock();
            if st.permission_lost || !st.initialized {
                return;
            }
            st.reenable_count += 1;
            self.backend.set_enabled(true);
            if !self.backend.is_enabled() {
                st.recreate_count += 1;
                warn!(recreate_count = st.recreate_count, "tap_reenable_failed_recreating");
                self.send_command(Command::Recreate);
            }
            (st.reenable_count, st.recreate_count)
        };
        self.notify(|o| o.on_recovered(reenable, recreate));
    }

    /// Tear down and build a fresh tap. Must not run on the callback thread.
    pub fn recreate(&self) -> bool {
        if self.has_permission_lost() {
            debug!("recreate_skipped_permission_lost");
            return false;
        }
        {
            let mut st = self.status.lock();
            self.backend.destroy();
            st.initialized = false;
        }
        self.initialize()
    }

    /// Run queued commands on the calling thread. Returns false once a
    /// `Shutdown` is seen.
    pub fn drain_commands(&self) -> bool {
        loop {
            match self.commands.1.try_recv() {
                Ok(cmd) => {
                    if !self.run_command(cmd) {
                        return false;
                    }
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return true,
            }
        }
    }

    /// Execute one command. Returns false for `Shutdown`.
    pub(crate) fn run_command(&self, cmd: Command) -> bool {
        match cmd {
            Command::Recreate => {
                if !self.recreate() {
                    warn!("tap_recreate_failed");
                }
                true
            }
            Command::Shutdown => false,
        }
    }

    /// Call every observer without holding the observer lock.
    fn notify(&self, f: impl Fn(&dyn TapObserver)) {
        let observers: Vec<Arc<dyn TapObserver>> = self.observers.lock().clone();
        for o in &observers {
            f(o.as_ref());
        }
    }
}

impl<B: TapBackend> TapControl for TapManager<B> {
    fn has_permission_lost(&self) -> bool {
        self.permission_lost.load(Ordering::SeqCst)
    }

    fn is_enabled(&self) -> bool {
        self.backend.is_enabled()
    }

    fn handle_disabled_by_os(&self, reason: DisableReason) {
        warn!(?reason, "tap_disabled_by_os_reenabling");
        self.ensure_alive();
    }

    fn health_check(&self, kind: EventKind) -> bool {
        {
            let mut st = self.status.lock();
            if !st.initialized || st.permission_lost {
                return true;
            }
            if st.health.step(kind, self.ramp_threshold) == HealthStep::Skip {
                return true;
            }
            let enabled = self.backend.is_enabled();
            let log_due = st.health.record(enabled, self.ramp_threshold);
            if enabled {
                return true;
            }
            if log_due {
                warn!(recoveries = st.health.recoveries, "health_check_found_tap_disabled");
            }
        }
        self.ensure_alive();
        false
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::{MockBackend, mock::BackendCall};

    #[derive(Default)]
    struct CountingObserver {
        started: AtomicUsize,
        lost: AtomicUsize,
        recovered: AtomicUsize,
    }

    impl TapObserver for CountingObserver {
        fn on_started(&self) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
        fn on_permission_lost(&self) {
            self.lost.fetch_add(1, Ordering::SeqCst);
        }
        fn on_recovered(&self, _r: u64, _c: u64) {
            self.recovered.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn manager() -> (TapManager<MockBackend>, Arc<CountingObserver>) {
        let m = TapManager::new(MockBackend::default());
        let obs = Arc::new(CountingObserver::default());
        m.add_observer(obs.clone());
        (m, obs)
    }

    #[test]
    fn initialize_is_idempotent() {
        let (m, obs) = manager();
        assert!(m.initialize());
        assert!(m.initialize());
        assert_eq!(obs.started.load(Ordering::SeqCst), 1);
        assert!(m.status().initialized);
        assert!(m.is_enabled());
    }

    #[test]
    fn falls_back_to_session_tap() {
        let (m, _) = manager();
        m.backend().deny_location(TapLocation::Hid);
        assert!(m.initialize());
        assert_eq!(m.backend().location(), Some(TapLocation::Session));
    }

    #[test]
    fn initialize_fails_when_every_location_denied() {
        let (m, obs) = manager();
        m.backend().deny_location(TapLocation::Hid);
        m.backend().deny_location(TapLocation::Session);
        assert!(!m.initialize());
        assert!(!m.status().initialized);
        assert_eq!(obs.started.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stop_destroys_and_reports_previous_state() {
        let (m, _) = manager();
        assert!(!m.stop());
        m.initialize();
        assert!(m.stop());
        assert!(!m.is_enabled());
        assert!(m.backend().calls().contains(&BackendCall::Destroy));
    }

    #[test]
    fn permission_lost_is_sticky_until_initialize() {
        let (m, obs) = manager();
        m.initialize();
        m.mark_permission_lost();
        assert!(m.has_permission_lost());
        assert!(!m.is_enabled());
        m.ensure_alive();
        assert!(m.has_permission_lost());
        assert!(!m.recreate());
        assert!(m.has_permission_lost());
        assert!(m.initialize());
        assert!(!m.has_permission_lost());
        assert_eq!(obs.lost.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn os_disable_reenables_in_place() {
        let (m, obs) = manager();
        m.initialize();
        m.backend().force_disabled(false);
        m.handle_disabled_by_os(DisableReason::Timeout);
        let st = m.status();
        assert_eq!(st.reenable_count, 1);
        assert_eq!(st.recreate_count, 0);
        assert!(m.is_enabled());
        assert_eq!(obs.recovered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stuck_tap_is_recreated_off_thread() {
        let (m, obs) = manager();
        m.initialize();
        m.backend().force_disabled(true);
        m.handle_disabled_by_os(DisableReason::UserInput);
        assert_eq!(m.status().recreate_count, 1);
        // Nothing happens until the supervisor side drains the queue.
        assert_eq!(m.backend().creates(), 1);
        m.backend().force_disabled(false);
        assert!(m.drain_commands());
        assert_eq!(m.backend().creates(), 2);
        assert!(m.is_enabled());
        assert_eq!(obs.started.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn health_check_probes_and_recovers() {
        let (m, _) = manager();
        m.initialize();
        m.backend().set_enabled(false);
        let results: Vec<bool> = (0..25).map(|_| m.health_check(EventKind::KeyDown)).collect();
        assert!(results[..24].iter().all(|r| *r));
        assert!(!results[24]);
        let st = m.status();
        assert_eq!(st.health.healthy, 0);
        assert_eq!(st.health.recoveries, 1);
        assert_eq!(st.reenable_count, 1);
        assert!(m.is_enabled());
    }

    #[test]
    fn health_check_ignores_non_key_down() {
        let (m, _) = manager();
        m.initialize();
        m.backend().set_enabled(false);
        for _ in 0..100 {
            assert!(m.health_check(EventKind::FlagsChanged));
        }
        assert_eq!(m.status().health.events, 0);
    }

    #[test]
    fn shutdown_command_stops_draining() {
        let (m, _) = manager();
        m.send_command(Command::Shutdown);
        assert!(!m.drain_commands());
    }
}
