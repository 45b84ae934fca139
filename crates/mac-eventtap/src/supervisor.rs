//! Background thread that performs deferred tap work and watches the
//! Accessibility permission.

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{select, tick};
use tracing::{debug, trace};

use crate::{Command, TapBackend, TapManager};

/// Handle to the supervisor thread. Dropping it shuts the thread down.
pub struct Supervisor<B: TapBackend> {
    /// Manager the thread serves.
    manager: Arc<TapManager<B>>,
    /// Thread handle, taken on shutdown.
    handle: Option<JoinHandle<()>>,
}

impl<B: TapBackend> Supervisor<B> {
    /// Start a supervisor that polls `permissions::accessibility_ok` every `poll`.
    pub fn spawn(manager: Arc<TapManager<B>>, poll: Duration) -> Self {
        Self::spawn_with_probe(manager, poll, permissions::accessibility_ok)
    }

    /// Start a supervisor with a custom permission probe.
    pub fn spawn_with_probe<P>(manager: Arc<TapManager<B>>, poll: Duration, probe: P) -> Self
    where
        P: Fn() -> bool + Send + 'static,
    {
        let m = manager.clone();
        let handle = thread::Builder::new()
            .name("vnkey-tap-supervisor".into())
            .spawn(move || run(&m, poll, probe))
            .ok();
        if handle.is_none() {
            tracing::error!("tap_supervisor_spawn_failed");
        }
        Self { manager, handle }
    }

    /// Stop the thread and wait for it.
    pub fn shutdown(&mut self) {
        if let Some(h) = self.handle.take() {
            self.manager.send_command(Command::Shutdown);
            if h.join().is_err() {
                tracing::error!("tap_supervisor_panicked");
            }
        }
    }
}

impl<B: TapBackend> Drop for Supervisor<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Supervisor loop body.
fn run<B, P>(manager: &TapManager<B>, poll: Duration, probe: P)
where
    B: TapBackend,
    P: Fn() -> bool,
{
    debug!(?poll, "tap_supervisor_started");
    let commands = manager.command_receiver();
    let ticker = tick(poll);
    let mut last_ok = true;
    loop {
        select! {
            recv(commands) -> msg => {
                let Ok(cmd) = msg else { break };
                trace!(?cmd, "tap_supervisor_command");
                if !manager.run_command(cmd) {
                    break;
                }
            }
            recv(ticker) -> _ => {
                let ok = probe();
                if !ok && last_ok && manager.status().initialized {
                    manager.mark_permission_lost();
                }
                if ok && !last_ok {
                    manager.report_permission_restored();
                }
                last_ok = ok;
            }
        }
    }
    debug!("tap_supervisor_exited");
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        time::Instant,
    };

    use super::*;
    use crate::{MockBackend, TapControl};

    fn wait_for(mut f: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if f() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn revoked_permission_trips_the_gate() {
        let m = Arc::new(TapManager::new(MockBackend::default()));
        m.initialize();
        let granted = Arc::new(AtomicBool::new(true));
        let g = granted.clone();
        let mut sup = Supervisor::spawn_with_probe(m.clone(), Duration::from_millis(5), move || {
            g.load(Ordering::SeqCst)
        });
        granted.store(false, Ordering::SeqCst);
        assert!(wait_for(|| m.has_permission_lost()));
        granted.store(true, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        // Restoration alone does not reopen the gate.
        assert!(m.has_permission_lost());
        sup.shutdown();
    }

    #[test]
    fn recreate_runs_on_supervisor_thread() {
        let m = Arc::new(TapManager::new(MockBackend::default()));
        m.initialize();
        let _sup = Supervisor::spawn_with_probe(m.clone(), Duration::from_secs(60), || true);
        m.send_command(Command::Recreate);
        assert!(wait_for(|| m.backend().creates() == 2));
        assert!(m.is_enabled());
    }
}
