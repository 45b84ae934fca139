use std::{path::Path, sync::Arc, thread, time::Duration};

use core_foundation::runloop::CFRunLoop;
use keysynth::KeySynth;
use mac_eventtap::{MacBackend, Supervisor, TapManager};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vnkey_engine::{
    Error, FilePersistence, NoAccessibility, Notice, Notifier, Pipeline, Result, Settings,
    SettingsHandle, SmartSwitchStore,
};

use crate::engine::PassThroughEngine;

/// Notices buffered between the callback thread and the logger.
const NOTICE_CAPACITY: usize = 256;

/// Install the tap and run the main run loop. Does not return while the tap
/// is alive.
pub fn run(settings: Settings, state_dir: &Path) -> Result<()> {
    let persistence = Arc::new(FilePersistence::new(state_dir));
    let store = Arc::new(SmartSwitchStore::new());
    let loaded = store.load(persistence.as_ref())?;
    info!(entries = loaded, dir = %state_dir.display(), "smart_switch_ready");

    let poll = Duration::from_millis(settings.permission_poll_ms);
    let ramp = settings.health_ramp_threshold;
    let (tx, rx) = mpsc::channel(NOTICE_CAPACITY);
    let pipeline = Arc::new(
        Pipeline::new(
            Arc::new(SettingsHandle::new(settings)),
            Box::new(PassThroughEngine::default()),
            Arc::new(NoAccessibility),
            KeySynth::new(),
        )
        .with_notifier(Notifier::new(tx))
        .with_smart_switch(store.clone()),
    );
    let tap = Arc::new(TapManager::with_ramp_threshold(
        MacBackend::new(pipeline.clone()),
        ramp,
    ));
    pipeline.attach_control(tap.clone());
    tap.add_observer(pipeline.clone());
    if !tap.initialize() {
        return Err(Error::Msg(
            "event tap could not be created; grant Accessibility and Input Monitoring".into(),
        ));
    }
    let _supervisor = Supervisor::spawn(tap, poll);
    spawn_notice_logger(rx, store, persistence);

    info!("monitor_running");
    CFRunLoop::run_current();
    Ok(())
}

/// Log notices and write the smart switch table when a language changes.
fn spawn_notice_logger(
    mut rx: mpsc::Receiver<Notice>,
    store: Arc<SmartSwitchStore>,
    persistence: Arc<FilePersistence>,
) {
    let spawned = thread::Builder::new()
        .name("vnkey-notices".into())
        .spawn(move || {
            while let Some(notice) = rx.blocking_recv() {
                debug!(?notice, "notice_received");
                if matches!(
                    notice,
                    Notice::LanguageChanged { .. } | Notice::CodeTableChanged { .. }
                ) && let Err(e) = store.persist(persistence.as_ref())
                {
                    warn!(error = %e, "smart_switch_persist_failed");
                }
            }
        });
    if let Err(e) = spawned {
        warn!(error = %e, "notice_thread_spawn_failed");
    }
}
