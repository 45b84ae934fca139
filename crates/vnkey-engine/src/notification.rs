use tokio::sync::mpsc::Sender;
use tracing::{info, warn};

use crate::{CodeTable, Error, Language, Result, modifier::ReleaseAction};

/// State changes the settings/UI layer reflects without polling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    /// The input language changed because of an internal action.
    LanguageChanged {
        /// New language.
        language: Language,
    },
    /// The code table changed (smart switch).
    CodeTableChanged {
        /// New code table.
        code_table: CodeTable,
    },
    /// A hotkey fired.
    HotkeyFired {
        /// What it did.
        action: ReleaseAction,
    },
    /// Accessibility permission was revoked; typing is pass-through.
    PermissionLost,
    /// The tap came back after an OS disable.
    TapRecovered {
        /// Re-enables so far.
        reenable_count: u64,
        /// Recreations so far.
        recreate_count: u64,
    },
}

/// Sends notices to the UI layer without blocking the callback thread.
#[derive(Clone, Debug)]
pub struct Notifier {
    /// UI channel.
    tx: Sender<Notice>,
}

impl Notifier {
    /// Create a notifier over a UI channel.
    pub fn new(tx: Sender<Notice>) -> Self {
        Self { tx }
    }

    /// Queue `notice`. Fails when the channel is full or closed.
    pub fn send(&self, notice: Notice) -> Result<()> {
        info!(?notice, "notice");
        self.tx.try_send(notice).map_err(|_| Error::ChannelClosed)
    }

    /// Queue `notice`, logging instead of failing.
    pub fn post(&self, notice: Notice) {
        if let Err(e) = self.send(notice) {
            warn!(error = %e, "notice_dropped");
        }
    }
}
