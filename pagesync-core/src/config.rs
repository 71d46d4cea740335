use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Per-run switches of the synchronisation engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Delete every existing child of the destination parent before writing.
    #[serde(default)]
    pub clean_sync: bool,
    /// Lock each created page against edits in the destination UI.
    #[serde(default)]
    pub lock_page: bool,
}

impl SyncOptions {
    pub fn trace_loaded(&self) {
        info!(
            clean_sync = self.clean_sync,
            lock_page = self.lock_page,
            "Loaded SyncOptions"
        );
        debug!(?self, "SyncOptions loaded (full debug)");
    }
}
