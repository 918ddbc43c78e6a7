use std::sync::Arc;

use dashmap::DashSet;
use uuid::Uuid;

/// Libraries with a scan in flight
#[derive(Debug, Clone, Default)]
pub struct ScanTracker {
    running: Arc<DashSet<Uuid>>,
}

impl ScanTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `library_id`; `None` when a scan already holds it
    ///
    /// The claim is released when the returned guard drops.
    pub fn try_begin(&self, library_id: Uuid) -> Option<ScanGuard> {
        self.running.insert(library_id).then(|| ScanGuard {
            tracker: self.clone(),
            library_id,
        })
    }
}

#[derive(Debug)]
pub struct ScanGuard {
    tracker: ScanTracker,
    library_id: Uuid,
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.tracker.running.remove(&self.library_id);
    }
}
