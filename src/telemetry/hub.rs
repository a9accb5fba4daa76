//! Latest-value slots and callback registry for decoded telemetry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::types::{TelemetryKind, TelemetryRecord, TelemetrySnapshot};

/// Handler invoked synchronously with every decoded record of one kind
pub type TelemetryHandler = Arc<dyn Fn(&TelemetryRecord) + Send + Sync>;

/// Holds the latest record per variant and dispatches to registered handlers.
///
/// Safe to share between the unit that decodes telemetry and any unit that
/// queries it. Locks are never held while handlers run, so a handler may
/// query the hub itself.
#[derive(Default)]
pub struct TelemetryHub {
    latest: Mutex<TelemetrySnapshot>,
    handlers: Mutex<HashMap<TelemetryKind, Vec<TelemetryHandler>>>,
}

impl std::fmt::Debug for TelemetryHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryHub")
            .field("latest", &*lock(&self.latest))
            .finish_non_exhaustive()
    }
}

/// A panicking handler must not disable telemetry for the rest of the run.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl TelemetryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one telemetry variant
    pub fn subscribe<F>(&self, kind: TelemetryKind, handler: F)
    where
        F: Fn(&TelemetryRecord) + Send + Sync + 'static,
    {
        lock(&self.handlers)
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Store `record` as the latest of its kind and notify handlers
    pub fn publish(&self, record: TelemetryRecord) {
        let kind = record.kind();
        lock(&self.latest).update(record.clone());

        let handlers = lock(&self.handlers)
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        for handler in &handlers {
            handler(&record);
        }
    }

    /// Latest record of one variant
    pub fn latest(&self, kind: TelemetryKind) -> Option<TelemetryRecord> {
        lock(&self.latest).get(kind)
    }

    /// Copy of all latest records
    pub fn snapshot(&self) -> TelemetrySnapshot {
        lock(&self.latest).clone()
    }
}
