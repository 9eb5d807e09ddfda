use chrono::Utc;
use parking_lot::Mutex;

use crate::error::IntegrationError;
use crate::models::{IntegrationKind, IntegrationStatus, StatusSnapshot};

/// Connection status of one manager, written by connection tests and by
/// action failures that show the service is unreachable.
#[derive(Debug)]
pub(crate) struct StatusTracker {
    kind: IntegrationKind,
    state: Mutex<StatusSnapshot>,
}

impl StatusTracker {
    pub(crate) fn new(kind: IntegrationKind, initial: IntegrationStatus) -> Self {
        Self {
            kind,
            state: Mutex::new(StatusSnapshot {
                status: initial,
                last_sync: None,
            }),
        }
    }

    pub(crate) fn snapshot(&self) -> StatusSnapshot {
        *self.state.lock()
    }

    /// Write `status` and stamp `last_sync`.
    pub(crate) fn record(&self, status: IntegrationStatus) {
        let previous = {
            let mut state = self.state.lock();
            let previous = state.status;
            state.status = status;
            state.last_sync = Some(Utc::now());
            previous
        };
        if previous != status {
            tracing::info!(
                integration = %self.kind,
                from = ?previous,
                to = ?status,
                "integration status changed"
            );
        }
    }

    /// Mark the integration as failing if `err` is a connectivity failure.
    pub(crate) fn record_failure(&self, err: &IntegrationError) {
        if err.reflects_connectivity() {
            self.record(IntegrationStatus::Error);
        }
    }
}
