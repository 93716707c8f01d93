//! Per-registration health bookkeeping

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use ngsild_core::RegistrationStatus;
use parking_lot::RwLock;
use tracing::debug;

/// Records whether the latest call to each context source succeeded.
///
/// Each outcome overwrites a single timestamp field (last write wins). The
/// tracker never excludes sources itself; see
/// [`SelectionPolicy`](crate::SelectionPolicy) for that.
#[derive(Debug, Default)]
pub struct HealthTracker {
    statuses: RwLock<HashMap<String, RegistrationStatus>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one call to `registration_id`, timestamped now
    pub fn record_outcome(&self, registration_id: &str, succeeded: bool) {
        self.record_outcome_at(registration_id, succeeded, Utc::now());
    }

    /// Record an outcome with an explicit timestamp
    pub fn record_outcome_at(&self, registration_id: &str, succeeded: bool, at: DateTime<Utc>) {
        debug!(registration_id = %registration_id, succeeded, "Recording source outcome");
        let mut statuses = self.statuses.write();
        let status = statuses.entry(registration_id.to_string()).or_default();
        if succeeded {
            status.last_success_at = Some(at);
        } else {
            status.last_failure_at = Some(at);
        }
    }

    /// Current status of one registration (empty if never called)
    pub fn status(&self, registration_id: &str) -> RegistrationStatus {
        self.statuses
            .read()
            .get(registration_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Copy of every recorded status
    pub fn snapshot(&self) -> HashMap<String, RegistrationStatus> {
        self.statuses.read().clone()
    }
}
