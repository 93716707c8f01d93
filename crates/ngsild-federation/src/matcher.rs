//! Context source registration selection

use std::collections::HashSet;
use std::sync::Arc;

use ngsild_core::{
    CSRFilters, ContextSourceRegistration, FederationResult, RegistrationCatalogue,
    RegistrationMode, RequestContext,
};
use tracing::debug;

use crate::health::HealthTracker;

/// Decides whether a matching registration is actually called.
///
/// Registrations reach the policy with their health status already stamped,
/// so a policy can exclude sources that failed recently.
pub trait SelectionPolicy: Send + Sync {
    fn admit(&self, registration: &ContextSourceRegistration) -> bool;
}

/// Policy admitting every matching registration
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl SelectionPolicy for AcceptAll {
    fn admit(&self, _registration: &ContextSourceRegistration) -> bool {
        true
    }
}

/// Selects the registrations eligible to answer a request.
///
/// The order of the returned list is merge precedence: catalogue order, with
/// auxiliary registrations moved after all others.
pub struct RegistrationMatcher {
    catalogue: Arc<dyn RegistrationCatalogue>,
    health: Arc<HealthTracker>,
    policy: Arc<dyn SelectionPolicy>,
}

impl RegistrationMatcher {
    pub fn new(catalogue: Arc<dyn RegistrationCatalogue>, health: Arc<HealthTracker>) -> Self {
        Self {
            catalogue,
            health,
            policy: Arc::new(AcceptAll),
        }
    }

    /// Replace the selection policy
    pub fn with_policy(mut self, policy: Arc<dyn SelectionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Registrations matching `filters`, in merge precedence order.
    ///
    /// A catalogue failure is returned as-is. No remote I/O happens here.
    pub async fn select(
        &self,
        context: &RequestContext,
        filters: &CSRFilters,
    ) -> FederationResult<Vec<ContextSourceRegistration>> {
        let found = self.catalogue.find_matching(context, filters).await?;
        let found_count = found.len();

        let mut seen = HashSet::new();
        let (mut selected, auxiliary): (Vec<_>, Vec<_>) = found
            .into_iter()
            .filter(|r| filters.matches(r) && seen.insert(r.id.clone()))
            .map(|mut r| {
                r.status = self.health.status(&r.id);
                r
            })
            .filter(|r| {
                let admitted = self.policy.admit(r);
                if !admitted {
                    debug!(registration_id = %r.id, "Registration excluded by selection policy");
                }
                admitted
            })
            .partition(|r| r.mode != RegistrationMode::Auxiliary);
        selected.extend(auxiliary);

        debug!(
            candidates = found_count,
            selected = selected.len(),
            "Selected context sources"
        );
        Ok(selected)
    }
}
