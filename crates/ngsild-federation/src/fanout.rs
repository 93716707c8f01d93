//! Concurrent fan-out to the local store and remote context sources

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use ngsild_core::{
    ContextSourceRegistration, FederationError, FederationResult, NgsiLdWarning, WarningCode,
};
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::health::HealthTracker;

/// Outcome of one remote call, paired with the registration it targeted
pub type RemoteOutcome<T> = (Result<T, NgsiLdWarning>, ContextSourceRegistration);

/// Everything a fan-out produced
#[derive(Debug)]
pub struct FanOutResult<L, T> {
    pub local: L,
    /// Remote outcomes in the order the registrations were given
    pub remote: Vec<RemoteOutcome<T>>,
}

/// Runs the local query and every remote call of one request concurrently.
///
/// Remote parallelism is bounded by `limit`. Each remote call gets its own
/// timeout and its outcome is recorded with the [`HealthTracker`] before it is
/// handed back. A remote failure never affects the other calls; a local
/// failure aborts the whole request.
pub struct FanOut {
    limit: Option<usize>,
    timeout: Duration,
    health: Arc<HealthTracker>,
}

impl FanOut {
    pub fn new(limit: Option<usize>, timeout: Duration, health: Arc<HealthTracker>) -> Self {
        Self {
            limit,
            timeout,
            health,
        }
    }

    /// Run `local` alongside `call(registration)` for every registration.
    ///
    /// Cancelling `cancel` drops every call still in flight; those calls
    /// leave no health record and the request fails with
    /// [`FederationError::Cancelled`].
    pub async fn run<L, T, LocalFut, F, Fut>(
        &self,
        local: LocalFut,
        registrations: Vec<ContextSourceRegistration>,
        call: F,
        cancel: &CancelToken,
    ) -> FederationResult<FanOutResult<L, T>>
    where
        LocalFut: Future<Output = FederationResult<L>>,
        F: Fn(ContextSourceRegistration) -> Fut,
        Fut: Future<Output = Result<T, NgsiLdWarning>>,
    {
        let limit = self.limit.unwrap_or(registrations.len()).max(1);
        debug!(sources = registrations.len(), limit, "Fanning out");

        let remote = stream::iter(registrations.into_iter().enumerate())
            .map(|(index, registration)| {
                let pending = call(registration.clone());
                async move {
                    let outcome = self.guarded(&registration, pending).await;
                    (index, (outcome, registration))
                }
            })
            .buffer_unordered(limit)
            .collect::<Vec<_>>();

        let work = async {
            let (local, mut remote) =
                tokio::try_join!(local, async { Ok::<_, FederationError>(remote.await) })?;
            remote.sort_by_key(|(index, _)| *index);
            let remote = remote.into_iter().map(|(_, outcome)| outcome).collect();
            Ok::<_, FederationError>(FanOutResult { local, remote })
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Fan-out cancelled");
                Err(FederationError::Cancelled)
            }
            result = work => result,
        }
    }

    /// Apply the per-call timeout and record the outcome
    async fn guarded<T>(
        &self,
        registration: &ContextSourceRegistration,
        pending: impl Future<Output = Result<T, NgsiLdWarning>>,
    ) -> Result<T, NgsiLdWarning> {
        let outcome = match tokio::time::timeout(self.timeout, pending).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    registration_id = %registration.id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Context source did not answer in time"
                );
                Err(NgsiLdWarning::for_source(
                    &registration.id,
                    WarningCode::Timeout,
                    format!("No answer within {} ms", self.timeout.as_millis()),
                ))
            }
        };
        self.health.record_outcome(&registration.id, outcome.is_ok());
        outcome
    }
}
