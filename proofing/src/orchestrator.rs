//! Concurrent fan-out over the configured vendor clients.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future::join_all;
use idv_types::{AttemptId, CheckKind, Clock, IdvParams, ProofingResult};
use idv_vendors::{CheckRequest, GuardedClient, ServiceStatus, VendorCheckClient};

use crate::{aggregate, ProofingError, ProofingPlan};

pub struct ProofingOrchestrator {
    clients: BTreeMap<CheckKind, GuardedClient>,
    status: Arc<ServiceStatus>,
    clock: Arc<dyn Clock>,
    hard_reject_routes_to_review: bool,
}

impl ProofingOrchestrator {
    /// One guarded client per check kind; a later client for the same kind
    /// replaces an earlier one.
    pub fn new(
        clients: Vec<Arc<dyn VendorCheckClient>>,
        status: Arc<ServiceStatus>,
        clock: Arc<dyn Clock>,
        params: &IdvParams,
    ) -> Self {
        let clients = clients
            .into_iter()
            .map(|c| (c.kind(), GuardedClient::from_params(c, params)))
            .collect();
        Self {
            clients,
            status,
            clock,
            hard_reject_routes_to_review: params.hard_reject_routes_to_review,
        }
    }

    pub fn from_guarded(
        clients: Vec<GuardedClient>,
        status: Arc<ServiceStatus>,
        clock: Arc<dyn Clock>,
        hard_reject_routes_to_review: bool,
    ) -> Self {
        Self {
            clients: clients.into_iter().map(|c| (c.kind(), c)).collect(),
            status,
            clock,
            hard_reject_routes_to_review,
        }
    }

    pub fn status(&self) -> &ServiceStatus {
        &self.status
    }

    pub fn is_configured(&self, kind: CheckKind) -> bool {
        self.clients.contains_key(&kind)
    }

    /// Run every check in `plan` and aggregate.
    ///
    /// Outage flags are read before any vendor is called: a required check
    /// in full outage yields a service-unavailable result with no calls made.
    /// All remaining checks run concurrently and each finishes or times out
    /// on its own.
    pub async fn run(
        &self,
        attempt_id: AttemptId,
        request: &CheckRequest,
        plan: &ProofingPlan,
    ) -> Result<ProofingResult, ProofingError> {
        if let Some(kind) = plan.kinds().find(|k| !self.is_configured(*k)) {
            return Err(ProofingError::NotConfigured(kind));
        }

        let down = self.status.outages(&plan.required);
        if !down.is_empty() {
            tracing::warn!(%attempt_id, ?down, "required vendor in full outage, deferring attempt");
            return Ok(ProofingResult::service_unavailable(attempt_id, down, self.clock.now()));
        }

        let to_run: Vec<&GuardedClient> = plan
            .kinds()
            .filter(|kind| {
                let skip = plan.optional.contains(kind) && self.status.is_full_outage(*kind);
                if skip {
                    tracing::warn!(%attempt_id, %kind, "optional vendor in full outage, skipping");
                }
                !skip
            })
            .filter_map(|kind| self.clients.get(&kind))
            .collect();

        let results = join_all(to_run.into_iter().map(|client| client.run(request))).await;

        let mut checks: BTreeMap<_, _> = plan.prior.iter().map(|r| (r.kind, r.clone())).collect();
        for result in results {
            tracing::debug!(%attempt_id, kind = %result.kind, success = result.success, timed_out = result.timed_out, "check finished");
            checks.insert(result.kind, result);
        }

        let result = aggregate(
            attempt_id,
            checks,
            self.hard_reject_routes_to_review,
            self.clock.now(),
        );
        tracing::info!(
            %attempt_id,
            success = result.success,
            pending = ?result.fraud_review_pending_reason,
            "proofing finished"
        );
        Ok(result)
    }
}
