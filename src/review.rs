//! CVA review queue: list requests, offer decisions, submit them once.

use std::sync::Arc;

use dashmap::DashMap;

use crate::client::CvaClient;
use crate::errors::{PortalError, Result};
use crate::intent::{IdempotencyLedger, Intent};
use crate::models::page::Page;
use crate::models::verification::{
    ApproveVerification, RejectVerification, ReviewAction, VerificationQuery,
    VerificationRequest, VerificationStatus,
};

const SCOPE_PREFIX: &str = "verification:";

#[derive(Clone)]
pub struct ReviewQueue {
    cva: CvaClient,
    ledger: IdempotencyLedger,
    /// Last status seen per request id.
    seen: Arc<DashMap<String, VerificationStatus>>,
}

impl ReviewQueue {
    pub fn new(cva: CvaClient, ledger: IdempotencyLedger) -> Self {
        Self {
            cva,
            ledger,
            seen: Arc::new(DashMap::new()),
        }
    }

    pub async fn list(&self, query: &VerificationQuery) -> Result<Page<VerificationRequest>> {
        let page = self.cva.list_verification_requests(query).await?;
        for request in &page.content {
            self.record(request);
        }
        Ok(page)
    }

    pub async fn fetch(&self, id: &str) -> Result<VerificationRequest> {
        let request = self.cva.get_verification_request(id).await?;
        self.record(&request);
        Ok(request)
    }

    /// Decisions to offer for `request`: both while pending, none afterwards.
    pub fn actions_for(&self, request: &VerificationRequest) -> &'static [ReviewAction] {
        request.available_actions()
    }

    pub fn last_seen(&self, id: &str) -> Option<VerificationStatus> {
        self.seen.get(id).map(|s| *s)
    }

    pub async fn approve(
        &self,
        id: &str,
        verifier_id: Option<String>,
        notes: Option<String>,
    ) -> Result<VerificationRequest> {
        self.guard(id, ReviewAction::Approve)?;
        let verifier_id = self.resolve_verifier(verifier_id).await?;
        let notes = notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let scope = scope_for(id);
        let fingerprint = format!("approve:{}", verifier_id);
        let outcome = self
            .ledger
            .run(&scope, &fingerprint, |intent| {
                let cmd = ApproveVerification {
                    verifier_id: verifier_id.clone(),
                    idempotency_key: intent.idempotency_key,
                    correlation_id: intent.correlation_id,
                    notes: notes.clone(),
                };
                async move { self.cva.approve_verification_request(id, &cmd).await }
            })
            .await;

        self.finish(id, ReviewAction::Approve, outcome)
    }

    /// Reject with a reason. A blank reason fails before anything is persisted
    /// or sent.
    pub async fn reject(
        &self,
        id: &str,
        verifier_id: Option<String>,
        reason: &str,
    ) -> Result<VerificationRequest> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(PortalError::Validation("a rejection reason is required".into()));
        }
        self.guard(id, ReviewAction::Reject)?;
        let verifier_id = self.resolve_verifier(verifier_id).await?;

        let scope = scope_for(id);
        let fingerprint = format!("reject:{}", verifier_id);
        let outcome = self
            .ledger
            .run(&scope, &fingerprint, |intent| {
                let cmd = RejectVerification {
                    verifier_id: verifier_id.clone(),
                    reason: reason.to_string(),
                    correlation_id: intent.correlation_id,
                };
                async move { self.cva.reject_verification_request(id, &cmd).await }
            })
            .await;

        self.finish(id, ReviewAction::Reject, outcome)
    }

    /// Decisions that were started but never got a definitive answer.
    pub async fn unfinished(&self) -> Result<Vec<Intent>> {
        let intents = self.ledger.pending().await?;
        Ok(intents
            .into_iter()
            .filter(|i| i.scope.starts_with(SCOPE_PREFIX))
            .collect())
    }

    fn guard(&self, id: &str, action: ReviewAction) -> Result<()> {
        match self.last_seen(id) {
            Some(status) if !status.can_transition(action.target_status()) => {
                tracing::info!(request_id = id, %status, ?action, "decision refused; request already decided");
                Err(PortalError::AlreadyDecided {
                    id: id.to_string(),
                    status,
                })
            }
            _ => Ok(()),
        }
    }

    async fn resolve_verifier(&self, verifier_id: Option<String>) -> Result<String> {
        match verifier_id.filter(|v| !v.trim().is_empty()) {
            Some(v) => Ok(v),
            None => self.cva.transport().session().subject().await,
        }
    }

    fn record(&self, request: &VerificationRequest) {
        self.seen.insert(request.id.clone(), request.status);
    }

    fn finish(
        &self,
        id: &str,
        action: ReviewAction,
        outcome: Result<VerificationRequest>,
    ) -> Result<VerificationRequest> {
        match outcome {
            Ok(decided) => {
                tracing::info!(
                    request_id = id,
                    status = %decided.status,
                    credits = ?decided.credit_issuance.as_ref().map(|c| c.credits_rounded),
                    "verification decision recorded"
                );
                self.record(&decided);
                Ok(decided)
            }
            Err(PortalError::Conflict(message)) => {
                // Someone else decided first; the cached status is stale.
                self.seen.remove(id);
                tracing::warn!(request_id = id, ?action, message = %message, "decision conflicted with server state");
                Err(PortalError::Conflict(message))
            }
            Err(e) => Err(e),
        }
    }
}

fn scope_for(id: &str) -> String {
    format!("{}{}", SCOPE_PREFIX, id)
}
