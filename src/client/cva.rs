use super::{CallIds, ServiceClient};
use crate::errors::{PortalError, Result};
use crate::models::page::Page;
use crate::models::verification::{
    ApproveVerification, RejectVerification, VerificationQuery, VerificationRequest,
    VerificationStatus, VerificationSummary,
};

const REQUESTS: &str = "verification-requests";

/// Client for the Carbon Verification Authority service.
#[derive(Clone)]
pub struct CvaClient {
    inner: ServiceClient,
}

impl CvaClient {
    pub fn new(inner: ServiceClient) -> Self {
        Self { inner }
    }

    pub fn transport(&self) -> &ServiceClient {
        &self.inner
    }

    pub async fn list_verification_requests(
        &self,
        query: &VerificationQuery,
    ) -> Result<Page<VerificationRequest>> {
        let page: Page<VerificationRequest> =
            self.inner.get_with_query(&["api", REQUESTS], &query.normalized()).await?;
        for request in &page.content {
            request.validate()?;
        }
        Ok(page)
    }

    pub async fn get_verification_request(&self, id: &str) -> Result<VerificationRequest> {
        let request: VerificationRequest = self.inner.get(&["api", REQUESTS, id]).await?;
        request.validate()?;
        Ok(request)
    }

    pub async fn get_verification_summary(&self) -> Result<VerificationSummary> {
        self.inner.get(&["api", REQUESTS, "summary"]).await
    }

    /// The key and correlation id travel in both the body and the headers.
    pub async fn approve_verification_request(
        &self,
        id: &str,
        cmd: &ApproveVerification,
    ) -> Result<VerificationRequest> {
        let ids = CallIds {
            idempotency_key: Some(cmd.idempotency_key),
            correlation_id: cmd.correlation_id,
        };
        let decided: VerificationRequest = self
            .inner
            .post(&["api", REQUESTS, id, "approve"], cmd, Some(ids))
            .await?;
        expect_decision(id, &decided, VerificationStatus::Approved)?;
        Ok(decided)
    }

    pub async fn reject_verification_request(
        &self,
        id: &str,
        cmd: &RejectVerification,
    ) -> Result<VerificationRequest> {
        if cmd.reason.trim().is_empty() {
            return Err(PortalError::Validation("a rejection reason is required".into()));
        }
        let ids = CallIds {
            idempotency_key: None,
            correlation_id: cmd.correlation_id,
        };
        let decided: VerificationRequest = self
            .inner
            .post(&["api", REQUESTS, id, "reject"], cmd, Some(ids))
            .await?;
        expect_decision(id, &decided, VerificationStatus::Rejected)?;
        Ok(decided)
    }
}

fn expect_decision(id: &str, decided: &VerificationRequest, wanted: VerificationStatus) -> Result<()> {
    if decided.id != id {
        return Err(PortalError::Contract(format!(
            "decision on {} answered with request {}",
            id, decided.id
        )));
    }
    if decided.status != wanted {
        return Err(PortalError::Contract(format!(
            "request {} is {} after a {} decision",
            id, decided.status, wanted
        )));
    }
    decided.validate()
}
