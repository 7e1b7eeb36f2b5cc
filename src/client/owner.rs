use rust_decimal::Decimal;

use super::{CallIds, ServiceClient};
use crate::errors::{PortalError, Result};
use crate::intent::IdempotencyLedger;
use crate::models::journey::{Journey, JourneyPayload, JourneySubmission};
use crate::models::page::{Page, PageRequest};
use crate::models::verification::{journey_checksum, VerificationRequest};
use crate::models::wallet::{Payout, PayoutPayload, PayoutRequest, WalletBalance};

/// Client for the EV owner service: journeys, wallet, payouts.
#[derive(Clone)]
pub struct OwnerClient {
    inner: ServiceClient,
}

impl OwnerClient {
    pub fn new(inner: ServiceClient) -> Self {
        Self { inner }
    }

    /// Submit a journey for CVA verification. The checksum is computed over the
    /// session's owner id so the CVA queue can detect altered submissions.
    pub async fn submit_journey(&self, submission: &JourneySubmission) -> Result<VerificationRequest> {
        submission.validate()?;
        let owner_id = self.inner.session().subject().await?;
        let checksum = journey_checksum(
            &owner_id,
            &submission.trip_id,
            submission.distance_km,
            submission.energy_kwh,
        );
        let payload = JourneyPayload { submission, checksum };
        let created: VerificationRequest = self.inner.post(&["api", "journeys"], &payload, None).await?;
        created.validate()?;
        tracing::info!(trip_id = %created.trip_id, request_id = %created.id, "journey submitted for verification");
        Ok(created)
    }

    pub async fn list_journeys(&self, page: PageRequest) -> Result<Page<Journey>> {
        self.inner.get_with_query(&["api", "journeys"], &page).await
    }

    /// Balance exactly as the wallet service reports it.
    pub async fn get_wallet_balance(&self) -> Result<WalletBalance> {
        self.inner.get(&["api", "wallet", "balance"]).await
    }

    pub async fn request_payout(&self, ledger: &IdempotencyLedger, request: &PayoutRequest) -> Result<Payout> {
        if request.amount <= Decimal::ZERO {
            return Err(PortalError::Validation("payout amount must be positive".into()));
        }
        if request.bank_account_id.trim().is_empty() {
            return Err(PortalError::Validation("a bank account is required".into()));
        }
        let scope = format!("payout:{}", request.bank_account_id);
        let fingerprint = format!("{}:{}", request.amount.normalize(), request.currency);

        ledger
            .run(&scope, &fingerprint, |intent| async move {
                let payload = PayoutPayload {
                    request,
                    idempotency_key: intent.idempotency_key,
                };
                self.inner
                    .post(&["api", "payouts"], &payload, Some(CallIds::from(&intent)))
                    .await
            })
            .await
    }

    pub async fn list_payouts(&self, page: PageRequest) -> Result<Page<Payout>> {
        self.inner.get_with_query(&["api", "payouts"], &page).await
    }
}
