use rust_decimal::Decimal;

use super::{CallIds, ServiceClient};
use crate::errors::{PortalError, Result};
use crate::intent::IdempotencyLedger;
use crate::models::listing::{Bid, BidPayload, Listing, ListingQuery, PurchasePayload};
use crate::models::page::{Page, PageRequest};
use crate::models::transaction::TransactionDetail;

/// Client for the buyer marketplace service.
#[derive(Clone)]
pub struct BuyerClient {
    inner: ServiceClient,
}

impl BuyerClient {
    pub fn new(inner: ServiceClient) -> Self {
        Self { inner }
    }

    pub async fn list_listings(&self, query: &ListingQuery) -> Result<Page<Listing>> {
        self.inner.get_with_query(&["api", "listings"], query).await
    }

    pub async fn get_listing(&self, id: &str) -> Result<Listing> {
        self.inner.get(&["api", "listings", id]).await
    }

    /// Buy `quantity` tCO2 from a fixed-price listing, at most once per
    /// pending intent.
    pub async fn purchase(
        &self,
        ledger: &IdempotencyLedger,
        listing_id: &str,
        quantity: f64,
    ) -> Result<TransactionDetail> {
        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(PortalError::Validation("quantity must be positive".into()));
        }
        let scope = format!("purchase:{}", listing_id);
        let fingerprint = format!("{:.6}", quantity);

        let tx: TransactionDetail = ledger
            .run(&scope, &fingerprint, |intent| async move {
                let payload = PurchasePayload {
                    listing_id,
                    quantity,
                    idempotency_key: intent.idempotency_key,
                };
                self.inner
                    .post(&["api", "purchases"], &payload, Some(CallIds::from(&intent)))
                    .await
            })
            .await?;
        tracing::info!(listing_id, transaction_id = %tx.id, "purchase recorded");
        Ok(tx)
    }

    pub async fn place_bid(&self, listing_id: &str, amount: Decimal) -> Result<Bid> {
        if amount <= Decimal::ZERO {
            return Err(PortalError::Validation("bid amount must be positive".into()));
        }
        self.inner
            .post(&["api", "listings", listing_id, "bids"], &BidPayload { amount }, None)
            .await
    }

    pub async fn list_transactions(&self, page: PageRequest) -> Result<Page<TransactionDetail>> {
        self.inner.get_with_query(&["api", "transactions"], &page).await
    }

    pub async fn get_transaction(&self, id: &str) -> Result<TransactionDetail> {
        self.inner.get(&["api", "transactions", id]).await
    }
}
