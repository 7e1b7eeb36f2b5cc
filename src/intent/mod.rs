//! Persisted idempotency intents.
//!
//! A mutation that must not be applied twice (a verification decision, a
//! purchase, a payout) gets its idempotency key and correlation id written to
//! an [`IntentStore`] *before* the first network attempt. Every later attempt
//! for the same scope and fingerprint, including one made by a fresh process
//! after a crash, reuses that pair. The intent is dropped once the backend
//! gives a definitive answer.

pub mod file;
pub mod memory;
pub mod redis_store;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{PortalError, Result};

pub use file::FileIntentStore;
pub use memory::MemoryIntentStore;
pub use redis_store::RedisIntentStore;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Intent {
    /// What the intent guards, e.g. `verification:vr-17`.
    pub scope: String,
    /// Digest of the decision inputs. A different decision on the same scope
    /// gets a fresh key.
    pub fingerprint: String,
    pub idempotency_key: Uuid,
    pub correlation_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub attempts: u32,
}

impl Intent {
    pub fn new(scope: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            fingerprint: fingerprint.into(),
            idempotency_key: Uuid::new_v4(),
            correlation_id: Uuid::new_v4(),
            created_at: Utc::now(),
            attempts: 0,
        }
    }
}

#[async_trait]
pub trait IntentStore: Send + Sync {
    async fn get(&self, scope: &str) -> anyhow::Result<Option<Intent>>;
    async fn put(&self, intent: &Intent) -> anyhow::Result<()>;
    /// Store `intent` only if its scope is free. Returns false when another
    /// caller got there first.
    async fn create(&self, intent: &Intent) -> anyhow::Result<bool>;
    async fn remove(&self, scope: &str) -> anyhow::Result<()>;
    async fn list(&self) -> anyhow::Result<Vec<Intent>>;
}

/// Drives the begin / call / settle cycle around an [`IntentStore`].
#[derive(Clone)]
pub struct IdempotencyLedger {
    store: Arc<dyn IntentStore>,
}

impl IdempotencyLedger {
    pub fn new(store: Arc<dyn IntentStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryIntentStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn IntentStore> {
        &self.store
    }

    /// Load the pending intent for `scope` or persist a new one.
    ///
    /// A new intent is created with [`IntentStore::create`], so two callers
    /// racing on the same scope and fingerprint end up sharing one key.
    pub async fn begin(&self, scope: &str, fingerprint: &str) -> Result<Intent> {
        let existing = self.store.get(scope).await.map_err(PortalError::Store)?;

        let mut intent = match existing {
            Some(intent) if intent.fingerprint == fingerprint => {
                tracing::info!(
                    scope,
                    idempotency_key = %intent.idempotency_key,
                    attempts = intent.attempts,
                    "resuming pending intent"
                );
                intent
            }
            Some(stale) => {
                tracing::info!(
                    scope,
                    old_key = %stale.idempotency_key,
                    "decision changed; replacing pending intent"
                );
                Intent::new(scope, fingerprint)
            }
            None => self.create(scope, fingerprint).await?,
        };
        intent.attempts += 1;

        self.store.put(&intent).await.map_err(PortalError::Store)?;
        Ok(intent)
    }

    async fn create(&self, scope: &str, fingerprint: &str) -> Result<Intent> {
        let fresh = Intent::new(scope, fingerprint);
        if self.store.create(&fresh).await.map_err(PortalError::Store)? {
            return Ok(fresh);
        }
        match self.store.get(scope).await.map_err(PortalError::Store)? {
            Some(winner) if winner.fingerprint == fingerprint => {
                tracing::info!(
                    scope,
                    idempotency_key = %winner.idempotency_key,
                    "intent created concurrently; sharing its key"
                );
                Ok(winner)
            }
            _ => Ok(fresh),
        }
    }

    /// Keep the intent only if the outcome says the same call may be retried.
    pub async fn settle<T>(&self, intent: &Intent, outcome: &Result<T>) -> Result<()> {
        let keep = matches!(outcome, Err(e) if e.is_retryable());
        if keep {
            tracing::warn!(
                scope = %intent.scope,
                idempotency_key = %intent.idempotency_key,
                "attempt failed; intent kept for retry"
            );
            return Ok(());
        }
        self.store
            .remove(&intent.scope)
            .await
            .map_err(PortalError::Store)
    }

    /// Run `call` under the intent for `scope`.
    pub async fn run<T, F, Fut>(&self, scope: &str, fingerprint: &str, call: F) -> Result<T>
    where
        F: FnOnce(Intent) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let intent = self.begin(scope, fingerprint).await?;
        let outcome = call(intent.clone()).await;
        self.settle(&intent, &outcome).await?;
        outcome
    }

    pub async fn pending(&self) -> Result<Vec<Intent>> {
        let mut intents = self.store.list().await.map_err(PortalError::Store)?;
        intents.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(intents)
    }

    pub async fn discard(&self, scope: &str) -> Result<()> {
        self.store.remove(scope).await.map_err(PortalError::Store)
    }
}
