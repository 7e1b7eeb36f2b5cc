use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{Intent, IntentStore};

/// Process-local store. Intents do not survive a restart.
#[derive(Clone, Default)]
pub struct MemoryIntentStore {
    intents: Arc<DashMap<String, Intent>>,
}

impl MemoryIntentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }
}

#[async_trait]
impl IntentStore for MemoryIntentStore {
    async fn get(&self, scope: &str) -> anyhow::Result<Option<Intent>> {
        Ok(self.intents.get(scope).map(|e| e.value().clone()))
    }

    async fn put(&self, intent: &Intent) -> anyhow::Result<()> {
        self.intents.insert(intent.scope.clone(), intent.clone());
        Ok(())
    }

    async fn create(&self, intent: &Intent) -> anyhow::Result<bool> {
        match self.intents.entry(intent.scope.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(intent.clone());
                Ok(true)
            }
        }
    }

    async fn remove(&self, scope: &str) -> anyhow::Result<()> {
        self.intents.remove(scope);
        Ok(())
    }

    async fn list(&self) -> anyhow::Result<Vec<Intent>> {
        Ok(self.intents.iter().map(|e| e.value().clone()).collect())
    }
}
