use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{Intent, IntentStore};

const KEY_PREFIX: &str = "carbon-portal:intent:";

/// Intents shared by every operator console pointed at the same Redis.
/// Entries expire after `ttl_secs` so abandoned intents do not pile up.
#[derive(Clone)]
pub struct RedisIntentStore {
    redis: ConnectionManager,
    ttl_secs: u64,
}

impl RedisIntentStore {
    pub async fn connect(url: &str, ttl_secs: u64) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let redis = ConnectionManager::new(client).await?;
        Ok(Self { redis, ttl_secs })
    }

    fn key(scope: &str) -> String {
        format!("{}{}", KEY_PREFIX, scope)
    }
}

#[async_trait]
impl IntentStore for RedisIntentStore {
    async fn get(&self, scope: &str) -> anyhow::Result<Option<Intent>> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = conn.get(Self::key(scope)).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, intent: &Intent) -> anyhow::Result<()> {
        let json = serde_json::to_string(intent)?;
        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(Self::key(&intent.scope), json, self.ttl_secs)
            .await?;
        Ok(())
    }

    async fn create(&self, intent: &Intent) -> anyhow::Result<bool> {
        let json = serde_json::to_string(intent)?;
        let mut conn = self.redis.clone();
        let created: Option<String> = redis::cmd("SET")
            .arg(Self::key(&intent.scope))
            .arg(json)
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(&mut conn)
            .await?;
        Ok(created.is_some())
    }

    async fn remove(&self, scope: &str) -> anyhow::Result<()> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(Self::key(scope)).await?;
        Ok(())
    }

    async fn list(&self) -> anyhow::Result<Vec<Intent>> {
        let mut conn = self.redis.clone();
        let keys: Vec<String> = {
            let mut iter = conn.scan_match::<_, String>(format!("{}*", KEY_PREFIX)).await?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };
        let mut intents = Vec::with_capacity(keys.len());
        for key in keys {
            let raw: Option<String> = conn.get(&key).await?;
            if let Some(json) = raw {
                match serde_json::from_str::<Intent>(&json) {
                    Ok(intent) => intents.push(intent),
                    Err(e) => tracing::warn!(key = %key, error = %e, "skipping unreadable intent"),
                }
            }
        }
        Ok(intents)
    }
}
