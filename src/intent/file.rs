use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{Intent, IntentStore};

/// One JSON file per intent, named by the SHA-256 of its scope.
///
/// Writes go to a temp file first and are renamed into place, so a crash
/// mid-write never leaves a truncated intent behind.
#[derive(Debug, Clone)]
pub struct FileIntentStore {
    dir: PathBuf,
}

impl FileIntentStore {
    pub async fn open(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("cannot create intent directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, scope: &str) -> PathBuf {
        let name = hex::encode(Sha256::digest(scope.as_bytes()));
        self.dir.join(format!("{}.json", name))
    }
}

#[async_trait]
impl IntentStore for FileIntentStore {
    async fn get(&self, scope: &str) -> anyhow::Result<Option<Intent>> {
        let path = self.path_for(scope);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let intent = serde_json::from_slice(&bytes)
                    .with_context(|| format!("corrupt intent file {}", path.display()))?;
                Ok(Some(intent))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("cannot read {}", path.display())),
        }
    }

    async fn put(&self, intent: &Intent) -> anyhow::Result<()> {
        let path = self.path_for(&intent.scope);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(intent)?;
        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("cannot write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("cannot move intent into {}", path.display()))?;
        Ok(())
    }

    /// Hard-linking a fully written temp file into place fails if the
    /// intent file already exists, so exactly one creator wins.
    async fn create(&self, intent: &Intent) -> anyhow::Result<bool> {
        let path = self.path_for(&intent.scope);
        let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        let bytes = serde_json::to_vec_pretty(intent)?;
        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("cannot write {}", tmp.display()))?;
        let linked = tokio::fs::hard_link(&tmp, &path).await;
        let _ = tokio::fs::remove_file(&tmp).await;
        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e).with_context(|| format!("cannot create {}", path.display())),
        }
    }

    async fn remove(&self, scope: &str) -> anyhow::Result<()> {
        let path = self.path_for(scope);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("cannot remove {}", path.display())),
        }
    }

    async fn list(&self) -> anyhow::Result<Vec<Intent>> {
        let mut intents = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<Intent>(&bytes) {
                Ok(intent) => intents.push(intent),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable intent file"),
            }
        }
        Ok(intents)
    }
}
