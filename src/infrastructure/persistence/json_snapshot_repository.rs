use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::domain::error::SnapshotError;
use crate::domain::models::{PersistenceConfig, ScopeSnapshot};
use crate::domain::ports::SnapshotRepository;

/// Snapshot repository backed by a single JSON document.
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// crash mid-write leaves the previous document intact.
#[derive(Debug, Clone)]
pub struct JsonSnapshotRepository {
    path: PathBuf,
    retention: Option<Duration>,
}

impl JsonSnapshotRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            retention: None,
        }
    }

    pub fn from_config(config: &PersistenceConfig) -> Self {
        Self::new(config.snapshot_path.clone()).with_retention_days(config.retention_days)
    }

    /// Drop finished scopes older than `days` on every save (0 keeps all).
    #[must_use]
    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention = (days > 0).then(|| Duration::days(i64::from(days)));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotRepository for JsonSnapshotRepository {
    async fn save(&self, snapshot: &ScopeSnapshot) -> Result<(), SnapshotError> {
        let json = match self.retention {
            Some(retention) => {
                let mut pruned = snapshot.clone();
                let dropped = pruned.prune_completed_before(Utc::now() - retention);
                if dropped > 0 {
                    info!(dropped, "pruned finished scopes past retention");
                }
                serde_json::to_vec_pretty(&pruned)?
            }
            None => serde_json::to_vec_pretty(snapshot)?,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, &json).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        debug!(path = %self.path.display(), bytes = json.len(), "snapshot written");
        Ok(())
    }

    async fn load(&self) -> Result<ScopeSnapshot, SnapshotError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no snapshot yet, starting empty");
                Ok(ScopeSnapshot::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{FinalStatus, Scope, ScopeKind};
    use std::collections::BTreeMap;

    fn scope(kind: ScopeKind, id: &str) -> Scope {
        Scope::new(kind, id, None, BTreeMap::new(), Utc::now())
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonSnapshotRepository::new(dir.path().join("nested/scopes.json"));

        let snapshot = ScopeSnapshot::new(vec![scope(ScopeKind::Prd, "p1")], Utc::now());
        repo.save(&snapshot).await.unwrap();

        let loaded = repo.load().await.unwrap();
        assert_eq!(loaded, snapshot);
        assert!(!repo.temp_path().exists(), "temp file must be renamed away");
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonSnapshotRepository::new(dir.path().join("absent.json"));
        assert!(repo.load().await.unwrap().scopes.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scopes.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let err = JsonSnapshotRepository::new(&path).load().await.unwrap_err();
        assert!(matches!(err, SnapshotError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_retention_prunes_on_save() {
        let dir = tempfile::tempdir().unwrap();
        let repo =
            JsonSnapshotRepository::new(dir.path().join("scopes.json")).with_retention_days(7);

        let mut old = scope(ScopeKind::Task, "old");
        old.complete(FinalStatus::Completed, Utc::now() - Duration::days(10));
        let open = scope(ScopeKind::Task, "open");
        let snapshot = ScopeSnapshot::new(vec![old, open], Utc::now());

        repo.save(&snapshot).await.unwrap();
        let loaded = repo.load().await.unwrap();
        assert!(loaded.find(ScopeKind::Task, "old").is_none());
        assert!(loaded.find(ScopeKind::Task, "open").is_some());
        // The caller's snapshot is untouched
        assert_eq!(snapshot.scopes.len(), 2);
    }

    #[test]
    fn test_from_config() {
        let config = PersistenceConfig {
            retention_days: 3,
            ..PersistenceConfig::default()
        };
        let repo = JsonSnapshotRepository::from_config(&config);
        assert_eq!(repo.path(), Path::new(".overwatch/scopes.json"));
        assert_eq!(repo.retention, Some(Duration::days(3)));
    }
}
