use crate::domain::error::SnapshotError;
use crate::domain::models::ScopeSnapshot;
use async_trait::async_trait;

/// Repository port for durable scope snapshots
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Replace the persisted snapshot atomically
    async fn save(&self, snapshot: &ScopeSnapshot) -> Result<(), SnapshotError>;

    /// Load the persisted snapshot; an absent document is an empty snapshot
    async fn load(&self) -> Result<ScopeSnapshot, SnapshotError>;
}
