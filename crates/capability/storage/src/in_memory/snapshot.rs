use crate::error::StorageError;
use crate::models::{GatewaySnapshot, RawSnapshot};
use crate::traits::SnapshotStore;
use std::sync::RwLock;

/// 快照内存存储，按与文件存储相同的原始形式保存。
pub struct InMemorySnapshotStore {
    snapshot: RwLock<Option<RawSnapshot>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(None),
        }
    }

    pub fn with_snapshot(snapshot: RawSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(Some(snapshot)),
        }
    }
}

impl Default for InMemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn load(&self) -> Result<Option<RawSnapshot>, StorageError> {
        let snapshot = self
            .snapshot
            .read()
            .map_err(|_| StorageError::Lock("snapshot"))?;
        Ok(snapshot.clone())
    }

    async fn save(&self, snapshot: &GatewaySnapshot) -> Result<(), StorageError> {
        let raw = snapshot.to_raw()?;
        let mut slot = self
            .snapshot
            .write()
            .map_err(|_| StorageError::Lock("snapshot"))?;
        *slot = Some(raw);
        Ok(())
    }
}
