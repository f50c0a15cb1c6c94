pub mod cluster_file;
pub mod config;

use crate::core::{StoreError, StoreResult, codes};
use crate::storage::{MemoryStore, MemoryStoreOptions};
use crate::transaction::Database;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

pub use cluster_file::{ClusterSpec, ConnectionString, cluster_file_path, write_cluster_file};
pub use config::{AdminClientConfig, ApplyRetryPolicy};

/// Opens a store handle from a cluster file.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, cluster_file: &Path) -> StoreResult<Arc<dyn Database>>;
}

/// Connector that resolves each distinct connection string to a shared
/// [`MemoryStore`].
///
/// Opening two cluster files with the same connection string yields two
/// handles on the same store, the way two clients of one cluster share its
/// data.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    stores: Arc<Mutex<HashMap<String, MemoryStore>>>,
    options: MemoryStoreOptions,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: MemoryStoreOptions) -> Self {
        Self {
            stores: Arc::default(),
            options,
        }
    }

    /// The store behind `connection_string`, created on first use.
    pub async fn store_for(&self, connection_string: &str) -> StoreResult<MemoryStore> {
        let parsed = ConnectionString::parse(connection_string)?;
        let mut stores = self.stores.lock().await;
        let store = stores
            .entry(parsed.to_string())
            .or_insert_with(|| MemoryStore::with_options(self.options.clone()));
        Ok(store.clone())
    }

    /// Drops every store this connector has handed out.
    pub async fn clear(&self) {
        self.stores.lock().await.clear();
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, cluster_file: &Path) -> StoreResult<Arc<dyn Database>> {
        let connection_string = tokio::fs::read_to_string(cluster_file)
            .await
            .map_err(|err| {
                StoreError::new(
                    codes::FILE_NOT_FOUND,
                    format!("{}: {}", cluster_file.display(), err),
                )
            })?;
        let store = self.store_for(&connection_string).await?;
        Ok(Arc::new(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_connection_string_shares_store() {
        let connector = MemoryConnector::new();
        let a = connector.store_for("c:1@127.0.0.1:4500").await.unwrap();
        let b = connector.store_for(" c:1@127.0.0.1:4500\n").await.unwrap();
        let other = connector.store_for("c:2@127.0.0.1:4500").await.unwrap();

        a.insert(b"k", b"v");
        assert_eq!(b.read(b"k"), Some(b"v".to_vec()));
        assert_eq!(other.read(b"k"), None);
    }

    #[tokio::test]
    async fn test_open_missing_cluster_file() {
        let dir = tempfile::tempdir().unwrap();
        let connector = MemoryConnector::new();
        let err = connector
            .open(&dir.path().join("missing.cluster"))
            .await
            .err()
            .unwrap();
        assert_eq!(err.code, codes::FILE_NOT_FOUND);
    }
}
