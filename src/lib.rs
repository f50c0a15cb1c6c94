// ============================================================================
// Cluster Configuration Coordinator Library
// ============================================================================
//
// Applies replication and storage configuration, and maintains the process
// exclusion list, in the system keyspace of a transactional key-value store.
//
// ============================================================================

pub mod admin;
pub mod configuration;
pub mod connection;
pub mod core;
pub mod storage;
pub mod transaction;

// Re-export main types for convenience
pub use admin::{
    AdminClient, ApplyReport, DatabaseConfigurator, ExclusionManager, MockAdminClient,
    MockAdminClientRegistry, RealAdminClient,
};
pub use configuration::{DatabaseConfiguration, ReplicationMode, ReplicationPolicy, StorageEngine};
pub use connection::{AdminClientConfig, ApplyRetryPolicy, ClusterSpec, Connector, MemoryConnector};
pub use crate::core::{AdminError, KeyRange, KeyValue, Result, StoreError, StoreResult};
pub use storage::{MemoryStore, MemoryStoreOptions};
pub use transaction::{Database, Transaction, TransactionOption};
