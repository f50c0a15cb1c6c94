// ============================================================================
// Database Configuration
// ============================================================================
//
// Turns a desired replication mode and storage engine into the system keys
// the store reads its configuration from.
//
// ============================================================================

pub mod keys;
pub mod policy;

pub use keys::{
    DatabaseConfiguration, INIT_ID_KEY, INITIALIZED_KEY, LOG_ANTI_QUORUM_KEY, LOG_ENGINE_KEY,
    LOG_REPLICAS_KEY, LOG_REPLICATION_POLICY_KEY, ReplicationMode, STORAGE_ENGINE_KEY,
    STORAGE_REPLICAS_KEY, STORAGE_REPLICATION_POLICY_KEY, StorageEngine, build_keys,
};
pub use policy::{CONFIGURATION_PROTOCOL_VERSION, ReplicationPolicy};
