use super::policy::ReplicationPolicy;
use crate::core::{AdminError, KeyValue, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const STORAGE_REPLICAS_KEY: &[u8] = b"\xff/conf/storage_replicas";
pub const LOG_REPLICAS_KEY: &[u8] = b"\xff/conf/log_replicas";
pub const LOG_ANTI_QUORUM_KEY: &[u8] = b"\xff/conf/log_anti_quorum";
pub const STORAGE_REPLICATION_POLICY_KEY: &[u8] = b"\xff/conf/storage_replication_policy";
pub const LOG_REPLICATION_POLICY_KEY: &[u8] = b"\xff/conf/log_replication_policy";
pub const STORAGE_ENGINE_KEY: &[u8] = b"\xff/conf/storage_engine";
pub const LOG_ENGINE_KEY: &[u8] = b"\xff/conf/log_engine";

/// Marker holding the attempt token of the transaction that created the database.
pub const INIT_ID_KEY: &[u8] = b"\xff/init_id";
pub const INITIALIZED_KEY: &[u8] = b"\xff/conf/initialized";

const LOG_ANTI_QUORUM: &[u8] = b"0";
const ZONE_FIELD: &str = "zoneid";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicationMode {
    Single,
    Double,
    Triple,
}

impl ReplicationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicationMode::Single => "single",
            ReplicationMode::Double => "double",
            ReplicationMode::Triple => "triple",
        }
    }

    /// Replica count as stored in the replica keys.
    pub fn replicas(&self) -> &'static [u8] {
        match self {
            ReplicationMode::Single => b"1",
            ReplicationMode::Double => b"2",
            ReplicationMode::Triple => b"3",
        }
    }

    pub fn policy(&self) -> ReplicationPolicy {
        match self {
            ReplicationMode::Single => ReplicationPolicy::Singleton,
            ReplicationMode::Double => {
                ReplicationPolicy::across(2, ZONE_FIELD, ReplicationPolicy::Singleton)
            }
            ReplicationMode::Triple => {
                ReplicationPolicy::across(3, ZONE_FIELD, ReplicationPolicy::Singleton)
            }
        }
    }
}

impl FromStr for ReplicationMode {
    type Err = AdminError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "single" => Ok(ReplicationMode::Single),
            "double" => Ok(ReplicationMode::Double),
            "triple" => Ok(ReplicationMode::Triple),
            other => Err(AdminError::Configuration(format!(
                "unknown replication mode '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ReplicationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageEngine {
    Ssd,
    Memory,
}

impl StorageEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageEngine::Ssd => "ssd",
            StorageEngine::Memory => "memory",
        }
    }

    /// One-byte engine code stored in the engine keys.
    pub fn code(&self) -> &'static [u8] {
        match self {
            StorageEngine::Ssd => b"1",
            StorageEngine::Memory => b"2",
        }
    }
}

impl FromStr for StorageEngine {
    type Err = AdminError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ssd" => Ok(StorageEngine::Ssd),
            "memory" => Ok(StorageEngine::Memory),
            other => Err(AdminError::Configuration(format!(
                "unknown storage engine '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for StorageEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired database configuration, as received from the caller.
///
/// Both fields stay as text until [`build_keys`] validates them, so a
/// configuration read from a cluster spec or a config file can be rejected
/// with a [`AdminError::Configuration`] instead of failing to deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DatabaseConfiguration {
    pub replication_mode: String,
    pub storage_engine: String,
}

impl DatabaseConfiguration {
    pub fn new(replication_mode: impl Into<String>, storage_engine: impl Into<String>) -> Self {
        Self {
            replication_mode: replication_mode.into(),
            storage_engine: storage_engine.into(),
        }
    }

    pub fn replication_mode(&self) -> Result<ReplicationMode> {
        self.replication_mode.parse()
    }

    pub fn storage_engine(&self) -> Result<StorageEngine> {
        self.storage_engine.parse()
    }

    /// The system key-value pairs this configuration maps to.
    pub fn configuration_keys(&self) -> Result<Vec<KeyValue>> {
        build_keys(self)
    }
}

impl From<(ReplicationMode, StorageEngine)> for DatabaseConfiguration {
    fn from((mode, engine): (ReplicationMode, StorageEngine)) -> Self {
        Self::new(mode.as_str(), engine.as_str())
    }
}

impl fmt::Display for DatabaseConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.replication_mode, self.storage_engine)
    }
}

/// Maps a configuration to the seven system keys it controls.
///
/// Both the replication mode and the storage engine are validated before
/// anything is built; on error no pairs are returned.
pub fn build_keys(configuration: &DatabaseConfiguration) -> Result<Vec<KeyValue>> {
    let mode = configuration.replication_mode()?;
    let engine = configuration.storage_engine()?;

    let replicas = mode.replicas();
    let policy = mode.policy().versioned_bytes();

    Ok(vec![
        KeyValue::new(STORAGE_REPLICAS_KEY, replicas),
        KeyValue::new(LOG_REPLICAS_KEY, replicas),
        KeyValue::new(LOG_ANTI_QUORUM_KEY, LOG_ANTI_QUORUM),
        KeyValue::new(STORAGE_REPLICATION_POLICY_KEY, policy.clone()),
        KeyValue::new(LOG_REPLICATION_POLICY_KEY, policy),
        KeyValue::new(STORAGE_ENGINE_KEY, engine.code()),
        KeyValue::new(LOG_ENGINE_KEY, engine.code()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::CONFIGURATION_PROTOCOL_VERSION;

    fn value_for<'a>(keys: &'a [KeyValue], key: &[u8]) -> &'a [u8] {
        keys.iter()
            .find(|kv| kv.key == key)
            .map(|kv| kv.value.as_slice())
            .unwrap()
    }

    #[test]
    fn test_single_ssd_keys() {
        let keys = build_keys(&DatabaseConfiguration::new("single", "ssd")).unwrap();
        assert_eq!(keys.len(), 7);
        assert_eq!(value_for(&keys, STORAGE_REPLICAS_KEY), b"1");
        assert_eq!(value_for(&keys, LOG_REPLICAS_KEY), b"1");
        assert_eq!(value_for(&keys, LOG_ANTI_QUORUM_KEY), b"0");
        assert_eq!(
            value_for(&keys, STORAGE_REPLICATION_POLICY_KEY),
            b"\x01\x00\x04Q\xa5\x00\xdb\x0f\x03\x00\x00\x00One"
        );
        assert_eq!(value_for(&keys, STORAGE_ENGINE_KEY), b"1");
        assert_eq!(value_for(&keys, LOG_ENGINE_KEY), b"1");
    }

    #[test]
    fn test_double_memory_keys() {
        let keys = build_keys(&DatabaseConfiguration::new("double", "memory")).unwrap();
        let mut expected_policy = CONFIGURATION_PROTOCOL_VERSION.to_vec();
        expected_policy.extend_from_slice(
            b"\x06\x00\x00\x00Across\x06\x00\x00\x00zoneid\x02\x00\x00\x00\x03\x00\x00\x00One",
        );
        assert_eq!(value_for(&keys, STORAGE_REPLICAS_KEY), b"2");
        assert_eq!(
            value_for(&keys, LOG_REPLICATION_POLICY_KEY),
            expected_policy.as_slice()
        );
        assert_eq!(value_for(&keys, STORAGE_ENGINE_KEY), b"2");
    }

    #[test]
    fn test_key_order_is_fixed() {
        let keys = build_keys(&DatabaseConfiguration::new("triple", "ssd")).unwrap();
        let order: Vec<&[u8]> = keys.iter().map(|kv| kv.key.as_slice()).collect();
        assert_eq!(
            order,
            vec![
                STORAGE_REPLICAS_KEY,
                LOG_REPLICAS_KEY,
                LOG_ANTI_QUORUM_KEY,
                STORAGE_REPLICATION_POLICY_KEY,
                LOG_REPLICATION_POLICY_KEY,
                STORAGE_ENGINE_KEY,
                LOG_ENGINE_KEY,
            ]
        );
    }

    #[test]
    fn test_unknown_values_rejected() {
        let err = build_keys(&DatabaseConfiguration::new("quadruple", "ssd")).unwrap_err();
        assert!(matches!(err, AdminError::Configuration(msg) if msg.contains("replication mode")));

        let err = build_keys(&DatabaseConfiguration::new("double", "tape")).unwrap_err();
        assert!(matches!(err, AdminError::Configuration(msg) if msg.contains("storage engine")));
    }

    #[test]
    fn test_configuration_from_typed_parts() {
        let config = DatabaseConfiguration::from((ReplicationMode::Triple, StorageEngine::Memory));
        assert_eq!(config, DatabaseConfiguration::new("triple", "memory"));
        assert_eq!(config.to_string(), "triple memory");
    }

    #[test]
    fn test_configuration_deserializes_unknown_mode_as_text() {
        let config: DatabaseConfiguration =
            serde_json::from_str(r#"{"replication_mode":"five","storage_engine":"ssd"}"#).unwrap();
        assert!(config.configuration_keys().is_err());
    }
}
