use crate::core::{AdminError, Result};
use crate::storage::MemoryStoreOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Bounds on the configure-database retry loop.
///
/// With both limits unset the loop keeps retrying for as long as the store
/// classifies failures as retryable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyRetryPolicy {
    /// Maximum number of attempts, counting the first one.
    pub max_attempts: Option<u32>,

    /// Stop retrying once this much time has passed since the first attempt.
    pub max_elapsed_ms: Option<u64>,
}

impl ApplyRetryPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn max_elapsed(mut self, elapsed: Duration) -> Self {
        self.max_elapsed_ms = Some(elapsed.as_millis() as u64);
        self
    }

    pub fn is_bounded(&self) -> bool {
        self.max_attempts.is_some() || self.max_elapsed_ms.is_some()
    }

    /// Whether another attempt is forbidden after `attempts` have run.
    pub fn is_exhausted(&self, attempts: u32, elapsed: Duration) -> bool {
        let over_attempts = self.max_attempts.is_some_and(|max| attempts >= max);
        let over_time = self
            .max_elapsed_ms
            .is_some_and(|max| elapsed >= Duration::from_millis(max));
        over_attempts || over_time
    }
}

/// Admin client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminClientConfig {
    /// Directory the cluster file is written to before opening the store.
    pub cluster_file_dir: PathBuf,

    /// Retry bounds for configuring the database.
    pub retry: ApplyRetryPolicy,

    /// Backoff used by in-memory stores opened through a `MemoryConnector`.
    pub memory_store: MemoryStoreOptions,
}

impl Default for AdminClientConfig {
    fn default() -> Self {
        Self {
            cluster_file_dir: PathBuf::from("/tmp/fdb"),
            retry: ApplyRetryPolicy::default(),
            memory_store: MemoryStoreOptions::default(),
        }
    }
}

impl AdminClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cluster file directory
    pub fn cluster_file_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cluster_file_dir = dir.into();
        self
    }

    /// Set the retry policy
    pub fn retry(mut self, retry: ApplyRetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn memory_store(mut self, options: MemoryStoreOptions) -> Self {
        self.memory_store = options;
        self
    }

    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|err| AdminError::Configuration(format!("invalid admin config: {}", err)))?;
        config.validate()?;
        Ok(config)
    }

    pub async fn from_json_file(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.cluster_file_dir.as_os_str().is_empty() {
            return Err(AdminError::Configuration(
                "cluster_file_dir cannot be empty".to_string(),
            ));
        }
        if self.retry.max_attempts == Some(0) {
            return Err(AdminError::Configuration(
                "retry.max_attempts must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AdminClientConfig::default();
        assert_eq!(config.cluster_file_dir, PathBuf::from("/tmp/fdb"));
        assert!(!config.retry.is_bounded());
    }

    #[test]
    fn test_builder_pattern() {
        let config = AdminClientConfig::new()
            .cluster_file_dir("/var/run/fdb")
            .retry(ApplyRetryPolicy::unbounded().max_attempts(5));

        assert_eq!(config.cluster_file_dir, PathBuf::from("/var/run/fdb"));
        assert_eq!(config.retry.max_attempts, Some(5));
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            AdminClientConfig::from_json(r#"{"retry":{"max_elapsed_ms":2500}}"#).unwrap();
        assert_eq!(config.cluster_file_dir, PathBuf::from("/tmp/fdb"));
        assert_eq!(config.retry.max_elapsed_ms, Some(2500));
        assert_eq!(config.retry.max_attempts, None);
    }

    #[test]
    fn test_invalid_json_and_values() {
        assert!(matches!(
            AdminClientConfig::from_json("{not json"),
            Err(AdminError::Configuration(_))
        ));
        assert!(AdminClientConfig::from_json(r#"{"retry":{"max_attempts":0}}"#).is_err());
        assert!(AdminClientConfig::from_json(r#"{"cluster_file_dir":""}"#).is_err());
    }

    #[test]
    fn test_retry_exhaustion() {
        let unbounded = ApplyRetryPolicy::unbounded();
        assert!(!unbounded.is_exhausted(10_000, Duration::from_secs(3600)));

        let by_attempts = ApplyRetryPolicy::unbounded().max_attempts(3);
        assert!(!by_attempts.is_exhausted(2, Duration::ZERO));
        assert!(by_attempts.is_exhausted(3, Duration::ZERO));

        let by_time = ApplyRetryPolicy::unbounded().max_elapsed(Duration::from_millis(50));
        assert!(!by_time.is_exhausted(1, Duration::from_millis(10)));
        assert!(by_time.is_exhausted(1, Duration::from_millis(50)));
    }
}
