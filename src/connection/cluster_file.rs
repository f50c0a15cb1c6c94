use crate::core::{AdminError, Result, StoreError, StoreResult, codes};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{Level, event};

/// Identity of a cluster and the descriptor used to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub name: String,
    pub connection_string: String,
}

impl ClusterSpec {
    pub fn new(name: impl Into<String>, connection_string: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connection_string: connection_string.into(),
        }
    }
}

/// A parsed connection string: `description:id@host:port[,host:port...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub description: String,
    pub id: String,
    pub coordinators: Vec<String>,
}

impl ConnectionString {
    pub fn parse(text: &str) -> StoreResult<Self> {
        let invalid = || StoreError::from_code(codes::CONNECTION_STRING_INVALID);
        let text = text.trim();

        let (cluster, coordinators) = text.split_once('@').ok_or_else(invalid)?;
        let (description, id) = cluster.split_once(':').ok_or_else(invalid)?;
        let valid_token = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_token(description) || !valid_token(id) {
            return Err(invalid());
        }

        let coordinators: Vec<String> = coordinators.split(',').map(str::to_string).collect();
        for coordinator in &coordinators {
            let (host, port) = coordinator.rsplit_once(':').ok_or_else(invalid)?;
            if host.is_empty() || port.parse::<u16>().is_err() {
                return Err(invalid());
            }
        }

        Ok(Self {
            description: description.to_string(),
            id: id.to_string(),
            coordinators,
        })
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}@{}",
            self.description,
            self.id,
            self.coordinators.join(",")
        )
    }
}

/// `<dir>/<cluster-name>.cluster`
pub fn cluster_file_path(dir: &Path, cluster_name: &str) -> PathBuf {
    dir.join(format!("{}.cluster", cluster_name))
}

/// Persists the cluster's connection string and returns the file's path.
pub async fn write_cluster_file(dir: &Path, cluster: &ClusterSpec) -> Result<PathBuf> {
    if cluster.name.trim().is_empty() || cluster.name.contains(['/', '\\']) {
        return Err(AdminError::Configuration(format!(
            "invalid cluster name '{}'",
            cluster.name
        )));
    }
    tokio::fs::create_dir_all(dir).await?;
    let path = cluster_file_path(dir, &cluster.name);
    tokio::fs::write(&path, cluster.connection_string.as_bytes()).await?;
    event!(Level::DEBUG, path = %path.display(), cluster = %cluster.name, "cluster file written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_connection_string() {
        let parsed = ConnectionString::parse("sample:abc123@10.1.0.1:4500,10.1.0.2:4500").unwrap();
        assert_eq!(parsed.description, "sample");
        assert_eq!(parsed.id, "abc123");
        assert_eq!(parsed.coordinators, vec!["10.1.0.1:4500", "10.1.0.2:4500"]);
        assert_eq!(parsed.to_string(), "sample:abc123@10.1.0.1:4500,10.1.0.2:4500");
    }

    #[test]
    fn test_invalid_connection_strings() {
        for text in [
            "",
            "sample@10.1.0.1:4500",
            "sample:abc",
            "sample:abc@10.1.0.1",
            "sample:abc@10.1.0.1:notaport",
            "sam ple:abc@10.1.0.1:4500",
        ] {
            let err = ConnectionString::parse(text).unwrap_err();
            assert_eq!(err.code, codes::CONNECTION_STRING_INVALID, "{}", text);
        }
    }

    #[test]
    fn test_cluster_file_path() {
        assert_eq!(
            cluster_file_path(Path::new("/tmp/fdb"), "prod"),
            PathBuf::from("/tmp/fdb/prod.cluster")
        );
    }

    #[tokio::test]
    async fn test_write_cluster_file() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("fdb");
        let cluster = ClusterSpec::new("prod", "prod:xyz@127.0.0.1:4501");
        let path = write_cluster_file(&nested, &cluster).await.unwrap();
        assert_eq!(
            tokio::fs::read_to_string(&path).await.unwrap(),
            "prod:xyz@127.0.0.1:4501"
        );

        let bad = ClusterSpec::new("../escape", "prod:xyz@127.0.0.1:4501");
        assert!(write_cluster_file(&nested, &bad).await.is_err());
    }
}
