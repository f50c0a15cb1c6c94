use super::configurator::{ApplyReport, DatabaseConfigurator};
use super::exclusion::ExclusionManager;
use super::AdminClient;
use crate::configuration::DatabaseConfiguration;
use crate::connection::{AdminClientConfig, ClusterSpec, Connector, write_cluster_file};
use crate::core::Result;
use crate::transaction::Database;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{Level, event};

/// Admin client backed by a live store handle.
pub struct RealAdminClient {
    cluster: ClusterSpec,
    configurator: DatabaseConfigurator,
    exclusions: ExclusionManager,
}

impl RealAdminClient {
    /// Writes the cluster file under `config.cluster_file_dir` and opens the
    /// store through `connector`.
    pub async fn connect(
        cluster: &ClusterSpec,
        config: &AdminClientConfig,
        connector: &dyn Connector,
    ) -> Result<Self> {
        config.validate()?;
        let cluster_file = write_cluster_file(&config.cluster_file_dir, cluster).await?;
        let database = connector.open(&cluster_file).await?;
        event!(Level::INFO, cluster = %cluster.name, path = %cluster_file.display(), "opened cluster database");
        Ok(Self::with_database(cluster.clone(), database, config))
    }

    pub fn with_database(
        cluster: ClusterSpec,
        database: Arc<dyn Database>,
        config: &AdminClientConfig,
    ) -> Self {
        Self {
            cluster,
            configurator: DatabaseConfigurator::with_retry(database.clone(), config.retry.clone()),
            exclusions: ExclusionManager::new(database),
        }
    }

    pub fn cluster(&self) -> &ClusterSpec {
        &self.cluster
    }

    /// Like [`AdminClient::configure_database`], reporting how the apply went.
    pub async fn configure_database_with_report(
        &self,
        configuration: &DatabaseConfiguration,
        new_database: bool,
    ) -> Result<ApplyReport> {
        self.configurator.apply(configuration, new_database).await
    }

    pub async fn excluded_addresses(&self) -> Result<Vec<String>> {
        self.exclusions.excluded_addresses().await
    }
}

#[async_trait]
impl AdminClient for RealAdminClient {
    async fn configure_database(
        &self,
        configuration: &DatabaseConfiguration,
        new_database: bool,
    ) -> Result<()> {
        self.configurator
            .apply(configuration, new_database)
            .await
            .map(|_| ())
    }

    async fn exclude_instances(&self, addresses: &[String]) -> Result<()> {
        self.exclusions.exclude(addresses).await
    }

    async fn include_instances(&self, addresses: &[String]) -> Result<()> {
        self.exclusions.include(addresses).await
    }

    async fn can_safely_remove(&self, addresses: &[String]) -> Result<Vec<String>> {
        self.exclusions.unsafe_to_remove(addresses).await
    }
}
