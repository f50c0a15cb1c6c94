use super::AdminClient;
use super::exclusion::is_covered;
use crate::configuration::DatabaseConfiguration;
use crate::connection::ClusterSpec;
use crate::core::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Everything a [`MockAdminClient`] has been told.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockAdminState {
    pub database_configuration: Option<DatabaseConfiguration>,
    pub excluded_addresses: Vec<String>,
    pub reincluded_addresses: Vec<String>,
}

/// An in-memory admin client for tests of code that drives the coordinator.
///
/// Clones share state, and the registry hands out the same client for the
/// same cluster name until it is cleared.
#[derive(Clone)]
pub struct MockAdminClient {
    cluster: ClusterSpec,
    state: Arc<Mutex<MockAdminState>>,
}

impl MockAdminClient {
    pub fn new(cluster: ClusterSpec) -> Self {
        Self {
            cluster,
            state: Arc::default(),
        }
    }

    pub fn cluster(&self) -> &ClusterSpec {
        &self.cluster
    }

    pub async fn snapshot(&self) -> MockAdminState {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl AdminClient for MockAdminClient {
    async fn configure_database(
        &self,
        configuration: &DatabaseConfiguration,
        _new_database: bool,
    ) -> Result<()> {
        configuration.configuration_keys()?;
        self.state.lock().await.database_configuration = Some(configuration.clone());
        Ok(())
    }

    async fn exclude_instances(&self, addresses: &[String]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.excluded_addresses.extend_from_slice(addresses);
        Ok(())
    }

    async fn include_instances(&self, addresses: &[String]) -> Result<()> {
        let mut state = self.state.lock().await;
        let MockAdminState {
            excluded_addresses,
            reincluded_addresses,
            ..
        } = &mut *state;
        excluded_addresses.retain(|excluded| {
            if addresses.contains(excluded) {
                reincluded_addresses.push(excluded.clone());
                false
            } else {
                true
            }
        });
        Ok(())
    }

    async fn can_safely_remove(&self, addresses: &[String]) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        Ok(addresses
            .iter()
            .filter(|address| !is_covered(address, &state.excluded_addresses))
            .cloned()
            .collect())
    }
}

/// Mock clients keyed by cluster name.
#[derive(Clone, Default)]
pub struct MockAdminClientRegistry {
    clients: Arc<Mutex<HashMap<String, MockAdminClient>>>,
}

impl MockAdminClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The client for `cluster`, created on first request.
    pub async fn client_for(&self, cluster: &ClusterSpec) -> MockAdminClient {
        let mut clients = self.clients.lock().await;
        clients
            .entry(cluster.name.clone())
            .or_insert_with(|| MockAdminClient::new(cluster.clone()))
            .clone()
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Forgets every client handed out so far.
    pub async fn clear(&self) {
        self.clients.lock().await.clear();
    }
}
