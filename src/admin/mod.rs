// ============================================================================
// Cluster Administration
// ============================================================================
//
// The operations a cluster operator runs against the system keyspace:
// applying the database configuration and maintaining the process exclusion
// list. `RealAdminClient` drives a live store; `MockAdminClient` records
// calls for tests of the code that drives the coordinator.
//
// ============================================================================

pub mod configurator;
pub mod exclusion;
pub mod mock;
pub mod real;

use crate::configuration::DatabaseConfiguration;
use crate::core::Result;
use async_trait::async_trait;

pub use configurator::{ApplyReport, AttemptToken, DatabaseConfigurator};
pub use exclusion::{
    EXCLUDED_KEY, EXCLUDED_PREFIX, EXCLUSION_PAGE_SIZE, ExclusionManager, exclusion_key,
    exclusion_port_range, is_covered,
};
pub use mock::{MockAdminClient, MockAdminClientRegistry, MockAdminState};
pub use real::RealAdminClient;

/// Administrative operations on one cluster.
#[async_trait]
pub trait AdminClient: Send + Sync {
    /// Writes `configuration` to the system keyspace. See
    /// [`DatabaseConfigurator::apply`] for the `new_database` semantics.
    async fn configure_database(
        &self,
        configuration: &DatabaseConfiguration,
        new_database: bool,
    ) -> Result<()>;

    async fn exclude_instances(&self, addresses: &[String]) -> Result<()>;

    async fn include_instances(&self, addresses: &[String]) -> Result<()>;

    /// Returns the subset of `addresses` that cannot be removed yet because
    /// no exclusion covers them. An empty result means all are safe.
    async fn can_safely_remove(&self, addresses: &[String]) -> Result<Vec<String>>;
}
