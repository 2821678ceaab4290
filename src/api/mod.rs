//! Clients of the cluster orchestration and report storage API.

pub mod client;

use async_trait::async_trait;

use crate::models::WorkloadReport;
use crate::Result;

pub use client::ClusterClient;

/// Component name of a storage node.
pub const STORE_COMPONENT: &str = "tikv";

/// Allocates hosts and adds components to the cluster.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// First host not yet serving `component`.
    async fn available_resource_id(&self, component: &str) -> Result<u64>;

    async fn scale_out(&self, component: &str, id: u64) -> Result<()>;

    /// Adds one storage node on the first available host.
    async fn add_store(&self) -> Result<()> {
        let id = self.available_resource_id(STORE_COMPONENT).await?;
        self.scale_out(STORE_COMPONENT, id).await
    }
}

/// Keeps the reports of past runs.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Most recent stored report, if any.
    async fn last_report(&self) -> Result<Option<WorkloadReport>>;

    async fn send_report(&self, data: &str, plaintext: &str) -> Result<()>;
}
