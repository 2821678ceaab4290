use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use super::{Orchestrator, ReportStore};
use crate::models::{ResourceItem, WorkloadReport};
use crate::{BenchError, Result};

/// HTTP client of the cluster API, scoped to one cluster.
#[derive(Debug, Clone)]
pub struct ClusterClient {
    name: String,
    api: String,
    http: Client,
}

impl ClusterClient {
    pub fn new(name: &str, api: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            name: name.to_string(),
            api: api.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api, path)
    }

    fn resource_path(&self) -> String {
        format!("api/cluster/resource/{}", self.name)
    }

    fn scale_out_path(&self, id: u64, component: &str) -> String {
        format!("api/cluster/scale_out/{}/{}/{}", self.name, id, component)
    }

    fn results_path(&self) -> String {
        format!("api/cluster/workload/{}/result", self.name)
    }

    async fn check(resp: Response) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(BenchError::Api { status, body })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        debug!(url = %url, "GET");
        let resp = Self::check(self.http.get(&url).send().await?).await?;
        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl Orchestrator for ClusterClient {
    async fn available_resource_id(&self, component: &str) -> Result<u64> {
        let resources: Vec<ResourceItem> = self.get_json(&self.resource_path()).await?;
        resources
            .iter()
            .find(|r| r.is_available(component))
            .map(|r| r.id)
            .ok_or_else(|| BenchError::NoAvailableResource(component.to_string()))
    }

    async fn scale_out(&self, component: &str, id: u64) -> Result<()> {
        let url = self.url(&self.scale_out_path(id, component));
        info!(cluster = %self.name, component, resource_id = id, "Scaling out");
        Self::check(self.http.post(&url).send().await?).await?;
        Ok(())
    }
}

#[async_trait]
impl ReportStore for ClusterClient {
    async fn last_report(&self) -> Result<Option<WorkloadReport>> {
        let reports: Vec<WorkloadReport> = self.get_json(&self.results_path()).await?;
        Ok(reports.into_iter().next())
    }

    async fn send_report(&self, data: &str, plaintext: &str) -> Result<()> {
        let url = self.url(&self.results_path());
        info!(cluster = %self.name, "Sending report");
        let body = json!({
            "data": data,
            "plaintext": plaintext,
        });
        Self::check(self.http.post(&url).json(&body).send().await?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let client = ClusterClient::new("30126", "http://api:8000/", Duration::from_secs(10)).unwrap();
        assert_eq!(
            client.url(&client.resource_path()),
            "http://api:8000/api/cluster/resource/30126"
        );
        assert_eq!(
            client.scale_out_path(7, "tikv"),
            "api/cluster/scale_out/30126/7/tikv"
        );
        assert_eq!(client.results_path(), "api/cluster/workload/30126/result");
    }

    #[test]
    fn test_decode_resources() {
        let body = r#"[
            {"ID": 1, "item_id": 11, "status": "ready", "rr_id": 2, "r_id": 3, "components": "tidb|tikv"},
            {"ID": 2, "item_id": 12, "status": "ready", "rr_id": 2, "r_id": 3, "components": "pd"}
        ]"#;
        let resources: Vec<ResourceItem> = serde_json::from_str(body).unwrap();
        let available: Vec<u64> = resources
            .iter()
            .filter(|r| r.is_available("tikv"))
            .map(|r| r.id)
            .collect();
        assert_eq!(available, vec![2]);
    }

    #[test]
    fn test_decode_reports() {
        let body = r#"[{"cr_id": 4, "data": "{\"balanceInterval\":100}", "plaintext": null}]"#;
        let reports: Vec<WorkloadReport> = serde_json::from_str(body).unwrap();
        assert_eq!(reports[0].snapshot().unwrap().balance_interval, 100);
        assert!(reports[0].plaintext.is_none());
    }
}
