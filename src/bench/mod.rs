//! Bench cases and the registry selecting one by name.

pub mod scale_out;

use async_trait::async_trait;

use crate::api::ClusterClient;
use crate::config::Config;
use crate::query::PrometheusClient;
use crate::{BenchError, Result};

pub use scale_out::ScaleOut;

#[async_trait]
pub trait Bench: Send {
    /// Drives the workload until its outcome can be measured.
    async fn run(&mut self) -> Result<()>;

    /// Captures statistics, compares them with the last run and stores both.
    async fn collect(&mut self) -> Result<()>;
}

/// Runs a case and collects its report.
pub async fn run_and_collect(bench: &mut dyn Bench) -> Result<()> {
    bench.run().await?;
    bench.collect().await
}

#[derive(Default)]
pub struct Benches {
    cases: Vec<(String, Box<dyn Bench>)>,
}

impl Benches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in case wired to the configured services.
    pub fn standard(config: &Config) -> Result<Self> {
        let source = PrometheusClient::new(&config.prometheus, config.query_timeout)?;
        let cluster = ClusterClient::new(&config.cluster_name, &config.api_server, config.query_timeout)?;

        let mut benches = Self::new();
        benches.register(scale_out::NAME, Box::new(ScaleOut::new(source, cluster, config)));
        Ok(benches)
    }

    pub fn register(&mut self, name: &str, bench: Box<dyn Bench>) {
        self.cases.push((name.to_string(), bench));
    }

    pub fn support_list(&self) -> Vec<String> {
        self.cases.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Removes and returns the case called `name`.
    pub fn take(mut self, name: &str) -> Result<Box<dyn Bench>> {
        match self.cases.iter().position(|(n, _)| n == name) {
            Some(idx) => Ok(self.cases.swap_remove(idx).1),
            None => Err(BenchError::UnknownCase {
                name: name.to_string(),
                supported: self.support_list(),
            }),
        }
    }
}
