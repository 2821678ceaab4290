use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use super::Bench;
use crate::api::{Orchestrator, ReportStore};
use crate::balance::BalanceDetector;
use crate::config::Config;
use crate::models::{StatSnapshot, TimePoint};
use crate::query::MetricsSource;
use crate::report::{ChartRenderer, Comparison, DiffRenderer, ReportRenderer};
use crate::{BenchError, Result};

pub const QUERY_LATENCY: &str = "sum(tidb_server_handle_query_duration_seconds_sum{sql_type!=\"internal\"}) / (sum(tidb_server_handle_query_duration_seconds_count{sql_type!=\"internal\"}) + 1)";
pub const BALANCE_LEADER_COUNT: &str = "pd_scheduler_event_count{type=\"balance-leader-scheduler\", name=\"schedule\"}";
pub const BALANCE_REGION_COUNT: &str = "pd_scheduler_event_count{type=\"balance-region-scheduler\", name=\"schedule\"}";
pub const COMPACTION_FLOW: &str = "sum(tikv_engine_compaction_flow_bytes)";
pub const APPLY_LOG_DURATION: &str = "sum(tikv_raftstore_apply_log_duration_seconds_sum) / (sum(tikv_raftstore_apply_log_duration_seconds_count) + 1)";
pub const DB_MUTEX_DURATION: &str = "sum(tikv_raftstore_store_perf_context_time_duration_secs_sum{type=\"db_mutex_lock_nanos\"}) / (sum(tikv_raftstore_store_perf_context_time_duration_secs_count{type=\"db_mutex_lock_nanos\"}) + 1)";

pub const NAME: &str = "scale-out";

/// Adds storage nodes and measures how long the cluster takes to rebalance.
pub struct ScaleOut<M, C> {
    detector: BalanceDetector<M>,
    cluster: C,
    num: u32,
    timeout: Duration,
    chart_output: Option<PathBuf>,
    time: Option<TimePoint>,
}

impl<M, C> ScaleOut<M, C>
where
    M: MetricsSource,
    C: Orchestrator + ReportStore,
{
    pub fn new(source: M, cluster: C, config: &Config) -> Self {
        Self {
            detector: BalanceDetector::new(source, config.balance.clone()),
            cluster,
            num: config.scale_num,
            timeout: config.balance.timeout,
            chart_output: config.chart_output.clone(),
            time: None,
        }
    }

    pub fn time(&self) -> Option<TimePoint> {
        self.time
    }

    /// Statistics of the finished run. Scheduler counters and latency are read
    /// at scale-out and at balance; compaction at balance and now.
    pub async fn create_report(&self, time: TimePoint) -> Result<StatSnapshot> {
        let source = self.detector.source();
        let (add, balance, now) = (time.add_time, time.balance_time, Utc::now());

        Ok(StatSnapshot {
            balance_interval: time.balance_interval(),
            prev_balance_leader_count: source.instant_value(BALANCE_LEADER_COUNT, add).await? as i64,
            prev_balance_region_count: source.instant_value(BALANCE_REGION_COUNT, add).await? as i64,
            cur_balance_leader_count: source.instant_value(BALANCE_LEADER_COUNT, balance).await? as i64,
            cur_balance_region_count: source.instant_value(BALANCE_REGION_COUNT, balance).await? as i64,
            prev_latency: source.instant_value(QUERY_LATENCY, add).await?,
            cur_latency: source.instant_value(QUERY_LATENCY, balance).await?,
            prev_compaction_rate: source.instant_value(COMPACTION_FLOW, balance).await?,
            cur_compaction_rate: source.instant_value(COMPACTION_FLOW, now).await?,
            prev_apply_log: source.instant_value(APPLY_LOG_DURATION, add).await?,
            cur_apply_log: source.instant_value(APPLY_LOG_DURATION, balance).await?,
            prev_db_mutex: source.instant_value(DB_MUTEX_DURATION, add).await?,
            cur_db_mutex: source.instant_value(DB_MUTEX_DURATION, balance).await?,
        })
    }

    async fn write_chart(&self, comparison: &Comparison) -> Result<()> {
        if let Some(path) = &self.chart_output {
            let renderer = ChartRenderer::default();
            tokio::fs::write(path, renderer.render(comparison)).await?;
            info!(path = %path.display(), renderer = renderer.name(), "Chart written");
        }
        Ok(())
    }
}

#[async_trait]
impl<M, C> Bench for ScaleOut<M, C>
where
    M: MetricsSource,
    C: Orchestrator + ReportStore,
{
    async fn run(&mut self) -> Result<()> {
        // Any probe failure is a setup failure, not something to poll through.
        self.detector.source().probe().await.map_err(|e| match e {
            BenchError::MetricsUnreachable(_) => e,
            other => BenchError::MetricsUnreachable(other.to_string()),
        })?;

        for i in 0..self.num {
            self.cluster.add_store().await?;
            info!(store = i + 1, total = self.num, "Store added");
        }
        let add_time = Utc::now();

        let balance_time = self
            .detector
            .poll_until_balanced(Instant::now() + self.timeout)
            .await?;
        let time = TimePoint {
            add_time,
            balance_time,
        };
        info!(balance_interval = time.balance_interval(), "Scale out balanced");
        self.time = Some(time);
        Ok(())
    }

    async fn collect(&mut self) -> Result<()> {
        let time = self
            .time
            .ok_or_else(|| BenchError::InvalidState("collect before a successful run".to_string()))?;
        let snapshot = self.create_report(time).await?;
        let data = snapshot.to_json()?;

        let plaintext = match self.cluster.last_report().await? {
            None => {
                info!("No previous report, sending the first one");
                String::new()
            }
            Some(last) => {
                let previous = last.snapshot()?;
                let comparison = Comparison::new(&previous, &snapshot);
                let text = DiffRenderer.render(&comparison);
                info!(merge_result = %text, "Merge report success");
                if let Err(e) = self.write_chart(&comparison).await {
                    warn!(error = %e, "Failed to write chart");
                }
                text
            }
        };

        self.cluster.send_report(&data, &plaintext).await
    }
}
