//! Detects when the cluster has rebalanced after a scale-out.
//!
//! Every poll round fetches the trailing window of the per-node load score
//! and runs a coefficient-of-variation-squared test on each node:
//!
//! ```text
//! unstable  <=>  variance > factor * mean^2
//! ```
//!
//! The cluster is balanced only when every node has a complete series and
//! none of them is unstable.

use chrono::{DateTime, Utc};
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::config::BalanceConfig;
use crate::metrics;
use crate::models::MetricSeries;
use crate::query::{MetricsSource, QueryRange};
use crate::{BenchError, Result};

/// Per-store region score reported by PD.
pub const REGION_SCORE_QUERY: &str = "pd_scheduler_store_status{type=\"region_score\"}";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesStats {
    pub mean: f64,
    /// Population variance.
    pub variance: f64,
}

impl SeriesStats {
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        Some(Self { mean, variance })
    }

    pub fn is_stable(&self, variance_factor: f64) -> bool {
        self.variance <= variance_factor * self.mean * self.mean
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeVerdict {
    Stable,
    Unstable(SeriesStats),
    Incomplete { samples: usize, expected: usize },
}

pub fn evaluate_node(values: &[f64], expected: usize, variance_factor: f64) -> NodeVerdict {
    if values.len() != expected {
        return NodeVerdict::Incomplete {
            samples: values.len(),
            expected,
        };
    }
    match SeriesStats::of(values) {
        Some(stats) if stats.is_stable(variance_factor) => NodeVerdict::Stable,
        Some(stats) => NodeVerdict::Unstable(stats),
        None => NodeVerdict::Incomplete {
            samples: 0,
            expected,
        },
    }
}

/// True when there is at least one node and every node is stable.
pub fn is_balanced(series: &[MetricSeries], expected: usize, variance_factor: f64) -> bool {
    if series.is_empty() {
        debug!("No series returned, not balanced");
        return false;
    }

    let mut unsettled = 0;
    for s in series {
        match evaluate_node(&s.values, expected, variance_factor) {
            NodeVerdict::Stable => {}
            NodeVerdict::Unstable(stats) => {
                debug!(node = s.node(), mean = stats.mean, variance = stats.variance, "Node unstable");
                unsettled += 1;
            }
            NodeVerdict::Incomplete { samples, expected } => {
                debug!(node = s.node(), samples, expected, "Node series incomplete");
                unsettled += 1;
            }
        }
    }
    metrics::set_unstable_nodes(unsettled);
    unsettled == 0
}

pub struct BalanceDetector<M> {
    source: M,
    config: BalanceConfig,
    query: String,
}

impl<M: MetricsSource> BalanceDetector<M> {
    pub fn new(source: M, config: BalanceConfig) -> Self {
        Self {
            source,
            config,
            query: REGION_SCORE_QUERY.to_string(),
        }
    }

    /// Uses `query` as the per-node load score instead of the region score.
    pub fn with_query(mut self, query: &str) -> Self {
        self.query = query.to_string();
        self
    }

    pub fn source(&self) -> &M {
        &self.source
    }

    /// Runs a single evaluation round against the current window.
    pub async fn check(&self) -> Result<bool> {
        let range = QueryRange::trailing(Utc::now(), self.config.window, self.config.step);
        let series = self.source.range(&self.query, range).await?;
        Ok(is_balanced(
            &series,
            self.config.expected_samples(),
            self.config.variance_factor,
        ))
    }

    /// Polls until balanced and returns the time balance was observed.
    ///
    /// Fails with [`BenchError::BalanceTimeout`] once `deadline` passes, and
    /// with [`BenchError::MetricsUnreachable`] after too many consecutive
    /// fetches that could not reach the backend. Other fetch failures are
    /// retried on the next tick.
    pub async fn poll_until_balanced(&self, deadline: Instant) -> Result<DateTime<Utc>> {
        let started = Instant::now();
        match timeout_at(deadline, self.poll_loop()).await {
            Ok(result) => result,
            Err(_) => Err(BenchError::BalanceTimeout(started.elapsed())),
        }
    }

    async fn poll_loop(&self) -> Result<DateTime<Utc>> {
        let mut unreachable = 0u32;
        loop {
            sleep(self.config.poll_interval).await;
            metrics::record_poll();

            match self.check().await {
                Ok(true) => {
                    let balance_time = Utc::now();
                    info!(at = %balance_time, "Cluster balanced");
                    return Ok(balance_time);
                }
                Ok(false) => {
                    unreachable = 0;
                }
                Err(e) if e.is_transient() => {
                    metrics::record_fetch_failure();
                    warn!(error = %e, "Metric fetch failed, retrying");
                    unreachable = 0;
                }
                Err(e) => {
                    metrics::record_fetch_failure();
                    unreachable += 1;
                    warn!(error = %e, attempt = unreachable, "Metrics backend unreachable");
                    if unreachable >= self.config.max_fetch_failures {
                        return Err(BenchError::MetricsUnreachable(format!(
                            "{} consecutive failures, last: {}",
                            unreachable, e
                        )));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sample;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    enum Step {
        Series(Vec<Vec<f64>>),
        Transient,
        Unreachable,
    }

    struct Scripted {
        steps: Mutex<VecDeque<Step>>,
        calls: Mutex<usize>,
    }

    impl Scripted {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: Mutex::new(steps.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl MetricsSource for Scripted {
        async fn instant(&self, _query: &str, _at: DateTime<Utc>) -> Result<Vec<Sample>> {
            Ok(vec![])
        }

        async fn range(&self, _query: &str, _range: QueryRange) -> Result<Vec<MetricSeries>> {
            *self.calls.lock().unwrap() += 1;
            // Once the script runs out the cluster stays unbalanced.
            let step = self
                .steps
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Step::Series(vec![vec![1.0, 100.0]]));
            match step {
                Step::Series(nodes) => Ok(nodes.into_iter().map(MetricSeries::new).collect()),
                Step::Transient => Err(BenchError::Query("bad_data".into())),
                Step::Unreachable => Err(BenchError::MetricsUnreachable("refused".into())),
            }
        }

        async fn probe(&self) -> Result<()> {
            Ok(())
        }
    }

    fn fast_config() -> BalanceConfig {
        BalanceConfig {
            poll_interval: Duration::from_millis(5),
            max_fetch_failures: 3,
            ..Default::default()
        }
    }

    fn constant(value: f64) -> Vec<f64> {
        vec![value; 10]
    }

    #[test]
    fn test_series_stats() {
        let stats = SeriesStats::of(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(stats.mean, 5.0);
        assert_eq!(stats.variance, 4.0);
        assert!(SeriesStats::of(&[]).is_none());
    }

    #[test]
    fn test_constant_series_always_stable() {
        for factor in [1e-9, 0.02, 0.1, 5.0] {
            assert_eq!(evaluate_node(&constant(50.0), 10, factor), NodeVerdict::Stable);
            assert_eq!(evaluate_node(&constant(0.0), 10, factor), NodeVerdict::Stable);
        }
    }

    #[test]
    fn test_wrong_sample_count_never_balanced() {
        for len in [0, 1, 9, 11, 20] {
            let series = vec![MetricSeries::new(vec![50.0; len])];
            assert!(!is_balanced(&series, 10, 1e6), "len {}", len);
        }
        assert_eq!(
            evaluate_node(&[1.0; 9], 10, 0.02),
            NodeVerdict::Incomplete {
                samples: 9,
                expected: 10
            }
        );
    }

    #[test]
    fn test_wrong_sample_count_ignores_spread() {
        let noisy = |len: usize| -> Vec<f64> {
            (0..len).map(|i| if i % 2 == 0 { 1.0 } else { 1000.0 }).collect()
        };
        for len in [1, 9, 11, 20] {
            assert_eq!(
                evaluate_node(&noisy(len), 10, 0.02),
                NodeVerdict::Incomplete {
                    samples: len,
                    expected: 10
                }
            );
        }

        // The factor accepts any spread, so only the length can reject.
        let factor = 1e12;
        let complete = MetricSeries::new(noisy(10));
        assert!(is_balanced(&[complete.clone(), complete.clone()], 10, factor));
        for len in [9, 11] {
            let series = vec![complete.clone(), MetricSeries::new(vec![50.0; len]), complete.clone()];
            assert!(!is_balanced(&series, 10, factor), "len {}", len);
        }
    }

    #[test]
    fn test_outlier_breaks_balance() {
        let steady = vec![MetricSeries::new(constant(50.0))];
        assert!(is_balanced(&steady, 10, 0.02));

        let mut spiked = constant(50.0);
        spiked[4] = 500.0;
        let spiked = vec![MetricSeries::new(constant(50.0)), MetricSeries::new(spiked)];
        assert!(!is_balanced(&spiked, 10, 0.02));
        assert!(!is_balanced(&spiked, 10, 0.1));
    }

    #[test]
    fn test_threshold_factor() {
        // mean 100, variance 25 => cv^2 = 0.0025
        let values = [95.0, 105.0, 95.0, 105.0, 95.0, 105.0, 95.0, 105.0, 95.0, 105.0];
        assert_eq!(evaluate_node(&values, 10, 0.02), NodeVerdict::Stable);
        assert!(matches!(
            evaluate_node(&values, 10, 0.001),
            NodeVerdict::Unstable(_)
        ));
    }

    #[test]
    fn test_no_nodes_not_balanced() {
        assert!(!is_balanced(&[], 10, 0.02));
    }

    #[test_log::test(tokio::test)]
    async fn test_poll_until_balanced() {
        let source = Scripted::new(vec![
            Step::Series(vec![constant(50.0), vec![50.0; 4]]),
            Step::Transient,
            Step::Series(vec![constant(50.0), constant(80.0)]),
        ]);
        let detector = BalanceDetector::new(source, fast_config());

        let before = Utc::now();
        let balance_time = detector
            .poll_until_balanced(Instant::now() + Duration::from_secs(5))
            .await
            .unwrap();
        assert!(balance_time >= before);
        assert_eq!(detector.source().calls(), 3);
    }

    #[test_log::test(tokio::test)]
    async fn test_poll_times_out() {
        let detector = BalanceDetector::new(Scripted::new(vec![]), fast_config());
        let err = detector
            .poll_until_balanced(Instant::now() + Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::BalanceTimeout(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_fatal() {
        let source = Scripted::new(vec![Step::Unreachable, Step::Unreachable, Step::Unreachable]);
        let detector = BalanceDetector::new(source, fast_config());
        let err = detector
            .poll_until_balanced(Instant::now() + Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::MetricsUnreachable(_)), "{:?}", err);
        assert_eq!(detector.source().calls(), 3);
    }

    #[tokio::test]
    async fn test_unreachable_streak_resets() {
        let source = Scripted::new(vec![
            Step::Unreachable,
            Step::Unreachable,
            Step::Series(vec![constant(10.0), vec![1.0]]),
            Step::Unreachable,
            Step::Unreachable,
            Step::Series(vec![constant(10.0)]),
        ]);
        let detector = BalanceDetector::new(source, fast_config());
        assert!(detector
            .poll_until_balanced(Instant::now() + Duration::from_secs(5))
            .await
            .is_ok());
    }
}
