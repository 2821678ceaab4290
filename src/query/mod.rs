//! Access to the time-series metrics backend.

pub mod client;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::warn;

use crate::models::{MetricSeries, Sample};
use crate::Result;

pub use client::PrometheusClient;

/// Time range of a range query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub step: Duration,
}

impl QueryRange {
    /// Window of length `window` ending at `end`.
    pub fn trailing(end: DateTime<Utc>, window: Duration, step: Duration) -> Self {
        let window = chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());
        Self {
            start: end - window,
            end,
            step,
        }
    }
}

#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Evaluates `query` at a single point in time.
    async fn instant(&self, query: &str, at: DateTime<Utc>) -> Result<Vec<Sample>>;

    /// Evaluates `query` over `range`, one series per label set.
    async fn range(&self, query: &str, range: QueryRange) -> Result<Vec<MetricSeries>>;

    /// Checks the backend answers at all.
    async fn probe(&self) -> Result<()>;

    /// Value of the first sample of an instant query, zero when the result is empty.
    async fn instant_value(&self, query: &str, at: DateTime<Utc>) -> Result<f64> {
        let samples = self.instant(query, at).await?;
        match samples.first() {
            Some(sample) => Ok(sample.value),
            None => {
                warn!(query, at = %at, "Empty query result, using 0");
                Ok(0.0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;

    struct Fixed(Vec<Sample>);

    #[async_trait]
    impl MetricsSource for Fixed {
        async fn instant(&self, _query: &str, _at: DateTime<Utc>) -> Result<Vec<Sample>> {
            Ok(self.0.clone())
        }

        async fn range(&self, _query: &str, _range: QueryRange) -> Result<Vec<MetricSeries>> {
            Ok(vec![])
        }

        async fn probe(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_trailing_range() {
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let range = QueryRange::trailing(end, Duration::from_secs(540), Duration::from_secs(60));
        assert_eq!(range.start, Utc.with_ymd_and_hms(2024, 1, 1, 11, 51, 0).unwrap());
        assert_eq!(range.end, end);
    }

    #[tokio::test]
    async fn test_instant_value() {
        let sample = Sample {
            labels: HashMap::new(),
            timestamp: 0.0,
            value: 3.5,
        };
        let source = Fixed(vec![sample]);
        assert_eq!(source.instant_value("up", Utc::now()).await.unwrap(), 3.5);

        let empty = Fixed(vec![]);
        assert_eq!(empty.instant_value("up", Utc::now()).await.unwrap(), 0.0);
    }
}
