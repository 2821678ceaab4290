use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::{MetricsSource, QueryRange};
use crate::metrics::QueryTimer;
use crate::models::{MetricSeries, Sample};
use crate::{BenchError, Result};

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
enum QueryData {
    Vector(Vec<VectorSample>),
    Matrix(Vec<MatrixSeries>),
    Scalar((f64, String)),
    #[serde(rename = "string")]
    Str((f64, String)),
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    #[serde(default)]
    metric: HashMap<String, String>,
    value: (f64, String),
}

#[derive(Debug, Deserialize)]
struct MatrixSeries {
    #[serde(default)]
    metric: HashMap<String, String>,
    #[serde(default)]
    values: Vec<(f64, String)>,
}

/// Client for the Prometheus HTTP query API.
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    base: String,
    http: Client,
}

impl PrometheusClient {
    /// Every request is bounded by `timeout`.
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<QueryData> {
        let url = format!("{}/{}", self.base, path);
        debug!(url = %url, ?params, "Querying metrics backend");

        let resp = self
            .http
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    BenchError::MetricsUnreachable(format!("{}: {}", url, e))
                } else {
                    BenchError::Http(e)
                }
            })?;
        let status = resp.status();
        let body = resp.text().await?;

        let parsed: ApiResponse = serde_json::from_str(&body).map_err(|e| {
            BenchError::Query(format!("unexpected response ({}) from {}: {}", status, url, e))
        })?;
        if !parsed.warnings.is_empty() {
            warn!(warnings = ?parsed.warnings, "Query has warnings");
        }
        if parsed.status != "success" {
            return Err(BenchError::Query(format!(
                "{}: {}",
                parsed.error_type.unwrap_or_else(|| status.to_string()),
                parsed.error.unwrap_or_default()
            )));
        }

        parsed
            .data
            .ok_or_else(|| BenchError::Query(format!("missing data in response from {}", url)))
    }
}

fn parse_value(raw: &str) -> Result<f64> {
    raw.parse()
        .map_err(|_| BenchError::Query(format!("invalid sample value {:?}", raw)))
}

fn format_time(t: DateTime<Utc>) -> String {
    format!("{:.3}", t.timestamp_millis() as f64 / 1000.0)
}

#[async_trait]
impl MetricsSource for PrometheusClient {
    async fn instant(&self, query: &str, at: DateTime<Utc>) -> Result<Vec<Sample>> {
        let _timer = QueryTimer::new("instant");
        let params = [("query", query.to_string()), ("time", format_time(at))];

        match self.get("api/v1/query", &params).await? {
            QueryData::Vector(samples) => samples
                .into_iter()
                .map(|s| {
                    Ok(Sample {
                        labels: s.metric,
                        timestamp: s.value.0,
                        value: parse_value(&s.value.1)?,
                    })
                })
                .collect(),
            QueryData::Scalar((timestamp, raw)) => Ok(vec![Sample {
                labels: HashMap::new(),
                timestamp,
                value: parse_value(&raw)?,
            }]),
            other => Err(BenchError::Query(format!(
                "instant query {:?} returned {:?}",
                query, other
            ))),
        }
    }

    async fn range(&self, query: &str, range: QueryRange) -> Result<Vec<MetricSeries>> {
        let _timer = QueryTimer::new("range");
        let params = [
            ("query", query.to_string()),
            ("start", format_time(range.start)),
            ("end", format_time(range.end)),
            ("step", range.step.as_secs_f64().to_string()),
        ];

        match self.get("api/v1/query_range", &params).await? {
            QueryData::Matrix(series) => series
                .into_iter()
                .map(|s| {
                    let values = s
                        .values
                        .iter()
                        .map(|(_, raw)| parse_value(raw))
                        .collect::<Result<Vec<_>>>()?;
                    Ok(MetricSeries {
                        labels: s.metric,
                        values,
                    })
                })
                .collect(),
            _ => Err(BenchError::Query(format!(
                "range query {:?} did not return a matrix",
                query
            ))),
        }
    }

    async fn probe(&self) -> Result<()> {
        self.instant("1", Utc::now()).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vector_response() {
        let body = r#"{
            "status": "success",
            "data": {
                "resultType": "vector",
                "result": [
                    {"metric": {"type": "balance-leader-scheduler"}, "value": [1700000000.123, "42"]}
                ]
            }
        }"#;
        let parsed: ApiResponse = serde_json::from_str(body).unwrap();
        match parsed.data {
            Some(QueryData::Vector(samples)) => {
                assert_eq!(samples.len(), 1);
                assert_eq!(samples[0].value.1, "42");
                assert_eq!(samples[0].metric["type"], "balance-leader-scheduler");
            }
            other => panic!("unexpected data: {:?}", other),
        }
    }

    #[test]
    fn test_parse_matrix_response() {
        let body = r#"{
            "status": "success",
            "data": {
                "resultType": "matrix",
                "result": [
                    {"metric": {"address": "tikv-0"}, "values": [[1, "10"], [61, "11.5"]]},
                    {"metric": {"address": "tikv-1"}, "values": [[1, "12"]]}
                ]
            },
            "warnings": ["partial response"]
        }"#;
        let parsed: ApiResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.warnings.len(), 1);
        match parsed.data {
            Some(QueryData::Matrix(series)) => {
                assert_eq!(series.len(), 2);
                assert_eq!(series[0].values.len(), 2);
            }
            other => panic!("unexpected data: {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_response() {
        let body = r#"{"status": "error", "errorType": "bad_data", "error": "parse error"}"#;
        let parsed: ApiResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.status, "error");
        assert_eq!(parsed.error_type.as_deref(), Some("bad_data"));
        assert!(parsed.data.is_none());
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("1.25").unwrap(), 1.25);
        assert!(parse_value("NaN").unwrap().is_nan());
        assert!(matches!(parse_value("abc"), Err(BenchError::Query(_))));
    }

    #[test]
    fn test_format_time() {
        let t = DateTime::<Utc>::from_timestamp(1_700_000_000, 500_000_000).unwrap();
        assert_eq!(format_time(t), "1700000000.500");
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        // Nothing listens on port 9 of localhost in the test environment.
        let client = PrometheusClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = client.probe().await.unwrap_err();
        assert!(matches!(err, BenchError::MetricsUnreachable(_)), "{:?}", err);
    }
}
