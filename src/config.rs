use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::{BenchError, Result};

/// Parameters of the balance detector.
#[derive(Debug, Clone)]
pub struct BalanceConfig {
    /// Trailing window each per-node series covers.
    pub window: Duration,
    /// Sampling step inside the window.
    pub step: Duration,
    /// A node is unstable when `variance > variance_factor * mean^2`.
    pub variance_factor: f64,
    /// Delay between two poll rounds.
    pub poll_interval: Duration,
    /// Overall deadline for the poll loop.
    pub timeout: Duration,
    /// Consecutive unreachable-backend fetches tolerated before giving up.
    pub max_fetch_failures: u32,
}

impl BalanceConfig {
    /// Number of samples a complete series holds: both window edges included.
    pub fn expected_samples(&self) -> usize {
        let step = self.step.as_millis().max(1);
        (self.window.as_millis() / step) as usize + 1
    }
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(9 * 60),
            step: Duration::from_secs(60),
            variance_factor: 0.02,
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(2 * 60 * 60),
            max_fetch_failures: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub cluster_name: String,
    pub api_server: String,
    pub prometheus: String,
    pub tidb: String,
    pub pd: String,
    pub case: String,
    pub scale_num: u32,
    pub balance: BalanceConfig,
    pub query_timeout: Duration,
    pub chart_output: Option<PathBuf>,
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| BenchError::Config(format!("{} must be set", key)))
        };
        let defaults = BalanceConfig::default();

        let balance = BalanceConfig {
            window: secs(&lookup, "BALANCE_WINDOW_SECS", defaults.window)?,
            step: secs(&lookup, "BALANCE_STEP_SECS", defaults.step)?,
            variance_factor: parse_or(&lookup, "BALANCE_VARIANCE_FACTOR", defaults.variance_factor)?,
            poll_interval: secs(&lookup, "BALANCE_POLL_INTERVAL_SECS", defaults.poll_interval)?,
            timeout: secs(&lookup, "BALANCE_TIMEOUT_SECS", defaults.timeout)?,
            max_fetch_failures: parse_or(
                &lookup,
                "BALANCE_MAX_FETCH_FAILURES",
                defaults.max_fetch_failures,
            )?,
        };
        if balance.step.is_zero() || balance.window < balance.step {
            return Err(BenchError::Config(
                "BALANCE_STEP_SECS must be positive and not exceed BALANCE_WINDOW_SECS".to_string(),
            ));
        }
        if !(balance.variance_factor > 0.0) {
            return Err(BenchError::Config(
                "BALANCE_VARIANCE_FACTOR must be positive".to_string(),
            ));
        }

        Ok(Self {
            cluster_name: required("CLUSTER_NAME")?,
            api_server: required("API_SERVER")?.trim_end_matches('/').to_string(),
            prometheus: required("PROM_ADDR")?.trim_end_matches('/').to_string(),
            tidb: lookup("TIDB_ADDR").unwrap_or_default(),
            pd: lookup("PD_ADDR").unwrap_or_default(),
            case: lookup("BENCH_CASE").unwrap_or_else(|| "scale-out".to_string()),
            scale_num: parse_or(&lookup, "SCALE_NUM", 1)?,
            balance,
            query_timeout: secs(&lookup, "QUERY_TIMEOUT_SECS", Duration::from_secs(10))?,
            chart_output: lookup("CHART_OUTPUT").map(PathBuf::from),
            log_json: matches!(lookup("BENCH_LOG_JSON").as_deref(), Some("1") | Some("true")),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| BenchError::Config(format!("invalid {}={:?}: {}", key, raw, e))),
        None => Ok(default),
    }
}

fn secs<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, key, default.as_secs()).map(Duration::from_secs)
}
