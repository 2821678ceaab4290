use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{BenchError, Result};

/// One sample of an instant query.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: HashMap<String, String>,
    pub timestamp: f64,
    pub value: f64,
}

/// Samples of one node over the trailing window, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSeries {
    pub labels: HashMap<String, String>,
    pub values: Vec<f64>,
}

impl MetricSeries {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            labels: HashMap::new(),
            values,
        }
    }

    /// Best effort node name for log lines.
    pub fn node(&self) -> &str {
        ["address", "store", "instance"]
            .iter()
            .find_map(|k| self.labels.get(*k))
            .map(String::as_str)
            .unwrap_or("unknown")
    }
}

/// When the scale-out was issued and when balance was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimePoint {
    pub add_time: DateTime<Utc>,
    pub balance_time: DateTime<Utc>,
}

impl TimePoint {
    /// Whole seconds between scale-out and balance.
    pub fn balance_interval(&self) -> i64 {
        (self.balance_time - self.add_time).num_seconds()
    }
}

/// Statistics captured once after balance, compared against the previous run.
///
/// Keys are written in lower camel case; PascalCase keys of older reports
/// are accepted too. Keys missing from a stored report default to zero so
/// reports written before a field existed still load, but a report with no
/// known key at all is rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatSnapshot {
    #[serde(alias = "BalanceInterval")]
    pub balance_interval: i64,
    #[serde(alias = "PrevBalanceLeaderCount")]
    pub prev_balance_leader_count: i64,
    #[serde(alias = "PrevBalanceRegionCount")]
    pub prev_balance_region_count: i64,
    #[serde(alias = "CurBalanceLeaderCount")]
    pub cur_balance_leader_count: i64,
    #[serde(alias = "CurBalanceRegionCount")]
    pub cur_balance_region_count: i64,
    #[serde(alias = "PrevLatency")]
    pub prev_latency: f64,
    #[serde(alias = "CurLatency")]
    pub cur_latency: f64,
    #[serde(alias = "PrevCompactionRate")]
    pub prev_compaction_rate: f64,
    #[serde(alias = "CurCompactionRate")]
    pub cur_compaction_rate: f64,
    #[serde(alias = "PrevApplyLog")]
    pub prev_apply_log: f64,
    #[serde(alias = "CurApplyLog")]
    pub cur_apply_log: f64,
    #[serde(alias = "PrevDbMutex")]
    pub prev_db_mutex: f64,
    #[serde(alias = "CurDbMutex")]
    pub cur_db_mutex: f64,
}

impl StatSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        let object: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(data).map_err(|e| BenchError::MalformedReport(e.to_string()))?;
        if !object.keys().any(|k| StatField::from_key(k).is_some()) {
            return Err(BenchError::MalformedReport(format!(
                "no statistic among keys {:?}",
                object.keys().collect::<Vec<_>>()
            )));
        }
        serde_json::from_value(serde_json::Value::Object(object))
            .map_err(|e| BenchError::MalformedReport(e.to_string()))
    }

    pub fn get(&self, field: StatField) -> f64 {
        match field {
            StatField::BalanceInterval => self.balance_interval as f64,
            StatField::PrevBalanceLeaderCount => self.prev_balance_leader_count as f64,
            StatField::PrevBalanceRegionCount => self.prev_balance_region_count as f64,
            StatField::CurBalanceLeaderCount => self.cur_balance_leader_count as f64,
            StatField::CurBalanceRegionCount => self.cur_balance_region_count as f64,
            StatField::PrevLatency => self.prev_latency,
            StatField::CurLatency => self.cur_latency,
            StatField::PrevCompactionRate => self.prev_compaction_rate,
            StatField::CurCompactionRate => self.cur_compaction_rate,
            StatField::PrevApplyLog => self.prev_apply_log,
            StatField::CurApplyLog => self.cur_apply_log,
            StatField::PrevDbMutex => self.prev_db_mutex,
            StatField::CurDbMutex => self.cur_db_mutex,
        }
    }
}

/// Ordered schema of the numeric fields in a [`StatSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatField {
    BalanceInterval,
    PrevBalanceLeaderCount,
    PrevBalanceRegionCount,
    CurBalanceLeaderCount,
    CurBalanceRegionCount,
    PrevLatency,
    CurLatency,
    PrevCompactionRate,
    CurCompactionRate,
    PrevApplyLog,
    CurApplyLog,
    PrevDbMutex,
    CurDbMutex,
}

impl StatField {
    pub const ALL: [StatField; 13] = [
        StatField::BalanceInterval,
        StatField::PrevBalanceLeaderCount,
        StatField::PrevBalanceRegionCount,
        StatField::CurBalanceLeaderCount,
        StatField::CurBalanceRegionCount,
        StatField::PrevLatency,
        StatField::CurLatency,
        StatField::PrevCompactionRate,
        StatField::CurCompactionRate,
        StatField::PrevApplyLog,
        StatField::CurApplyLog,
        StatField::PrevDbMutex,
        StatField::CurDbMutex,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StatField::BalanceInterval => "BalanceInterval",
            StatField::PrevBalanceLeaderCount => "PrevBalanceLeaderCount",
            StatField::PrevBalanceRegionCount => "PrevBalanceRegionCount",
            StatField::CurBalanceLeaderCount => "CurBalanceLeaderCount",
            StatField::CurBalanceRegionCount => "CurBalanceRegionCount",
            StatField::PrevLatency => "PrevLatency",
            StatField::CurLatency => "CurLatency",
            StatField::PrevCompactionRate => "PrevCompactionRate",
            StatField::CurCompactionRate => "CurCompactionRate",
            StatField::PrevApplyLog => "PrevApplyLog",
            StatField::CurApplyLog => "CurApplyLog",
            StatField::PrevDbMutex => "PrevDbMutex",
            StatField::CurDbMutex => "CurDbMutex",
        }
    }

    /// Field stored under `key`, in either camel or Pascal case.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| {
            let (key, name) = (key.as_bytes(), f.name().as_bytes());
            key.len() == name.len()
                && key[1..] == name[1..]
                && (key[0] == name[0] || key[0] == name[0].to_ascii_lowercase())
        })
    }
}

/// A host known to the orchestration API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceItem {
    #[serde(rename = "ID", alias = "id", default)]
    pub id: u64,
    #[serde(default)]
    pub item_id: u64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub rr_id: u64,
    #[serde(default)]
    pub r_id: u64,
    /// `|` separated list of components already serving on the host.
    #[serde(default)]
    pub components: String,
    #[serde(default)]
    pub spec: serde_json::Value,
}

impl ResourceItem {
    pub fn is_available(&self, component: &str) -> bool {
        !self.components.split('|').any(|c| c == component)
    }
}

/// A report as held by the report store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkloadReport {
    #[serde(default)]
    pub cr_id: u64,
    /// Serialized [`StatSnapshot`].
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plaintext: Option<String>,
}

impl WorkloadReport {
    pub fn snapshot(&self) -> Result<StatSnapshot> {
        StatSnapshot::from_json(&self.data)
    }
}
