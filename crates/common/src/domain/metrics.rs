use crate::domain::result::{DomainError, DomainResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Categorical congestion state reported by roadside devices.
///
/// Ordered by severity; `Congestion` is the most severe level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum CongestionLevel {
    #[default]
    #[serde(rename = "free flow")]
    FreeFlow,
    #[serde(rename = "slow")]
    Slow,
    #[serde(rename = "congestion")]
    Congestion,
}

impl CongestionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CongestionLevel::FreeFlow => "free flow",
            CongestionLevel::Slow => "slow",
            CongestionLevel::Congestion => "congestion",
        }
    }

    /// The most severe level; once a summary reaches it no other device can lower it.
    pub fn is_most_severe(&self) -> bool {
        matches!(self, CongestionLevel::Congestion)
    }
}

impl fmt::Display for CongestionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CongestionLevel {
    type Err = DomainError;

    fn from_str(s: &str) -> DomainResult<Self> {
        match s {
            "free flow" => Ok(CongestionLevel::FreeFlow),
            "slow" => Ok(CongestionLevel::Slow),
            "congestion" => Ok(CongestionLevel::Congestion),
            other => Err(DomainError::ValidationError(format!(
                "unknown congestion level '{}'",
                other
            ))),
        }
    }
}

/// Latest real-time metrics for one device.
///
/// Every field is optional: a push carries only the fields it reports, and a
/// pulled snapshot contains whatever fields have been written since the key
/// was (re)created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMetricSnapshot {
    pub vehicle_total: Option<u64>,
    pub average_speed: Option<f64>,
    pub pedestrian_total: Option<u64>,
    pub congestion: Option<CongestionLevel>,
}

impl DeviceMetricSnapshot {
    pub fn is_empty(&self) -> bool {
        self.vehicle_total.is_none()
            && self.average_speed.is_none()
            && self.pedestrian_total.is_none()
            && self.congestion.is_none()
    }
}

/// Point-in-time traffic situation for one intersection, computed on read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntersectionSummary {
    pub vehicle_total: u64,
    pub average_speed: i64,
    pub pedestrian_total: u64,
    pub congestion: CongestionLevel,
    pub device_count: usize,
}

impl Default for IntersectionSummary {
    fn default() -> Self {
        Self {
            vehicle_total: 0,
            average_speed: 0,
            pedestrian_total: 0,
            congestion: CongestionLevel::FreeFlow,
            device_count: 0,
        }
    }
}
