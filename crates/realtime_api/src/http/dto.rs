use common::domain::{CongestionLevel, DeviceMetricSnapshot, IntersectionSummary};
use garde::Validate;
use serde::{Deserialize, Serialize};

/// Body of `POST /api/v1/realtime/route-info`
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RouteInfoPushRequest {
    #[garde(length(min = 1))]
    pub device_id: String,
    #[garde(skip)]
    pub vehicle_total: Option<u64>,
    #[garde(range(min = 0.0))]
    pub average_speed: Option<f64>,
    #[garde(skip)]
    pub pedestrian_total: Option<u64>,
    #[garde(skip)]
    pub congestion: Option<CongestionLevel>,
}

impl RouteInfoPushRequest {
    pub fn snapshot(&self) -> DeviceMetricSnapshot {
        DeviceMetricSnapshot {
            vehicle_total: self.vehicle_total,
            average_speed: self.average_speed,
            pedestrian_total: self.pedestrian_total,
            congestion: self.congestion,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteInfoQuery {
    pub intersection_code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteInfoSummaryResponse {
    pub vehicle_total: u64,
    pub average_speed: i64,
    pub pedestrian_total: u64,
    pub congestion: CongestionLevel,
    pub device_count: usize,
}

impl From<IntersectionSummary> for RouteInfoSummaryResponse {
    fn from(s: IntersectionSummary) -> Self {
        Self {
            vehicle_total: s.vehicle_total,
            average_speed: s.average_speed,
            pedestrian_total: s.pedestrian_total,
            congestion: s.congestion,
            device_count: s.device_count,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
