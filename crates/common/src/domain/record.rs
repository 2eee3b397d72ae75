use crate::domain::metrics::CongestionLevel;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Identifier assigned to a durable record by the persistence store
pub type RecordId = i64;

/// Position reported by a sensor or vehicle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub lng: f64,
    pub lat: f64,
}

/// One vehicle entry from a cooperative sensor-sharing message
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSharingRecord {
    pub device_id: String,
    pub sensor_pos: Option<Position>,
    pub sec_mark: i64,
    pub ego_id: String,
    pub ego_pos: Position,
    pub speed: f64,
    pub heading: f64,
    pub width: Option<f64>,
    pub length: Option<f64>,
    pub height: Option<f64>,
    pub received_at: DateTime<Utc>,
}

/// Signal-phase state of one phase at an intersection
#[derive(Debug, Clone, PartialEq)]
pub struct SignalPhaseRecord {
    pub device_id: String,
    pub intersection_code: String,
    pub phase_id: String,
    pub light: String,
    pub remaining_time: Option<f64>,
    pub received_at: DateTime<Utc>,
}

/// Traffic situation reported by a device, persisted before it is cached
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficSituationRecord {
    pub device_id: String,
    pub vehicle_total: Option<u64>,
    pub average_speed: Option<f64>,
    pub pedestrian_total: Option<u64>,
    pub congestion: Option<CongestionLevel>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorType {
    Radar,
    Lidar,
    Camera,
}

impl SensorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorType::Radar => "radar",
            SensorType::Lidar => "lidar",
            SensorType::Camera => "camera",
        }
    }
}

/// Sensor announcing itself through a roadside unit
#[derive(Debug, Clone, PartialEq)]
pub struct SensorRegistrationRecord {
    pub device_id: String,
    pub serial_number: String,
    pub name: String,
    pub sensor_type: SensorType,
    pub ip: Option<String>,
    pub position: Position,
    pub intersection_code: String,
    pub received_at: DateTime<Utc>,
}

/// Structured value decoded from a transport payload by a handler
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedRecord {
    SensorSharing(SensorSharingRecord),
    SignalPhase(SignalPhaseRecord),
    TrafficSituation(TrafficSituationRecord),
    SensorRegistration(SensorRegistrationRecord),
}

impl DecodedRecord {
    pub fn record_type(&self) -> &'static str {
        match self {
            DecodedRecord::SensorSharing(_) => "sensor_sharing",
            DecodedRecord::SignalPhase(_) => "signal_phase",
            DecodedRecord::TrafficSituation(_) => "traffic_situation",
            DecodedRecord::SensorRegistration(_) => "sensor_registration",
        }
    }

    /// Device that reported the record
    pub fn device_id(&self) -> &str {
        match self {
            DecodedRecord::SensorSharing(r) => &r.device_id,
            DecodedRecord::SignalPhase(r) => &r.device_id,
            DecodedRecord::TrafficSituation(r) => &r.device_id,
            DecodedRecord::SensorRegistration(r) => &r.device_id,
        }
    }
}
