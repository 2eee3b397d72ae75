use crate::domain::{
    decode_document, persist_one, HandleOutcome, HandlerResult, MessageHandler, ParsedTopic,
};
use async_trait::async_trait;
use chrono::Utc;
use common::domain::{
    DecodedRecord, PersistenceSession, Position, SensorRegistrationRecord, SensorType,
};
use garde::Validate;
use serde::Deserialize;
use tracing::{info, instrument};

/// Message type key for sensors announcing themselves through a roadside unit
pub const SENSOR_REGISTRATION_MESSAGE_TYPE: &str = "SENSOR_REGISTER";

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct SensorRegistrationMessage {
    #[serde(alias = "serialNumber")]
    #[garde(length(min = 1))]
    sn: String,
    #[garde(length(min = 1))]
    name: String,
    #[garde(skip)]
    sensor_type: SensorType,
    #[garde(ip)]
    ip: Option<String>,
    #[serde(alias = "lon")]
    #[garde(range(min = -180.0, max = 180.0))]
    lng: f64,
    #[garde(range(min = -90.0, max = 90.0))]
    lat: f64,
    #[garde(length(min = 1))]
    intersection_code: String,
}

/// Handles `SENSOR_REGISTER` messages; re-registration replaces the previous entry
#[derive(Debug, Default)]
pub struct SensorRegistrationHandler;

impl SensorRegistrationHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MessageHandler for SensorRegistrationHandler {
    #[instrument(skip_all, fields(message_type = SENSOR_REGISTRATION_MESSAGE_TYPE))]
    async fn handle(
        &self,
        session: &mut dyn PersistenceSession,
        topic: &ParsedTopic,
        payload: &[u8],
    ) -> HandlerResult<HandleOutcome> {
        let message: SensorRegistrationMessage = decode_document(payload)?;
        let sensor_type = message.sensor_type;

        let registration = SensorRegistrationRecord {
            device_id: topic.device_id.clone(),
            serial_number: message.sn,
            name: message.name,
            sensor_type,
            ip: message.ip,
            position: Position {
                lng: message.lng,
                lat: message.lat,
            },
            intersection_code: message.intersection_code,
            received_at: Utc::now(),
        };

        let outcome =
            persist_one(session, &DecodedRecord::SensorRegistration(registration.clone())).await?;
        info!(
            serial_number = %registration.serial_number,
            sensor_type = sensor_type.as_str(),
            intersection_code = %registration.intersection_code,
            "sensor registered"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HandlerError, TopicParser};
    use common::domain::MockPersistenceSession;
    use serde_json::json;

    fn topic() -> ParsedTopic {
        TopicParser::default().parse("v2x/rsu-3/SENSOR_REGISTER").unwrap()
    }

    #[tokio::test]
    async fn test_handle_registers_lidar() {
        let mut session = MockPersistenceSession::new();
        session
            .expect_create_record()
            .withf(|r| {
                matches!(r, DecodedRecord::SensorRegistration(s)
                    if s.serial_number == "LD-001"
                        && s.sensor_type == SensorType::Lidar
                        && s.device_id == "rsu-3"
                        && s.ip.as_deref() == Some("10.0.0.8"))
            })
            .times(1)
            .returning(|_| Ok(3));

        let payload = json!({
            "sn": "LD-001",
            "name": "north lidar",
            "sensorType": "lidar",
            "ip": "10.0.0.8",
            "lng": 121.47,
            "lat": 31.23,
            "intersectionCode": "X1"
        });

        let outcome = SensorRegistrationHandler::new()
            .handle(&mut session, &topic(), payload.to_string().as_bytes())
            .await
            .unwrap();

        assert_eq!(outcome.persisted, 1);
    }

    #[tokio::test]
    async fn test_handle_accepts_missing_ip() {
        let mut session = MockPersistenceSession::new();
        session
            .expect_create_record()
            .withf(|r| matches!(r, DecodedRecord::SensorRegistration(s) if s.ip.is_none()))
            .times(1)
            .returning(|_| Ok(1));

        let payload = json!({
            "sn": "CAM-7",
            "name": "east camera",
            "sensorType": "camera",
            "lng": 121.47,
            "lat": 31.23,
            "intersectionCode": "X1"
        });

        SensorRegistrationHandler::new()
            .handle(&mut session, &topic(), payload.to_string().as_bytes())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_handle_rejects_unknown_sensor_type() {
        let mut session = MockPersistenceSession::new();
        session.expect_create_record().times(0);

        let payload = json!({
            "sn": "S-1",
            "name": "mystery",
            "sensorType": "sonar",
            "lng": 121.47,
            "lat": 31.23,
            "intersectionCode": "X1"
        });

        let result = SensorRegistrationHandler::new()
            .handle(&mut session, &topic(), payload.to_string().as_bytes())
            .await;

        assert!(matches!(result, Err(HandlerError::Decode(_))));
    }

    #[tokio::test]
    async fn test_handle_rejects_invalid_ip() {
        let mut session = MockPersistenceSession::new();
        session.expect_create_record().times(0);

        let payload = json!({
            "sn": "RD-2",
            "name": "radar",
            "sensorType": "radar",
            "ip": "not-an-ip",
            "lng": 121.47,
            "lat": 31.23,
            "intersectionCode": "X1"
        });

        let result = SensorRegistrationHandler::new()
            .handle(&mut session, &topic(), payload.to_string().as_bytes())
            .await;

        assert!(matches!(result, Err(HandlerError::Decode(_))));
    }
}
