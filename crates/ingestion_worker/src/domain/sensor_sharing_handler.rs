use crate::domain::{
    decode_document, decode_entry, persist_entries, HandleOutcome, HandlerResult, MessageHandler,
    ParsedTopic,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::domain::{DecodedRecord, PersistenceSession, Position, SensorSharingRecord};
use garde::Validate;
use serde::Deserialize;
use tracing::{debug, instrument};

/// Message type key published by roadside units for cooperative sensor sharing
pub const SENSOR_SHARING_MESSAGE_TYPE: &str = "SSW";

#[derive(Debug, Clone, Copy, Deserialize, Validate)]
pub(crate) struct PositionPayload {
    #[serde(alias = "lon")]
    #[garde(range(min = -180.0, max = 180.0))]
    pub lng: f64,
    #[garde(range(min = -90.0, max = 90.0))]
    pub lat: f64,
}

impl From<PositionPayload> for Position {
    fn from(p: PositionPayload) -> Self {
        Position {
            lng: p.lng,
            lat: p.lat,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct SensorSharingMessage {
    #[serde(default)]
    #[garde(dive)]
    sensor_pos: Option<PositionPayload>,
    // Entries are decoded one by one so a bad entry cannot sink its siblings
    #[garde(skip)]
    content: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct SensorSharingEntry {
    #[garde(skip)]
    sec_mark: i64,
    #[garde(dive)]
    ego_info: EgoInfo,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct EgoInfo {
    #[garde(length(min = 1))]
    ego_id: String,
    #[garde(dive)]
    ego_pos: PositionPayload,
    #[garde(range(min = 0.0))]
    speed: f64,
    #[garde(range(min = 0.0, max = 360.0))]
    heading: f64,
    #[serde(default)]
    #[garde(skip)]
    width: Option<f64>,
    #[serde(default)]
    #[garde(skip)]
    length: Option<f64>,
    #[serde(default)]
    #[garde(skip)]
    height: Option<f64>,
}

/// Handles `SSW` messages: one durable record per vehicle in `content`
#[derive(Debug, Default)]
pub struct SensorSharingHandler;

impl SensorSharingHandler {
    pub fn new() -> Self {
        Self
    }

    fn to_record(
        device_id: &str,
        sensor_pos: Option<Position>,
        entry: SensorSharingEntry,
        received_at: DateTime<Utc>,
    ) -> DecodedRecord {
        let ego = entry.ego_info;
        DecodedRecord::SensorSharing(SensorSharingRecord {
            device_id: device_id.to_string(),
            sensor_pos,
            sec_mark: entry.sec_mark,
            ego_id: ego.ego_id,
            ego_pos: ego.ego_pos.into(),
            speed: ego.speed,
            heading: ego.heading,
            width: ego.width,
            length: ego.length,
            height: ego.height,
            received_at,
        })
    }
}

#[async_trait]
impl MessageHandler for SensorSharingHandler {
    #[instrument(skip_all, fields(message_type = SENSOR_SHARING_MESSAGE_TYPE))]
    async fn handle(
        &self,
        session: &mut dyn PersistenceSession,
        topic: &ParsedTopic,
        payload: &[u8],
    ) -> HandlerResult<HandleOutcome> {
        let message: SensorSharingMessage = decode_document(payload)?;
        let sensor_pos = message.sensor_pos.map(Position::from);
        let received_at = Utc::now();
        debug!(entries = message.content.len(), "decoded sensor sharing message");

        persist_entries(session, message.content, |entry| {
            let entry: SensorSharingEntry = decode_entry(entry)?;
            Ok(Self::to_record(&topic.device_id, sensor_pos, entry, received_at))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HandlerError, TopicParser};
    use common::domain::{DomainError, MockPersistenceSession};
    use serde_json::json;

    fn topic() -> ParsedTopic {
        TopicParser::default().parse("v2x/R328328/SSW").unwrap()
    }

    fn vehicle(ego_id: &str, speed: f64) -> serde_json::Value {
        json!({
            "secMark": 1200,
            "egoInfo": {
                "egoId": ego_id,
                "egoPos": {"lng": 121.47, "lat": 31.23},
                "speed": speed,
                "heading": 90.0,
                "width": 1.8,
                "length": 4.5,
                "height": 1.5
            }
        })
    }

    fn is_vehicle(record: &DecodedRecord, ego_id: &str) -> bool {
        matches!(record, DecodedRecord::SensorSharing(r) if r.ego_id == ego_id && r.device_id == "R328328")
    }

    #[tokio::test]
    async fn test_handle_persists_every_vehicle() {
        let mut session = MockPersistenceSession::new();
        session
            .expect_create_record()
            .withf(|r| is_vehicle(r, "veh-1"))
            .times(1)
            .returning(|_| Ok(1));
        session
            .expect_create_record()
            .withf(|r| is_vehicle(r, "veh-2"))
            .times(1)
            .returning(|_| Ok(2));

        let payload = json!({
            "sensorPos": {"lng": 121.4, "lat": 31.2},
            "content": [vehicle("veh-1", 12.5), vehicle("veh-2", 8.0)]
        });

        let outcome = SensorSharingHandler::new()
            .handle(&mut session, &topic(), payload.to_string().as_bytes())
            .await
            .unwrap();

        assert_eq!(outcome, HandleOutcome { persisted: 2, rejected: 0 });
    }

    #[tokio::test]
    async fn test_handle_skips_malformed_vehicle() {
        let mut session = MockPersistenceSession::new();
        session
            .expect_create_record()
            .withf(|r| is_vehicle(r, "veh-1") || is_vehicle(r, "veh-3"))
            .times(2)
            .returning(|_| Ok(1));

        let payload = json!({
            "content": [
                vehicle("veh-1", 12.5),
                {"secMark": 1200, "egoInfo": {"egoId": "veh-2"}},
                vehicle("veh-3", 3.0)
            ]
        });

        let outcome = SensorSharingHandler::new()
            .handle(&mut session, &topic(), payload.to_string().as_bytes())
            .await
            .unwrap();

        assert_eq!(outcome, HandleOutcome { persisted: 2, rejected: 1 });
    }

    #[tokio::test]
    async fn test_handle_rejects_out_of_range_vehicle() {
        let mut session = MockPersistenceSession::new();
        session.expect_create_record().times(0);

        let payload = json!({ "content": [vehicle("veh-1", -4.0)] });

        let outcome = SensorSharingHandler::new()
            .handle(&mut session, &topic(), payload.to_string().as_bytes())
            .await
            .unwrap();

        assert_eq!(outcome.rejected, 1);
    }

    #[tokio::test]
    async fn test_handle_carries_sensor_position() {
        let mut session = MockPersistenceSession::new();
        session
            .expect_create_record()
            .withf(|r| {
                matches!(r, DecodedRecord::SensorSharing(s)
                    if s.sensor_pos == Some(Position { lng: 121.4, lat: 31.2 }) && s.sec_mark == 1200)
            })
            .times(1)
            .returning(|_| Ok(1));

        let payload = json!({
            "sensorPos": {"lon": 121.4, "lat": 31.2},
            "content": [vehicle("veh-1", 12.5)]
        });

        SensorSharingHandler::new()
            .handle(&mut session, &topic(), payload.to_string().as_bytes())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_handle_invalid_json() {
        let mut session = MockPersistenceSession::new();
        session.expect_create_record().times(0);

        let result = SensorSharingHandler::new()
            .handle(&mut session, &topic(), b"not json")
            .await;

        assert!(matches!(result, Err(HandlerError::Decode(_))));
    }

    #[tokio::test]
    async fn test_handle_missing_content() {
        let mut session = MockPersistenceSession::new();
        session.expect_create_record().times(0);

        let result = SensorSharingHandler::new()
            .handle(&mut session, &topic(), br#"{"sensorPos": null}"#)
            .await;

        assert!(matches!(result, Err(HandlerError::Decode(_))));
    }

    #[tokio::test]
    async fn test_handle_unknown_device() {
        let mut session = MockPersistenceSession::new();
        session
            .expect_create_record()
            .returning(|r| Err(DomainError::DeviceNotFound(r.device_id().to_string())));

        let payload = json!({ "content": [vehicle("veh-1", 12.5)] });

        let result = SensorSharingHandler::new()
            .handle(&mut session, &topic(), payload.to_string().as_bytes())
            .await;

        assert!(matches!(
            result,
            Err(HandlerError::Persistence {
                persisted: 0,
                failed: 1,
                source: DomainError::DeviceNotFound(_)
            })
        ));
    }
}
