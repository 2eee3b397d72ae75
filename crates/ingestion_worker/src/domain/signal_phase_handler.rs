use crate::domain::{
    decode_document, decode_entry, persist_entries, HandleOutcome, HandlerResult, MessageHandler,
    ParsedTopic,
};
use async_trait::async_trait;
use chrono::Utc;
use common::domain::{DecodedRecord, PersistenceSession, SignalPhaseRecord};
use garde::Validate;
use serde::Deserialize;
use tracing::{debug, instrument};

/// Message type key for signal phase and timing broadcasts
pub const SIGNAL_PHASE_MESSAGE_TYPE: &str = "SPAT";

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct SignalPhaseMessage {
    #[garde(length(min = 1))]
    intersection_code: String,
    #[garde(skip)]
    phases: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct PhaseEntry {
    #[garde(length(min = 1))]
    phase_id: String,
    #[garde(length(min = 1))]
    light: String,
    #[serde(default)]
    #[garde(range(min = 0.0))]
    remaining_time: Option<f64>,
}

/// Handles `SPAT` messages: one durable record per phase
#[derive(Debug, Default)]
pub struct SignalPhaseHandler;

impl SignalPhaseHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MessageHandler for SignalPhaseHandler {
    #[instrument(skip_all, fields(message_type = SIGNAL_PHASE_MESSAGE_TYPE))]
    async fn handle(
        &self,
        session: &mut dyn PersistenceSession,
        topic: &ParsedTopic,
        payload: &[u8],
    ) -> HandlerResult<HandleOutcome> {
        let message: SignalPhaseMessage = decode_document(payload)?;
        let received_at = Utc::now();
        debug!(
            intersection_code = %message.intersection_code,
            phases = message.phases.len(),
            "decoded signal phase message"
        );

        let intersection_code = message.intersection_code;
        persist_entries(session, message.phases, |entry| {
            let phase: PhaseEntry = decode_entry(entry)?;
            Ok(DecodedRecord::SignalPhase(SignalPhaseRecord {
                device_id: topic.device_id.clone(),
                intersection_code: intersection_code.clone(),
                phase_id: phase.phase_id,
                light: phase.light,
                remaining_time: phase.remaining_time,
                received_at,
            }))
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
        TopicParser::default().parse("v2x/rsu-9/SPAT").unwrap()
    }

    #[tokio::test]
    async fn test_handle_persists_each_phase() {
        let mut session = MockPersistenceSession::new();
        session
            .expect_create_record()
            .withf(|r| {
                matches!(r, DecodedRecord::SignalPhase(p)
                    if p.intersection_code == "X1" && p.device_id == "rsu-9")
            })
            .times(2)
            .returning(|_| Ok(1));

        let payload = json!({
            "intersectionCode": "X1",
            "phases": [
                {"phaseId": "1", "light": "green", "remainingTime": 12.0},
                {"phaseId": "2", "light": "red"}
            ]
        });

        let outcome = SignalPhaseHandler::new()
            .handle(&mut session, &topic(), payload.to_string().as_bytes())
            .await
            .unwrap();

        assert_eq!(outcome, HandleOutcome { persisted: 2, rejected: 0 });
    }

    #[tokio::test]
    async fn test_handle_persists_first_and_third_when_second_malformed() {
        let mut session = MockPersistenceSession::new();
        session
            .expect_create_record()
            .withf(|r| matches!(r, DecodedRecord::SignalPhase(p) if p.phase_id == "1" || p.phase_id == "3"))
            .times(2)
            .returning(|_| Ok(1));

        let payload = json!({
            "intersectionCode": "X1",
            "phases": [
                {"phaseId": "1", "light": "green"},
                {"phaseId": "", "light": "red"},
                {"phaseId": "3", "light": "yellow"}
            ]
        });

        let outcome = SignalPhaseHandler::new()
            .handle(&mut session, &topic(), payload.to_string().as_bytes())
            .await
            .unwrap();

        assert_eq!(outcome, HandleOutcome { persisted: 2, rejected: 1 });
    }

    #[tokio::test]
    async fn test_handle_rejects_negative_remaining_time() {
        let mut session = MockPersistenceSession::new();
        session.expect_create_record().times(0);

        let payload = json!({
            "intersectionCode": "X1",
            "phases": [{"phaseId": "1", "light": "green", "remainingTime": -1.0}]
        });

        let outcome = SignalPhaseHandler::new()
            .handle(&mut session, &topic(), payload.to_string().as_bytes())
            .await
            .unwrap();

        assert_eq!(outcome.rejected, 1);
    }

    #[tokio::test]
    async fn test_handle_requires_intersection_code() {
        let mut session = MockPersistenceSession::new();
        session.expect_create_record().times(0);

        let payload = json!({ "intersectionCode": "", "phases": [] });

        let result = SignalPhaseHandler::new()
            .handle(&mut session, &topic(), payload.to_string().as_bytes())
            .await;

        assert!(matches!(result, Err(HandlerError::Decode(_))));
    }

    #[tokio::test]
    async fn test_handle_reports_reference_violation() {
        let mut session = MockPersistenceSession::new();
        session
            .expect_create_record()
            .returning(|_| Err(DomainError::ReferenceViolation("intersection".to_string())));

        let payload = json!({
            "intersectionCode": "UNKNOWN",
            "phases": [{"phaseId": "1", "light": "green"}]
        });

        let result = SignalPhaseHandler::new()
            .handle(&mut session, &topic(), payload.to_string().as_bytes())
            .await;

        assert!(matches!(
            result,
            Err(HandlerError::Persistence {
                source: DomainError::ReferenceViolation(_),
                ..
            })
        ));
    }
}
