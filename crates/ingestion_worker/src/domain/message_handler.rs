use crate::domain::ParsedTopic;
use async_trait::async_trait;
use common::domain::{DecodedRecord, DomainError, PersistenceSession};
use common::garde::validate_struct;
use garde::Validate;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Failed to decode payload: {0}")]
    Decode(String),

    /// At least one decoded record could not be stored. Every valid record in
    /// the message was still attempted; `source` is the first failure.
    #[error("Persisted {persisted} records, {failed} failed: {source}")]
    Persistence {
        persisted: usize,
        failed: usize,
        #[source]
        source: DomainError,
    },
}

pub type HandlerResult<T> = Result<T, HandlerError>;

/// Result of a successfully handled message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleOutcome {
    /// Records written to the persistence store
    pub persisted: usize,
    /// Entries dropped because they failed to decode or validate
    pub rejected: usize,
}

/// Decodes one message type and persists its records through the session it is given.
///
/// Handlers hold no per-message state and may be invoked concurrently.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(
        &self,
        session: &mut dyn PersistenceSession,
        topic: &ParsedTopic,
        payload: &[u8],
    ) -> HandlerResult<HandleOutcome>;
}

/// Parse and validate a whole message document
pub(crate) fn decode_document<T>(payload: &[u8]) -> HandlerResult<T>
where
    T: DeserializeOwned + Validate,
    T::Context: Default,
{
    let document: T =
        serde_json::from_slice(payload).map_err(|e| HandlerError::Decode(e.to_string()))?;
    validate_struct(&document).map_err(|e| HandlerError::Decode(e.to_string()))?;
    Ok(document)
}

/// Parse and validate one entry of a batch message
pub(crate) fn decode_entry<T>(entry: serde_json::Value) -> Result<T, String>
where
    T: DeserializeOwned + Validate,
    T::Context: Default,
{
    let entry: T = serde_json::from_value(entry).map_err(|e| e.to_string())?;
    validate_struct(&entry).map_err(|e| e.to_string())?;
    Ok(entry)
}

/// Decode and persist every entry of a batch message.
///
/// Entries that fail to decode are logged and skipped without affecting
/// their siblings. Every decoded entry is offered to the session even after
/// a persistence failure; the first such failure is returned once the batch
/// is exhausted.
pub(crate) async fn persist_entries<F>(
    session: &mut dyn PersistenceSession,
    entries: Vec<serde_json::Value>,
    decode: F,
) -> HandlerResult<HandleOutcome>
where
    F: Fn(serde_json::Value) -> Result<DecodedRecord, String>,
{
    let mut outcome = HandleOutcome::default();
    let mut failed = 0;
    let mut first_error = None;

    for (index, entry) in entries.into_iter().enumerate() {
        let record = match decode(entry) {
            Ok(record) => record,
            Err(reason) => {
                warn!(entry_index = index, error = %reason, "dropping malformed entry");
                outcome.rejected += 1;
                continue;
            }
        };

        match session.create_record(&record).await {
            Ok(_) => outcome.persisted += 1,
            Err(e) => {
                error!(
                    entry_index = index,
                    record_type = record.record_type(),
                    error = %e,
                    "failed to persist record"
                );
                failed += 1;
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(source) => Err(HandlerError::Persistence {
            persisted: outcome.persisted,
            failed,
            source,
        }),
        None => Ok(outcome),
    }
}

/// Persist a message that decodes to a single record
pub(crate) async fn persist_one(
    session: &mut dyn PersistenceSession,
    record: &DecodedRecord,
) -> HandlerResult<HandleOutcome> {
    session
        .create_record(record)
        .await
        .map(|_| HandleOutcome {
            persisted: 1,
            rejected: 0,
        })
        .map_err(|source| {
            error!(record_type = record.record_type(), error = %source, "failed to persist record");
            HandlerError::Persistence {
                persisted: 0,
                failed: 1,
                source,
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::domain::{MockPersistenceSession, SignalPhaseRecord};
    use serde_json::json;

    fn phase_record(phase_id: &str) -> DecodedRecord {
        DecodedRecord::SignalPhase(SignalPhaseRecord {
            device_id: "rsu-1".to_string(),
            intersection_code: "X1".to_string(),
            phase_id: phase_id.to_string(),
            light: "green".to_string(),
            remaining_time: None,
            received_at: Utc::now(),
        })
    }

    fn decode_phase(entry: serde_json::Value) -> Result<DecodedRecord, String> {
        entry
            .as_str()
            .map(phase_record)
            .ok_or_else(|| "expected string".to_string())
    }

    #[tokio::test]
    async fn test_persist_entries_skips_malformed_entry() {
        let mut session = MockPersistenceSession::new();
        session
            .expect_create_record()
            .times(2)
            .returning(|_| Ok(1));

        let entries = vec![json!("1"), json!(42), json!("3")];
        let outcome = persist_entries(&mut session, entries, decode_phase)
            .await
            .unwrap();

        assert_eq!(outcome, HandleOutcome { persisted: 2, rejected: 1 });
    }

    #[tokio::test]
    async fn test_persist_entries_attempts_all_after_failure() {
        let mut session = MockPersistenceSession::new();
        let mut seq = mockall::Sequence::new();
        session
            .expect_create_record()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(DomainError::DeviceNotFound("rsu-1".to_string())));
        session
            .expect_create_record()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Ok(7));

        let entries = vec![json!("1"), json!("2"), json!("3")];
        let result = persist_entries(&mut session, entries, decode_phase).await;

        match result {
            Err(HandlerError::Persistence {
                persisted,
                failed,
                source,
            }) => {
                assert_eq!(persisted, 2);
                assert_eq!(failed, 1);
                assert!(matches!(source, DomainError::DeviceNotFound(_)));
            }
            other => panic!("expected persistence error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_persist_entries_empty_batch() {
        let mut session = MockPersistenceSession::new();
        session.expect_create_record().times(0);

        let outcome = persist_entries(&mut session, Vec::new(), decode_phase)
            .await
            .unwrap();
        assert_eq!(outcome, HandleOutcome::default());
    }

    #[tokio::test]
    async fn test_persist_one_wraps_failure() {
        let mut session = MockPersistenceSession::new();
        session
            .expect_create_record()
            .returning(|_| Err(DomainError::ReferenceViolation("fk".to_string())));

        let result = persist_one(&mut session, &phase_record("1")).await;
        assert!(matches!(
            result,
            Err(HandlerError::Persistence { persisted: 0, failed: 1, .. })
        ));
    }
}
