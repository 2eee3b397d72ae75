use crate::domain::record::{DecodedRecord, RecordId};
use crate::domain::result::DomainResult;
use async_trait::async_trait;

/// Source of persistence sessions.
///
/// Each message dispatch and each API call acquires its own session; sessions
/// are never shared between concurrent units of work.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Acquire a session backed by a dedicated connection
    async fn session(&self) -> DomainResult<Box<dyn PersistenceSession>>;
}

/// Unit-of-work handle onto the relational store.
///
/// Implementations release their connection when dropped, so a session is
/// returned to the pool on every exit path of the caller.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PersistenceSession: Send {
    /// Persist one decoded record.
    ///
    /// Fails with `DeviceNotFound` or `ReferenceViolation` when the record
    /// references a device or intersection that does not exist.
    async fn create_record(&mut self, record: &DecodedRecord) -> DomainResult<RecordId>;

    /// Device identifiers registered at an intersection
    async fn list_devices_for_intersection(
        &mut self,
        intersection_code: &str,
    ) -> DomainResult<Vec<String>>;

    async fn intersection_exists(&mut self, intersection_code: &str) -> DomainResult<bool>;
}
