use crate::domain::metrics::DeviceMetricSnapshot;
use crate::domain::result::DomainResult;
use async_trait::async_trait;

/// Short-lived per-device metric store backing "current traffic situation" queries.
///
/// Implementations should:
/// - Upsert only the fields present in a push, leaving the others untouched
/// - Reset the key's expiry on every push
/// - Report expired or never-pushed devices as absent
/// - Return `DomainError::CacheUnavailable` when the backing store cannot be reached
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RealtimeCache: Send + Sync {
    /// Merge the present fields of `update` into the device's snapshot and refresh its expiry
    async fn push(&self, device_id: &str, update: &DeviceMetricSnapshot) -> DomainResult<()>;

    /// Current snapshot for a device, or `None` if it was never pushed or has expired
    async fn pull(&self, device_id: &str) -> DomainResult<Option<DeviceMetricSnapshot>>;
}
