use crate::domain::{
    CongestionLevel, DeviceMetricSnapshot, DomainError, DomainResult, RealtimeCache,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Namespace for per-device traffic situation keys
pub const ROUTE_INFO_KEY_PREFIX: &str = "ROUTE_INFO_";

/// Expiry applied to a snapshot on every push
pub const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_secs(60);

const FIELD_VEHICLE_TOTAL: &str = "vehicleTotal";
const FIELD_AVERAGE_SPEED: &str = "averageSpeed";
const FIELD_PEDESTRIAN_TOTAL: &str = "pedestrianTotal";
const FIELD_CONGESTION: &str = "congestion";

/// Cache key for a device's snapshot
pub fn snapshot_key(device_id: &str) -> String {
    format!("{}{}", ROUTE_INFO_KEY_PREFIX, device_id)
}

struct CacheEntry {
    fields: HashMap<String, String>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-process real-time cache storing each snapshot as a flat field map with a per-key expiry.
///
/// Upserts lock only the shard holding the device's key, so pushes for
/// different devices proceed in parallel while concurrent pushes for the same
/// device are applied one after the other (last write wins per field).
pub struct FieldMapCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl FieldMapCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of keys currently held, including expired keys not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired key and return how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.entries.len())
    }
}

impl Default for FieldMapCache {
    fn default() -> Self {
        Self::new(DEFAULT_SNAPSHOT_TTL)
    }
}

#[async_trait]
impl RealtimeCache for FieldMapCache {
    #[instrument(skip(self, update), fields(device_id = %device_id))]
    async fn push(&self, device_id: &str, update: &DeviceMetricSnapshot) -> DomainResult<()> {
        let key = snapshot_key(device_id);
        let now = Instant::now();
        let fields = encode_fields(update);

        if fields.is_empty() {
            // Nothing to write: only a live key gets its expiry refreshed
            if let Some(mut entry) = self.entries.get_mut(&key) {
                if entry.is_live(now) {
                    entry.expires_at = now + self.ttl;
                }
            }
            return Ok(());
        }

        let mut entry = self.entries.entry(key).or_insert_with(|| CacheEntry {
            fields: HashMap::new(),
            expires_at: now,
        });
        if !entry.is_live(now) {
            entry.fields.clear();
        }
        entry.fields.extend(fields);
        entry.expires_at = now + self.ttl;

        debug!(field_count = entry.fields.len(), "snapshot pushed");
        Ok(())
    }

    #[instrument(skip(self), fields(device_id = %device_id))]
    async fn pull(&self, device_id: &str) -> DomainResult<Option<DeviceMetricSnapshot>> {
        let key = snapshot_key(device_id);
        let now = Instant::now();

        match self.entries.get(&key) {
            Some(entry) if entry.is_live(now) => {
                return decode_fields(device_id, &entry.fields).map(Some);
            }
            Some(_) => {}
            None => return Ok(None),
        }

        // Shard guard released above; remove only if nobody refreshed it meanwhile
        self.entries.remove_if(&key, |_, entry| !entry.is_live(now));
        Ok(None)
    }
}

fn encode_fields(update: &DeviceMetricSnapshot) -> Vec<(String, String)> {
    let mut fields = Vec::with_capacity(4);
    if let Some(v) = update.vehicle_total {
        fields.push((FIELD_VEHICLE_TOTAL.to_string(), v.to_string()));
    }
    if let Some(v) = update.average_speed {
        fields.push((FIELD_AVERAGE_SPEED.to_string(), v.to_string()));
    }
    if let Some(v) = update.pedestrian_total {
        fields.push((FIELD_PEDESTRIAN_TOTAL.to_string(), v.to_string()));
    }
    if let Some(v) = update.congestion {
        fields.push((FIELD_CONGESTION.to_string(), v.as_str().to_string()));
    }
    fields
}

fn decode_fields(
    device_id: &str,
    fields: &HashMap<String, String>,
) -> DomainResult<DeviceMetricSnapshot> {
    Ok(DeviceMetricSnapshot {
        vehicle_total: decode_field(device_id, fields, FIELD_VEHICLE_TOTAL)?,
        average_speed: decode_field(device_id, fields, FIELD_AVERAGE_SPEED)?,
        pedestrian_total: decode_field(device_id, fields, FIELD_PEDESTRIAN_TOTAL)?,
        congestion: decode_field::<CongestionLevel>(device_id, fields, FIELD_CONGESTION)?,
    })
}

/// Absent field decodes to `None`; a present but unparsable field is an error
fn decode_field<T: std::str::FromStr>(
    device_id: &str,
    fields: &HashMap<String, String>,
    name: &str,
) -> DomainResult<Option<T>> {
    match fields.get(name) {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
            DomainError::SnapshotCorrupt(
                device_id.to_string(),
                format!("field '{}' has unparsable value '{}'", name, raw),
            )
        }),
    }
}

/// Periodically purge expired snapshots until cancelled.
///
/// Reads already treat expired keys as absent; the sweeper only bounds memory
/// held for devices that stopped reporting.
pub async fn run_expiry_sweeper(
    cache: Arc<FieldMapCache>,
    interval: Duration,
    ctx: CancellationToken,
) -> anyhow::Result<()> {
    info!(interval_secs = interval.as_secs(), "starting snapshot expiry sweeper");
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ctx.cancelled() => {
                debug!("snapshot expiry sweeper stopped");
                return Ok(());
            }
            _ = ticker.tick() => {
                let purged = cache.purge_expired();
                if purged > 0 {
                    debug!(purged, remaining = cache.len(), "purged expired snapshots");
                }
            }
        }
    }
}
