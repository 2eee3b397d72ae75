use common::domain::{
    CongestionLevel, DeviceMetricSnapshot, DomainError, DomainResult, IntersectionSummary,
    PersistenceGateway, RealtimeCache,
};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Real-time traffic situation per device and per intersection.
///
/// Pushes go straight to the realtime cache. Summaries resolve the
/// intersection's devices through a persistence session, then combine
/// whatever live snapshots the cache holds for them.
pub struct TrafficSituationService {
    gateway: Arc<dyn PersistenceGateway>,
    cache: Arc<dyn RealtimeCache>,
}

impl TrafficSituationService {
    pub fn new(gateway: Arc<dyn PersistenceGateway>, cache: Arc<dyn RealtimeCache>) -> Self {
        Self { gateway, cache }
    }

    /// Merge the present fields of `update` into the device's snapshot.
    ///
    /// An update with no metrics only refreshes the expiry of a live snapshot.
    #[instrument(skip(self, update), fields(device_id = %device_id))]
    pub async fn push(&self, device_id: &str, update: &DeviceMetricSnapshot) -> DomainResult<()> {
        if device_id.trim().is_empty() {
            return Err(DomainError::InvalidDeviceId(
                "Device ID cannot be empty".to_string(),
            ));
        }

        self.cache.push(device_id, update).await?;
        debug!("realtime snapshot updated");
        Ok(())
    }

    /// Combine the live snapshots of every device at an intersection
    #[instrument(skip(self), fields(intersection_code = %intersection_code))]
    pub async fn summarize(&self, intersection_code: &str) -> DomainResult<IntersectionSummary> {
        let devices = {
            let mut session = self.gateway.session().await?;
            if !session.intersection_exists(intersection_code).await? {
                return Err(DomainError::IntersectionNotFound(
                    intersection_code.to_string(),
                ));
            }
            session
                .list_devices_for_intersection(intersection_code)
                .await?
        };

        let mut snapshots = Vec::with_capacity(devices.len());
        for device_id in &devices {
            match self.cache.pull(device_id).await {
                Ok(Some(snapshot)) => snapshots.push(snapshot),
                Ok(None) => debug!(device_id = %device_id, "no current snapshot for device"),
                Err(DomainError::CacheUnavailable(reason)) => warn!(
                    device_id = %device_id,
                    cache_unavailable = true,
                    error = %reason,
                    "realtime cache unavailable, treating device as absent"
                ),
                Err(e) => warn!(
                    device_id = %device_id,
                    error = %e,
                    "unreadable snapshot, treating device as absent"
                ),
            }
        }

        let summary = combine(&snapshots);
        debug!(
            devices = devices.len(),
            contributing = summary.device_count,
            "intersection summarized"
        );
        Ok(summary)
    }
}

/// Combine per-device snapshots into one intersection summary.
///
/// Counts are summed, saturating at `u64::MAX`. The average speed is the mean of the contributing
/// devices' speeds (each rounded to one decimal, absent counted as zero),
/// truncated to an integer; with no contributors it stays at zero.
/// `Congestion` is sticky once seen; otherwise the last reported level other
/// than free flow wins.
pub fn combine(snapshots: &[DeviceMetricSnapshot]) -> IntersectionSummary {
    let mut summary = IntersectionSummary::default();
    let mut speed_total = 0.0_f64;

    for snapshot in snapshots {
        summary.vehicle_total = summary
            .vehicle_total
            .saturating_add(snapshot.vehicle_total.unwrap_or(0));
        summary.pedestrian_total = summary
            .pedestrian_total
            .saturating_add(snapshot.pedestrian_total.unwrap_or(0));
        speed_total += round_to_tenth(snapshot.average_speed.unwrap_or(0.0));

        if !summary.congestion.is_most_severe() {
            if let Some(level) = snapshot.congestion.filter(|l| *l != CongestionLevel::FreeFlow) {
                summary.congestion = level;
            }
        }
        summary.device_count += 1;
    }

    summary.average_speed = if summary.device_count == 0 {
        speed_total as i64
    } else {
        (speed_total / summary.device_count as f64).trunc() as i64
    };
    summary
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
