use crate::domain::{
    decode_document, persist_one, HandleOutcome, HandlerError, HandlerResult, MessageHandler,
    ParsedTopic,
};
use async_trait::async_trait;
use chrono::Utc;
use common::domain::{
    CongestionLevel, DecodedRecord, DeviceMetricSnapshot, PersistenceSession, RealtimeCache,
    TrafficSituationRecord,
};
use garde::Validate;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Message type key for per-device traffic situation reports
pub const TRAFFIC_SITUATION_MESSAGE_TYPE: &str = "ROUTE_INFO";

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct TrafficSituationMessage {
    #[garde(skip)]
    vehicle_total: Option<u64>,
    #[garde(range(min = 0.0))]
    average_speed: Option<f64>,
    #[garde(skip)]
    pedestrian_total: Option<u64>,
    #[garde(skip)]
    congestion: Option<CongestionLevel>,
}

impl TrafficSituationMessage {
    fn snapshot(&self) -> DeviceMetricSnapshot {
        DeviceMetricSnapshot {
            vehicle_total: self.vehicle_total,
            average_speed: self.average_speed,
            pedestrian_total: self.pedestrian_total,
            congestion: self.congestion,
        }
    }
}

/// Handles `ROUTE_INFO` messages.
///
/// The report is persisted first; only a persisted report is pushed to the
/// real-time cache. A cache failure is logged and does not fail the message.
pub struct TrafficSituationHandler {
    cache: Arc<dyn RealtimeCache>,
}

impl TrafficSituationHandler {
    pub fn new(cache: Arc<dyn RealtimeCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl MessageHandler for TrafficSituationHandler {
    #[instrument(skip_all, fields(message_type = TRAFFIC_SITUATION_MESSAGE_TYPE))]
    async fn handle(
        &self,
        session: &mut dyn PersistenceSession,
        topic: &ParsedTopic,
        payload: &[u8],
    ) -> HandlerResult<HandleOutcome> {
        let message: TrafficSituationMessage = decode_document(payload)?;
        let snapshot = message.snapshot();
        if snapshot.is_empty() {
            return Err(HandlerError::Decode(
                "traffic situation carries no metrics".to_string(),
            ));
        }

        let record = DecodedRecord::TrafficSituation(TrafficSituationRecord {
            device_id: topic.device_id.clone(),
            vehicle_total: snapshot.vehicle_total,
            average_speed: snapshot.average_speed,
            pedestrian_total: snapshot.pedestrian_total,
            congestion: snapshot.congestion,
            received_at: Utc::now(),
        });
        let outcome = persist_one(session, &record).await?;

        match self.cache.push(&topic.device_id, &snapshot).await {
            Ok(()) => debug!("pushed traffic situation to realtime cache"),
            Err(e) => warn!(
                cache_unavailable = true,
                error = %e,
                "failed to push traffic situation to realtime cache"
            ),
        }

        Ok(outcome)
    }
}
