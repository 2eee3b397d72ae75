use crate::domain::{
    DecodedRecord, DomainError, DomainResult, PersistenceGateway, PersistenceSession, RecordId,
    SensorRegistrationRecord, SensorSharingRecord, SignalPhaseRecord, TrafficSituationRecord,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use tracing::{debug, instrument};

/// SQLSTATE raised when a foreign key constraint rejects an insert
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// PostgreSQL implementation of PersistenceGateway; each session owns one pooled connection
#[derive(Clone)]
pub struct PostgresPersistenceGateway {
    client: PostgresClient,
}

impl PostgresPersistenceGateway {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PersistenceGateway for PostgresPersistenceGateway {
    async fn session(&self) -> DomainResult<Box<dyn PersistenceSession>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;
        Ok(Box::new(PostgresSession { conn }))
    }
}

/// Session over a single checked-out connection
pub struct PostgresSession {
    conn: deadpool_postgres::Client,
}

impl PostgresSession {
    async fn insert_sensor_sharing(&self, r: &SensorSharingRecord) -> DomainResult<Option<RecordId>> {
        let sensor_lng = r.sensor_pos.map(|p| p.lng);
        let sensor_lat = r.sensor_pos.map(|p| p.lat);
        let row = self
            .conn
            .query_opt(
                "INSERT INTO sensor_sharing_records (device_id, intersection_code, sensor_lng, sensor_lat, sec_mark, ego_id, ego_lng, ego_lat, speed, heading, width, length, height, received_at)
                 SELECT d.device_id, d.intersection_code, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13
                 FROM devices d WHERE d.device_id = $1
                 RETURNING id",
                &[
                    &r.device_id,
                    &sensor_lng,
                    &sensor_lat,
                    &r.sec_mark,
                    &r.ego_id,
                    &r.ego_pos.lng,
                    &r.ego_pos.lat,
                    &r.speed,
                    &r.heading,
                    &r.width,
                    &r.length,
                    &r.height,
                    &r.received_at,
                ],
            )
            .await
            .map_err(map_insert_error)?;
        Ok(row.map(|row| row.get(0)))
    }

    async fn insert_signal_phase(&self, r: &SignalPhaseRecord) -> DomainResult<Option<RecordId>> {
        let row = self
            .conn
            .query_opt(
                "INSERT INTO signal_phase_records (device_id, intersection_code, phase_id, light, remaining_time, received_at)
                 SELECT d.device_id, $2, $3, $4, $5, $6
                 FROM devices d WHERE d.device_id = $1
                 RETURNING id",
                &[
                    &r.device_id,
                    &r.intersection_code,
                    &r.phase_id,
                    &r.light,
                    &r.remaining_time,
                    &r.received_at,
                ],
            )
            .await
            .map_err(map_insert_error)?;
        Ok(row.map(|row| row.get(0)))
    }

    async fn insert_traffic_situation(
        &self,
        r: &TrafficSituationRecord,
    ) -> DomainResult<Option<RecordId>> {
        let vehicle_total = to_i64("vehicle_total", r.vehicle_total)?;
        let pedestrian_total = to_i64("pedestrian_total", r.pedestrian_total)?;
        let congestion = r.congestion.map(|c| c.as_str());
        let row = self
            .conn
            .query_opt(
                "INSERT INTO traffic_situation_records (device_id, intersection_code, vehicle_total, average_speed, pedestrian_total, congestion, received_at)
                 SELECT d.device_id, d.intersection_code, $2, $3, $4, $5, $6
                 FROM devices d WHERE d.device_id = $1
                 RETURNING id",
                &[
                    &r.device_id,
                    &vehicle_total,
                    &r.average_speed,
                    &pedestrian_total,
                    &congestion,
                    &r.received_at,
                ],
            )
            .await
            .map_err(map_insert_error)?;
        Ok(row.map(|row| row.get(0)))
    }

    async fn upsert_sensor(&self, r: &SensorRegistrationRecord) -> DomainResult<Option<RecordId>> {
        // Sensors re-announce themselves; the latest registration wins
        let row = self
            .conn
            .query_opt(
                "INSERT INTO sensors (serial_number, device_id, name, sensor_type, ip, lng, lat, intersection_code, registered_at)
                 SELECT $1, d.device_id, $3, $4, $5, $6, $7, $8, $9
                 FROM devices d WHERE d.device_id = $2
                 ON CONFLICT (serial_number) DO UPDATE SET
                     device_id = EXCLUDED.device_id,
                     name = EXCLUDED.name,
                     sensor_type = EXCLUDED.sensor_type,
                     ip = EXCLUDED.ip,
                     lng = EXCLUDED.lng,
                     lat = EXCLUDED.lat,
                     intersection_code = EXCLUDED.intersection_code,
                     registered_at = EXCLUDED.registered_at
                 RETURNING id",
                &[
                    &r.serial_number,
                    &r.device_id,
                    &r.name,
                    &r.sensor_type.as_str(),
                    &r.ip,
                    &r.position.lng,
                    &r.position.lat,
                    &r.intersection_code,
                    &r.received_at,
                ],
            )
            .await
            .map_err(map_insert_error)?;
        Ok(row.map(|row| row.get(0)))
    }
}

#[async_trait]
impl PersistenceSession for PostgresSession {
    #[instrument(skip(self, record), fields(record_type = record.record_type(), device_id = %record.device_id()))]
    async fn create_record(&mut self, record: &DecodedRecord) -> DomainResult<RecordId> {
        let id = match record {
            DecodedRecord::SensorSharing(r) => self.insert_sensor_sharing(r).await?,
            DecodedRecord::SignalPhase(r) => self.insert_signal_phase(r).await?,
            DecodedRecord::TrafficSituation(r) => self.insert_traffic_situation(r).await?,
            DecodedRecord::SensorRegistration(r) => self.upsert_sensor(r).await?,
        };

        // INSERT ... SELECT yields no row when the reporting device is unknown
        let id = id.ok_or_else(|| DomainError::DeviceNotFound(record.device_id().to_string()))?;
        debug!(record_id = id, "record persisted");
        Ok(id)
    }

    #[instrument(skip(self), fields(intersection_code = %intersection_code))]
    async fn list_devices_for_intersection(
        &mut self,
        intersection_code: &str,
    ) -> DomainResult<Vec<String>> {
        let rows = self
            .conn
            .query(
                "SELECT device_id FROM devices WHERE intersection_code = $1 ORDER BY device_id",
                &[&intersection_code],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    #[instrument(skip(self), fields(intersection_code = %intersection_code))]
    async fn intersection_exists(&mut self, intersection_code: &str) -> DomainResult<bool> {
        let row = self
            .conn
            .query_opt(
                "SELECT 1 FROM intersections WHERE code = $1",
                &[&intersection_code],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.is_some())
    }
}

fn map_insert_error(e: tokio_postgres::Error) -> DomainError {
    if let Some(db_err) = e.as_db_error() {
        if db_err.code().code() == FOREIGN_KEY_VIOLATION {
            return DomainError::ReferenceViolation(db_err.message().to_string());
        }
    }
    DomainError::RepositoryError(e.into())
}

fn to_i64(field: &str, value: Option<u64>) -> DomainResult<Option<i64>> {
    value
        .map(i64::try_from)
        .transpose()
        .map_err(|_| DomainError::ValidationError(format!("{} out of range", field)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_i64_passes_through_absent() {
        assert_eq!(to_i64("vehicle_total", None).unwrap(), None);
    }

    #[test]
    fn test_to_i64_converts_in_range() {
        assert_eq!(to_i64("vehicle_total", Some(42)).unwrap(), Some(42));
    }

    #[test]
    fn test_to_i64_rejects_overflow() {
        let result = to_i64("vehicle_total", Some(u64::MAX));
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }
}
