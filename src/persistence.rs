//! Persistence gateway (§4.D): the one seam between the alert core and
//! storage. `InMemoryGateway` backs unit/integration tests; `PgGateway`
//! is the Postgres/Diesel implementation used in production, following
//! the repository-over-a-pool shape of the device repository this was
//! grounded on, including offloading blocking Diesel calls with
//! `tokio::task::spawn_blocking`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::device_directory::{self, DirectoryEntry};
use crate::error::{CoreError, CoreResult};
use crate::models::{
    Device, DeviceRow, EngagementEvent, EngagementEventRow, Sighting, SightingRow, WitnessConfirmation,
    WitnessConfirmationRow,
};
use crate::postgis_functions::{ST_DWithin, ST_MakePoint, ST_SetSRID};

pub type PgPool = Pool<ConnectionManager<PgConnection>>;
pub type PgConn = PooledConnection<ConnectionManager<PgConnection>>;

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn create_sighting(&self, sighting: Sighting) -> CoreResult<Uuid>;
    async fn get_sighting(&self, id: Uuid) -> CoreResult<Sighting>;
    async fn list_public_sightings(&self, limit: i64, offset: i64) -> CoreResult<Vec<Sighting>>;
    async fn update_enrichment(&self, sighting_id: Uuid, processor_name: &str, data: Json) -> CoreResult<()>;
    /// Returns the new `witness_count` after the atomic increment.
    async fn add_witness(&self, confirmation: WitnessConfirmation) -> CoreResult<i32>;
    async fn list_witnesses(&self, sighting_id: Uuid) -> CoreResult<Vec<WitnessConfirmation>>;
    /// Counts witness confirmations (across all sightings) located within
    /// `radius_km` of `(lat, lon)` and confirmed at or after `since`. Drives
    /// fan-out's local-witness-density escalation and emergency override.
    async fn count_recent_witnesses_near(
        &self,
        lat: f64,
        lon: f64,
        radius_km: f64,
        since: chrono::DateTime<Utc>,
    ) -> CoreResult<u32>;
    async fn list_devices_for_ring(
        &self,
        center_lat: f64,
        center_lon: f64,
        radius_km: f64,
        exclude_device_id: Option<&str>,
    ) -> CoreResult<Vec<DirectoryEntry>>;
    async fn append_engagement(&self, event: EngagementEvent) -> CoreResult<()>;
    async fn upsert_device(&self, device: Device) -> CoreResult<()>;
}

/// In-memory implementation: no geo-index, so `list_devices_for_ring`
/// always takes the haversine fallback path.
#[derive(Default, Clone)]
pub struct InMemoryGateway {
    sightings: Arc<DashMap<Uuid, Sighting>>,
    witnesses: Arc<DashMap<Uuid, Vec<WitnessConfirmation>>>,
    devices: Arc<DashMap<String, Device>>,
    engagements: Arc<DashMap<Uuid, EngagementEvent>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryGateway {
    async fn create_sighting(&self, sighting: Sighting) -> CoreResult<Uuid> {
        let id = sighting.id;
        self.sightings.entry(id).or_insert(sighting);
        Ok(id)
    }

    async fn get_sighting(&self, id: Uuid) -> CoreResult<Sighting> {
        self.sightings
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or_else(|| CoreError::NotFound(format!("sighting {id}")))
    }

    async fn list_public_sightings(&self, limit: i64, offset: i64) -> CoreResult<Vec<Sighting>> {
        let mut all: Vec<Sighting> = self.sightings.iter().filter(|e| e.is_public).map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let offset = offset.max(0) as usize;
        let limit = limit.max(0) as usize;
        Ok(all.into_iter().skip(offset).take(limit).collect())
    }

    async fn update_enrichment(&self, sighting_id: Uuid, processor_name: &str, data: Json) -> CoreResult<()> {
        let mut entry = self
            .sightings
            .get_mut(&sighting_id)
            .ok_or_else(|| CoreError::NotFound(format!("sighting {sighting_id}")))?;
        entry.enrichment_data.insert(processor_name.to_string(), data);
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn add_witness(&self, confirmation: WitnessConfirmation) -> CoreResult<i32> {
        let mut bucket = self.witnesses.entry(confirmation.sighting_id).or_default();
        if bucket.iter().any(|w| w.device_id == confirmation.device_id) {
            return Err(CoreError::DuplicateWitness {
                sighting_id: confirmation.sighting_id.to_string(),
                device_id: confirmation.device_id.clone(),
            });
        }
        bucket.push(confirmation.clone());
        drop(bucket);

        let mut sighting = self
            .sightings
            .get_mut(&confirmation.sighting_id)
            .ok_or_else(|| CoreError::NotFound(format!("sighting {}", confirmation.sighting_id)))?;
        sighting.witness_count += 1;
        Ok(sighting.witness_count)
    }

    async fn list_witnesses(&self, sighting_id: Uuid) -> CoreResult<Vec<WitnessConfirmation>> {
        let mut rows = self.witnesses.get(&sighting_id).map(|e| e.value().clone()).unwrap_or_default();
        rows.sort_by(|a, b| a.confirmed_at.cmp(&b.confirmed_at));
        Ok(rows)
    }

    async fn count_recent_witnesses_near(
        &self,
        lat: f64,
        lon: f64,
        radius_km: f64,
        since: chrono::DateTime<Utc>,
    ) -> CoreResult<u32> {
        let mut count = 0u32;
        for bucket in self.witnesses.iter() {
            for w in bucket.value() {
                if w.confirmed_at < since {
                    continue;
                }
                if let (Some(wlat), Some(wlon)) = (w.latitude, w.longitude) {
                    if crate::geo::distance_km(lat, lon, wlat, wlon).unwrap_or(f64::MAX) <= radius_km {
                        count += 1;
                    }
                }
            }
        }
        Ok(count)
    }

    async fn list_devices_for_ring(
        &self,
        center_lat: f64,
        center_lon: f64,
        radius_km: f64,
        exclude_device_id: Option<&str>,
    ) -> CoreResult<Vec<DirectoryEntry>> {
        let devices: Vec<Device> = self.devices.iter().map(|e| e.value().clone()).collect();
        Ok(device_directory::haversine_filter(
            devices.iter(),
            center_lat,
            center_lon,
            radius_km,
            exclude_device_id,
            device_directory::DEFAULT_RESULT_CAP,
        ))
    }

    async fn append_engagement(&self, event: EngagementEvent) -> CoreResult<()> {
        self.engagements.insert(event.id, event);
        Ok(())
    }

    async fn upsert_device(&self, device: Device) -> CoreResult<()> {
        self.devices.insert(device.device_id.clone(), device);
        Ok(())
    }
}

/// Postgres/Diesel implementation. Blocking Diesel calls are offloaded to
/// a blocking-pool thread per call; the pool itself is cheap to clone.
#[derive(Clone)]
pub struct PgGateway {
    pool: PgPool,
}

impl PgGateway {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PersistenceGateway for PgGateway {
    async fn create_sighting(&self, sighting: Sighting) -> CoreResult<Uuid> {
        use crate::schema::sightings;

        let pool = self.pool.clone();
        let id = sighting.id;
        let row = SightingRow::from(&sighting);

        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| CoreError::TransientBackend(format!("connection pool: {e}")))?;
            diesel::insert_into(sightings::table)
                .values(&row)
                .on_conflict(sightings::id)
                .do_nothing()
                .execute(&mut conn)
                .map_err(|e| CoreError::TransientBackend(format!("insert sighting: {e}")))
        })
        .await
        .map_err(|e| CoreError::TransientBackend(format!("join error: {e}")))??;

        Ok(id)
    }

    async fn get_sighting(&self, id: Uuid) -> CoreResult<Sighting> {
        use crate::schema::sightings;

        let pool = self.pool.clone();
        let row: SightingRow = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| CoreError::TransientBackend(format!("connection pool: {e}")))?;
            sightings::table
                .find(id)
                .select(SightingRow::as_select())
                .first(&mut conn)
                .map_err(|e| match e {
                    diesel::result::Error::NotFound => CoreError::NotFound(format!("sighting {id}")),
                    other => CoreError::TransientBackend(format!("get sighting: {other}")),
                })
        })
        .await
        .map_err(|e| CoreError::TransientBackend(format!("join error: {e}")))??;

        Sighting::try_from(row)
    }

    async fn list_public_sightings(&self, limit: i64, offset: i64) -> CoreResult<Vec<Sighting>> {
        use crate::schema::sightings;

        let pool = self.pool.clone();
        let rows: Vec<SightingRow> = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| CoreError::TransientBackend(format!("connection pool: {e}")))?;
            sightings::table
                .filter(sightings::is_public.eq(true))
                .order(sightings::created_at.desc())
                .limit(limit)
                .offset(offset)
                .select(SightingRow::as_select())
                .load(&mut conn)
                .map_err(|e| CoreError::TransientBackend(format!("list sightings: {e}")))
        })
        .await
        .map_err(|e| CoreError::TransientBackend(format!("join error: {e}")))??;

        rows.into_iter().map(Sighting::try_from).collect()
    }

    async fn update_enrichment(&self, sighting_id: Uuid, processor_name: &str, data: Json) -> CoreResult<()> {
        use crate::schema::sightings;

        let pool = self.pool.clone();
        let processor_name = processor_name.to_string();

        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| CoreError::TransientBackend(format!("connection pool: {e}")))?;
            conn.transaction(|conn| {
                let current: Json = sightings::table
                    .find(sighting_id)
                    .select(sightings::enrichment_data)
                    .first(conn)?;
                let mut merged = match current {
                    Json::Object(map) => map,
                    _ => serde_json::Map::new(),
                };
                merged.insert(processor_name.clone(), data);
                diesel::update(sightings::table.find(sighting_id))
                    .set((sightings::enrichment_data.eq(Json::Object(merged)), sightings::updated_at.eq(Utc::now())))
                    .execute(conn)
            })
            .map_err(|e| match e {
                diesel::result::Error::NotFound => CoreError::NotFound(format!("sighting {sighting_id}")),
                other => CoreError::TransientBackend(format!("merge enrichment: {other}")),
            })
        })
        .await
        .map_err(|e| CoreError::TransientBackend(format!("join error: {e}")))??;

        Ok(())
    }

    async fn add_witness(&self, confirmation: WitnessConfirmation) -> CoreResult<i32> {
        use crate::schema::{sightings, witness_confirmations};

        let pool = self.pool.clone();
        let row = WitnessConfirmationRow::from(&confirmation);
        let sighting_id = confirmation.sighting_id;

        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| CoreError::TransientBackend(format!("connection pool: {e}")))?;
            conn.transaction(|conn| {
                diesel::insert_into(witness_confirmations::table).values(&row).execute(conn)?;
                diesel::update(sightings::table.find(sighting_id))
                    .set(sightings::witness_count.eq(sightings::witness_count + 1))
                    .execute(conn)?;
                sightings::table.find(sighting_id).select(sightings::witness_count).first::<i32>(conn)
            })
            .map_err(|e| {
                if is_unique_violation(&e) {
                    CoreError::DuplicateWitness {
                        sighting_id: sighting_id.to_string(),
                        device_id: confirmation.device_id.clone(),
                    }
                } else {
                    CoreError::TransientBackend(format!("add witness: {e}"))
                }
            })
        })
        .await
        .map_err(|e| CoreError::TransientBackend(format!("join error: {e}")))?
    }

    async fn list_witnesses(&self, sighting_id: Uuid) -> CoreResult<Vec<WitnessConfirmation>> {
        use crate::schema::witness_confirmations;

        let pool = self.pool.clone();
        let rows: Vec<WitnessConfirmationRow> = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| CoreError::TransientBackend(format!("connection pool: {e}")))?;
            witness_confirmations::table
                .filter(witness_confirmations::sighting_id.eq(sighting_id))
                .order(witness_confirmations::confirmed_at.asc())
                .select(WitnessConfirmationRow::as_select())
                .load(&mut conn)
                .map_err(|e| CoreError::TransientBackend(format!("list witnesses: {e}")))
        })
        .await
        .map_err(|e| CoreError::TransientBackend(format!("join error: {e}")))??;

        rows.into_iter().map(WitnessConfirmation::try_from).collect()
    }

    async fn count_recent_witnesses_near(
        &self,
        lat: f64,
        lon: f64,
        radius_km: f64,
        since: chrono::DateTime<Utc>,
    ) -> CoreResult<u32> {
        use crate::schema::witness_confirmations;

        let pool = self.pool.clone();
        let radius_m = radius_km * 1000.0;

        let count: i64 = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| CoreError::TransientBackend(format!("connection pool: {e}")))?;
            let center_point = ST_SetSRID(ST_MakePoint(lon, lat), 4326);
            let witness_point = ST_SetSRID(
                ST_MakePoint(witness_confirmations::longitude.assume_not_null(), witness_confirmations::latitude.assume_not_null()),
                4326,
            );

            witness_confirmations::table
                .filter(witness_confirmations::confirmed_at.ge(since))
                .filter(witness_confirmations::latitude.is_not_null())
                .filter(witness_confirmations::longitude.is_not_null())
                .filter(ST_DWithin(witness_point, center_point, radius_m))
                .count()
                .get_result(&mut conn)
                .map_err(|e| CoreError::TransientBackend(format!("count recent witnesses: {e}")))
        })
        .await
        .map_err(|e| CoreError::TransientBackend(format!("join error: {e}")))??;

        Ok(count.max(0) as u32)
    }

    async fn list_devices_for_ring(
        &self,
        center_lat: f64,
        center_lon: f64,
        radius_km: f64,
        exclude_device_id: Option<&str>,
    ) -> CoreResult<Vec<DirectoryEntry>> {
        use crate::schema::devices;

        let pool = self.pool.clone();
        let exclude = exclude_device_id.map(|s| s.to_string());
        let radius_m = radius_km * 1000.0;

        let include_no_location_backstop = radius_km >= device_directory::NO_LOCATION_BACKSTOP_KM;

        let rows: Vec<DeviceRow> = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| CoreError::TransientBackend(format!("connection pool: {e}")))?;
            let center_point = ST_SetSRID(ST_MakePoint(center_lon, center_lat), 4326);
            let device_point = ST_SetSRID(ST_MakePoint(devices::lon.assume_not_null(), devices::lat.assume_not_null()), 4326);

            let mut query = devices::table
                .filter(devices::is_active.eq(true))
                .filter(devices::push_enabled.eq(true))
                .filter(devices::alert_notifications.eq(true))
                .filter(devices::push_token.is_not_null())
                .into_boxed();

            // §4.E backstop: a device with no recorded location is only
            // reachable through the outermost ring, reported at the ring's
            // edge distance rather than excluded from the geo-index query.
            if include_no_location_backstop {
                query = query.filter(
                    devices::lat
                        .is_null()
                        .or(devices::lon.is_null())
                        .or(ST_DWithin(device_point, center_point, radius_m)),
                );
            } else {
                query = query
                    .filter(devices::lat.is_not_null())
                    .filter(devices::lon.is_not_null())
                    .filter(ST_DWithin(device_point, center_point, radius_m));
            }

            if let Some(exclude) = &exclude {
                query = query.filter(devices::device_id.ne(exclude));
            }

            query
                .limit(device_directory::DEFAULT_RESULT_CAP)
                .select(DeviceRow::as_select())
                .load(&mut conn)
                .map_err(|e| CoreError::TransientBackend(format!("geo-indexed device query: {e}")))
        })
        .await
        .map_err(|e| CoreError::TransientBackend(format!("join error: {e}")))??;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let device = Device::try_from(row)?;
            match (device.lat, device.lon) {
                (Some(lat), Some(lon)) => {
                    let distance_km = crate::geo::distance_km(center_lat, center_lon, lat, lon)?;
                    entries.push(DirectoryEntry {
                        device_id: device.device_id,
                        push_token: device.push_token.unwrap(),
                        platform: device.platform,
                        lat: Some(lat),
                        lon: Some(lon),
                        distance_km,
                    });
                }
                _ => entries.push(DirectoryEntry {
                    device_id: device.device_id,
                    push_token: device.push_token.unwrap(),
                    platform: device.platform,
                    lat: None,
                    lon: None,
                    distance_km: radius_km,
                }),
            }
        }
        entries.sort_by(|a, b| a.distance_km.partial_cmp(&b.distance_km).unwrap_or(std::cmp::Ordering::Equal));
        Ok(entries)
    }

    async fn append_engagement(&self, event: EngagementEvent) -> CoreResult<()> {
        use crate::schema::engagement_events;

        let pool = self.pool.clone();
        let row = EngagementEventRow::from(&event);

        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| CoreError::TransientBackend(format!("connection pool: {e}")))?;
            diesel::insert_into(engagement_events::table)
                .values(&row)
                .execute(&mut conn)
                .map_err(|e| CoreError::TransientBackend(format!("append engagement: {e}")))
        })
        .await
        .map_err(|e| CoreError::TransientBackend(format!("join error: {e}")))??;

        Ok(())
    }

    async fn upsert_device(&self, device: Device) -> CoreResult<()> {
        use crate::schema::devices;

        let pool = self.pool.clone();
        let row = DeviceRow::from(&device);

        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| CoreError::TransientBackend(format!("connection pool: {e}")))?;
            diesel::insert_into(devices::table)
                .values(&row)
                .on_conflict(devices::device_id)
                .do_update()
                .set(&row)
                .execute(&mut conn)
                .map_err(|e| CoreError::TransientBackend(format!("upsert device: {e}")))
        })
        .await
        .map_err(|e| CoreError::TransientBackend(format!("join error: {e}")))??;

        Ok(())
    }
}

fn is_unique_violation(err: &diesel::result::Error) -> bool {
    matches!(
        err,
        diesel::result::Error::DatabaseError(diesel::result::DatabaseErrorKind::UniqueViolation, _)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertLevel, Location, MediaInfo, SensorData, SightingStatus, WitnessConfidence};
    use std::collections::BTreeMap;

    fn sample_sighting() -> Sighting {
        let now = Utc::now();
        Sighting {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            reporter_device_id: "dev1".to_string(),
            reporter_id: None,
            title: None,
            description: None,
            category: Sighting::category_default(),
            tags: vec![],
            sensor_data: SensorData {
                location: Location { lat: 47.6, lon: -122.3, accuracy_m: None, altitude_m: None, original_lat: Some(47.6), original_lon: Some(-122.3) },
                azimuth_deg: None,
                pitch_deg: None,
                roll_deg: None,
                hfov_deg: None,
                timestamp: now,
                device_id: "dev1".to_string(),
            },
            media_info: MediaInfo::default(),
            enrichment_data: BTreeMap::new(),
            alert_level: AlertLevel::Normal,
            status: SightingStatus::Created,
            witness_count: 1,
            is_public: true,
        }
    }

    fn sample_witness(sighting_id: Uuid, device_id: &str) -> WitnessConfirmation {
        WitnessConfirmation {
            id: Uuid::new_v4(),
            sighting_id,
            device_id: device_id.to_string(),
            confirmed_at: Utc::now(),
            latitude: Some(47.601),
            longitude: Some(-122.301),
            altitude_m: None,
            accuracy_m: None,
            bearing_deg: None,
            still_visible: true,
            confidence: WitnessConfidence::Medium,
            description: None,
            platform: None,
            app_version: None,
            distance_km_to_sighting: None,
        }
    }

    #[tokio::test]
    async fn create_and_get_round_trip() {
        let gw = InMemoryGateway::new();
        let sighting = sample_sighting();
        let id = gw.create_sighting(sighting.clone()).await.unwrap();
        let fetched = gw.get_sighting(id).await.unwrap();
        assert_eq!(fetched.id, sighting.id);
    }

    #[tokio::test]
    async fn get_missing_sighting_is_not_found() {
        let gw = InMemoryGateway::new();
        assert!(matches!(gw.get_sighting(Uuid::new_v4()).await, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn add_witness_increments_count_and_rejects_duplicate_device() {
        let gw = InMemoryGateway::new();
        let sighting = sample_sighting();
        let id = gw.create_sighting(sighting).await.unwrap();

        let count = gw.add_witness(sample_witness(id, "dev2")).await.unwrap();
        assert_eq!(count, 2);

        let err = gw.add_witness(sample_witness(id, "dev2")).await.unwrap_err();
        assert!(matches!(err, CoreError::DuplicateWitness { .. }));
    }

    #[tokio::test]
    async fn update_enrichment_merges_without_clobbering_other_keys() {
        let gw = InMemoryGateway::new();
        let sighting = sample_sighting();
        let id = gw.create_sighting(sighting).await.unwrap();

        gw.update_enrichment(id, "weather", serde_json::json!({"temp_c": 18})).await.unwrap();
        gw.update_enrichment(id, "celestial", serde_json::json!({"moon_phase": "full"})).await.unwrap();

        let fetched = gw.get_sighting(id).await.unwrap();
        assert!(fetched.enrichment_data.contains_key("weather"));
        assert!(fetched.enrichment_data.contains_key("celestial"));
    }

    #[tokio::test]
    async fn list_public_sightings_orders_newest_first() {
        let gw = InMemoryGateway::new();
        let mut first = sample_sighting();
        first.created_at = Utc::now() - chrono::Duration::minutes(10);
        let mut second = sample_sighting();
        second.created_at = Utc::now();

        gw.create_sighting(first.clone()).await.unwrap();
        gw.create_sighting(second.clone()).await.unwrap();

        let page = gw.list_public_sightings(10, 0).await.unwrap();
        assert_eq!(page[0].id, second.id);
        assert_eq!(page[1].id, first.id);
    }
}
