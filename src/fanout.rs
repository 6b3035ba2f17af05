//! Fan-out engine (§4.G): turns a new sighting into ring-scoped,
//! escalation-aware push dispatch. A device is alerted at most once per
//! sighting — ring membership is exclusive, computed by subtracting
//! inner rings from each successive radius.

use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use uuid::Uuid;

use crate::config::Config;
use crate::device_directory::DirectoryEntry;
use crate::error::CoreResult;
use crate::models::AlertLevel;
use crate::notifications;
use crate::persistence::PersistenceGateway;
use crate::push::{self, DispatchContext, PushDispatcher};
use crate::rate_limit::FanoutRateGate;

/// Window feeding `Escalation` (§4.G step 1): witness density near a new
/// sighting over the last 30 minutes, within 10 km.
const LOCAL_DENSITY_WINDOW_MINUTES: i64 = 30;
const LOCAL_DENSITY_RADIUS_KM: f64 = 10.0;

/// Window feeding the emergency rate-cap override: a distinct, tighter
/// mass-sighting burst — confirmations within the last 5 minutes, within
/// 1 km — that lifts the global 15-minute fan-out suppression regardless
/// of how many sightings it is spread across.
const OVERRIDE_WINDOW_MINUTES: i64 = 5;
const OVERRIDE_RADIUS_KM: f64 = 1.0;

/// Local-witness-derived urgency, independent of any per-ring floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    Normal,
    Urgent,
    Emergency,
}

impl Escalation {
    fn from_local_witness_count(count: u32) -> Self {
        if count >= 10 {
            Escalation::Emergency
        } else if count >= 3 {
            Escalation::Urgent
        } else {
            Escalation::Normal
        }
    }

    fn as_alert_level(self) -> AlertLevel {
        match self {
            Escalation::Normal => AlertLevel::Normal,
            Escalation::Urgent => AlertLevel::Urgent,
            Escalation::Emergency => AlertLevel::Emergency,
        }
    }
}

/// Floor level for a ring distance, before escalation is applied.
fn ring_floor_level(ring_km: f64) -> AlertLevel {
    if ring_km <= 1.0 {
        AlertLevel::Emergency
    } else if ring_km <= 5.0 {
        AlertLevel::Urgent
    } else {
        AlertLevel::Normal
    }
}

fn level_rank(level: AlertLevel) -> u8 {
    match level {
        AlertLevel::Low => 0,
        AlertLevel::Normal => 1,
        AlertLevel::Urgent => 2,
        AlertLevel::Emergency => 3,
    }
}

fn stricter(a: AlertLevel, b: AlertLevel) -> AlertLevel {
    if level_rank(a) >= level_rank(b) { a } else { b }
}

#[derive(Debug, Clone, Default)]
pub struct RingOutcome {
    pub ring_km: f64,
    pub level: AlertLevel,
    pub sent: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FanoutResult {
    pub total_sent: usize,
    pub per_ring: Vec<RingOutcome>,
    pub delivery_time_ms: i64,
    pub escalation_applied: bool,
    pub suppressed: bool,
}

/// Partition directory entries into exclusive ring buckets: a device that
/// falls within multiple configured radii is kept only in the innermost.
fn partition_into_rings(devices: Vec<DirectoryEntry>, rings_km: &[f64]) -> Vec<(f64, Vec<DirectoryEntry>)> {
    let mut sorted_rings: Vec<f64> = rings_km.to_vec();
    sorted_rings.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let mut buckets: Vec<(f64, Vec<DirectoryEntry>)> = sorted_rings.iter().map(|r| (*r, Vec::new())).collect();
    let mut seen = std::collections::HashSet::new();

    for device in devices {
        for (ring_km, bucket) in buckets.iter_mut() {
            if device.distance_km <= *ring_km && seen.insert(device.device_id.clone()) {
                bucket.push(device.clone());
                break;
            }
        }
    }
    buckets
}

pub struct FanoutEngine<G: PersistenceGateway, D: PushDispatcher> {
    gateway: Arc<G>,
    dispatcher: Arc<D>,
    rate_gate: FanoutRateGate,
    config: Config,
}

impl<G: PersistenceGateway, D: PushDispatcher> FanoutEngine<G, D> {
    pub fn new(gateway: Arc<G>, dispatcher: Arc<D>, rate_gate: FanoutRateGate, config: Config) -> Self {
        Self { gateway, dispatcher, rate_gate, config }
    }

    /// §4.G entry point. Queries devices per ring, derives escalation
    /// from recent local witness density, and dispatches concurrently —
    /// one task per ring, each fully forming a device's payload before
    /// sending it.
    pub async fn fan_out(
        &self,
        sighting_id: Uuid,
        lat: f64,
        lon: f64,
        submitter_device_id: &str,
        location_name: Option<String>,
        witness_count: i32,
    ) -> CoreResult<FanoutResult> {
        let started = Utc::now();

        let local_witness_count = self
            .gateway
            .count_recent_witnesses_near(lat, lon, LOCAL_DENSITY_RADIUS_KM, Utc::now() - chrono::Duration::minutes(LOCAL_DENSITY_WINDOW_MINUTES))
            .await?;
        let escalation = Escalation::from_local_witness_count(local_witness_count);

        let now = Utc::now();
        self.rate_gate.record_sighting(now);
        let override_witness_count = self
            .gateway
            .count_recent_witnesses_near(lat, lon, OVERRIDE_RADIUS_KM, now - chrono::Duration::minutes(OVERRIDE_WINDOW_MINUTES))
            .await?;
        let emergency_override = override_witness_count >= self.config.emergency_override_witness_count;
        if self.rate_gate.is_suppressed(self.config.fanout_rate_15min_cap, now) && !emergency_override {
            return Ok(FanoutResult { suppressed: true, delivery_time_ms: elapsed_ms(started), ..Default::default() });
        }

        let mut all_devices = Vec::new();
        for ring_km in &self.config.fanout_rings_km {
            let devices = self.gateway.list_devices_for_ring(lat, lon, *ring_km, Some(submitter_device_id)).await?;
            all_devices.extend(devices);
        }
        all_devices.sort_by(|a, b| a.distance_km.partial_cmp(&b.distance_km).unwrap());
        all_devices.dedup_by(|a, b| a.device_id == b.device_id);

        let buckets = partition_into_rings(all_devices, &self.config.fanout_rings_km);

        let ring_tasks = buckets.into_iter().filter(|(_, devices)| !devices.is_empty()).map(|(ring_km, devices)| {
            let level = stricter(ring_floor_level(ring_km), escalation.as_alert_level());
            let title = notifications::alert_title(level, ring_km);
            let body = notifications::alert_body(witness_count, location_name.as_deref(), ring_km);
            let ctx = DispatchContext {
                sighting_id,
                ring_km,
                level,
                witness_count,
                submitter_device_id: submitter_device_id.to_string(),
                title,
                body,
                latitude: lat,
                longitude: lon,
                location_name: location_name.clone(),
            };
            let dispatcher = Arc::clone(&self.dispatcher);
            async move { dispatch_ring(dispatcher, ctx, ring_km, level, devices).await }
        });

        let per_ring = join_all(ring_tasks).await;
        let total_sent = per_ring.iter().map(|r| r.sent).sum();

        Ok(FanoutResult {
            total_sent,
            per_ring,
            delivery_time_ms: elapsed_ms(started),
            escalation_applied: escalation != Escalation::Normal,
            suppressed: false,
        })
    }

}

async fn dispatch_ring<D: PushDispatcher>(
    dispatcher: Arc<D>,
    ctx: DispatchContext,
    ring_km: f64,
    level: AlertLevel,
    devices: Vec<DirectoryEntry>,
) -> RingOutcome {
    let sends = devices.into_iter().map(|device| {
        let dispatcher = Arc::clone(&dispatcher);
        let ctx = ctx.clone();
        async move {
            match push::build_payload(&ctx, &device) {
                Ok(payload) => dispatcher.send(&device, &payload).await.success,
                Err(_) => false,
            }
        }
    });

    let outcomes = join_all(sends).await;
    let sent = outcomes.iter().filter(|ok| **ok).count();
    let failed = outcomes.len() - sent;

    RingOutcome { ring_km, level, sent, failed }
}

fn elapsed_ms(started: chrono::DateTime<Utc>) -> i64 {
    (Utc::now() - started).num_milliseconds()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Device, Platform, PushProvider};
    use crate::persistence::InMemoryGateway;
    use crate::push::NullDispatcher;

    fn device(id: &str, lat: f64, lon: f64) -> Device {
        Device {
            id: Uuid::new_v4(),
            device_id: id.to_string(),
            user_id: None,
            platform: Platform::Ios,
            push_token: Some(format!("tok-{id}")),
            push_provider: Some(PushProvider::Fcm),
            push_enabled: true,
            alert_notifications: true,
            chat_notifications: true,
            system_notifications: true,
            is_active: true,
            last_seen: None,
            lat: Some(lat),
            lon: Some(lon),
            notifications_sent: 0,
            notifications_opened: 0,
        }
    }

    #[test]
    fn ring_partition_is_exclusive_innermost_wins() {
        let devices = vec![
            DirectoryEntry { device_id: "a".to_string(), push_token: "t".to_string(), platform: Platform::Ios, lat: None, lon: None, distance_km: 0.5 },
            DirectoryEntry { device_id: "b".to_string(), push_token: "t".to_string(), platform: Platform::Ios, lat: None, lon: None, distance_km: 3.0 },
        ];
        let buckets = partition_into_rings(devices, &[1.0, 5.0, 10.0, 25.0]);
        assert_eq!(buckets[0].1.len(), 1);
        assert_eq!(buckets[0].1[0].device_id, "a");
        assert_eq!(buckets[1].1.len(), 1);
        assert_eq!(buckets[1].1[0].device_id, "b");
    }

    #[test]
    fn escalation_thresholds_match_spec() {
        assert_eq!(Escalation::from_local_witness_count(0).as_alert_level(), AlertLevel::Normal);
        assert_eq!(Escalation::from_local_witness_count(3).as_alert_level(), AlertLevel::Urgent);
        assert_eq!(Escalation::from_local_witness_count(10).as_alert_level(), AlertLevel::Emergency);
    }

    #[test]
    fn ring_floor_matches_spec_table() {
        assert_eq!(ring_floor_level(1.0), AlertLevel::Emergency);
        assert_eq!(ring_floor_level(5.0), AlertLevel::Urgent);
        assert_eq!(ring_floor_level(25.0), AlertLevel::Normal);
    }

    #[tokio::test]
    async fn fan_out_dispatches_to_rings_and_excludes_submitter() {
        let gateway = Arc::new(InMemoryGateway::new());
        gateway.upsert_device(device("near", 47.601, -122.301)).await.unwrap();
        gateway.upsert_device(device("reporter", 47.6, -122.3)).await.unwrap();

        let dispatcher = Arc::new(NullDispatcher::new());
        let engine = FanoutEngine::new(gateway.clone(), dispatcher.clone(), FanoutRateGate::new(), Config::default());

        let result = engine.fan_out(Uuid::new_v4(), 47.6, -122.3, "reporter", None, 1).await.unwrap();
        assert_eq!(result.total_sent, 1);
        assert_eq!(dispatcher.sent_count(), 1);
    }

    #[tokio::test]
    async fn fan_out_reports_no_devices_without_error() {
        let gateway = Arc::new(InMemoryGateway::new());
        let dispatcher = Arc::new(NullDispatcher::new());
        let engine = FanoutEngine::new(gateway, dispatcher, FanoutRateGate::new(), Config::default());

        let result = engine.fan_out(Uuid::new_v4(), 47.6, -122.3, "reporter", None, 1).await.unwrap();
        assert_eq!(result.total_sent, 0);
        assert!(!result.suppressed);
    }
}
