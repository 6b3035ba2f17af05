//! Aircraft-match analyser (§4.J): tests whether a sensor pose lines up
//! with a live aircraft state vector closely enough to explain a
//! sighting as mundane air traffic.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::Deserialize;

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::geo;

/// A single aircraft position/velocity report, as fetched from the
/// upstream traffic feed for one bbox/time bucket.
#[derive(Debug, Clone)]
pub struct AircraftStateVector {
    pub icao24: Option<String>,
    pub callsign: Option<String>,
    pub lat: f64,
    pub lon: f64,
    pub baro_altitude_m: Option<f64>,
    pub velocity_ms: Option<f64>,
}

/// Sensor pose submitted for matching.
#[derive(Debug, Clone, Copy)]
pub struct SensorPose {
    pub timestamp: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    pub altitude_m: Option<f64>,
    pub azimuth_deg: f64,
    pub pitch_deg: f64,
}

#[derive(Debug, Clone)]
pub struct MatchedAircraft {
    pub callsign: Option<String>,
    pub icao24: Option<String>,
    pub altitude_m: Option<f64>,
    pub velocity_ms: Option<f64>,
    pub angular_error_deg: f64,
}

#[derive(Debug, Clone)]
pub struct AircraftMatchResult {
    pub is_plane: bool,
    pub matched: Option<MatchedAircraft>,
    pub confidence: f64,
    pub reason: String,
}

fn not_applicable(reason: &str) -> AircraftMatchResult {
    AircraftMatchResult { is_plane: false, matched: None, confidence: 0.0, reason: reason.to_string() }
}

fn distance_factor(distance_km: f64) -> f64 {
    if distance_km < 1.0 {
        0.5
    } else if distance_km < 10.0 {
        0.8
    } else if distance_km < 50.0 {
        1.0
    } else {
        0.9
    }
}

fn altitude_factor(altitude_m: f64) -> f64 {
    if altitude_m < 1000.0 {
        0.7
    } else if altitude_m < 12_000.0 {
        1.0
    } else {
        0.9
    }
}

/// Fetches aircraft state vectors for a bounding box, as of a quantised
/// time bucket. Implemented against whatever live traffic feed the
/// deployment wires in.
#[async_trait]
pub trait AircraftFeed: Send + Sync {
    async fn fetch(&self, bbox: geo::BoundingBox, bucket: DateTime<Utc>) -> CoreResult<Vec<AircraftStateVector>>;
}

/// Fetches live state vectors from the OpenSky Network's public REST API
/// (no key required, rate-limited for anonymous callers).
pub struct OpenSkyFeed {
    client: reqwest::Client,
}

impl OpenSkyFeed {
    pub fn new(timeout: StdDuration) -> Self {
        Self { client: reqwest::Client::builder().timeout(timeout).build().unwrap_or_default() }
    }
}

#[derive(Deserialize)]
struct OpenSkyResponse {
    states: Option<Vec<Vec<serde_json::Value>>>,
}

fn state_vector_from_row(row: &[serde_json::Value]) -> Option<AircraftStateVector> {
    let lat = row.get(6)?.as_f64()?;
    let lon = row.get(5)?.as_f64()?;
    Some(AircraftStateVector {
        icao24: row.first().and_then(|v| v.as_str()).map(str::to_string),
        callsign: row.get(1).and_then(|v| v.as_str()).map(|s| s.trim().to_string()),
        lat,
        lon,
        baro_altitude_m: row.get(7).and_then(|v| v.as_f64()),
        velocity_ms: row.get(9).and_then(|v| v.as_f64()),
    })
}

#[async_trait]
impl AircraftFeed for OpenSkyFeed {
    async fn fetch(&self, bbox: geo::BoundingBox, _bucket: DateTime<Utc>) -> CoreResult<Vec<AircraftStateVector>> {
        let url = format!(
            "https://opensky-network.org/api/states/all?lamin={}&lomin={}&lamax={}&lomax={}",
            bbox.lat_min, bbox.lon_min, bbox.lat_max, bbox.lon_max
        );
        let response = self.client.get(&url).send().await.map_err(|e| CoreError::Upstream {
            provider: "opensky".to_string(),
            retriable: true,
            detail: e.to_string(),
        })?;
        let body: OpenSkyResponse = response.json().await.map_err(|e| CoreError::Upstream {
            provider: "opensky".to_string(),
            retriable: false,
            detail: e.to_string(),
        })?;
        Ok(body.states.unwrap_or_default().iter().filter_map(|row| state_vector_from_row(row)).collect())
    }
}

#[derive(Clone, Hash, Eq, PartialEq)]
struct BucketKey {
    bbox_key: (i64, i64, i64, i64),
    bucket_secs: i64,
}

fn quantize(timestamp: DateTime<Utc>, quant_s: i64) -> DateTime<Utc> {
    let secs = timestamp.timestamp();
    let bucketed = (secs / quant_s) * quant_s;
    DateTime::from_timestamp(bucketed, 0).unwrap_or(timestamp)
}

fn bbox_key(bbox: &geo::BoundingBox) -> (i64, i64, i64, i64) {
    let scale = |v: f64| (v * 1000.0).round() as i64;
    (scale(bbox.lat_min), scale(bbox.lat_max), scale(bbox.lon_min), scale(bbox.lon_max))
}

/// Caches aircraft-feed fetches per bbox/time bucket, then scores each
/// candidate's line-of-sight match against a sensor pose.
pub struct AircraftMatcher<F: AircraftFeed> {
    feed: Arc<F>,
    cache: Cache<BucketKey, Arc<Vec<AircraftStateVector>>>,
    config: Config,
}

impl<F: AircraftFeed> AircraftMatcher<F> {
    pub fn new(feed: Arc<F>, config: Config) -> Self {
        let cache = Cache::builder()
            .max_capacity(500)
            .time_to_live(StdDuration::from_secs(config.aircraft_cache_ttl_s))
            .build();
        Self { feed, cache, config }
    }

    async fn candidates(&self, bbox: geo::BoundingBox, bucket: DateTime<Utc>) -> CoreResult<Arc<Vec<AircraftStateVector>>> {
        let key = BucketKey { bbox_key: bbox_key(&bbox), bucket_secs: bucket.timestamp() };
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit);
        }
        let fetched = Arc::new(self.feed.fetch(bbox, bucket).await?);
        self.cache.insert(key, fetched.clone()).await;
        Ok(fetched)
    }

    /// §4.J entry point.
    pub async fn match_pose(&self, pose: SensorPose) -> CoreResult<AircraftMatchResult> {
        geo::validate_point(pose.lat, pose.lon)?;
        geo::validate_elevation(pose.pitch_deg)?;

        let radius_km = self.config.aircraft_radius_km.min(self.config.aircraft_radius_hard_cap_km);
        let bbox = geo::bbox(pose.lat, pose.lon, radius_km)?;
        let bucket = quantize(pose.timestamp, self.config.aircraft_time_quant_s);
        let candidates = self.candidates(bbox, bucket).await?;

        if candidates.is_empty() {
            return Ok(not_applicable("no aircraft state vectors in range"));
        }

        let tolerance = self.config.aircraft_tolerance_deg;
        let mut best: Option<(MatchedAircraft, f64)> = None;

        for aircraft in candidates.iter() {
            let distance_km = match geo::distance_km(pose.lat, pose.lon, aircraft.lat, aircraft.lon) {
                Ok(d) => d,
                Err(_) => continue,
            };
            let Some(baro_altitude_m) = aircraft.baro_altitude_m else { continue };
            let observer_altitude_m = pose.altitude_m.unwrap_or(0.0);
            let altitude_diff_m = baro_altitude_m - observer_altitude_m;
            let distance_m = distance_km * 1000.0;

            let bearing = match geo::bearing_deg(pose.lat, pose.lon, aircraft.lat, aircraft.lon) {
                Ok(b) => b,
                Err(_) => continue,
            };
            let elevation = altitude_diff_m.atan2(distance_m).to_degrees();

            let angular_error = match geo::angular_separation_deg(pose.azimuth_deg, pose.pitch_deg, bearing, elevation) {
                Ok(e) => e,
                Err(_) => continue,
            };

            if angular_error > tolerance {
                continue;
            }

            let candidate = MatchedAircraft {
                callsign: aircraft.callsign.clone(),
                icao24: aircraft.icao24.clone(),
                altitude_m: Some(baro_altitude_m),
                velocity_ms: aircraft.velocity_ms,
                angular_error_deg: angular_error,
            };

            let angular_confidence = 1.0 - angular_error / tolerance;
            let confidence = angular_confidence * distance_factor(distance_km) * altitude_factor(baro_altitude_m);

            if best.as_ref().map(|(_, e)| angular_error < *e).unwrap_or(true) {
                best = Some((candidate, confidence));
            }
        }

        match best {
            Some((matched, confidence)) => Ok(AircraftMatchResult {
                is_plane: true,
                matched: Some(matched),
                confidence,
                reason: "line of sight matches a tracked aircraft within tolerance".to_string(),
            }),
            None => Ok(not_applicable("no aircraft within angular tolerance")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticFeed(Vec<AircraftStateVector>);

    #[async_trait]
    impl AircraftFeed for StaticFeed {
        async fn fetch(&self, _bbox: geo::BoundingBox, _bucket: DateTime<Utc>) -> CoreResult<Vec<AircraftStateVector>> {
            Ok(self.0.clone())
        }
    }

    fn aircraft_at(lat: f64, lon: f64, alt_m: f64) -> AircraftStateVector {
        AircraftStateVector {
            icao24: Some("abc123".to_string()),
            callsign: Some("UAL123".to_string()),
            lat,
            lon,
            baro_altitude_m: Some(alt_m),
            velocity_ms: Some(230.0),
        }
    }

    #[tokio::test]
    async fn perfect_alignment_matches_with_high_confidence() {
        let observer_lat: f64 = 37.6213;
        let observer_lon: f64 = -122.3790;

        // Place an aircraft due north-east-ish so bearing/elevation line up
        // with azimuth=45, pitch=30 by construction.
        let distance_km = 10.0;
        let bearing_rad = 45.0_f64.to_radians();
        let dlat = (distance_km / 111.0) * bearing_rad.cos();
        let dlon = (distance_km / 111.0) * bearing_rad.sin() / observer_lat.to_radians().cos();
        let altitude_m = distance_km * 1000.0 * 30.0_f64.to_radians().tan();

        let feed = Arc::new(StaticFeed(vec![aircraft_at(observer_lat + dlat, observer_lon + dlon, altitude_m)]));
        let matcher = AircraftMatcher::new(feed, Config::default());

        let pose = SensorPose {
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            lat: observer_lat,
            lon: observer_lon,
            altitude_m: Some(0.0),
            azimuth_deg: 45.0,
            pitch_deg: 30.0,
        };

        let result = matcher.match_pose(pose).await.unwrap();
        assert!(result.is_plane);
        let matched = result.matched.unwrap();
        assert!(matched.angular_error_deg < 0.5);
        assert!(result.confidence > 0.6);
    }

    #[tokio::test]
    async fn no_candidates_returns_not_applicable() {
        let feed = Arc::new(StaticFeed(vec![]));
        let matcher = AircraftMatcher::new(feed, Config::default());
        let pose = SensorPose {
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            lat: 37.0,
            lon: -122.0,
            altitude_m: Some(0.0),
            azimuth_deg: 45.0,
            pitch_deg: 30.0,
        };
        let result = matcher.match_pose(pose).await.unwrap();
        assert!(!result.is_plane);
        assert!(result.matched.is_none());
    }

    #[tokio::test]
    async fn far_out_of_tolerance_aircraft_is_rejected() {
        let feed = Arc::new(StaticFeed(vec![aircraft_at(40.0, -120.0, 9000.0)]));
        let matcher = AircraftMatcher::new(feed, Config::default());
        let pose = SensorPose {
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            lat: 37.0,
            lon: -122.0,
            altitude_m: Some(0.0),
            azimuth_deg: 0.0,
            pitch_deg: 0.0,
        };
        let result = matcher.match_pose(pose).await.unwrap();
        assert!(!result.is_plane);
    }
}
