//! Witness aggregator (§4.K): validates incoming confirmations,
//! triangulates bearing lines into a position estimate, and scores the
//! resulting consensus for auto-escalation.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::models::{Sighting, WitnessConfirmation};
use crate::persistence::PersistenceGateway;
use crate::rate_limit::SlidingWindowGate;

/// A single bearing observation feeding triangulation.
#[derive(Debug, Clone, Copy)]
pub struct WitnessPoint {
    pub lat: f64,
    pub lon: f64,
    pub bearing_deg: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Validates a prospective confirmation against the rules in §4.K,
/// returning a human-readable reason on rejection.
pub struct WitnessValidator<G: PersistenceGateway> {
    gateway: Arc<G>,
    rate_gate: SlidingWindowGate,
    config: Config,
}

impl<G: PersistenceGateway> WitnessValidator<G> {
    pub fn new(gateway: Arc<G>, rate_gate: SlidingWindowGate, config: Config) -> Self {
        Self { gateway, rate_gate, config }
    }

    /// Validates and, on acceptance, persists the confirmation, returning
    /// the new `witness_count`.
    pub async fn confirm(&self, mut confirmation: WitnessConfirmation) -> CoreResult<i32> {
        let sighting = self.gateway.get_sighting(confirmation.sighting_id).await?;

        let now = Utc::now();
        let age = now - sighting.created_at;
        let window = chrono::Duration::minutes(self.config.witness_window_minutes);
        if age > window {
            return Err(CoreError::WindowClosed { remaining_seconds: (window - age).num_seconds() });
        }

        self.rate_gate.check_and_record(&confirmation.device_id, self.config.witness_rate_per_hour, now)?;

        if let (Some(wlat), Some(wlon)) = (confirmation.latitude, confirmation.longitude) {
            let limit_km = self.confirm_distance_limit(&sighting);
            let distance_km = crate::geo::distance_km(wlat, wlon, sighting.sensor_data.location.lat, sighting.sensor_data.location.lon)?;
            if distance_km > limit_km {
                return Err(CoreError::OutOfRangeWitness { distance_km, limit_km });
            }
            confirmation.distance_km_to_sighting = Some(distance_km);
        }

        // add_witness itself rejects a second confirmation from the same
        // device with `DuplicateWitness`.
        self.gateway.add_witness(confirmation).await
    }

    fn confirm_distance_limit(&self, sighting: &Sighting) -> f64 {
        sighting
            .enrichment_data
            .get("weather")
            .and_then(|v| v.get("visibility_km"))
            .and_then(|v| v.as_f64())
            .map(|visibility_km| 2.0 * visibility_km)
            .unwrap_or(self.config.max_confirm_km)
    }
}

/// Analytic intersection of two bearing lines through `(p1, p2)`, or
/// `None` if they are (near-)parallel.
fn two_line_intersection(p1: WitnessPoint, b1: f64, p2: WitnessPoint, b2: f64) -> Option<(f64, f64)> {
    // Direction vectors in (lon, lat) plane — flat-earth approximation
    // appropriate at witness-confirmation distances (tens of km).
    let (d1x, d1y) = (b1.to_radians().sin(), b1.to_radians().cos());
    let (d2x, d2y) = (b2.to_radians().sin(), b2.to_radians().cos());

    let denom = d1x * d2y - d1y * d2x;
    if denom.abs() < 1e-9 {
        return None;
    }

    let dx = p2.lon - p1.lon;
    let dy = p2.lat - p1.lat;
    let t = (dx * d2y - dy * d2x) / denom;

    Some((p1.lat + t * d1y, p1.lon + t * d1x))
}

/// Triangulate a position from ≥ 2 witness points with ≥ 2 bearings. For
/// exactly two lines, solves analytically; for more, averages all
/// pairwise intersections (a documented approximation, not a
/// least-squares fit).
pub fn triangulate(points: &[WitnessPoint]) -> Option<(f64, f64)> {
    let bearing_points: Vec<(WitnessPoint, f64)> = points.iter().filter_map(|p| p.bearing_deg.map(|b| (*p, b))).collect();
    if points.len() < 2 || bearing_points.len() < 2 {
        return None;
    }

    let mut lat_sum = 0.0;
    let mut lon_sum = 0.0;
    let mut count = 0;

    for i in 0..bearing_points.len() {
        for j in (i + 1)..bearing_points.len() {
            let (p1, b1) = bearing_points[i];
            let (p2, b2) = bearing_points[j];
            if let Some((lat, lon)) = two_line_intersection(p1, b1, p2, b2) {
                lat_sum += lat;
                lon_sum += lon;
                count += 1;
            }
        }
    }

    if count == 0 { None } else { Some((lat_sum / count as f64, lon_sum / count as f64)) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusQuality {
    Excellent,
    Good,
    Poor,
    Insufficient,
}

#[derive(Debug, Clone)]
pub struct ConsensusMetrics {
    pub estimated_position: Option<(f64, f64)>,
    pub confidence: f64,
    pub quality: ConsensusQuality,
    pub agreement_percentage: f64,
    pub estimated_radius_m: Option<f64>,
}

fn max_pairwise_distance_m(points: &[WitnessPoint]) -> f64 {
    let mut max_m = 0.0_f64;
    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            if let Ok(km) = crate::geo::distance_km(points[i].lat, points[i].lon, points[j].lat, points[j].lon) {
                max_m = max_m.max(km * 1000.0);
            }
        }
    }
    max_m
}

/// Score a set of witness points per §4.K's consensus formula.
pub fn consensus(points: &[WitnessPoint]) -> ConsensusMetrics {
    let estimated_position = triangulate(points);

    let temporal_score = if points.len() < 2 {
        0.0
    } else {
        let min_t = points.iter().map(|p| p.timestamp).min().unwrap();
        let max_t = points.iter().map(|p| p.timestamp).max().unwrap();
        let spread_s = (max_t - min_t).num_seconds() as f64;
        (1.0 - spread_s / 3600.0).max(0.0)
    };

    let spatial_score = (max_pairwise_distance_m(points) / 1000.0).min(1.0);

    let bearing_score = match estimated_position {
        Some((lat, lon)) => {
            let errors: Vec<f64> = points
                .iter()
                .filter_map(|p| p.bearing_deg.map(|b| (p, b)))
                .filter_map(|(p, reported)| {
                    crate::geo::bearing_deg(p.lat, p.lon, lat, lon).ok().map(|actual| {
                        let diff = (reported - actual).abs() % 360.0;
                        if diff > 180.0 { 360.0 - diff } else { diff }
                    })
                })
                .collect();
            if errors.is_empty() {
                0.5
            } else {
                let avg_error = errors.iter().sum::<f64>() / errors.len() as f64;
                (1.0 - avg_error / 45.0).max(0.0)
            }
        }
        None => 0.5,
    };

    let confidence = 0.3 * temporal_score + 0.3 * spatial_score + 0.4 * bearing_score;

    let quality = if confidence >= 0.8 {
        ConsensusQuality::Excellent
    } else if confidence >= 0.6 {
        ConsensusQuality::Good
    } else if confidence >= 0.3 {
        ConsensusQuality::Poor
    } else {
        ConsensusQuality::Insufficient
    };

    let estimated_radius_m = estimated_position.map(|_| ((1.0 - confidence) * 5000.0).max(100.0));

    ConsensusMetrics {
        estimated_position,
        confidence,
        quality,
        agreement_percentage: confidence * 100.0,
        estimated_radius_m,
    }
}

/// §4.K auto-escalation decision.
pub fn should_auto_escalate(
    total_witnesses: u32,
    witnesses_last_60s: u32,
    confidence: f64,
) -> bool {
    (witnesses_last_60s >= 3 && confidence >= 0.6) || total_witnesses >= 5 || (total_witnesses >= 3 && confidence >= 0.8)
}

pub fn witnesses_last_60s(confirmations: &[WitnessConfirmation], now: DateTime<Utc>) -> u32 {
    confirmations.iter().filter(|w| now - w.confirmed_at <= chrono::Duration::seconds(60)).count() as u32
}
