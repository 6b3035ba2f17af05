//! Plane-match processor: runs the aircraft-match analyser (§4.J) as a
//! panel member named `plane_match`, skipping sightings that carry no
//! azimuth/pitch pose to match against.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use crate::aircraft_match::{AircraftFeed, AircraftMatcher, SensorPose};
use crate::config::Config;

use super::{EnrichmentContext, EnrichmentProcessor, ProcessorOutcome};

pub struct PlaneMatchProcessor<F: AircraftFeed> {
    matcher: Arc<AircraftMatcher<F>>,
    timeout_seconds: u64,
}

impl<F: AircraftFeed> PlaneMatchProcessor<F> {
    pub fn new(matcher: Arc<AircraftMatcher<F>>, config: &Config) -> Self {
        Self { matcher, timeout_seconds: config.aircraft_timeout_s }
    }
}

#[async_trait]
impl<F: AircraftFeed> EnrichmentProcessor for PlaneMatchProcessor<F> {
    fn name(&self) -> &str {
        "plane_match"
    }

    fn priority(&self) -> u8 {
        2
    }

    fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn process(&self, ctx: &EnrichmentContext) -> ProcessorOutcome {
        let started = Utc::now();
        let (Some(azimuth_deg), Some(pitch_deg)) = (ctx.azimuth_deg, ctx.pitch_deg) else {
            return ProcessorOutcome::ok(
                json!({"is_plane": false, "reason": "no sensor pose recorded"}),
                (Utc::now() - started).num_milliseconds(),
                Some(0.0),
            );
        };

        let pose = SensorPose { timestamp: ctx.timestamp, lat: ctx.latitude, lon: ctx.longitude, altitude_m: ctx.altitude_m, azimuth_deg, pitch_deg };

        match self.matcher.match_pose(pose).await {
            Ok(result) => {
                let confidence = result.confidence;
                let data = json!({
                    "is_plane": result.is_plane,
                    "reason": result.reason,
                    "confidence": result.confidence,
                    "matched": result.matched.map(|m| json!({
                        "callsign": m.callsign,
                        "icao24": m.icao24,
                        "altitude_m": m.altitude_m,
                        "velocity_ms": m.velocity_ms,
                        "angular_error_deg": m.angular_error_deg,
                    })),
                });
                ProcessorOutcome::ok(data, (Utc::now() - started).num_milliseconds(), Some(confidence))
            }
            Err(e) => ProcessorOutcome::failed(e.to_string(), (Utc::now() - started).num_milliseconds()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreResult;
    use crate::geo::BoundingBox;
    use chrono::DateTime;

    struct StaticFeed(Vec<crate::aircraft_match::AircraftStateVector>);

    #[async_trait]
    impl AircraftFeed for StaticFeed {
        async fn fetch(&self, _bbox: BoundingBox, _bucket: DateTime<Utc>) -> CoreResult<Vec<crate::aircraft_match::AircraftStateVector>> {
            Ok(self.0.clone())
        }
    }

    fn ctx(azimuth: Option<f64>, pitch: Option<f64>) -> EnrichmentContext {
        EnrichmentContext {
            sighting_id: uuid::Uuid::new_v4(),
            latitude: 37.6213,
            longitude: -122.3790,
            altitude_m: Some(0.0),
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            azimuth_deg: azimuth,
            pitch_deg: pitch,
            roll_deg: None,
            category: "ufo".to_string(),
            title: None,
            description: None,
        }
    }

    #[tokio::test]
    async fn skips_sightings_without_pose() {
        let feed = Arc::new(StaticFeed(vec![]));
        let matcher = Arc::new(AircraftMatcher::new(feed, Config::default()));
        let processor = PlaneMatchProcessor::new(matcher, &Config::default());
        let outcome = processor.process(&ctx(None, None)).await;
        assert!(outcome.success);
        assert_eq!(outcome.data.unwrap()["is_plane"], false);
    }

    #[tokio::test]
    async fn reports_no_match_when_no_candidates() {
        let feed = Arc::new(StaticFeed(vec![]));
        let matcher = Arc::new(AircraftMatcher::new(feed, Config::default()));
        let processor = PlaneMatchProcessor::new(matcher, &Config::default());
        let outcome = processor.process(&ctx(Some(45.0), Some(30.0))).await;
        assert!(outcome.success);
        assert_eq!(outcome.data.unwrap()["is_plane"], false);
    }
}
