//! Alert service facade: the one place that wires persistence, jitter,
//! fan-out, the enrichment orchestrator and the witness aggregator
//! together into the ingestion and confirmation flows an HTTP adapter
//! would call. Ingestion persists synchronously, dispatches fan-out
//! synchronously (it is fast — push sends, not upstream enrichment calls —
//! and the response contract needs its actual counts), and spawns
//! enrichment as a detached background task, since weather/geocoding/
//! satellite lookups are the slow part and nothing in the response
//! depends on their result.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::config::Config;
use crate::dto::{
    AlertDetailResponse, AlertListEntry, AlertListResponse, AlertStats, IngestionRequest, IngestionResponse,
    MediaAssociationResponse, MediaFileResponse, MediaUpload, ProximityAlerts, WitnessConfirmationRequest,
    WitnessConfirmationResponse, WitnessStatusResponse, WitnessSummary,
};
use crate::enrichment::EnrichmentOrchestrator;
use crate::error::{CoreError, CoreResult};
use crate::fanout::FanoutEngine;
use crate::geo;
use crate::jitter;
use crate::models::{MediaFile, MediaKind, Sighting, SensorData, Location, MediaInfo, SightingStatus, WitnessConfidence};
use crate::persistence::PersistenceGateway;
use crate::push::PushDispatcher;
use crate::witness::{consensus, should_auto_escalate, witnesses_last_60s, ConsensusQuality, WitnessPoint, WitnessValidator};

fn quality_str(quality: ConsensusQuality) -> &'static str {
    match quality {
        ConsensusQuality::Excellent => "excellent",
        ConsensusQuality::Good => "good",
        ConsensusQuality::Poor => "poor",
        ConsensusQuality::Insufficient => "insufficient",
    }
}

fn escalation_rank(level: &str) -> u8 {
    match level {
        "emergency" => 3,
        "urgent" => 2,
        "normal" => 1,
        _ => 0,
    }
}

/// Derives synchronous variant URLs for an uploaded file, falling back to
/// the original URL on failure, per §6's media-association contract.
pub trait MediaVariantGenerator: Send + Sync {
    fn thumbnail_url(&self, original_url: &str, kind: MediaKind) -> Option<String>;
    fn web_url(&self, original_url: &str, kind: MediaKind) -> Option<String>;
    fn preview_url(&self, original_url: &str, kind: MediaKind) -> Option<String>;
}

/// Default variant generator: derives suffixed URLs from the original,
/// used when no dedicated image-processing backend is configured.
pub struct SuffixVariantGenerator;

impl MediaVariantGenerator for SuffixVariantGenerator {
    fn thumbnail_url(&self, original_url: &str, _kind: MediaKind) -> Option<String> {
        Some(format!("{original_url}?variant=thumbnail"))
    }
    fn web_url(&self, original_url: &str, _kind: MediaKind) -> Option<String> {
        Some(format!("{original_url}?variant=web"))
    }
    fn preview_url(&self, original_url: &str, _kind: MediaKind) -> Option<String> {
        Some(format!("{original_url}?variant=preview"))
    }
}

pub struct AlertService<G: PersistenceGateway + 'static, D: PushDispatcher + 'static> {
    gateway: Arc<G>,
    fanout: FanoutEngine<G, D>,
    enrichment: Arc<EnrichmentOrchestrator>,
    witness_validator: WitnessValidator<G>,
    variants: Arc<dyn MediaVariantGenerator>,
    config: Config,
}

impl<G: PersistenceGateway + 'static, D: PushDispatcher + 'static> AlertService<G, D> {
    pub fn new(
        gateway: Arc<G>,
        fanout: FanoutEngine<G, D>,
        enrichment: Arc<EnrichmentOrchestrator>,
        witness_validator: WitnessValidator<G>,
        config: Config,
    ) -> Self {
        Self { gateway, fanout, enrichment, witness_validator, variants: Arc::new(SuffixVariantGenerator), config }
    }

    /// §6 ingestion endpoint. Validates input, jitters the true location,
    /// persists the sighting, dispatches fan-out (unless media is pending),
    /// and spawns enrichment in the background.
    pub async fn ingest(&self, req: IngestionRequest) -> CoreResult<IngestionResponse> {
        if req.device_id.trim().is_empty() {
            return Err(CoreError::InputError("device_id is required".to_string()));
        }
        geo::validate_point(req.location.latitude, req.location.longitude)?;

        let (jittered_lat, jittered_lon) =
            jitter::jitter_with_config(req.location.latitude, req.location.longitude, &self.config, None)?;

        let now = Utc::now();
        let sighting_id = Uuid::new_v4();
        let sighting = Sighting {
            id: sighting_id,
            created_at: now,
            updated_at: now,
            reporter_device_id: req.device_id.clone(),
            reporter_id: None,
            title: None,
            description: req.description.clone(),
            category: Sighting::category_default(),
            tags: Vec::new(),
            sensor_data: SensorData {
                location: Location {
                    lat: jittered_lat,
                    lon: jittered_lon,
                    accuracy_m: req.location.accuracy,
                    altitude_m: None,
                    original_lat: Some(req.location.latitude),
                    original_lon: Some(req.location.longitude),
                },
                azimuth_deg: None,
                pitch_deg: None,
                roll_deg: None,
                hfov_deg: None,
                timestamp: now,
                device_id: req.device_id.clone(),
            },
            media_info: MediaInfo::default(),
            enrichment_data: BTreeMap::new(),
            alert_level: crate::models::AlertLevel::Normal,
            status: SightingStatus::Created,
            witness_count: 1,
            is_public: true,
        };

        let witness_count = sighting.witness_count;
        self.gateway.create_sighting(sighting).await?;

        self.spawn_enrichment(sighting_id, jittered_lat, jittered_lon, now, req.description.clone());

        if req.has_media {
            return Ok(IngestionResponse {
                sighting_id,
                message: "sighting recorded; awaiting media before alerting".to_string(),
                alert_message: "media upload pending; alerts will be sent once media is attached".to_string(),
                alert_stats: AlertStats { total_alerted: 0, radius_km: outermost_ring(&self.config) },
                witness_count,
                location_jittered: true,
                proximity_alerts: ProximityAlerts { rings_notified: Vec::new(), escalation_applied: false },
            });
        }

        let fan_out = self.fanout.fan_out(sighting_id, jittered_lat, jittered_lon, &req.device_id, None, witness_count).await?;

        let alert_message = if fan_out.suppressed {
            "alert rate limit reached; dispatch suppressed".to_string()
        } else if fan_out.total_sent == 0 {
            "no nearby devices found".to_string()
        } else {
            format!("alerted {} nearby device(s)", fan_out.total_sent)
        };

        Ok(IngestionResponse {
            sighting_id,
            message: "sighting recorded".to_string(),
            alert_message,
            alert_stats: AlertStats { total_alerted: fan_out.total_sent, radius_km: outermost_ring(&self.config) },
            witness_count,
            location_jittered: true,
            proximity_alerts: ProximityAlerts {
                rings_notified: fan_out.per_ring.iter().filter(|r| r.sent > 0).map(|r| r.ring_km).collect(),
                escalation_applied: fan_out.escalation_applied,
            },
        })
    }

    fn spawn_enrichment(&self, sighting_id: Uuid, lat: f64, lon: f64, timestamp: chrono::DateTime<Utc>, description: Option<String>) {
        let gateway = self.gateway.clone();
        let enrichment = self.enrichment.clone();
        tokio::spawn(async move {
            let ctx = crate::enrichment::EnrichmentContext {
                sighting_id,
                latitude: lat,
                longitude: lon,
                altitude_m: None,
                timestamp,
                azimuth_deg: None,
                pitch_deg: None,
                roll_deg: None,
                category: Sighting::category_default(),
                title: None,
                description,
            };
            let outcomes = enrichment.run(&ctx).await;
            for (name, outcome) in outcomes {
                let data = outcome_to_json(&outcome);
                let _ = gateway.update_enrichment(sighting_id, &name, data).await;
            }
        });
    }

    /// §6 media association endpoint. Persists each file synchronously,
    /// deriving its variant URLs and falling back to the original URL for
    /// any that fail to generate. If fan-out for this sighting was
    /// deferred at ingestion (`has_media=true`), dispatches it now.
    pub async fn associate_media(&self, sighting_id: Uuid, submitter_device_id: &str, uploads: Vec<MediaUpload>) -> CoreResult<MediaAssociationResponse> {
        let mut sighting = self.gateway.get_sighting(sighting_id).await?;

        let mut responses = Vec::with_capacity(uploads.len());
        for upload in uploads {
            let id = Uuid::new_v4();
            let url = format!("https://media.soar-beep.local/{sighting_id}/{id}/{}", upload.filename);
            let thumbnail_url = self.variants.thumbnail_url(&url, upload.kind).unwrap_or_else(|| url.clone());
            let web_url = self.variants.web_url(&url, upload.kind).unwrap_or_else(|| url.clone());
            let preview_url = self.variants.preview_url(&url, upload.kind).unwrap_or_else(|| url.clone());

            let file = MediaFile {
                id,
                kind: upload.kind,
                filename: upload.filename.clone(),
                url: url.clone(),
                thumbnail_url: Some(thumbnail_url.clone()),
                web_url: Some(web_url.clone()),
                preview_url: Some(preview_url.clone()),
                size: upload.bytes.len() as i64,
                exif: None,
            };
            sighting.media_info.files.push(file);
            responses.push(MediaFileResponse {
                id,
                kind: upload.kind.to_string(),
                filename: upload.filename,
                url,
                thumbnail_url,
                web_url,
                preview_url,
                size: upload.bytes.len() as i64,
                exif: None,
            });
        }
        sighting.media_info.count = sighting.media_info.files.len();

        let files_json = serde_json::to_value(&sighting.media_info.files).unwrap_or(serde_json::Value::Array(vec![]));
        self.gateway.update_enrichment(sighting_id, "_media_info_files", files_json).await.ok();

        let location = sighting.sensor_data.location;
        self.fanout
            .fan_out(sighting_id, location.lat, location.lon, submitter_device_id, None, sighting.witness_count)
            .await?;

        Ok(MediaAssociationResponse { sighting_id, files: responses })
    }

    /// §6 list endpoint.
    pub async fn list_alerts(&self, limit: i64, offset: i64) -> CoreResult<AlertListResponse> {
        let sightings = self.gateway.list_public_sightings(limit, offset).await?;
        let alerts: Vec<AlertListEntry> = sightings.iter().map(to_list_entry).collect();
        Ok(AlertListResponse { total: alerts.len(), alerts, limit, offset })
    }

    /// §6 detail endpoint.
    pub async fn alert_detail(&self, sighting_id: Uuid) -> CoreResult<AlertDetailResponse> {
        let sighting = self.gateway.get_sighting(sighting_id).await?;
        let witnesses = self.gateway.list_witnesses(sighting_id).await?;
        let points: Vec<WitnessPoint> = witnesses
            .iter()
            .filter_map(|w| match (w.latitude, w.longitude) {
                (Some(lat), Some(lon)) => Some(WitnessPoint { lat, lon, bearing_deg: w.bearing_deg, timestamp: w.confirmed_at }),
                _ => None,
            })
            .collect();
        let metrics = consensus(&points);

        Ok(AlertDetailResponse {
            entry: to_list_entry(&sighting),
            witness_summary: WitnessSummary {
                estimated_position: metrics.estimated_position,
                confidence: metrics.confidence,
                quality: quality_str(metrics.quality).to_string(),
                agreement_percentage: metrics.agreement_percentage,
            },
        })
    }

    /// §6 witness-status endpoint.
    pub async fn witness_status(&self, sighting_id: Uuid, device_id: &str) -> CoreResult<WitnessStatusResponse> {
        let witnesses = self.gateway.list_witnesses(sighting_id).await?;
        let existing = witnesses.into_iter().find(|w| w.device_id == device_id);
        Ok(WitnessStatusResponse {
            has_confirmed: existing.is_some(),
            confirmed_at: existing.map(|w| w.confirmed_at),
            device_id: device_id.to_string(),
            sighting_id,
        })
    }

    /// §6 witness confirmation endpoint. Validates and persists the
    /// confirmation, then recomputes consensus/escalation and folds the
    /// result into `enrichment_data["witness_consensus"]`, never letting
    /// the stored escalation level decrease (§8 property 6).
    pub async fn confirm_witness(&self, sighting_id: Uuid, req: WitnessConfirmationRequest) -> CoreResult<WitnessConfirmationResponse> {
        let sighting_before = self.gateway.get_sighting(sighting_id).await?;

        let confidence = req
            .confidence
            .as_deref()
            .map(|s| s.parse::<WitnessConfidence>())
            .transpose()?
            .unwrap_or_default();

        let confirmation = crate::models::WitnessConfirmation {
            id: Uuid::new_v4(),
            sighting_id,
            device_id: req.device_id.clone(),
            confirmed_at: Utc::now(),
            latitude: req.latitude,
            longitude: req.longitude,
            altitude_m: req.altitude,
            accuracy_m: req.accuracy,
            bearing_deg: req.bearing_deg,
            still_visible: req.still_visible.unwrap_or(true),
            confidence,
            description: req.description,
            platform: req.platform,
            app_version: req.app_version,
            distance_km_to_sighting: None,
        };

        let new_witness_count = self.witness_validator.confirm(confirmation.clone()).await?;

        let witnesses = self.gateway.list_witnesses(sighting_id).await?;
        let points: Vec<WitnessPoint> = witnesses
            .iter()
            .filter_map(|w| match (w.latitude, w.longitude) {
                (Some(lat), Some(lon)) => Some(WitnessPoint { lat, lon, bearing_deg: w.bearing_deg, timestamp: w.confirmed_at }),
                _ => None,
            })
            .collect();
        let metrics = consensus(&points);
        let now = Utc::now();
        let last_60s = witnesses_last_60s(&witnesses, now);
        let auto_escalated = should_auto_escalate(witnesses.len() as u32, last_60s, metrics.confidence);

        let proposed_level = if !auto_escalated {
            "normal"
        } else if metrics.confidence >= 0.8 {
            "emergency"
        } else {
            "urgent"
        };
        let previous_level = sighting_before
            .enrichment_data
            .get("witness_consensus")
            .and_then(|v| v.get("escalation_level"))
            .and_then(|v| v.as_str())
            .unwrap_or("normal");
        let final_level = if escalation_rank(proposed_level) >= escalation_rank(previous_level) { proposed_level } else { previous_level };

        self.gateway
            .update_enrichment(
                sighting_id,
                "witness_consensus",
                json!({
                    "estimated_position": metrics.estimated_position,
                    "confidence": metrics.confidence,
                    "quality": quality_str(metrics.quality),
                    "agreement_percentage": metrics.agreement_percentage,
                    "estimated_radius_m": metrics.estimated_radius_m,
                    "escalation_level": final_level,
                    "auto_escalated": auto_escalated,
                }),
            )
            .await?;

        Ok(WitnessConfirmationResponse {
            confirmed: true,
            new_witness_count,
            total_confirmations: witnesses.len() as i32,
            confirmation_time: confirmation.confirmed_at,
            sighting_age_minutes: (confirmation.confirmed_at - sighting_before.created_at).num_minutes(),
        })
    }
}

/// Shapes a processor's result for `enrichment_data`: on success, the
/// processor's own JSON is stored verbatim so clients keep reading the
/// familiar field names; on failure/timeout/unavailable, a small marker is
/// written instead so the caller can tell "not run" from "ran and failed".
fn outcome_to_json(outcome: &crate::enrichment::ProcessorOutcome) -> serde_json::Value {
    if outcome.success {
        outcome.data.clone().unwrap_or(serde_json::Value::Null)
    } else {
        json!({
            "success": false,
            "error": outcome.error.clone().unwrap_or_else(|| "unknown error".to_string()),
        })
    }
}

fn outermost_ring(config: &Config) -> f64 {
    config.fanout_rings_km.iter().cloned().fold(0.0_f64, f64::max)
}

fn to_list_entry(sighting: &Sighting) -> AlertListEntry {
    AlertListEntry {
        sighting_id: sighting.id,
        created_at: sighting.created_at,
        category: sighting.category.clone(),
        title: sighting.title.clone(),
        description: sighting.description.clone(),
        latitude: sighting.sensor_data.location.lat,
        longitude: sighting.sensor_data.location.lon,
        alert_level: sighting.alert_level.to_string(),
        witness_count: sighting.witness_count,
        media_files: sighting
            .media_info
            .files
            .iter()
            .map(|f| MediaFileResponse {
                id: f.id,
                kind: f.kind.to_string(),
                filename: f.filename.clone(),
                url: f.url.clone(),
                thumbnail_url: f.thumbnail_url.clone().unwrap_or_else(|| f.url.clone()),
                web_url: f.web_url.clone().unwrap_or_else(|| f.url.clone()),
                preview_url: f.preview_url.clone().unwrap_or_else(|| f.url.clone()),
                size: f.size,
                exif: f.exif.clone(),
            })
            .collect(),
        enrichment_data: sighting.enrichment_data.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::EnrichmentOrchestrator;
    use crate::persistence::InMemoryGateway;
    use crate::push::NullDispatcher;
    use crate::rate_limit::{FanoutRateGate, SlidingWindowGate};

    fn service(config: Config) -> AlertService<InMemoryGateway, NullDispatcher> {
        let gateway = Arc::new(InMemoryGateway::new());
        let dispatcher = Arc::new(NullDispatcher::new());
        let fanout = FanoutEngine::new(gateway.clone(), dispatcher, FanoutRateGate::new(), config.clone());
        let enrichment = Arc::new(EnrichmentOrchestrator::new(Vec::new(), &config));
        let witness_validator = WitnessValidator::new(gateway.clone(), SlidingWindowGate::new(chrono::Duration::hours(1)), config.clone());
        AlertService::new(gateway, fanout, enrichment, witness_validator, config)
    }

    fn ingest_req(device_id: &str) -> IngestionRequest {
        IngestionRequest {
            device_id: device_id.to_string(),
            location: crate::dto::LocationInput { latitude: 47.6062, longitude: -122.3321, accuracy: None },
            description: Some("a bright light".to_string()),
            has_media: false,
        }
    }

    #[tokio::test]
    async fn ingestion_jitters_location_and_reports_no_nearby_devices() {
        let svc = service(Config::default());
        let response = svc.ingest(ingest_req("dev1")).await.unwrap();
        assert_eq!(response.alert_stats.total_alerted, 0);
        assert_eq!(response.alert_message, "no nearby devices found");
        assert!(response.location_jittered);
    }

    #[tokio::test]
    async fn ingestion_rejects_empty_device_id() {
        let svc = service(Config::default());
        let err = svc.ingest(ingest_req("")).await.unwrap_err();
        assert!(matches!(err, CoreError::InputError(_)));
    }

    #[tokio::test]
    async fn has_media_defers_fan_out() {
        let svc = service(Config::default());
        let mut req = ingest_req("dev1");
        req.has_media = true;
        let response = svc.ingest(req).await.unwrap();
        assert_eq!(response.alert_stats.total_alerted, 0);
        assert!(response.alert_message.contains("media upload pending"));
    }

    #[tokio::test]
    async fn witness_confirmation_round_trips_and_escalates() {
        let svc = service(Config::default());
        let response = svc.ingest(ingest_req("dev1")).await.unwrap();

        let confirm = WitnessConfirmationRequest {
            device_id: "witness1".to_string(),
            latitude: Some(47.6065),
            longitude: Some(-122.3325),
            altitude: None,
            accuracy: None,
            bearing_deg: Some(45.0),
            still_visible: Some(true),
            description: None,
            confidence: Some("high".to_string()),
            platform: None,
            app_version: None,
        };
        let confirmed = svc.confirm_witness(response.sighting_id, confirm).await.unwrap();
        assert!(confirmed.confirmed);
        // the reporter already counts as witness 1; this confirmation is the 2nd.
        assert_eq!(confirmed.new_witness_count, 2);

        let status = svc.witness_status(response.sighting_id, "witness1").await.unwrap();
        assert!(status.has_confirmed);

        let sighting = svc.gateway.get_sighting(response.sighting_id).await.unwrap();
        assert!(sighting.enrichment_data.contains_key("witness_consensus"));
    }

    struct AlwaysFailsProcessor;

    #[async_trait::async_trait]
    impl crate::enrichment::EnrichmentProcessor for AlwaysFailsProcessor {
        fn name(&self) -> &str {
            "flaky"
        }
        fn priority(&self) -> u8 {
            1
        }
        fn timeout_seconds(&self) -> u64 {
            5
        }
        async fn is_available(&self) -> bool {
            true
        }
        async fn process(&self, _ctx: &crate::enrichment::EnrichmentContext) -> crate::enrichment::ProcessorOutcome {
            crate::enrichment::ProcessorOutcome::failed("upstream unreachable", 1)
        }
    }

    #[tokio::test]
    async fn failed_enrichment_outcome_is_still_persisted() {
        let config = Config::default();
        let gateway = Arc::new(InMemoryGateway::new());
        let dispatcher = Arc::new(NullDispatcher::new());
        let fanout = FanoutEngine::new(gateway.clone(), dispatcher, FanoutRateGate::new(), config.clone());
        let processors: Vec<Arc<dyn crate::enrichment::EnrichmentProcessor>> = vec![Arc::new(AlwaysFailsProcessor)];
        let enrichment = Arc::new(EnrichmentOrchestrator::new(processors, &config));
        let witness_validator = WitnessValidator::new(gateway.clone(), SlidingWindowGate::new(chrono::Duration::hours(1)), config.clone());
        let svc = AlertService::new(gateway.clone(), fanout, enrichment, witness_validator, config);

        let response = svc.ingest(ingest_req("dev1")).await.unwrap();
        // enrichment is spawned in the background; give it a moment to land.
        for _ in 0..50 {
            let sighting = gateway.get_sighting(response.sighting_id).await.unwrap();
            if sighting.enrichment_data.contains_key("flaky") {
                let entry = &sighting.enrichment_data["flaky"];
                assert_eq!(entry["success"], serde_json::json!(false));
                assert_eq!(entry["error"], serde_json::json!("upstream unreachable"));
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("failed processor outcome was never persisted");
    }

    #[tokio::test]
    async fn media_association_falls_back_to_original_url_on_missing_variants() {
        let svc = service(Config::default());
        let response = svc.ingest(ingest_req("dev1")).await.unwrap();
        let upload = MediaUpload { filename: "photo.jpg".to_string(), bytes: vec![0u8; 10], kind: MediaKind::Image };
        let media = svc.associate_media(response.sighting_id, "dev1", vec![upload]).await.unwrap();
        assert_eq!(media.files.len(), 1);
        assert!(!media.files[0].thumbnail_url.is_empty());
    }
}
