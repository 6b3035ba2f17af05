//! External-interface DTOs (§6): the plain request/response structs an
//! HTTP adapter layer would serialize at the edge. No router lives here —
//! these types and the `AlertService` facade methods that consume/produce
//! them are the contract surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct LocationInput {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestionRequest {
    pub device_id: String,
    pub location: LocationInput,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub has_media: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertStats {
    pub total_alerted: usize,
    pub radius_km: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProximityAlerts {
    pub rings_notified: Vec<f64>,
    pub escalation_applied: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionResponse {
    pub sighting_id: Uuid,
    pub message: String,
    pub alert_message: String,
    pub alert_stats: AlertStats,
    pub witness_count: i32,
    pub location_jittered: bool,
    pub proximity_alerts: ProximityAlerts,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaFileResponse {
    pub id: Uuid,
    pub kind: String,
    pub filename: String,
    pub url: String,
    pub thumbnail_url: String,
    pub web_url: String,
    pub preview_url: String,
    pub size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exif: Option<Json>,
}

#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub kind: crate::models::MediaKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaAssociationResponse {
    pub sighting_id: Uuid,
    pub files: Vec<MediaFileResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertListEntry {
    pub sighting_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub category: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub alert_level: String,
    pub witness_count: i32,
    pub media_files: Vec<MediaFileResponse>,
    pub enrichment_data: std::collections::BTreeMap<String, Json>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertListResponse {
    pub alerts: Vec<AlertListEntry>,
    pub total: usize,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WitnessSummary {
    pub estimated_position: Option<(f64, f64)>,
    pub confidence: f64,
    pub quality: String,
    pub agreement_percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertDetailResponse {
    #[serde(flatten)]
    pub entry: AlertListEntry,
    pub witness_summary: WitnessSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct WitnessStatusResponse {
    pub has_confirmed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    pub device_id: String,
    pub sighting_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WitnessConfirmationRequest {
    pub device_id: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub bearing_deg: Option<f64>,
    #[serde(default)]
    pub still_visible: Option<bool>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub confidence: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub app_version: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WitnessConfirmationResponse {
    pub confirmed: bool,
    pub new_witness_count: i32,
    pub total_confirmations: i32,
    pub confirmation_time: DateTime<Utc>,
    pub sighting_age_minutes: i64,
}
