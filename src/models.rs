//! Data model (§3): the root `Sighting` entity and the rows it owns
//! exclusively — witness confirmations, alert deliveries and engagement
//! events — plus the `Device` a client registers for push.
//!
//! Each entity has a plain domain struct used everywhere above the
//! persistence boundary, and (where backed by Postgres) a `*Row` struct
//! that mirrors `schema.rs` column-for-column, following the split between
//! `Device`/`DeviceModel` in the device directory this was grounded on.
//! Enum columns are stored as `Text`; conversion happens in `TryFrom`/`From`
//! impls here rather than spreading `match`es through the repository.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Low,
    Normal,
    Urgent,
    Emergency,
}

impl Default for AlertLevel {
    fn default() -> Self {
        AlertLevel::Normal
    }
}

impl std::str::FromStr for AlertLevel {
    type Err = CoreError;
    fn from_str(s: &str) -> CoreResult<Self> {
        match s {
            "low" => Ok(AlertLevel::Low),
            "normal" => Ok(AlertLevel::Normal),
            "urgent" => Ok(AlertLevel::Urgent),
            "emergency" => Ok(AlertLevel::Emergency),
            other => Err(CoreError::InputError(format!("unknown alert_level '{other}'"))),
        }
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertLevel::Low => "low",
            AlertLevel::Normal => "normal",
            AlertLevel::Urgent => "urgent",
            AlertLevel::Emergency => "emergency",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SightingStatus {
    Created,
    Processed,
    Verified,
}

impl Default for SightingStatus {
    fn default() -> Self {
        SightingStatus::Created
    }
}

impl std::str::FromStr for SightingStatus {
    type Err = CoreError;
    fn from_str(s: &str) -> CoreResult<Self> {
        match s {
            "created" => Ok(SightingStatus::Created),
            "processed" => Ok(SightingStatus::Processed),
            "verified" => Ok(SightingStatus::Verified),
            other => Err(CoreError::InputError(format!("unknown status '{other}'"))),
        }
    }
}

impl std::fmt::Display for SightingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SightingStatus::Created => "created",
            SightingStatus::Processed => "processed",
            SightingStatus::Verified => "verified",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
    Web,
}

impl std::str::FromStr for Platform {
    type Err = CoreError;
    fn from_str(s: &str) -> CoreResult<Self> {
        match s {
            "ios" => Ok(Platform::Ios),
            "android" => Ok(Platform::Android),
            "web" => Ok(Platform::Web),
            other => Err(CoreError::InputError(format!("unknown platform '{other}'"))),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
            Platform::Web => "web",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushProvider {
    Fcm,
    Apns,
    Webpush,
}

impl std::str::FromStr for PushProvider {
    type Err = CoreError;
    fn from_str(s: &str) -> CoreResult<Self> {
        match s {
            "fcm" => Ok(PushProvider::Fcm),
            "apns" => Ok(PushProvider::Apns),
            "webpush" => Ok(PushProvider::Webpush),
            other => Err(CoreError::InputError(format!("unknown push_provider '{other}'"))),
        }
    }
}

impl std::fmt::Display for PushProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PushProvider::Fcm => "fcm",
            PushProvider::Apns => "apns",
            PushProvider::Webpush => "webpush",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WitnessConfidence {
    Low,
    Medium,
    High,
}

impl Default for WitnessConfidence {
    fn default() -> Self {
        WitnessConfidence::Medium
    }
}

impl std::str::FromStr for WitnessConfidence {
    type Err = CoreError;
    fn from_str(s: &str) -> CoreResult<Self> {
        match s {
            "low" => Ok(WitnessConfidence::Low),
            "medium" => Ok(WitnessConfidence::Medium),
            "high" => Ok(WitnessConfidence::High),
            other => Err(CoreError::InputError(format!("unknown confidence '{other}'"))),
        }
    }
}

impl std::fmt::Display for WitnessConfidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WitnessConfidence::Low => "low",
            WitnessConfidence::Medium => "medium",
            WitnessConfidence::High => "high",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

impl std::str::FromStr for MediaKind {
    type Err = CoreError;
    fn from_str(s: &str) -> CoreResult<Self> {
        match s {
            "image" => Ok(MediaKind::Image),
            "video" => Ok(MediaKind::Video),
            other => Err(CoreError::InputError(format!("unknown media kind '{other}'"))),
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementEventType {
    AlertSent,
    QuickActionSeeItToo,
    QuickActionDontSee,
    QuickActionMissed,
    AlertOpened,
    BeepSubmitted,
}

impl std::str::FromStr for EngagementEventType {
    type Err = CoreError;
    fn from_str(s: &str) -> CoreResult<Self> {
        match s {
            "alert_sent" => Ok(EngagementEventType::AlertSent),
            "quick_action_see_it_too" => Ok(EngagementEventType::QuickActionSeeItToo),
            "quick_action_dont_see" => Ok(EngagementEventType::QuickActionDontSee),
            "quick_action_missed" => Ok(EngagementEventType::QuickActionMissed),
            "alert_opened" => Ok(EngagementEventType::AlertOpened),
            "beep_submitted" => Ok(EngagementEventType::BeepSubmitted),
            other => Err(CoreError::InputError(format!("unknown event_type '{other}'"))),
        }
    }
}

impl std::fmt::Display for EngagementEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EngagementEventType::AlertSent => "alert_sent",
            EngagementEventType::QuickActionSeeItToo => "quick_action_see_it_too",
            EngagementEventType::QuickActionDontSee => "quick_action_dont_see",
            EngagementEventType::QuickActionMissed => "quick_action_missed",
            EngagementEventType::AlertOpened => "alert_opened",
            EngagementEventType::BeepSubmitted => "beep_submitted",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude_m: Option<f64>,
    /// Never surfaced through any read path; present only on the row
    /// written at ingestion time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_lon: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorData {
    pub location: Location,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azimuth_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roll_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hfov_deg: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub device_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaFile {
    pub id: Uuid,
    pub kind: MediaKind,
    pub filename: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    pub size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exif: Option<Json>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub files: Vec<MediaFile>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sighting {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub reporter_device_id: String,
    pub reporter_id: Option<Uuid>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: String,
    pub tags: Vec<String>,
    pub sensor_data: SensorData,
    pub media_info: MediaInfo,
    pub enrichment_data: std::collections::BTreeMap<String, Json>,
    pub alert_level: AlertLevel,
    pub status: SightingStatus,
    pub witness_count: i32,
    pub is_public: bool,
}

impl Sighting {
    pub fn category_default() -> String {
        "ufo".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WitnessConfirmation {
    pub id: Uuid,
    pub sighting_id: Uuid,
    pub device_id: String,
    pub confirmed_at: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude_m: Option<f64>,
    pub accuracy_m: Option<f64>,
    pub bearing_deg: Option<f64>,
    pub still_visible: bool,
    pub confidence: WitnessConfidence,
    pub description: Option<String>,
    pub platform: Option<String>,
    pub app_version: Option<String>,
    pub distance_km_to_sighting: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: Uuid,
    pub device_id: String,
    pub user_id: Option<Uuid>,
    pub platform: Platform,
    pub push_token: Option<String>,
    pub push_provider: Option<PushProvider>,
    pub push_enabled: bool,
    pub alert_notifications: bool,
    pub chat_notifications: bool,
    pub system_notifications: bool,
    pub is_active: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub notifications_sent: i32,
    pub notifications_opened: i32,
}

impl Device {
    /// Invariant from §3: eligible for fan-out iff active, push-enabled,
    /// a token is present, and the device opted into alert notifications.
    pub fn is_fanout_eligible(&self) -> bool {
        self.is_active && self.push_enabled && self.push_token.is_some() && self.alert_notifications
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementEvent {
    pub id: Uuid,
    pub device_id: String,
    pub sighting_id: Option<Uuid>,
    pub event_type: EngagementEventType,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: Uuid,
    pub sighting_id: Uuid,
    pub device_id: String,
    pub distance_km: f64,
    pub ring: f64,
    pub level: AlertLevel,
    pub sent_at: DateTime<Utc>,
    pub delivered: bool,
    pub error: Option<String>,
}

// --- Diesel row models -----------------------------------------------
//
// Mirror `schema.rs` column-for-column. Enum/struct-shaped columns are
// strings or jsonb here; `TryFrom`/`From` below convert to/from the
// domain types above at the repository boundary.

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::sightings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SightingRow {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub reporter_device_id: String,
    pub reporter_id: Option<Uuid>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: String,
    pub tags: Json,
    pub sensor_data: Json,
    pub media_info: Json,
    pub enrichment_data: Json,
    pub alert_level: String,
    pub status: String,
    pub witness_count: i32,
    pub is_public: bool,
}

impl TryFrom<SightingRow> for Sighting {
    type Error = CoreError;

    fn try_from(row: SightingRow) -> CoreResult<Self> {
        Ok(Sighting {
            id: row.id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            reporter_device_id: row.reporter_device_id,
            reporter_id: row.reporter_id,
            title: row.title,
            description: row.description,
            category: row.category,
            tags: serde_json::from_value(row.tags).unwrap_or_default(),
            sensor_data: serde_json::from_value(row.sensor_data)
                .map_err(|e| CoreError::InputError(format!("corrupt sensor_data: {e}")))?,
            media_info: serde_json::from_value(row.media_info).unwrap_or_default(),
            enrichment_data: serde_json::from_value(row.enrichment_data).unwrap_or_default(),
            alert_level: row.alert_level.parse()?,
            status: row.status.parse()?,
            witness_count: row.witness_count,
            is_public: row.is_public,
        })
    }
}

impl From<&Sighting> for SightingRow {
    fn from(s: &Sighting) -> Self {
        SightingRow {
            id: s.id,
            created_at: s.created_at,
            updated_at: s.updated_at,
            reporter_device_id: s.reporter_device_id.clone(),
            reporter_id: s.reporter_id,
            title: s.title.clone(),
            description: s.description.clone(),
            category: s.category.clone(),
            tags: serde_json::to_value(&s.tags).unwrap_or(Json::Array(vec![])),
            sensor_data: serde_json::to_value(&s.sensor_data).unwrap_or(Json::Null),
            media_info: serde_json::to_value(&s.media_info).unwrap_or(Json::Null),
            enrichment_data: serde_json::to_value(&s.enrichment_data).unwrap_or(Json::Object(Default::default())),
            alert_level: s.alert_level.to_string(),
            status: s.status.to_string(),
            witness_count: s.witness_count,
            is_public: s.is_public,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::witness_confirmations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WitnessConfirmationRow {
    pub id: Uuid,
    pub sighting_id: Uuid,
    pub device_id: String,
    pub confirmed_at: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude_m: Option<f64>,
    pub accuracy_m: Option<f64>,
    pub bearing_deg: Option<f64>,
    pub still_visible: bool,
    pub confidence: String,
    pub description: Option<String>,
    pub platform: Option<String>,
    pub app_version: Option<String>,
    pub distance_km_to_sighting: Option<f64>,
}

impl TryFrom<WitnessConfirmationRow> for WitnessConfirmation {
    type Error = CoreError;

    fn try_from(row: WitnessConfirmationRow) -> CoreResult<Self> {
        Ok(WitnessConfirmation {
            id: row.id,
            sighting_id: row.sighting_id,
            device_id: row.device_id,
            confirmed_at: row.confirmed_at,
            latitude: row.latitude,
            longitude: row.longitude,
            altitude_m: row.altitude_m,
            accuracy_m: row.accuracy_m,
            bearing_deg: row.bearing_deg,
            still_visible: row.still_visible,
            confidence: row.confidence.parse()?,
            description: row.description,
            platform: row.platform,
            app_version: row.app_version,
            distance_km_to_sighting: row.distance_km_to_sighting,
        })
    }
}

impl From<&WitnessConfirmation> for WitnessConfirmationRow {
    fn from(w: &WitnessConfirmation) -> Self {
        WitnessConfirmationRow {
            id: w.id,
            sighting_id: w.sighting_id,
            device_id: w.device_id.clone(),
            confirmed_at: w.confirmed_at,
            latitude: w.latitude,
            longitude: w.longitude,
            altitude_m: w.altitude_m,
            accuracy_m: w.accuracy_m,
            bearing_deg: w.bearing_deg,
            still_visible: w.still_visible,
            confidence: w.confidence.to_string(),
            description: w.description.clone(),
            platform: w.platform.clone(),
            app_version: w.app_version.clone(),
            distance_km_to_sighting: w.distance_km_to_sighting,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::devices)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DeviceRow {
    pub id: Uuid,
    pub device_id: String,
    pub user_id: Option<Uuid>,
    pub platform: String,
    pub push_token: Option<String>,
    pub push_provider: Option<String>,
    pub push_enabled: bool,
    pub alert_notifications: bool,
    pub chat_notifications: bool,
    pub system_notifications: bool,
    pub is_active: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub notifications_sent: i32,
    pub notifications_opened: i32,
}

impl TryFrom<DeviceRow> for Device {
    type Error = CoreError;

    fn try_from(row: DeviceRow) -> CoreResult<Self> {
        Ok(Device {
            id: row.id,
            device_id: row.device_id,
            user_id: row.user_id,
            platform: row.platform.parse()?,
            push_token: row.push_token,
            push_provider: row.push_provider.map(|p| p.parse()).transpose()?,
            push_enabled: row.push_enabled,
            alert_notifications: row.alert_notifications,
            chat_notifications: row.chat_notifications,
            system_notifications: row.system_notifications,
            is_active: row.is_active,
            last_seen: row.last_seen,
            lat: row.lat,
            lon: row.lon,
            notifications_sent: row.notifications_sent,
            notifications_opened: row.notifications_opened,
        })
    }
}

impl From<&Device> for DeviceRow {
    fn from(d: &Device) -> Self {
        DeviceRow {
            id: d.id,
            device_id: d.device_id.clone(),
            user_id: d.user_id,
            platform: d.platform.to_string(),
            push_token: d.push_token.clone(),
            push_provider: d.push_provider.map(|p| p.to_string()),
            push_enabled: d.push_enabled,
            alert_notifications: d.alert_notifications,
            chat_notifications: d.chat_notifications,
            system_notifications: d.system_notifications,
            is_active: d.is_active,
            last_seen: d.last_seen,
            lat: d.lat,
            lon: d.lon,
            notifications_sent: d.notifications_sent,
            notifications_opened: d.notifications_opened,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::engagement_events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct EngagementEventRow {
    pub id: Uuid,
    pub device_id: String,
    pub sighting_id: Option<Uuid>,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
}

impl TryFrom<EngagementEventRow> for EngagementEvent {
    type Error = CoreError;

    fn try_from(row: EngagementEventRow) -> CoreResult<Self> {
        Ok(EngagementEvent {
            id: row.id,
            device_id: row.device_id,
            sighting_id: row.sighting_id,
            event_type: row.event_type.parse()?,
            timestamp: row.timestamp,
        })
    }
}

impl From<&EngagementEvent> for EngagementEventRow {
    fn from(e: &EngagementEvent) -> Self {
        EngagementEventRow {
            id: e.id,
            device_id: e.device_id.clone(),
            sighting_id: e.sighting_id,
            event_type: e.event_type.to_string(),
            timestamp: e.timestamp,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::alert_records)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AlertRecordRow {
    pub id: Uuid,
    pub sighting_id: Uuid,
    pub device_id: String,
    pub distance_km: f64,
    pub ring: f64,
    pub level: String,
    pub sent_at: DateTime<Utc>,
    pub delivered: bool,
    pub error: Option<String>,
}

impl TryFrom<AlertRecordRow> for AlertRecord {
    type Error = CoreError;

    fn try_from(row: AlertRecordRow) -> CoreResult<Self> {
        Ok(AlertRecord {
            id: row.id,
            sighting_id: row.sighting_id,
            device_id: row.device_id,
            distance_km: row.distance_km,
            ring: row.ring,
            level: row.level.parse()?,
            sent_at: row.sent_at,
            delivered: row.delivered,
            error: row.error,
        })
    }
}

impl From<&AlertRecord> for AlertRecordRow {
    fn from(a: &AlertRecord) -> Self {
        AlertRecordRow {
            id: a.id,
            sighting_id: a.sighting_id,
            device_id: a.device_id.clone(),
            distance_km: a.distance_km,
            ring: a.ring,
            level: a.level.to_string(),
            sent_at: a.sent_at,
            delivered: a.delivered,
            error: a.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_fanout_eligibility_requires_all_four_conditions() {
        let mut d = Device {
            id: Uuid::new_v4(),
            device_id: "dev1".to_string(),
            user_id: None,
            platform: Platform::Ios,
            push_token: Some("tok".to_string()),
            push_provider: Some(PushProvider::Fcm),
            push_enabled: true,
            alert_notifications: true,
            chat_notifications: true,
            system_notifications: true,
            is_active: true,
            last_seen: None,
            lat: None,
            lon: None,
            notifications_sent: 0,
            notifications_opened: 0,
        };
        assert!(d.is_fanout_eligible());

        d.push_token = None;
        assert!(!d.is_fanout_eligible());
        d.push_token = Some("tok".to_string());

        d.alert_notifications = false;
        assert!(!d.is_fanout_eligible());
        d.alert_notifications = true;

        d.is_active = false;
        assert!(!d.is_fanout_eligible());
    }

    #[test]
    fn alert_level_round_trips_through_display_and_parse() {
        for level in [AlertLevel::Low, AlertLevel::Normal, AlertLevel::Urgent, AlertLevel::Emergency] {
            let s = level.to_string();
            let parsed: AlertLevel = s.parse().unwrap();
            assert_eq!(parsed, level);
        }
    }

    #[test]
    fn unknown_enum_string_is_rejected() {
        assert!("bogus".parse::<AlertLevel>().is_err());
    }
}
