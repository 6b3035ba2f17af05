//! Push dispatcher (§4.F): turns a ring dispatch into per-device FCM HTTP
//! v1 payloads and delivers them. Delivery is always best-effort — per-
//! token failures are reported back to the fan-out engine, never
//! propagated as a fatal error.

use std::sync::Mutex;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device_directory::DirectoryEntry;
use crate::error::{CoreError, CoreResult};
use crate::models::AlertLevel;

/// Everything the dispatcher needs to assemble a payload, independent of
/// which device it is being sent to.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub sighting_id: Uuid,
    pub ring_km: f64,
    pub level: AlertLevel,
    pub witness_count: i32,
    pub submitter_device_id: String,
    pub title: String,
    pub body: String,
    pub latitude: f64,
    pub longitude: f64,
    pub location_name: Option<String>,
}

/// Per-device payload, individualised with the device's precomputed
/// distance and (when its location is known) forward bearing.
#[derive(Debug, Clone, Serialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub data: std::collections::BTreeMap<String, String>,
}

pub fn build_payload(ctx: &DispatchContext, device: &DirectoryEntry) -> CoreResult<PushPayload> {
    let mut data = std::collections::BTreeMap::new();
    data.insert("type".to_string(), "sighting_alert".to_string());
    data.insert("sighting_id".to_string(), ctx.sighting_id.to_string());
    data.insert("alert_level".to_string(), ctx.level.to_string());
    data.insert("witness_count".to_string(), ctx.witness_count.to_string());
    data.insert("timestamp".to_string(), Utc::now().to_rfc3339());
    data.insert("action".to_string(), "open_compass".to_string());
    data.insert("submitter_device_id".to_string(), ctx.submitter_device_id.clone());
    data.insert("ring".to_string(), ctx.ring_km.to_string());
    data.insert("latitude".to_string(), ctx.latitude.to_string());
    data.insert("longitude".to_string(), ctx.longitude.to_string());
    if let Some(name) = &ctx.location_name {
        data.insert("location_name".to_string(), name.clone());
    }
    data.insert("distance".to_string(), format!("{:.2}", device.distance_km));

    if let (Some(dev_lat), Some(dev_lon)) = (device.lat, device.lon) {
        let bearing = crate::geo::bearing_deg(dev_lat, dev_lon, ctx.latitude, ctx.longitude)?;
        data.insert("bearing".to_string(), format!("{bearing:.1}"));
    }

    Ok(PushPayload { title: ctx.title.clone(), body: ctx.body.clone(), data })
}

#[derive(Debug, Clone)]
pub struct PushOutcome {
    pub device_id: String,
    pub success: bool,
    pub error_code: Option<String>,
}

#[async_trait]
pub trait PushDispatcher: Send + Sync {
    async fn send(&self, device: &DirectoryEntry, payload: &PushPayload) -> PushOutcome;
}

/// No-op dispatcher: records every payload it was asked to send and
/// reports success. Used in tests and whenever push credentials are
/// absent, so ingestion still succeeds with `total_alerted=0` reported
/// by the caller rather than this type lying about delivery.
#[derive(Default)]
pub struct NullDispatcher {
    sent: Mutex<Vec<(String, PushPayload)>>,
}

impl NullDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn drain(&self) -> Vec<(String, PushPayload)> {
        std::mem::take(&mut self.sent.lock().unwrap())
    }
}

#[async_trait]
impl PushDispatcher for NullDispatcher {
    async fn send(&self, device: &DirectoryEntry, payload: &PushPayload) -> PushOutcome {
        self.sent.lock().unwrap().push((device.device_id.clone(), payload.clone()));
        PushOutcome { device_id: device.device_id.clone(), success: true, error_code: None }
    }
}

#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
}

#[derive(Debug, Serialize)]
struct GoogleClaims {
    iss: String,
    scope: String,
    aud: String,
    exp: i64,
    iat: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// FCM HTTP v1 dispatcher, authenticating as a service account and
/// caching the resulting OAuth2 bearer token with a 5-minute safety
/// margin on its expiry.
pub struct FcmDispatcher {
    client: reqwest::Client,
    project_id: String,
    key: ServiceAccountKey,
    token: Mutex<Option<CachedToken>>,
}

const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const TOKEN_SAFETY_MARGIN: Duration = Duration::minutes(5);

impl FcmDispatcher {
    pub fn from_service_account_json(project_id: String, json: &str) -> CoreResult<Self> {
        let key: ServiceAccountKey = serde_json::from_str(json)
            .map_err(|e| CoreError::DispatchUnavailable(format!("invalid service account json: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(10))
            .build()
            .map_err(|e| CoreError::DispatchUnavailable(format!("http client: {e}")))?;
        Ok(Self { client, project_id, key, token: Mutex::new(None) })
    }

    fn cached_token(&self) -> Option<String> {
        let guard = self.token.lock().unwrap();
        guard.as_ref().filter(|t| Utc::now() + TOKEN_SAFETY_MARGIN < t.expires_at).map(|t| t.access_token.clone())
    }

    async fn fetch_token(&self) -> CoreResult<String> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        let now = Utc::now();
        let claims = GoogleClaims {
            iss: self.key.client_email.clone(),
            scope: FCM_SCOPE.to_string(),
            aud: self.key.token_uri.clone(),
            exp: (now + Duration::hours(1)).timestamp(),
            iat: now.timestamp(),
        };
        let encoding_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| CoreError::DispatchUnavailable(format!("bad private key: {e}")))?;
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
            .map_err(|e| CoreError::DispatchUnavailable(format!("jwt signing: {e}")))?;

        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| CoreError::Upstream { provider: "fcm-oauth".to_string(), retriable: true, detail: e.to_string() })?;

        if !response.status().is_success() {
            return Err(CoreError::Upstream {
                provider: "fcm-oauth".to_string(),
                retriable: response.status().is_server_error(),
                detail: format!("status {}", response.status()),
            });
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| CoreError::Upstream { provider: "fcm-oauth".to_string(), retriable: false, detail: e.to_string() })?;

        let expires_at = now + Duration::seconds(parsed.expires_in);
        *self.token.lock().unwrap() = Some(CachedToken { access_token: parsed.access_token.clone(), expires_at });
        Ok(parsed.access_token)
    }
}

#[async_trait]
impl PushDispatcher for FcmDispatcher {
    async fn send(&self, device: &DirectoryEntry, payload: &PushPayload) -> PushOutcome {
        let token = match self.fetch_token().await {
            Ok(t) => t,
            Err(e) => return PushOutcome { device_id: device.device_id.clone(), success: false, error_code: Some(e.to_string()) },
        };

        let url = format!("https://fcm.googleapis.com/v1/projects/{}/messages:send", self.project_id);
        let body = serde_json::json!({
            "message": {
                "token": device.push_token,
                "notification": { "title": payload.title, "body": payload.body },
                "data": payload.data,
            }
        });

        match self.client.post(&url).bearer_auth(token).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                PushOutcome { device_id: device.device_id.clone(), success: true, error_code: None }
            }
            Ok(resp) => {
                PushOutcome { device_id: device.device_id.clone(), success: false, error_code: Some(resp.status().to_string()) }
            }
            Err(e) => PushOutcome { device_id: device.device_id.clone(), success: false, error_code: Some(e.to_string()) },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Platform;

    fn ctx() -> DispatchContext {
        DispatchContext {
            sighting_id: Uuid::new_v4(),
            ring_km: 5.0,
            level: AlertLevel::Urgent,
            witness_count: 3,
            submitter_device_id: "reporter".to_string(),
            title: "⚡ UFO Sighting — nearby".to_string(),
            body: "Multiple witnesses (3) — 2.1 km away".to_string(),
            latitude: 47.6,
            longitude: -122.3,
            location_name: None,
        }
    }

    fn device(lat: Option<f64>, lon: Option<f64>) -> DirectoryEntry {
        DirectoryEntry {
            device_id: "recipient".to_string(),
            push_token: "tok".to_string(),
            platform: Platform::Android,
            lat,
            lon,
            distance_km: 2.1,
        }
    }

    #[test]
    fn payload_includes_required_keys() {
        let payload = build_payload(&ctx(), &device(Some(47.601), Some(-122.301))).unwrap();
        for key in ["type", "sighting_id", "alert_level", "witness_count", "timestamp", "action", "submitter_device_id"] {
            assert!(payload.data.contains_key(key), "missing {key}");
        }
        assert_eq!(payload.data["type"], "sighting_alert");
        assert_eq!(payload.data["action"], "open_compass");
    }

    #[test]
    fn payload_includes_bearing_only_when_device_location_known() {
        let with_location = build_payload(&ctx(), &device(Some(47.601), Some(-122.301))).unwrap();
        assert!(with_location.data.contains_key("bearing"));

        let without_location = build_payload(&ctx(), &device(None, None)).unwrap();
        assert!(!without_location.data.contains_key("bearing"));
    }

    #[tokio::test]
    async fn null_dispatcher_records_every_send() {
        let dispatcher = NullDispatcher::new();
        let payload = build_payload(&ctx(), &device(Some(47.6), Some(-122.3))).unwrap();
        let outcome = dispatcher.send(&device(Some(47.6), Some(-122.3)), &payload).await;
        assert!(outcome.success);
        assert_eq!(dispatcher.sent_count(), 1);
    }
}
