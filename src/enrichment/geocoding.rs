//! Reverse-geocoding processor (§4.I): turns a sighting's coordinates into a
//! human-readable place name, Nominatim-primary with an optional Google
//! Maps fallback when `GOOGLE_MAPS_API_KEY` is configured.

use std::env;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Utc;
use google_maps::Client as GoogleMapsClient;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::Config;

use super::{new_ttl_cache, EnrichmentContext, EnrichmentProcessor, ProcessorOutcome, TtlCache};

#[derive(Debug, Clone)]
pub struct GeocodingResult {
    pub location_name: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub formatted_address: String,
}

impl GeocodingResult {
    fn to_json(&self) -> serde_json::Value {
        json!({
            "location_name": self.location_name,
            "city": self.city,
            "state": self.state,
            "country": self.country,
            "country_code": self.country_code,
            "formatted_address": self.formatted_address,
        })
    }
}

/// Assembles the display name per §4.I: "City, State" for US addresses,
/// "City, Country" otherwise, falling back to country alone, then to a
/// fixed placeholder.
fn location_name(city: Option<&str>, state: Option<&str>, country: Option<&str>, country_code: Option<&str>) -> String {
    let is_us = country_code.map(|c| c.eq_ignore_ascii_case("us")).unwrap_or(false);
    match (city, state, country) {
        (Some(city), Some(state), _) if is_us => format!("{city}, {state}"),
        (Some(city), _, Some(country)) => format!("{city}, {country}"),
        (Some(city), Some(state), None) => format!("{city}, {state}"),
        (None, _, Some(country)) => country.to_string(),
        _ => "Unknown Location".to_string(),
    }
}

#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn reverse(&self, lat: f64, lon: f64) -> anyhow::Result<GeocodingResult>;
}

#[derive(Debug, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    hamlet: Option<String>,
    state: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NominatimReverseResponse {
    display_name: String,
    #[serde(default)]
    address: Option<NominatimAddress>,
}

pub struct Geocoder {
    client: reqwest::Client,
    google_maps_client: Option<GoogleMapsClient>,
}

impl Geocoder {
    pub fn new(timeout: StdDuration) -> Self {
        let client = reqwest::Client::builder().timeout(timeout).build().unwrap_or_default();

        let google_maps_client = env::var("GOOGLE_MAPS_API_KEY").ok().filter(|k| !k.trim().is_empty()).and_then(|key| {
            GoogleMapsClient::try_new(&key)
                .inspect_err(|e| warn!("failed to create Google Maps client: {e}"))
                .ok()
        });

        Self { client, google_maps_client }
    }

    async fn reverse_with_nominatim(&self, lat: f64, lon: f64) -> anyhow::Result<GeocodingResult> {
        let response = self
            .client
            .get("https://nominatim.openstreetmap.org/reverse")
            .query(&[("lat", lat.to_string()), ("lon", lon.to_string()), ("format", "json".to_string()), ("addressdetails", "1".to_string())])
            .header("User-Agent", "soar-beep reverse geocoder/1.0")
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("Nominatim reverse geocoding failed with status: {}", response.status());
        }

        let body: NominatimReverseResponse = response.json().await?;
        let address = body.address.unwrap_or(NominatimAddress { city: None, town: None, village: None, hamlet: None, state: None, country: None, country_code: None });
        let city = address.city.or(address.town).or(address.village).or(address.hamlet);

        Ok(GeocodingResult {
            location_name: location_name(city.as_deref(), address.state.as_deref(), address.country.as_deref(), address.country_code.as_deref()),
            city,
            state: address.state,
            country: address.country,
            country_code: address.country_code,
            formatted_address: body.display_name,
        })
    }

    async fn reverse_with_google_maps(&self, lat: f64, lon: f64) -> anyhow::Result<GeocodingResult> {
        let google_client = self.google_maps_client.as_ref().ok_or_else(|| anyhow::anyhow!("Google Maps client not available"))?;
        let latlng = google_maps::LatLng::try_from_f64(lat, lon).map_err(|e| anyhow::anyhow!("invalid coordinates for Google Maps: {e}"))?;
        let response = google_client.reverse_geocoding(latlng).execute().await.map_err(|e| anyhow::anyhow!("Google Maps reverse geocoding failed: {e}"))?;

        let result = response.results.first().ok_or_else(|| anyhow::anyhow!("no Google Maps reverse geocoding results"))?;

        // Google's address_components array is parsed loosely here — the
        // formatted_address is the only field the panel actually depends on.
        Ok(GeocodingResult {
            location_name: result.formatted_address.clone(),
            city: None,
            state: None,
            country: None,
            country_code: None,
            formatted_address: result.formatted_address.clone(),
        })
    }
}

#[async_trait]
impl ReverseGeocoder for Geocoder {
    async fn reverse(&self, lat: f64, lon: f64) -> anyhow::Result<GeocodingResult> {
        match self.reverse_with_nominatim(lat, lon).await {
            Ok(result) => Ok(result),
            Err(nominatim_error) => {
                if self.google_maps_client.is_some() {
                    debug!("Nominatim reverse geocoding failed ({nominatim_error}), trying Google Maps fallback");
                    self.reverse_with_google_maps(lat, lon).await
                } else {
                    Err(nominatim_error)
                }
            }
        }
    }
}

fn cache_key(lat: f64, lon: f64) -> (i64, i64) {
    let round = |v: f64| (v * 1000.0).round() as i64;
    (round(lat), round(lon))
}

pub struct GeocodingProcessor<R: ReverseGeocoder> {
    geocoder: R,
    cache: TtlCache<(i64, i64), GeocodingResult>,
    timeout_seconds: u64,
}

impl<R: ReverseGeocoder> GeocodingProcessor<R> {
    pub fn new(geocoder: R, config: &Config) -> Self {
        Self { geocoder, cache: new_ttl_cache(StdDuration::from_secs(3600), 2000), timeout_seconds: config.geocoding_timeout_s }
    }
}

#[async_trait]
impl<R: ReverseGeocoder> EnrichmentProcessor for GeocodingProcessor<R> {
    fn name(&self) -> &str {
        "geocoding"
    }

    fn priority(&self) -> u8 {
        1
    }

    fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn process(&self, ctx: &EnrichmentContext) -> ProcessorOutcome {
        let started = Utc::now();
        let key = cache_key(ctx.latitude, ctx.longitude);

        if let Some(cached) = self.cache.get(&key).await {
            return ProcessorOutcome::ok(cached.to_json(), (Utc::now() - started).num_milliseconds(), Some(0.85));
        }

        match self.geocoder.reverse(ctx.latitude, ctx.longitude).await {
            Ok(result) => {
                self.cache.insert(key, result.clone()).await;
                ProcessorOutcome::ok(result.to_json(), (Utc::now() - started).num_milliseconds(), Some(0.85))
            }
            Err(e) => ProcessorOutcome::failed(e.to_string(), (Utc::now() - started).num_milliseconds()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_name_prefers_city_state_for_us() {
        assert_eq!(location_name(Some("Seattle"), Some("Washington"), Some("United States"), Some("us")), "Seattle, Washington");
    }

    #[test]
    fn location_name_uses_city_country_outside_us() {
        assert_eq!(location_name(Some("Paris"), Some("Ile-de-France"), Some("France"), Some("fr")), "Paris, France");
    }

    #[test]
    fn location_name_falls_back_to_country_then_placeholder() {
        assert_eq!(location_name(None, None, Some("Atlantis"), None), "Atlantis");
        assert_eq!(location_name(None, None, None, None), "Unknown Location");
    }

    struct StaticGeocoder(GeocodingResult);

    #[async_trait]
    impl ReverseGeocoder for StaticGeocoder {
        async fn reverse(&self, _lat: f64, _lon: f64) -> anyhow::Result<GeocodingResult> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn processor_caches_and_reports_confidence() {
        let result = GeocodingResult {
            location_name: "Seattle, Washington".to_string(),
            city: Some("Seattle".to_string()),
            state: Some("Washington".to_string()),
            country: Some("United States".to_string()),
            country_code: Some("us".to_string()),
            formatted_address: "Seattle, WA, USA".to_string(),
        };
        let processor = GeocodingProcessor::new(StaticGeocoder(result), &Config::default());
        let ctx = EnrichmentContext {
            sighting_id: uuid::Uuid::new_v4(),
            latitude: 47.6062,
            longitude: -122.3321,
            altitude_m: None,
            timestamp: Utc::now(),
            azimuth_deg: None,
            pitch_deg: None,
            roll_deg: None,
            category: "ufo".to_string(),
            title: None,
            description: None,
        };
        let outcome = processor.process(&ctx).await;
        assert!(outcome.success);
        assert_eq!(outcome.data.unwrap()["location_name"], "Seattle, Washington");
    }
}
