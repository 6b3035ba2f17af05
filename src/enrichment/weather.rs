//! Weather processor (§4.I): current conditions at a sighting's location
//! and time, via Open-Meteo (no API key required).

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::config::Config;

use super::{new_ttl_cache, EnrichmentContext, EnrichmentProcessor, ProcessorOutcome, TtlCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherCondition {
    Clear,
    Cloudy,
    Rain,
    Snow,
    Thunderstorm,
    Atmosphere,
    Drizzle,
    Unknown,
}

impl WeatherCondition {
    /// WMO weather code (as returned by Open-Meteo's `weathercode` field).
    fn from_wmo_code(code: u32) -> Self {
        match code {
            0 | 1 => WeatherCondition::Clear,
            2 | 3 => WeatherCondition::Cloudy,
            45 | 48 => WeatherCondition::Atmosphere,
            51..=55 => WeatherCondition::Drizzle,
            56 | 57 | 61..=67 | 80..=82 => WeatherCondition::Rain,
            71..=77 | 85 | 86 => WeatherCondition::Snow,
            95..=99 => WeatherCondition::Thunderstorm,
            _ => WeatherCondition::Unknown,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            WeatherCondition::Clear => "clear",
            WeatherCondition::Cloudy => "cloudy",
            WeatherCondition::Rain => "rain",
            WeatherCondition::Snow => "snow",
            WeatherCondition::Thunderstorm => "thunderstorm",
            WeatherCondition::Atmosphere => "atmosphere",
            WeatherCondition::Drizzle => "drizzle",
            WeatherCondition::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone)]
pub struct WeatherData {
    pub temperature_c: f64,
    pub feels_like_c: f64,
    pub humidity_percent: f64,
    pub pressure_hpa: f64,
    pub wind_speed_ms: f64,
    pub wind_direction_deg: f64,
    pub visibility_km: f64,
    pub cloud_cover_percent: f64,
    pub weather_condition: WeatherCondition,
    pub sunrise_unix: Option<i64>,
    pub sunset_unix: Option<i64>,
}

impl WeatherData {
    fn to_json(&self) -> serde_json::Value {
        json!({
            "temperature_c": self.temperature_c,
            "feels_like_c": self.feels_like_c,
            "humidity_percent": self.humidity_percent,
            "pressure_hpa": self.pressure_hpa,
            "wind_speed_ms": self.wind_speed_ms,
            "wind_direction_deg": self.wind_direction_deg,
            "visibility_km": self.visibility_km,
            "cloud_cover_percent": self.cloud_cover_percent,
            "weather_condition": self.weather_condition.as_str(),
            "sunrise_unix": self.sunrise_unix,
            "sunset_unix": self.sunset_unix,
        })
    }
}

#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn fetch(&self, lat: f64, lon: f64) -> anyhow::Result<WeatherData>;
}

#[derive(Deserialize)]
struct OpenMeteoResponse {
    current: OpenMeteoCurrent,
    daily: Option<OpenMeteoDaily>,
}

#[derive(Deserialize)]
struct OpenMeteoCurrent {
    temperature_2m: f64,
    apparent_temperature: f64,
    relative_humidity_2m: f64,
    surface_pressure: f64,
    wind_speed_10m: f64,
    wind_direction_10m: f64,
    visibility: Option<f64>,
    cloud_cover: f64,
    weather_code: u32,
}

#[derive(Deserialize)]
struct OpenMeteoDaily {
    sunrise: Vec<String>,
    sunset: Vec<String>,
}

pub struct OpenMeteoSource {
    client: reqwest::Client,
}

impl OpenMeteoSource {
    pub fn new(timeout: StdDuration) -> Self {
        Self { client: reqwest::Client::builder().timeout(timeout).build().unwrap_or_default() }
    }
}

#[async_trait]
impl WeatherSource for OpenMeteoSource {
    async fn fetch(&self, lat: f64, lon: f64) -> anyhow::Result<WeatherData> {
        let url = format!(
            "https://api.open-meteo.com/v1/forecast?latitude={lat}&longitude={lon}&current=temperature_2m,apparent_temperature,relative_humidity_2m,surface_pressure,wind_speed_10m,wind_direction_10m,visibility,cloud_cover,weather_code&daily=sunrise,sunset&timezone=UTC"
        );
        let response = self.client.get(&url).send().await?;
        let body: OpenMeteoResponse = response.json().await?;

        let (sunrise_unix, sunset_unix) = body
            .daily
            .as_ref()
            .and_then(|d| d.sunrise.first().zip(d.sunset.first()))
            .map(|(sr, ss)| {
                let parse = |s: &str| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M").ok().map(|dt| dt.and_utc().timestamp());
                (parse(sr), parse(ss))
            })
            .unwrap_or((None, None));

        Ok(WeatherData {
            temperature_c: body.current.temperature_2m,
            feels_like_c: body.current.apparent_temperature,
            humidity_percent: body.current.relative_humidity_2m,
            pressure_hpa: body.current.surface_pressure,
            wind_speed_ms: body.current.wind_speed_10m,
            wind_direction_deg: body.current.wind_direction_10m,
            visibility_km: body.current.visibility.unwrap_or(10_000.0) / 1000.0,
            cloud_cover_percent: body.current.cloud_cover,
            weather_condition: WeatherCondition::from_wmo_code(body.current.weather_code),
            sunrise_unix,
            sunset_unix,
        })
    }
}

fn quantize_key(lat: f64, lon: f64, timestamp: chrono::DateTime<Utc>) -> (i64, i64, i64) {
    let round = |v: f64| (v * 100.0).round() as i64;
    (round(lat), round(lon), timestamp.timestamp() / 3600)
}

pub struct WeatherProcessor<S: WeatherSource> {
    source: S,
    cache: TtlCache<(i64, i64, i64), WeatherData>,
    timeout_seconds: u64,
}

impl<S: WeatherSource> WeatherProcessor<S> {
    pub fn new(source: S, config: &Config) -> Self {
        Self {
            source,
            cache: new_ttl_cache(StdDuration::from_secs(600), 1000),
            timeout_seconds: config.weather_timeout_s,
        }
    }
}

#[async_trait]
impl<S: WeatherSource> EnrichmentProcessor for WeatherProcessor<S> {
    fn name(&self) -> &str {
        "weather"
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
        let key = quantize_key(ctx.latitude, ctx.longitude, ctx.timestamp);

        if let Some(cached) = self.cache.get(&key).await {
            let elapsed = (Utc::now() - started).num_milliseconds();
            return ProcessorOutcome::ok(cached.to_json(), elapsed, Some(0.9));
        }

        match self.source.fetch(ctx.latitude, ctx.longitude).await {
            Ok(data) => {
                self.cache.insert(key, data.clone()).await;
                let elapsed = (Utc::now() - started).num_milliseconds();
                ProcessorOutcome::ok(data.to_json(), elapsed, Some(0.9))
            }
            Err(e) => ProcessorOutcome::failed(e.to_string(), (Utc::now() - started).num_milliseconds()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wmo_codes_map_to_expected_conditions() {
        assert_eq!(WeatherCondition::from_wmo_code(0), WeatherCondition::Clear);
        assert_eq!(WeatherCondition::from_wmo_code(3), WeatherCondition::Cloudy);
        assert_eq!(WeatherCondition::from_wmo_code(61), WeatherCondition::Rain);
        assert_eq!(WeatherCondition::from_wmo_code(75), WeatherCondition::Snow);
        assert_eq!(WeatherCondition::from_wmo_code(95), WeatherCondition::Thunderstorm);
        assert_eq!(WeatherCondition::from_wmo_code(45), WeatherCondition::Atmosphere);
        assert_eq!(WeatherCondition::from_wmo_code(53), WeatherCondition::Drizzle);
        assert_eq!(WeatherCondition::from_wmo_code(9999), WeatherCondition::Unknown);
    }

    struct StaticSource(WeatherData);

    #[async_trait]
    impl WeatherSource for StaticSource {
        async fn fetch(&self, _lat: f64, _lon: f64) -> anyhow::Result<WeatherData> {
            Ok(self.0.clone())
        }
    }

    fn sample() -> WeatherData {
        WeatherData {
            temperature_c: 18.0,
            feels_like_c: 17.0,
            humidity_percent: 55.0,
            pressure_hpa: 1013.0,
            wind_speed_ms: 3.0,
            wind_direction_deg: 270.0,
            visibility_km: 16.0,
            cloud_cover_percent: 10.0,
            weather_condition: WeatherCondition::Clear,
            sunrise_unix: Some(1_700_000_000),
            sunset_unix: Some(1_700_040_000),
        }
    }

    #[tokio::test]
    async fn processor_reports_success_with_confidence() {
        let processor = WeatherProcessor::new(StaticSource(sample()), &Config::default());
        let ctx = EnrichmentContext {
            sighting_id: uuid::Uuid::new_v4(),
            latitude: 47.6,
            longitude: -122.3,
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
        assert_eq!(outcome.confidence, Some(0.9));
        assert_eq!(outcome.data.unwrap()["weather_condition"], "clear");
    }
}
