//! Runtime configuration, loaded from environment variables with the
//! defaults named in the design. Call [`Config::from_env`] once at startup
//! and pass the resulting value down instead of re-reading the environment
//! throughout the codebase.

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,

    // C: privacy jitterer
    pub jitter_min_m: f64,
    pub jitter_max_m: f64,

    // E/G: fan-out
    pub fanout_rings_km: Vec<f64>,
    pub device_result_cap: i64,
    pub fanout_rate_15min_cap: u32,
    pub emergency_override_witness_count: u32,

    // K: witness aggregator
    pub witness_window_minutes: i64,
    pub witness_rate_per_hour: u32,
    pub max_confirm_km: f64,

    // H: enrichment orchestrator
    pub enrichment_concurrency: usize,
    pub weather_timeout_s: u64,
    pub geocoding_timeout_s: u64,
    pub celestial_timeout_s: u64,
    pub satellite_timeout_s: u64,
    pub content_timeout_s: u64,
    pub aircraft_timeout_s: u64,

    // J: aircraft-match analyser
    pub aircraft_radius_km: f64,
    pub aircraft_radius_hard_cap_km: f64,
    pub aircraft_tolerance_deg: f64,
    pub aircraft_time_quant_s: i64,
    pub aircraft_cache_ttl_s: u64,

    // push
    pub fcm_project_id: Option<String>,
    pub fcm_service_account_json_path: Option<String>,
    pub google_maps_api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/soar_beep".to_string()),

            jitter_min_m: env_f64("JITTER_MIN_M", 100.0),
            jitter_max_m: env_f64("JITTER_MAX_M", 300.0),

            fanout_rings_km: std::env::var("FANOUT_RINGS_KM")
                .ok()
                .map(|v| v.split(',').filter_map(|p| p.trim().parse().ok()).collect())
                .filter(|v: &Vec<f64>| !v.is_empty())
                .unwrap_or_else(|| vec![1.0, 5.0, 10.0, 25.0]),
            device_result_cap: env_i64("DEVICE_RESULT_CAP", 1000),
            fanout_rate_15min_cap: env_u32("FANOUT_RATE_15MIN_CAP", 3),
            emergency_override_witness_count: env_u32("EMERGENCY_OVERRIDE_WITNESS_COUNT", 10),

            witness_window_minutes: env_i64("WITNESS_WINDOW_MINUTES", 60),
            witness_rate_per_hour: env_u32("WITNESS_RATE_PER_HOUR", 5),
            max_confirm_km: env_f64("MAX_CONFIRM_KM", 50.0),

            enrichment_concurrency: env_u32("ENRICHMENT_CONCURRENCY", 3) as usize,
            weather_timeout_s: env_u32("WEATHER_TIMEOUT_S", 10) as u64,
            geocoding_timeout_s: env_u32("GEOCODING_TIMEOUT_S", 8) as u64,
            celestial_timeout_s: env_u32("CELESTIAL_TIMEOUT_S", 15) as u64,
            satellite_timeout_s: env_u32("SATELLITE_TIMEOUT_S", 20) as u64,
            content_timeout_s: env_u32("CONTENT_TIMEOUT_S", 30) as u64,
            aircraft_timeout_s: env_u32("AIRCRAFT_TIMEOUT_S", 15) as u64,

            aircraft_radius_km: env_f64("AIRCRAFT_RADIUS_KM", 50.0),
            aircraft_radius_hard_cap_km: env_f64("AIRCRAFT_RADIUS_HARD_CAP_KM", 80.0),
            aircraft_tolerance_deg: env_f64("AIRCRAFT_TOLERANCE_DEG", 2.5),
            aircraft_time_quant_s: env_i64("AIRCRAFT_TIME_QUANT_S", 5),
            aircraft_cache_ttl_s: env_u32("AIRCRAFT_CACHE_TTL_S", 10) as u64,

            fcm_project_id: std::env::var("FCM_PROJECT_ID").ok(),
            fcm_service_account_json_path: std::env::var("FCM_SERVICE_ACCOUNT_JSON").ok(),
            google_maps_api_key: std::env::var("GOOGLE_MAPS_API_KEY").ok(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        // Safe defaults for tests; no environment variables required.
        Config {
            database_url: "postgres://localhost/soar_beep_test".to_string(),
            jitter_min_m: 100.0,
            jitter_max_m: 300.0,
            fanout_rings_km: vec![1.0, 5.0, 10.0, 25.0],
            device_result_cap: 1000,
            fanout_rate_15min_cap: 3,
            emergency_override_witness_count: 10,
            witness_window_minutes: 60,
            witness_rate_per_hour: 5,
            max_confirm_km: 50.0,
            enrichment_concurrency: 3,
            weather_timeout_s: 10,
            geocoding_timeout_s: 8,
            celestial_timeout_s: 15,
            satellite_timeout_s: 20,
            content_timeout_s: 30,
            aircraft_timeout_s: 15,
            aircraft_radius_km: 50.0,
            aircraft_radius_hard_cap_km: 80.0,
            aircraft_tolerance_deg: 2.5,
            aircraft_time_quant_s: 5,
            aircraft_cache_ttl_s: 10,
            fcm_project_id: None,
            fcm_service_account_json_path: None,
            google_maps_api_key: None,
        }
    }
}
