//! Production entry point: wires the Postgres-backed gateway, the FCM
//! dispatcher (falling back to a no-op dispatcher when unconfigured), the
//! live enrichment panel, and the aircraft-match feed into an
//! [`alert_service::AlertService`], then holds the process open. The HTTP
//! adapter that would front this lives outside this crate's scope.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;

use soar_beep::aircraft_match::{AircraftMatcher, OpenSkyFeed};
use soar_beep::alert_service::AlertService;
use soar_beep::config::Config;
use soar_beep::device_directory::DirectoryEntry;
use soar_beep::enrichment::celestial::CelestialProcessor;
use soar_beep::enrichment::content_filter::ContentFilterProcessor;
use soar_beep::enrichment::geocoding::{Geocoder, GeocodingProcessor};
use soar_beep::enrichment::plane_match::PlaneMatchProcessor;
use soar_beep::enrichment::satellite::{CelestrakSource, SatelliteProcessor};
use soar_beep::enrichment::weather::{OpenMeteoSource, WeatherProcessor};
use soar_beep::enrichment::{EnrichmentOrchestrator, EnrichmentProcessor};
use soar_beep::fanout::FanoutEngine;
use soar_beep::persistence::PgGateway;
use soar_beep::push::{FcmDispatcher, NullDispatcher, PushDispatcher, PushOutcome, PushPayload};
use soar_beep::rate_limit::{FanoutRateGate, SlidingWindowGate};
use soar_beep::witness::WitnessValidator;

/// Picks between a real FCM dispatcher and a no-op one at startup, so
/// `FanoutEngine` can stay generic over a single concrete dispatcher type.
enum RuntimeDispatcher {
    Fcm(FcmDispatcher),
    NoOp(NullDispatcher),
}

#[async_trait]
impl PushDispatcher for RuntimeDispatcher {
    async fn send(&self, device: &DirectoryEntry, payload: &PushPayload) -> PushOutcome {
        match self {
            RuntimeDispatcher::Fcm(d) => d.send(device, payload).await,
            RuntimeDispatcher::NoOp(d) => d.send(device, payload).await,
        }
    }
}

fn build_enrichment_panel(config: &Config) -> EnrichmentOrchestrator {
    let weather = WeatherProcessor::new(OpenMeteoSource::new(StdDuration::from_secs(config.weather_timeout_s)), config);
    let geocoding = GeocodingProcessor::new(Geocoder::new(StdDuration::from_secs(config.geocoding_timeout_s)), config);
    let satellite = SatelliteProcessor::new(CelestrakSource::new(StdDuration::from_secs(config.satellite_timeout_s)), config);
    let aircraft_feed = Arc::new(OpenSkyFeed::new(StdDuration::from_secs(config.aircraft_timeout_s)));
    let matcher = Arc::new(AircraftMatcher::new(aircraft_feed, config.clone()));
    let plane_match = PlaneMatchProcessor::new(matcher, config);

    let processors: Vec<Arc<dyn EnrichmentProcessor>> = vec![
        Arc::new(weather),
        Arc::new(geocoding),
        Arc::new(CelestialProcessor),
        Arc::new(satellite),
        Arc::new(plane_match),
        Arc::new(ContentFilterProcessor),
    ];
    EnrichmentOrchestrator::new(processors, config)
}

async fn build_dispatcher(config: &Config) -> RuntimeDispatcher {
    if let (Some(project_id), Some(path)) = (&config.fcm_project_id, &config.fcm_service_account_json_path) {
        match std::fs::read_to_string(path) {
            Ok(json) => match FcmDispatcher::from_service_account_json(project_id.clone(), &json) {
                Ok(dispatcher) => {
                    tracing::info!(project_id, "using FCM push dispatcher");
                    return RuntimeDispatcher::Fcm(dispatcher);
                }
                Err(e) => tracing::warn!(%e, "failed to build FCM dispatcher, falling back to no-op"),
            },
            Err(e) => tracing::warn!(%e, path, "failed to read FCM service account json, falling back to no-op"),
        }
    } else {
        tracing::info!("FCM not configured, using no-op dispatcher");
    }
    RuntimeDispatcher::NoOp(NullDispatcher::new())
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();
    tracing::info!("soar-beep starting");

    let config = Config::from_env();

    let manager = ConnectionManager::<PgConnection>::new(&config.database_url);
    let pool = match Pool::builder().build(manager) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(%e, "failed to build database connection pool");
            std::process::exit(1);
        }
    };
    let gateway = Arc::new(PgGateway::new(pool));

    let dispatcher = Arc::new(build_dispatcher(&config).await);
    let fanout_rate_gate = FanoutRateGate::new();
    let fanout = FanoutEngine::new(gateway.clone(), dispatcher, fanout_rate_gate, config.clone());

    let enrichment = Arc::new(build_enrichment_panel(&config));

    let witness_window = chrono::Duration::minutes(config.witness_window_minutes);
    let witness_validator = WitnessValidator::new(gateway.clone(), SlidingWindowGate::new(witness_window), config.clone());

    let _service: AlertService<PgGateway, RuntimeDispatcher> =
        AlertService::new(gateway, fanout, enrichment, witness_validator, config);

    tracing::info!("soar-beep wired and ready");
    std::future::pending::<()>().await;
}
