//! Enrichment orchestrator (§4.H): runs a fixed panel of processors in
//! priority order, batching at most M concurrent, without letting one
//! processor's timeout or unavailability block its siblings. Every
//! processor's outcome — run-and-succeeded, run-and-failed, or
//! not-run — is written back under its own name.

pub mod celestial;
pub mod content_filter;
pub mod geocoding;
pub mod plane_match;
pub mod satellite;
pub mod weather;

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde_json::Value as Json;
use uuid::Uuid;

use crate::config::Config;

/// Everything a processor needs to enrich one sighting.
#[derive(Debug, Clone)]
pub struct EnrichmentContext {
    pub sighting_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub azimuth_deg: Option<f64>,
    pub pitch_deg: Option<f64>,
    pub roll_deg: Option<f64>,
    pub category: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProcessorOutcome {
    pub success: bool,
    pub data: Option<Json>,
    pub error: Option<String>,
    pub processing_time_ms: i64,
    pub confidence: Option<f64>,
    pub metadata: Option<Json>,
}

impl ProcessorOutcome {
    pub fn ok(data: Json, processing_time_ms: i64, confidence: Option<f64>) -> Self {
        Self { success: true, data: Some(data), error: None, processing_time_ms, confidence, metadata: None }
    }

    pub fn failed(error: impl Into<String>, processing_time_ms: i64) -> Self {
        Self { success: false, data: None, error: Some(error.into()), processing_time_ms, confidence: None, metadata: None }
    }

    fn unavailable() -> Self {
        Self { success: false, data: None, error: Some("unavailable".to_string()), processing_time_ms: 0, confidence: None, metadata: None }
    }

    fn timeout() -> Self {
        Self { success: false, data: None, error: Some("timeout".to_string()), processing_time_ms: 0, confidence: None, metadata: None }
    }
}

#[async_trait]
pub trait EnrichmentProcessor: Send + Sync {
    fn name(&self) -> &str;
    fn priority(&self) -> u8;
    fn timeout_seconds(&self) -> u64;
    async fn is_available(&self) -> bool;
    async fn process(&self, ctx: &EnrichmentContext) -> ProcessorOutcome;
}

/// A TTL-bounded cache shared by processors that quantise their inputs
/// to a cache key (location rounded to 3 decimals, timestamp to the hour,
/// etc). A thin alias over `moka`'s async cache — each processor owns one
/// sized and timed to its own data's staleness.
pub type TtlCache<K, V> = moka::future::Cache<K, V>;

pub fn new_ttl_cache<K, V>(ttl: StdDuration, max_capacity: u64) -> TtlCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    moka::future::Cache::builder().max_capacity(max_capacity).time_to_live(ttl).build()
}

async fn run_one(processor: Arc<dyn EnrichmentProcessor>, ctx: EnrichmentContext) -> (String, ProcessorOutcome) {
    let name = processor.name().to_string();
    if !processor.is_available().await {
        return (name, ProcessorOutcome::unavailable());
    }

    let deadline = StdDuration::from_secs(processor.timeout_seconds());
    match tokio::time::timeout(deadline, async move { processor.process(&ctx).await }).await {
        Ok(outcome) => (name, outcome),
        Err(_) => (name, ProcessorOutcome::timeout()),
    }
}

/// Runs the configured processor panel, ascending by priority, in batches
/// of at most `concurrency` at a time. Unavailable processors resolve
/// immediately without occupying a batch slot's wall-clock budget.
pub struct EnrichmentOrchestrator {
    processors: Vec<Arc<dyn EnrichmentProcessor>>,
    concurrency: usize,
}

impl EnrichmentOrchestrator {
    pub fn new(mut processors: Vec<Arc<dyn EnrichmentProcessor>>, config: &Config) -> Self {
        processors.sort_by_key(|p| p.priority());
        Self { processors, concurrency: config.enrichment_concurrency.max(1) }
    }

    pub async fn run(&self, ctx: &EnrichmentContext) -> Vec<(String, ProcessorOutcome)> {
        let mut results = Vec::with_capacity(self.processors.len());
        for batch in self.processors.chunks(self.concurrency) {
            let futures = batch.iter().map(|p| run_one(p.clone(), ctx.clone()));
            results.extend(join_all(futures).await);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyProcessor {
        name: &'static str,
        priority: u8,
        available: bool,
        delay_ms: u64,
        timeout_s: u64,
        concurrent_gauge: Arc<AtomicUsize>,
        max_concurrent: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EnrichmentProcessor for FlakyProcessor {
        fn name(&self) -> &str {
            self.name
        }
        fn priority(&self) -> u8 {
            self.priority
        }
        fn timeout_seconds(&self) -> u64 {
            self.timeout_s
        }
        async fn is_available(&self) -> bool {
            self.available
        }
        async fn process(&self, _ctx: &EnrichmentContext) -> ProcessorOutcome {
            let now = self.concurrent_gauge.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(StdDuration::from_millis(self.delay_ms)).await;
            self.concurrent_gauge.fetch_sub(1, Ordering::SeqCst);
            ProcessorOutcome::ok(serde_json::json!({"ok": true}), self.delay_ms as i64, Some(0.9))
        }
    }

    fn ctx() -> EnrichmentContext {
        EnrichmentContext {
            sighting_id: Uuid::new_v4(),
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
        }
    }

    #[tokio::test]
    async fn unavailable_processor_yields_unavailable_without_running() {
        let gauge = Arc::new(AtomicUsize::new(0));
        let max = Arc::new(AtomicUsize::new(0));
        let processors: Vec<Arc<dyn EnrichmentProcessor>> = vec![Arc::new(FlakyProcessor {
            name: "unavailable_proc",
            priority: 1,
            available: false,
            delay_ms: 0,
            timeout_s: 5,
            concurrent_gauge: gauge,
            max_concurrent: max,
        })];
        let orchestrator = EnrichmentOrchestrator::new(processors, &Config::default());
        let results = orchestrator.run(&ctx()).await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].1.success);
        assert_eq!(results[0].1.error.as_deref(), Some("unavailable"));
    }

    #[tokio::test]
    async fn slow_processor_times_out_without_cancelling_siblings() {
        let gauge = Arc::new(AtomicUsize::new(0));
        let max = Arc::new(AtomicUsize::new(0));
        let processors: Vec<Arc<dyn EnrichmentProcessor>> = vec![
            Arc::new(FlakyProcessor {
                name: "slow",
                priority: 1,
                available: true,
                delay_ms: 50,
                timeout_s: 0,
                concurrent_gauge: gauge.clone(),
                max_concurrent: max.clone(),
            }),
            Arc::new(FlakyProcessor {
                name: "fast",
                priority: 1,
                available: true,
                delay_ms: 1,
                timeout_s: 5,
                concurrent_gauge: gauge,
                max_concurrent: max,
            }),
        ];
        let orchestrator = EnrichmentOrchestrator::new(processors, &Config::default());
        let results = orchestrator.run(&ctx()).await;
        let slow = results.iter().find(|(n, _)| n == "slow").unwrap();
        let fast = results.iter().find(|(n, _)| n == "fast").unwrap();
        assert_eq!(slow.1.error.as_deref(), Some("timeout"));
        assert!(fast.1.success);
    }

    #[tokio::test]
    async fn batches_respect_concurrency_limit() {
        let gauge = Arc::new(AtomicUsize::new(0));
        let max = Arc::new(AtomicUsize::new(0));
        let mut config = Config::default();
        config.enrichment_concurrency = 2;
        let processors: Vec<Arc<dyn EnrichmentProcessor>> = (0..5)
            .map(|i| {
                Arc::new(FlakyProcessor {
                    name: Box::leak(format!("p{i}").into_boxed_str()),
                    priority: 1,
                    available: true,
                    delay_ms: 20,
                    timeout_s: 5,
                    concurrent_gauge: gauge.clone(),
                    max_concurrent: max.clone(),
                }) as Arc<dyn EnrichmentProcessor>
            })
            .collect();
        let orchestrator = EnrichmentOrchestrator::new(processors, &config);
        let results = orchestrator.run(&ctx()).await;
        assert_eq!(results.len(), 5);
        assert!(max.load(Ordering::SeqCst) <= 2);
    }
}
