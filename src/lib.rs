//! soar-beep — real-time sighting-alert backend: ingest a beep, jitter the
//! reporter's location for privacy, fan out push alerts in expanding rings,
//! enrich the sighting in the background, and aggregate witness
//! confirmations into a triangulated, confidence-scored consensus.

pub mod aircraft_match;
pub mod alert_service;
pub mod config;
pub mod device_directory;
pub mod dto;
pub mod enrichment;
pub mod error;
pub mod fanout;
pub mod geo;
pub mod jitter;
pub mod models;
pub mod notifications;
pub mod persistence;
pub mod postgis_functions;
pub mod push;
pub mod rate_limit;
pub mod schema;
pub mod witness;
