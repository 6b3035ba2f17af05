//! Component-scoped error taxonomy for the alert core.
//!
//! Each variant corresponds to one of the error kinds named in the design
//! (input validation, missing entities, rate/window/range guards, upstream
//! and timeout failures, and backend availability). Call sites attach
//! context rather than wrapping opaquely, so a caller can match on kind.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Malformed or out-of-range input (coordinates, azimuth, etc).
    InputError(String),
    /// An addressable entity (sighting, device, witness) could not be found.
    NotFound(String),
    /// Unique constraint violation for `(sighting_id, device_id)`.
    DuplicateWitness { sighting_id: String, device_id: String },
    /// Per-device or global rate gate tripped.
    RateLimited { reason: String },
    /// The witness confirmation window has closed.
    WindowClosed { remaining_seconds: i64 },
    /// Witness location too far from the sighting.
    OutOfRangeWitness { distance_km: f64, limit_km: f64 },
    /// A remote provider (weather, geocoding, aircraft, push) failed.
    Upstream { provider: String, retriable: bool, detail: String },
    /// A bounded operation exceeded its deadline.
    Timeout { component: String },
    /// The persistence backend is temporarily unavailable; retriable by the caller.
    TransientBackend(String),
    /// Push credentials are missing or invalid; fatal for the current dispatch only.
    DispatchUnavailable(String),
    /// Two rows raced to insert the same unique key; caller should not retry as new.
    Conflict(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::InputError(msg) => write!(f, "invalid input: {msg}"),
            CoreError::NotFound(what) => write!(f, "not found: {what}"),
            CoreError::DuplicateWitness { sighting_id, device_id } => write!(
                f,
                "device {device_id} already witnessed sighting {sighting_id}"
            ),
            CoreError::RateLimited { reason } => write!(f, "rate limited: {reason}"),
            CoreError::WindowClosed { remaining_seconds } => write!(
                f,
                "witness window closed {} seconds ago",
                -remaining_seconds
            ),
            CoreError::OutOfRangeWitness { distance_km, limit_km } => write!(
                f,
                "witness is {distance_km:.1} km away, exceeding the {limit_km:.1} km limit"
            ),
            CoreError::Upstream { provider, retriable, detail } => write!(
                f,
                "upstream provider {provider} failed ({detail}), retriable={retriable}"
            ),
            CoreError::Timeout { component } => write!(f, "{component} timed out"),
            CoreError::TransientBackend(detail) => write!(f, "backend temporarily unavailable: {detail}"),
            CoreError::DispatchUnavailable(detail) => write!(f, "dispatch unavailable: {detail}"),
            CoreError::Conflict(detail) => write!(f, "conflict: {detail}"),
        }
    }
}

impl std::error::Error for CoreError {}

pub type CoreResult<T> = Result<T, CoreError>;
