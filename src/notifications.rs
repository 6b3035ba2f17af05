//! Notification text templates (§6): ring-aware titles, witness-aware
//! bodies, and the emoji/urgency prefix selected by `AlertLevel`.

use crate::models::AlertLevel;

/// Ring-aware proximity descriptor used in both title and body.
fn proximity_descriptor(ring_km: f64) -> &'static str {
    if ring_km <= 1.0 {
        "VERY CLOSE"
    } else if ring_km <= 5.0 {
        "nearby"
    } else if ring_km <= 10.0 {
        "in your area"
    } else {
        "within range"
    }
}

fn within_n_km(ring_km: f64) -> String {
    format!("within {:.0}km", ring_km)
}

/// Title template: emoji-prefixed, ring-aware.
pub fn alert_title(level: AlertLevel, ring_km: f64) -> String {
    let prefix = match level {
        AlertLevel::Emergency => "🚨 UFO EMERGENCY",
        AlertLevel::Urgent => "⚡ UFO Sighting",
        AlertLevel::Normal | AlertLevel::Low => "👁 UFO Alert",
    };
    let descriptor = if ring_km <= 10.0 { proximity_descriptor(ring_km).to_string() } else { within_n_km(ring_km) };
    format!("{prefix} — {descriptor}")
}

/// Witness-count descriptor used at the front of the body.
fn witness_descriptor(witness_count: i32) -> String {
    if witness_count >= 10 {
        format!("MASS SIGHTING — {witness_count} witnesses")
    } else if witness_count >= 3 {
        format!("Multiple witnesses ({witness_count})")
    } else if witness_count == 2 {
        "2nd witness".to_string()
    } else {
        "New sighting".to_string()
    }
}

/// Body template: witness descriptor + location descriptor.
pub fn alert_body(witness_count: i32, location_name: Option<&str>, distance_km: f64) -> String {
    let witness = witness_descriptor(witness_count);
    let location = location_name.map(|n| n.to_string()).unwrap_or_else(|| format!("{distance_km:.1} km away"));
    format!("{witness} — {location}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_reflects_ring_and_level() {
        assert!(alert_title(AlertLevel::Normal, 0.5).contains("VERY CLOSE"));
        assert!(alert_title(AlertLevel::Normal, 4.0).contains("nearby"));
        assert!(alert_title(AlertLevel::Normal, 9.0).contains("in your area"));
        assert!(alert_title(AlertLevel::Normal, 25.0).contains("within 25km"));
    }

    #[test]
    fn title_prefix_escalates_with_level() {
        assert!(alert_title(AlertLevel::Emergency, 1.0).starts_with("🚨"));
        assert!(alert_title(AlertLevel::Urgent, 1.0).starts_with("⚡"));
        assert!(alert_title(AlertLevel::Normal, 1.0).starts_with("👁"));
    }

    #[test]
    fn body_witness_descriptor_thresholds() {
        assert!(alert_body(1, None, 2.0).contains("New sighting"));
        assert!(alert_body(2, None, 2.0).contains("2nd witness"));
        assert!(alert_body(5, None, 2.0).contains("Multiple witnesses (5)"));
        assert!(alert_body(12, None, 2.0).contains("MASS SIGHTING — 12 witnesses"));
    }

    #[test]
    fn body_prefers_location_name_over_distance() {
        assert!(alert_body(1, Some("Seattle, WA"), 2.0).contains("Seattle, WA"));
        assert!(alert_body(1, None, 2.5).contains("2.5 km away"));
    }
}
