//! Device directory (§4.E): answers "which devices sit within `radius_km`
//! of a center" for the fan-out engine. Two execution paths share one
//! result shape — a geo-indexed Postgres query (`ST_DWithin`) and a
//! haversine fallback for stores without spatial indexing (the in-memory
//! gateway used in tests).

use serde::Serialize;

use crate::geo;
use crate::models::Device;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectoryEntry {
    pub device_id: String,
    pub push_token: String,
    pub platform: crate::models::Platform,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub distance_km: f64,
}

/// Default cap on rows returned by either execution path.
pub const DEFAULT_RESULT_CAP: i64 = 1000;

/// Radius, in km, at or above which devices with unknown location are
/// included as an outermost-ring backstop.
pub const NO_LOCATION_BACKSTOP_KM: f64 = 25.0;

/// Haversine fallback: scan all eligible devices in memory and filter by
/// distance. Used by the in-memory gateway and by any backing store that
/// does not support geospatial predicates.
///
/// Devices without a known `(lat, lon)` are included only when
/// `radius_km >= 25` and are reported with `distance_km == radius_km` so
/// downstream scoring treats them as being at the edge of the ring.
pub fn haversine_filter<'a>(
    devices: impl Iterator<Item = &'a Device>,
    center_lat: f64,
    center_lon: f64,
    radius_km: f64,
    exclude_device_id: Option<&str>,
    cap: i64,
) -> Vec<DirectoryEntry> {
    let mut results: Vec<DirectoryEntry> = Vec::new();

    for device in devices {
        if !device.is_fanout_eligible() {
            continue;
        }
        if let Some(exclude) = exclude_device_id {
            if device.device_id == exclude {
                continue;
            }
        }
        let push_token = match &device.push_token {
            Some(t) => t.clone(),
            None => continue,
        };

        match (device.lat, device.lon) {
            (Some(lat), Some(lon)) => {
                let Ok(distance_km) = geo::distance_km(center_lat, center_lon, lat, lon) else {
                    continue;
                };
                if distance_km <= radius_km {
                    results.push(DirectoryEntry {
                        device_id: device.device_id.clone(),
                        push_token,
                        platform: device.platform,
                        lat: Some(lat),
                        lon: Some(lon),
                        distance_km,
                    });
                }
            }
            _ => {
                if radius_km >= NO_LOCATION_BACKSTOP_KM {
                    results.push(DirectoryEntry {
                        device_id: device.device_id.clone(),
                        push_token,
                        platform: device.platform,
                        lat: None,
                        lon: None,
                        distance_km: radius_km,
                    });
                }
            }
        }
    }

    results.sort_by(|a, b| a.distance_km.partial_cmp(&b.distance_km).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(cap.max(0) as usize);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Platform, PushProvider};
    use uuid::Uuid;

    fn device(id: &str, lat: Option<f64>, lon: Option<f64>) -> Device {
        Device {
            id: Uuid::new_v4(),
            device_id: id.to_string(),
            user_id: None,
            platform: Platform::Ios,
            push_token: Some(format!("tok-{id}")),
            push_provider: Some(PushProvider::Fcm),
            push_enabled: true,
            alert_notifications: true,
            chat_notifications: true,
            system_notifications: true,
            is_active: true,
            last_seen: None,
            lat,
            lon,
            notifications_sent: 0,
            notifications_opened: 0,
        }
    }

    #[test]
    fn filters_by_radius_and_sorts_ascending() {
        let near = device("near", Some(47.601), Some(-122.332));
        let far = device("far", Some(48.5), Some(-123.5));
        let devices = vec![far.clone(), near.clone()];
        let results = haversine_filter(devices.iter(), 47.6062, -122.3321, 50.0, None, DEFAULT_RESULT_CAP);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].device_id, "near");
    }

    #[test]
    fn excludes_named_device() {
        let devices = vec![device("self", Some(47.6062), Some(-122.3321))];
        let results =
            haversine_filter(devices.iter(), 47.6062, -122.3321, 10.0, Some("self"), DEFAULT_RESULT_CAP);
        assert!(results.is_empty());
    }

    #[test]
    fn no_location_device_included_only_in_outer_ring() {
        let devices = vec![device("nolo", None, None)];
        let inner = haversine_filter(devices.iter(), 47.6, -122.3, 10.0, None, DEFAULT_RESULT_CAP);
        assert!(inner.is_empty());

        let outer = haversine_filter(devices.iter(), 47.6, -122.3, 25.0, None, DEFAULT_RESULT_CAP);
        assert_eq!(outer.len(), 1);
        assert_eq!(outer[0].distance_km, 25.0);
    }

    #[test]
    fn ineligible_devices_are_skipped() {
        let mut inactive = device("inactive", Some(47.6), Some(-122.3));
        inactive.is_active = false;
        let mut no_token = device("no_token", Some(47.6), Some(-122.3));
        no_token.push_token = None;
        let devices = vec![inactive, no_token];
        let results = haversine_filter(devices.iter(), 47.6, -122.3, 10.0, None, DEFAULT_RESULT_CAP);
        assert!(results.is_empty());
    }

    #[test]
    fn result_cap_truncates() {
        let devices: Vec<Device> = (0..5)
            .map(|i| device(&format!("d{i}"), Some(47.6 + i as f64 * 0.001), Some(-122.3)))
            .collect();
        let results = haversine_filter(devices.iter(), 47.6, -122.3, 50.0, None, 2);
        assert_eq!(results.len(), 2);
    }
}
