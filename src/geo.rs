//! Great-circle geometry shared by fan-out, witness triangulation and the
//! aircraft-match analyser. Every entry point validates its inputs and
//! returns [`CoreError::InputError`] rather than producing NaN/garbage.

use crate::error::{CoreError, CoreResult};

const EARTH_RADIUS_KM: f64 = 6371.0;

pub fn validate_lat(lat: f64) -> CoreResult<()> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(CoreError::InputError(format!("latitude {lat} out of range [-90, 90]")));
    }
    Ok(())
}

pub fn validate_lon(lon: f64) -> CoreResult<()> {
    if !(-180.0..=180.0).contains(&lon) {
        return Err(CoreError::InputError(format!("longitude {lon} out of range [-180, 180]")));
    }
    Ok(())
}

pub fn validate_point(lat: f64, lon: f64) -> CoreResult<()> {
    validate_lat(lat)?;
    validate_lon(lon)?;
    Ok(())
}

pub fn validate_elevation(elevation_deg: f64) -> CoreResult<()> {
    if !(-90.0..=90.0).contains(&elevation_deg) {
        return Err(CoreError::InputError(format!(
            "elevation {elevation_deg} out of range [-90, 90]"
        )));
    }
    Ok(())
}

/// Normalise an azimuth/bearing to `[0, 360)`.
pub fn normalize_azimuth(azimuth_deg: f64) -> f64 {
    let normalized = azimuth_deg % 360.0;
    if normalized < 0.0 { normalized + 360.0 } else { normalized }
}

/// Haversine great-circle distance in kilometers on a 6371 km sphere.
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> CoreResult<f64> {
    validate_point(lat1, lon1)?;
    validate_point(lat2, lon2)?;

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    Ok(EARTH_RADIUS_KM * c)
}

/// Forward (initial) bearing from `(lat1, lon1)` to `(lat2, lon2)`, in `[0, 360)`.
pub fn bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> CoreResult<f64> {
    validate_point(lat1, lon1)?;
    validate_point(lat2, lon2)?;

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let y = dlon.sin() * lat2_rad.cos();
    let x = lat1_rad.cos() * lat2_rad.sin() - lat1_rad.sin() * lat2_rad.cos() * dlon.cos();

    Ok(normalize_azimuth(y.atan2(x).to_degrees()))
}

/// Angular separation between two `(azimuth, elevation)` pairs via the
/// unit-vector dot product, clamped to `[-1, 1]` before `acos`.
pub fn angular_separation_deg(az1: f64, el1: f64, az2: f64, el2: f64) -> CoreResult<f64> {
    validate_elevation(el1)?;
    validate_elevation(el2)?;

    let (az1, el1) = (normalize_azimuth(az1).to_radians(), el1.to_radians());
    let (az2, el2) = (normalize_azimuth(az2).to_radians(), el2.to_radians());

    let v1 = (az1.sin() * el1.cos(), az1.cos() * el1.cos(), el1.sin());
    let v2 = (az2.sin() * el2.cos(), az2.cos() * el2.cos(), el2.sin());

    let dot = v1.0 * v2.0 + v1.1 * v2.1 + v1.2 * v2.2;
    let clamped = dot.clamp(-1.0, 1.0);

    Ok(clamped.acos().to_degrees())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

/// Inclusive bounding box around `(lat, lon)` at `radius_km`, scaled for
/// longitude by `1/cos(lat)`. Clamps to valid lat/lon ranges.
pub fn bbox(lat: f64, lon: f64, radius_km: f64) -> CoreResult<BoundingBox> {
    validate_point(lat, lon)?;
    if radius_km < 0.0 {
        return Err(CoreError::InputError(format!("radius_km {radius_km} must be >= 0")));
    }

    const KM_PER_DEG_LAT: f64 = 111.0;
    let lat_delta = radius_km / KM_PER_DEG_LAT;

    // Guard against division blow-up near the poles.
    let cos_lat = lat.to_radians().cos().max(1e-6);
    let lon_delta = radius_km / (KM_PER_DEG_LAT * cos_lat);

    Ok(BoundingBox {
        lat_min: (lat - lat_delta).max(-90.0),
        lat_max: (lat + lat_delta).min(90.0),
        lon_min: (lon - lon_delta).max(-180.0),
        lon_max: (lon + lon_delta).min(180.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_zero_for_identical_points() {
        assert!((distance_km(47.0, -122.0, 47.0, -122.0).unwrap()).abs() < 1e-9);
    }

    #[test]
    fn bearing_north_is_zero() {
        let b = bearing_deg(47.0, -122.0, 48.0, -122.0).unwrap();
        assert!(b.abs() < 1e-6);
    }

    #[test]
    fn bearing_east_is_ninety() {
        let b = bearing_deg(0.0, 0.0, 0.0, 1.0).unwrap();
        assert!((b - 90.0).abs() < 1e-6);
    }

    #[test]
    fn angular_separation_is_symmetric() {
        let a = angular_separation_deg(45.0, 30.0, 90.0, 10.0).unwrap();
        let b = angular_separation_deg(90.0, 10.0, 45.0, 30.0).unwrap();
        assert!((a - b).abs() < 1e-6);
    }

    #[test]
    fn angular_separation_same_direction_is_zero() {
        let a = angular_separation_deg(45.0, 30.0, 45.0, 30.0).unwrap();
        assert!(a.abs() < 1e-6);
    }

    #[test]
    fn invalid_latitude_rejected() {
        assert!(distance_km(200.0, 0.0, 0.0, 0.0).is_err());
    }

    #[test]
    fn bbox_widens_longitude_away_from_equator() {
        let equator = bbox(0.0, 0.0, 10.0).unwrap();
        let high_lat = bbox(60.0, 0.0, 10.0).unwrap();
        let eq_width = equator.lon_max - equator.lon_min;
        let hi_width = high_lat.lon_max - high_lat.lon_min;
        assert!(hi_width > eq_width);
    }
}
