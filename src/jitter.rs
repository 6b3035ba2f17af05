//! Privacy jitterer: perturbs a true coordinate within a configured meter
//! radius so that public reads never expose a reporter's exact location.

use rand::{Rng, RngExt};

use crate::config::Config;
use crate::error::CoreResult;
use crate::geo::validate_point;

const METERS_PER_DEG_LAT: f64 = 111_320.0;

/// Draw a point uniformly over a disc of radius in `[min_m, max_m]` around
/// `(lat, lon)`. Longitude delta scales with `1/cos(lat)`. Both outputs are
/// clamped to valid ranges. With `seed` set, the draw is deterministic.
pub fn jitter(lat: f64, lon: f64, min_m: f64, max_m: f64, seed: Option<u64>) -> CoreResult<(f64, f64)> {
    validate_point(lat, lon)?;

    let (radius_m, angle_rad) = match seed {
        Some(seed) => {
            use rand::SeedableRng;
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            draw(&mut rng, min_m, max_m)
        }
        None => {
            let mut rng = rand::rng();
            draw(&mut rng, min_m, max_m)
        }
    };

    let dx_m = radius_m * angle_rad.cos();
    let dy_m = radius_m * angle_rad.sin();

    let cos_lat = lat.to_radians().cos().max(1e-6);
    let dlat = dy_m / METERS_PER_DEG_LAT;
    let dlon = dx_m / (METERS_PER_DEG_LAT * cos_lat);

    let jittered_lat = (lat + dlat).clamp(-90.0, 90.0);
    let jittered_lon = (lon + dlon).clamp(-180.0, 180.0);

    Ok((jittered_lat, jittered_lon))
}

/// Convenience wrapper using the configured default radius.
pub fn jitter_with_config(lat: f64, lon: f64, config: &Config, seed: Option<u64>) -> CoreResult<(f64, f64)> {
    jitter(lat, lon, config.jitter_min_m, config.jitter_max_m, seed)
}

fn draw<R: Rng + ?Sized>(rng: &mut R, min_m: f64, max_m: f64) -> (f64, f64) {
    // Uniform-over-disc sampling: radius must be drawn from sqrt of a
    // uniform variate scaled between the min/max annulus, not linearly,
    // or points would cluster toward the center.
    let min_sq = min_m * min_m;
    let max_sq = max_m * max_m;
    let r = (min_sq + rng.random::<f64>() * (max_sq - min_sq)).sqrt();
    let theta = rng.random::<f64>() * std::f64::consts::TAU;
    (r, theta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_radius() {
        let (lat, lon) = (47.6062, -122.3321);
        for seed in 0..50 {
            let (jlat, jlon) = jitter(lat, lon, 100.0, 300.0, Some(seed)).unwrap();
            let d_km = crate::geo::distance_km(lat, lon, jlat, jlon).unwrap();
            assert!(d_km * 1000.0 <= 301.0, "jitter distance {} exceeded max", d_km * 1000.0);
        }
    }

    #[test]
    fn jitter_is_deterministic_with_seed() {
        let a = jitter(47.0, -122.0, 100.0, 300.0, Some(42)).unwrap();
        let b = jitter(47.0, -122.0, 100.0, 300.0, Some(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn jitter_clamps_near_poles() {
        let (jlat, _) = jitter(89.9999, 0.0, 100.0, 300.0, Some(7)).unwrap();
        assert!(jlat <= 90.0);
    }
}
