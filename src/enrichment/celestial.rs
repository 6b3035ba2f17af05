//! Celestial-context processor (§4.I): altitude/azimuth of the sun, moon,
//! and naked-eye planets at the sighting's place and time, plus moon phase
//! and twilight classification. Pure computation, always available.
//!
//! Positions use Paul Schlyter's low-precision planetary position method
//! (heliocentric orbital elements with linear secular rates, no perturbation
//! terms) — accurate to roughly a degree, which is adequate for "is there a
//! bright known object near this line of sight" rather than for an almanac.

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use serde_json::json;

use super::{EnrichmentContext, EnrichmentProcessor, ProcessorOutcome};

const DEG: f64 = std::f64::consts::PI / 180.0;

/// Heliocentric orbital elements at J2000, with linear per-day rates, after
/// Schlyter. `(N, i, w, a, e, M)` — longitude of ascending node, inclination,
/// argument of perihelion, semi-major axis (AU), eccentricity, mean anomaly —
/// each as `(value_at_epoch_deg_or_au, rate_per_day)` except `a` which is
/// constant to this precision.
struct Elements {
    n: (f64, f64),
    i: (f64, f64),
    w: (f64, f64),
    a: f64,
    e: (f64, f64),
    m: (f64, f64),
}

fn days_since_epoch(timestamp: DateTime<Utc>) -> f64 {
    // Days since 2000-01-01 00:00 UTC (J2000.0), matching Schlyter's `d`.
    let epoch = chrono::DateTime::parse_from_rfc3339("2000-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
    (timestamp - epoch).num_milliseconds() as f64 / 86_400_000.0
}

fn rev(angle_deg: f64) -> f64 {
    angle_deg.rem_euclid(360.0)
}

/// Solves Kepler's equation `M = E - e*sin(E)` for `E` by Newton iteration.
fn eccentric_anomaly(m_deg: f64, e: f64) -> f64 {
    let m = m_deg * DEG;
    let mut ecc = m + e * m.sin() * (1.0 + e * m.cos());
    for _ in 0..6 {
        let delta = ecc - e * ecc.sin() - m;
        ecc -= delta / (1.0 - e * ecc.cos());
    }
    ecc
}

/// Heliocentric ecliptic rectangular coordinates (AU) for one body.
fn heliocentric_position(elements: &Elements, d: f64) -> (f64, f64, f64) {
    let n = rev(elements.n.0 + elements.n.1 * d) * DEG;
    let i = rev(elements.i.0 + elements.i.1 * d) * DEG;
    let w = rev(elements.w.0 + elements.w.1 * d) * DEG;
    let a = elements.a;
    let e = elements.e.0 + elements.e.1 * d;
    let m = rev(elements.m.0 + elements.m.1 * d);

    let ecc = eccentric_anomaly(m, e);
    let xv = a * (ecc.cos() - e);
    let yv = a * ((1.0 - e * e).sqrt() * ecc.sin());

    let v = yv.atan2(xv);
    let r = (xv * xv + yv * yv).sqrt();

    let xh = r * (n.cos() * (v + w).cos() - n.sin() * (v + w).sin() * i.cos());
    let yh = r * (n.sin() * (v + w).cos() + n.cos() * (v + w).sin() * i.cos());
    let zh = r * ((v + w).sin() * i.sin());

    (xh, yh, zh)
}

fn sun_geocentric_ecliptic(d: f64) -> (f64, f64, f64) {
    let sun = Elements { n: (0.0, 0.0), i: (0.0, 0.0), w: (282.9404, 4.709_35e-5), a: 1.0, e: (0.016_709, -1.151e-9), m: (356.047_0, 0.985_600_3) };
    // Sun's heliocentric longitude IS the geocentric longitude of the sun
    // (earth-sun vector reversed); compute directly via the same 2-body solve.
    let e = sun.e.0 + sun.e.1 * d;
    let m = rev(sun.m.0 + sun.m.1 * d);
    let ecc = eccentric_anomaly(m, e);
    let xv = ecc.cos() - e;
    let yv = (1.0 - e * e).sqrt() * ecc.sin();
    let v = yv.atan2(xv);
    let r = (xv * xv + yv * yv).sqrt();
    let lon = rev((v * 180.0 / std::f64::consts::PI) + sun.w.0 + sun.w.1 * d);
    (r * (lon * DEG).cos(), r * (lon * DEG).sin(), 0.0)
}

struct EquatorialPosition {
    ra_deg: f64,
    dec_deg: f64,
    distance_au: f64,
}

fn ecliptic_to_equatorial(xh: f64, yh: f64, zh: f64, d: f64) -> EquatorialPosition {
    let obliquity = (23.439_1 - 3.563e-7 * d) * DEG;
    let xe = xh;
    let ye = yh * obliquity.cos() - zh * obliquity.sin();
    let ze = yh * obliquity.sin() + zh * obliquity.cos();
    let ra = ye.atan2(xe).to_degrees();
    let dec = (ze / (xe * xe + ye * ye + ze * ze).sqrt()).asin().to_degrees();
    EquatorialPosition { ra_deg: rev(ra), dec_deg: dec, distance_au: (xe * xe + ye * ye + ze * ze).sqrt() }
}

/// Greenwich Mean Sidereal Time, in degrees, after Schlyter's `GMST0 + UT`.
fn gmst_deg(timestamp: DateTime<Utc>, d: f64) -> f64 {
    let sun = sun_geocentric_ecliptic(d);
    let sun_lon = sun.1.atan2(sun.0).to_degrees();
    let ut_hours = timestamp.hour() as f64 + timestamp.minute() as f64 / 60.0 + timestamp.second() as f64 / 3600.0;
    rev(rev(sun_lon + 180.0) + ut_hours * 15.0)
}

/// Horizontal (altitude, azimuth) coordinates, azimuth measured clockwise
/// from north.
fn equatorial_to_horizontal(eq: &EquatorialPosition, timestamp: DateTime<Utc>, d: f64, lat: f64, lon: f64) -> (f64, f64) {
    let lst = rev(gmst_deg(timestamp, d) + lon);
    let hour_angle = rev(lst - eq.ra_deg) * DEG;
    let dec = eq.dec_deg * DEG;
    let lat_rad = lat * DEG;

    let sin_alt = dec.sin() * lat_rad.sin() + dec.cos() * lat_rad.cos() * hour_angle.cos();
    let alt = sin_alt.asin();

    let cos_az = (dec.sin() - sin_alt * lat_rad.sin()) / (alt.cos() * lat_rad.cos());
    let az = cos_az.clamp(-1.0, 1.0).acos();
    let az = if hour_angle.sin() > 0.0 { 360.0 - az.to_degrees() } else { az.to_degrees() };

    (alt.to_degrees(), az)
}

struct Body {
    name: &'static str,
    elements: Option<Elements>,
}

fn bodies() -> Vec<Body> {
    vec![
        Body { name: "sun", elements: None },
        Body {
            name: "venus",
            elements: Some(Elements { n: (76.679_2, 2.46e-5), i: (3.394_6, 2.75e-8), w: (54.891_0, 1.38374e-5), a: 0.723_330, e: (0.006_773, -1.302e-9), m: (48.005_2, 1.602_130_9) }),
        },
        Body {
            name: "mars",
            elements: Some(Elements { n: (49.557_9, 2.10e-5), i: (1.849_9, -1.78e-8), w: (286.502_2, 2.92961e-5), a: 1.523_688, e: (0.093_405, 2.516e-9), m: (18.602_1, 0.524_033_0) }),
        },
        Body {
            name: "jupiter",
            elements: Some(Elements { n: (100.473_5, 2.76e-5), i: (1.303_0, -1.557e-7), w: (273.867_7, 1.64505e-4), a: 5.202_603, e: (0.048_498, 4.469e-9), m: (19.895_0, 0.083_090_9) }),
        },
        Body {
            name: "saturn",
            elements: Some(Elements { n: (113.665_0, 2.38e-5), i: (2.488_7, -1.081e-7), w: (339.391_5, 2.97661e-4), a: 9.554_909, e: (0.055_546, -9.499e-9), m: (316.967_0, 0.033_494_6) }),
        },
    ]
}

fn position_for(name: &str, elements: Option<&Elements>, timestamp: DateTime<Utc>, lat: f64, lon: f64) -> (f64, f64, f64) {
    let d = days_since_epoch(timestamp);
    let (xh, yh, zh) = match elements {
        None => sun_geocentric_ecliptic(d),
        Some(e) => {
            let (xh, yh, zh) = heliocentric_position(e, d);
            let (sx, sy, sz) = sun_geocentric_ecliptic(d);
            (xh + sx, yh + sy, zh + sz)
        }
    };
    let eq = ecliptic_to_equatorial(xh, yh, zh, d);
    let (alt, az) = equatorial_to_horizontal(&eq, timestamp, d, lat, lon);
    let _ = name;
    (alt, az, eq.distance_au)
}

/// Geocentric moon position — Schlyter's simplified lunar terms (mean
/// elements only, no perturbations), which places phase/illumination within
/// a few percent and altitude/azimuth within a couple of degrees.
fn moon_position(timestamp: DateTime<Utc>, lat: f64, lon: f64) -> (f64, f64, f64) {
    let d = days_since_epoch(timestamp);
    let n = rev(125.1228 - 0.052_953_8 * d) * DEG;
    let i = 5.1454 * DEG;
    let w = rev(318.0634 + 0.164_357_4 * d) * DEG;
    let a = 60.2666_f64;
    let e = 0.054_900;
    let m = rev(115.3654 + 13.064_993_1 * d);

    let ecc = eccentric_anomaly(m, e);
    let xv = a * (ecc.cos() - e);
    let yv = a * ((1.0 - e * e).sqrt() * ecc.sin());
    let v = yv.atan2(xv);
    let r = (xv * xv + yv * yv).sqrt();

    let xh = r * (n.cos() * (v + w).cos() - n.sin() * (v + w).sin() * i.cos());
    let yh = r * (n.sin() * (v + w).cos() + n.cos() * (v + w).sin() * i.cos());
    let zh = r * ((v + w).sin() * i.sin());

    let eq = ecliptic_to_equatorial(xh, yh, zh, d);
    let (alt, az) = equatorial_to_horizontal(&eq, timestamp, d, lat, lon);
    (alt, az, r / 149_598_000.0 * 6_378.14)
}

/// Moon elongation (degrees from the sun) used for phase name and
/// illuminated fraction.
fn moon_elongation(timestamp: DateTime<Utc>) -> f64 {
    let d = days_since_epoch(timestamp);
    let sun = sun_geocentric_ecliptic(d);
    let sun_lon = rev(sun.1.atan2(sun.0).to_degrees());

    let n = rev(125.1228 - 0.052_953_8 * d);
    let i = 5.1454;
    let w = rev(318.0634 + 0.164_357_4 * d);
    let m = rev(115.3654 + 13.064_993_1 * d);
    let e = 0.054_900;
    let ecc = eccentric_anomaly(m, e);
    let xv = ecc.cos() - e;
    let yv = (1.0 - e * e).sqrt() * ecc.sin();
    let v = yv.atan2(xv).to_degrees();

    // Project the orbital-plane true longitude onto the ecliptic.
    let u = (v + w) * DEG;
    let xh = u.cos() * (n * DEG).cos() - u.sin() * (n * DEG).sin() * (i * DEG).cos();
    let yh = u.cos() * (n * DEG).sin() + u.sin() * (n * DEG).cos() * (i * DEG).cos();
    let lon_ecl = rev(yh.atan2(xh).to_degrees());

    rev(lon_ecl - sun_lon)
}

fn moon_phase_name(elongation_deg: f64) -> &'static str {
    let e = rev(elongation_deg);
    match (e / 45.0).floor() as i32 {
        0 => "new",
        1 => "waxing_crescent",
        2 => "first_quarter",
        3 => "waxing_gibbous",
        4 => "full",
        5 => "waning_gibbous",
        6 => "last_quarter",
        _ => "waning_crescent",
    }
}

fn twilight_type(sun_altitude_deg: f64) -> &'static str {
    if sun_altitude_deg > 0.0 {
        "day"
    } else if sun_altitude_deg > -6.0 {
        "civil_twilight"
    } else if sun_altitude_deg > -12.0 {
        "nautical_twilight"
    } else if sun_altitude_deg > -18.0 {
        "astronomical_twilight"
    } else {
        "night"
    }
}

pub struct CelestialProcessor;

#[async_trait]
impl EnrichmentProcessor for CelestialProcessor {
    fn name(&self) -> &str {
        "celestial"
    }

    fn priority(&self) -> u8 {
        2
    }

    fn timeout_seconds(&self) -> u64 {
        5
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn process(&self, ctx: &EnrichmentContext) -> ProcessorOutcome {
        let started = Utc::now();

        let mut objects = serde_json::Map::new();
        let mut sun_altitude_deg = 0.0;

        for body in bodies() {
            let (alt, az, distance) = if body.name == "sun" {
                let (alt, az, distance) = position_for("sun", None, ctx.timestamp, ctx.latitude, ctx.longitude);
                sun_altitude_deg = alt;
                (alt, az, distance)
            } else {
                position_for(body.name, body.elements.as_ref(), ctx.timestamp, ctx.latitude, ctx.longitude)
            };
            objects.insert(body.name.to_string(), json!({"altitude_deg": alt, "azimuth_deg": az, "distance_au": distance}));
        }

        let (moon_alt, moon_az, moon_distance_earth_radii) = moon_position(ctx.timestamp, ctx.latitude, ctx.longitude);
        let elongation = moon_elongation(ctx.timestamp);
        let illumination = (1.0 - elongation.to_radians().cos()) / 2.0;
        objects.insert(
            "moon".to_string(),
            json!({
                "altitude_deg": moon_alt,
                "azimuth_deg": moon_az,
                "distance_earth_radii": moon_distance_earth_radii,
                "phase": moon_phase_name(elongation),
                "illumination_fraction": illumination,
            }),
        );

        let data = json!({
            "objects": objects,
            "sun_altitude_deg": sun_altitude_deg,
            "summary": {
                "twilight_type": twilight_type(sun_altitude_deg),
            },
        });

        ProcessorOutcome::ok(data, (Utc::now() - started).num_milliseconds(), Some(1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twilight_thresholds_match_spec() {
        assert_eq!(twilight_type(5.0), "day");
        assert_eq!(twilight_type(-3.0), "civil_twilight");
        assert_eq!(twilight_type(-9.0), "nautical_twilight");
        assert_eq!(twilight_type(-15.0), "astronomical_twilight");
        assert_eq!(twilight_type(-20.0), "night");
    }

    #[test]
    fn moon_phase_buckets_are_8_way() {
        assert_eq!(moon_phase_name(0.0), "new");
        assert_eq!(moon_phase_name(90.0), "first_quarter");
        assert_eq!(moon_phase_name(180.0), "full");
        assert_eq!(moon_phase_name(270.0), "last_quarter");
    }

    #[tokio::test]
    async fn processor_always_available_and_produces_all_bodies() {
        let processor = CelestialProcessor;
        assert!(processor.is_available().await);
        let ctx = EnrichmentContext {
            sighting_id: uuid::Uuid::new_v4(),
            latitude: 47.6062,
            longitude: -122.3321,
            altitude_m: None,
            timestamp: DateTime::parse_from_rfc3339("2026-06-21T04:00:00Z").unwrap().with_timezone(&Utc),
            azimuth_deg: None,
            pitch_deg: None,
            roll_deg: None,
            category: "ufo".to_string(),
            title: None,
            description: None,
        };
        let outcome = processor.process(&ctx).await;
        assert!(outcome.success);
        let data = outcome.data.unwrap();
        for name in ["sun", "venus", "mars", "jupiter", "saturn", "moon"] {
            assert!(data["objects"].get(name).is_some(), "missing {name}");
        }
    }
}
