use crate::ellipsoid::Ellipsoid;

/// Geodetic (degrees, metres) to geocentric ECEF (metres).
pub fn geodetic_to_geocentric(
    ellipsoid: &Ellipsoid,
    lng: f64,
    lat: f64,
    height: f64,
) -> (f64, f64, f64) {
    let e_sq = ellipsoid.e_sq();
    let (sin_lat, cos_lat) = lat.to_radians().sin_cos();
    let (sin_lng, cos_lng) = lng.to_radians().sin_cos();
    let n = ellipsoid.a() / (1.0 - e_sq * sin_lat * sin_lat).sqrt();

    let x = (n + height) * cos_lat * cos_lng;
    let y = (n + height) * cos_lat * sin_lng;
    let z = (n * (1.0 - e_sq) + height) * sin_lat;
    (x, y, z)
}

/// Geocentric ECEF (metres) to geodetic (degrees, metres).
pub fn geocentric_to_geodetic(ellipsoid: &Ellipsoid, x: f64, y: f64, z: f64) -> (f64, f64, f64) {
    let a = ellipsoid.a();
    let e_sq = ellipsoid.e_sq();
    let p = x.hypot(y);
    let lng = y.atan2(x);

    let mut lat = z.atan2(p * (1.0 - e_sq));
    for _ in 0..16 {
        let sin_lat = lat.sin();
        let n = a / (1.0 - e_sq * sin_lat * sin_lat).sqrt();
        let next = (z + e_sq * n * sin_lat).atan2(p);
        let converged = (next - lat).abs() < 1e-15;
        lat = next;
        if converged {
            break;
        }
    }

    let (sin_lat, cos_lat) = lat.sin_cos();
    let height = p * cos_lat + z * sin_lat - a * (1.0 - e_sq * sin_lat * sin_lat).sqrt();
    (lng.to_degrees(), lat.to_degrees(), height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ellipsoid::wgs84;

    #[test]
    fn equator_prime_meridian() {
        let (x, y, z) = geodetic_to_geocentric(&wgs84(), 0.0, 0.0, 0.0);
        assert!((x - 6_378_137.0).abs() < 1e-6);
        assert!(y.abs() < 1e-6);
        assert!(z.abs() < 1e-6);
    }

    #[test]
    fn geocentric_round_trip() {
        let ellipsoid = wgs84();
        for &(lng, lat, height) in &[
            (139.767, 35.681, 40.0),
            (-123.1, 49.25, -12.5),
            (10.0, 89.9, 1000.0),
        ] {
            let (x, y, z) = geodetic_to_geocentric(&ellipsoid, lng, lat, height);
            let (lng2, lat2, height2) = geocentric_to_geodetic(&ellipsoid, x, y, z);
            assert!((lng - lng2).abs() < 1e-10);
            assert!((lat - lat2).abs() < 1e-10);
            assert!((height - height2).abs() < 1e-6);
        }
    }
}
