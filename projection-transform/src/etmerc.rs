//! Transverse Mercator after Krüger, using the n⁴ series of Karney (2011).
//! Accurate to well below a millimetre within a few thousand kilometres of
//! the central meridian.

use crate::{ellipsoid::Ellipsoid, error::ProjectionError};

// Beyond this |η| the inverse series diverges.
const MAX_ETA: f64 = 2.623_395_162_778;

#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedTransverseMercatorProjection {
    lng0: f64,
    k0: f64,
    false_easting: f64,
    false_northing: f64,
    e: f64,
    rectifying_radius: f64,
    alpha: [f64; 4],
    beta: [f64; 4],
    xi0: f64,
}

impl ExtendedTransverseMercatorProjection {
    /// `lng0`/`lat0` are the origin in degrees; `k0` the scale on the central meridian.
    pub fn new(lng0: f64, lat0: f64, k0: f64, ellipsoid: &Ellipsoid) -> Self {
        let n = ellipsoid.f() / (2.0 - ellipsoid.f());
        let n2 = n * n;
        let n3 = n2 * n;
        let n4 = n3 * n;

        let rectifying_radius = ellipsoid.a() / (1.0 + n) * (1.0 + n2 / 4.0 + n4 / 64.0);
        let alpha = [
            n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0 + 41.0 * n4 / 180.0,
            13.0 * n2 / 48.0 - 3.0 * n3 / 5.0 + 557.0 * n4 / 1440.0,
            61.0 * n3 / 240.0 - 103.0 * n4 / 140.0,
            49561.0 * n4 / 161_280.0,
        ];
        let beta = [
            n / 2.0 - 2.0 * n2 / 3.0 + 37.0 * n3 / 96.0 - n4 / 360.0,
            n2 / 48.0 + n3 / 15.0 - 437.0 * n4 / 1440.0,
            17.0 * n3 / 480.0 - 37.0 * n4 / 840.0,
            4397.0 * n4 / 161_280.0,
        ];

        let mut projection = Self {
            lng0,
            k0,
            false_easting: 0.0,
            false_northing: 0.0,
            e: ellipsoid.e_sq().sqrt(),
            rectifying_radius,
            alpha,
            beta,
            xi0: 0.0,
        };
        let (xi0, _) = projection.gauss_schreiber(lat0.to_radians(), 0.0);
        projection.xi0 = xi0;
        projection
    }

    pub fn with_false_origin(mut self, false_easting: f64, false_northing: f64) -> Self {
        self.false_easting = false_easting;
        self.false_northing = false_northing;
        self
    }

    pub fn central_meridian(&self) -> f64 {
        self.lng0
    }

    /// Geographic (degrees) to projected (metres). Height passes through.
    pub fn project_forward(
        &self,
        lng: f64,
        lat: f64,
        height: f64,
    ) -> Result<(f64, f64, f64), ProjectionError> {
        if !lng.is_finite() || !lat.is_finite() || lat.abs() > 90.0 {
            return Err(ProjectionError::InvalidCoordinate { lng, lat });
        }
        let dlng = normalize_degrees(lng - self.lng0);
        if dlng.abs() >= 90.0 {
            return Err(ProjectionError::OutOfDomain { x: lng, y: lat });
        }

        let (xi, eta) = self.gauss_schreiber(lat.to_radians(), dlng.to_radians());
        let scale = self.k0 * self.rectifying_radius;
        let x = self.false_easting + scale * eta;
        let y = self.false_northing + scale * (xi - self.xi0);
        Ok((x, y, height))
    }

    /// Projected (metres) to geographic (degrees). Height passes through.
    pub fn project_inverse(
        &self,
        x: f64,
        y: f64,
        height: f64,
    ) -> Result<(f64, f64, f64), ProjectionError> {
        let scale = self.k0 * self.rectifying_radius;
        let xi = (y - self.false_northing) / scale + self.xi0;
        let eta = (x - self.false_easting) / scale;
        if !xi.is_finite() || !eta.is_finite() || eta.abs() > MAX_ETA {
            return Err(ProjectionError::OutOfDomain { x, y });
        }

        let mut xi_p = xi;
        let mut eta_p = eta;
        for (j, beta) in self.beta.iter().enumerate() {
            let k = 2.0 * (j + 1) as f64;
            xi_p -= beta * (k * xi).sin() * (k * eta).cosh();
            eta_p -= beta * (k * xi).cos() * (k * eta).sinh();
        }

        let tau_p = xi_p.sin() / (eta_p.sinh().powi(2) + xi_p.cos().powi(2)).sqrt();
        let lng = eta_p.sinh().atan2(xi_p.cos());
        let lat = self.conformal_to_geodetic(tau_p).atan();
        if !lat.is_finite() || !lng.is_finite() {
            return Err(ProjectionError::OutOfDomain { x, y });
        }

        Ok((
            normalize_degrees(self.lng0 + lng.to_degrees()),
            lat.to_degrees(),
            height,
        ))
    }

    fn gauss_schreiber(&self, lat: f64, dlng: f64) -> (f64, f64) {
        let sin_lat = lat.sin();
        let tau_p = (sin_lat.atanh() - self.e * (self.e * sin_lat).atanh()).sinh();
        let xi_p = tau_p.atan2(dlng.cos());
        let eta_p = (dlng.sin() / (1.0 + tau_p * tau_p).sqrt()).atanh();

        let mut xi = xi_p;
        let mut eta = eta_p;
        for (j, alpha) in self.alpha.iter().enumerate() {
            let k = 2.0 * (j + 1) as f64;
            xi += alpha * (k * xi_p).sin() * (k * eta_p).cosh();
            eta += alpha * (k * xi_p).cos() * (k * eta_p).sinh();
        }
        (xi, eta)
    }

    // Newton iteration for tan(lat) given the conformal tan(lat').
    fn conformal_to_geodetic(&self, tau_p: f64) -> f64 {
        let e_sq = self.e * self.e;
        let mut tau = tau_p;
        for _ in 0..8 {
            let sigma = (self.e * (self.e * tau / (1.0 + tau * tau).sqrt()).atanh()).sinh();
            let tau_i = tau * (1.0 + sigma * sigma).sqrt() - sigma * (1.0 + tau * tau).sqrt();
            let delta = (tau_p - tau_i) / (1.0 + tau_i * tau_i).sqrt()
                * (1.0 + (1.0 - e_sq) * tau * tau)
                / ((1.0 - e_sq) * (1.0 + tau * tau).sqrt());
            tau += delta;
            if delta.abs() < 1e-14 * tau.abs().max(1.0) {
                break;
            }
        }
        tau
    }
}

fn normalize_degrees(value: f64) -> f64 {
    let wrapped = (value + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && value > 0.0 {
        180.0
    } else {
        wrapped
    }
}
