#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    a: f64,
    f: f64,
}

impl Ellipsoid {
    pub const fn new(a: f64, f: f64) -> Self {
        Self { a, f }
    }

    /// Semi-major axis in metres.
    pub fn a(&self) -> f64 {
        self.a
    }

    /// Flattening.
    pub fn f(&self) -> f64 {
        self.f
    }

    /// Semi-minor axis in metres.
    pub fn b(&self) -> f64 {
        self.a * (1.0 - self.f)
    }

    /// First eccentricity squared.
    pub fn e_sq(&self) -> f64 {
        self.f * (2.0 - self.f)
    }
}

pub fn wgs84() -> Ellipsoid {
    Ellipsoid::new(6_378_137.0, 1.0 / 298.257_223_563)
}

pub fn grs80() -> Ellipsoid {
    Ellipsoid::new(6_378_137.0, 1.0 / 298.257_222_101)
}

pub fn clarke1866() -> Ellipsoid {
    Ellipsoid::new(6_378_206.4, 1.0 / 294.978_698_213_898)
}

pub fn bessel1841() -> Ellipsoid {
    Ellipsoid::new(6_377_397.155, 1.0 / 299.152_812_8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wgs84_semi_minor_axis() {
        assert!((wgs84().b() - 6_356_752.314_245).abs() < 1e-3);
    }

    #[test]
    fn grs80_eccentricity() {
        assert!((grs80().e_sq() - 0.006_694_380_022_9).abs() < 1e-12);
    }
}
