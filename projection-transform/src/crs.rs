use crate::{
    cartesian::{geocentric_to_geodetic, geodetic_to_geocentric},
    ellipsoid::{self, Ellipsoid},
    error::ProjectionError,
    etmerc::ExtendedTransverseMercatorProjection,
    jprect::JPRZone,
};

/// EPSG code type alias
pub type EpsgCode = u16;

pub const EPSG_WGS84_GEOGRAPHIC_2D: EpsgCode = 4326;
/// WGS84 Geographic 3D (EPSG:4979)
pub const EPSG_WGS84_GEOGRAPHIC_3D: EpsgCode = 4979;
pub const EPSG_WGS84_GEOCENTRIC: EpsgCode = 4978;
pub const EPSG_NAD83_GEOGRAPHIC: EpsgCode = 4269;
pub const EPSG_NAD27_GEOGRAPHIC: EpsgCode = 4267;
pub const EPSG_NAD83_CSRS_GEOGRAPHIC: EpsgCode = 4617;
pub const EPSG_JGD2011_GEOGRAPHIC_2D: EpsgCode = 6668;
pub const EPSG_JGD2011_GEOGRAPHIC_3D: EpsgCode = 6697;
pub const EPSG_JGD2000_GEOGRAPHIC: EpsgCode = 4612;
pub const EPSG_TOKYO_GEOGRAPHIC: EpsgCode = 4301;

pub const EPSG_JGD2011_JPRECT_I: EpsgCode = 6669;
pub const EPSG_JGD2011_JPRECT_IX: EpsgCode = 6677;
pub const EPSG_JGD2011_JPRECT_XIX: EpsgCode = 6687;

pub const DATUM_WGS84: &str = "WGS84";
pub const DATUM_NAD83: &str = "NAD83";
pub const DATUM_NAD27: &str = "NAD27";
pub const DATUM_NAD83_CSRS: &str = "NAD83_CSRS";
pub const DATUM_JGD2011: &str = "JGD2011";
pub const DATUM_JGD2000: &str = "JGD2000";
pub const DATUM_TOKYO: &str = "TOKYO";

#[derive(Debug, Clone, PartialEq)]
pub enum CrsKind {
    /// Longitude/latitude in degrees, ellipsoidal height in metres.
    Geographic,
    /// Earth-centred, earth-fixed cartesian metres.
    Geocentric,
    Projected(ExtendedTransverseMercatorProjection),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Crs {
    pub epsg: Option<EpsgCode>,
    pub datum: String,
    pub ellipsoid: Ellipsoid,
    pub kind: CrsKind,
}

impl Crs {
    pub fn geographic(datum: &str, ellipsoid: Ellipsoid) -> Self {
        Self {
            epsg: None,
            datum: datum.to_string(),
            ellipsoid,
            kind: CrsKind::Geographic,
        }
    }

    pub fn geocentric(datum: &str, ellipsoid: Ellipsoid) -> Self {
        Self {
            kind: CrsKind::Geocentric,
            ..Self::geographic(datum, ellipsoid)
        }
    }

    pub fn projected(
        datum: &str,
        ellipsoid: Ellipsoid,
        projection: ExtendedTransverseMercatorProjection,
    ) -> Self {
        Self {
            kind: CrsKind::Projected(projection),
            ..Self::geographic(datum, ellipsoid)
        }
    }

    pub fn from_epsg(epsg: EpsgCode) -> Result<Self, ProjectionError> {
        let crs = match epsg {
            EPSG_WGS84_GEOGRAPHIC_2D | EPSG_WGS84_GEOGRAPHIC_3D => {
                Self::geographic(DATUM_WGS84, ellipsoid::wgs84())
            }
            EPSG_WGS84_GEOCENTRIC => Self::geocentric(DATUM_WGS84, ellipsoid::wgs84()),
            EPSG_NAD83_GEOGRAPHIC => Self::geographic(DATUM_NAD83, ellipsoid::grs80()),
            EPSG_NAD27_GEOGRAPHIC => Self::geographic(DATUM_NAD27, ellipsoid::clarke1866()),
            EPSG_NAD83_CSRS_GEOGRAPHIC => Self::geographic(DATUM_NAD83_CSRS, ellipsoid::grs80()),
            EPSG_JGD2011_GEOGRAPHIC_2D | EPSG_JGD2011_GEOGRAPHIC_3D => {
                Self::geographic(DATUM_JGD2011, ellipsoid::grs80())
            }
            EPSG_JGD2000_GEOGRAPHIC => Self::geographic(DATUM_JGD2000, ellipsoid::grs80()),
            EPSG_TOKYO_GEOGRAPHIC => Self::geographic(DATUM_TOKYO, ellipsoid::bessel1841()),
            EPSG_JGD2011_JPRECT_I..=EPSG_JGD2011_JPRECT_XIX => {
                let zone = JPRZone::from_epsg(epsg).ok_or(ProjectionError::UnsupportedCrs(epsg))?;
                Self::projected(DATUM_JGD2011, ellipsoid::grs80(), zone.projection())
            }
            32601..=32660 => Self::utm(DATUM_WGS84, ellipsoid::wgs84(), (epsg - 32600) as u8, true),
            32701..=32760 => {
                Self::utm(DATUM_WGS84, ellipsoid::wgs84(), (epsg - 32700) as u8, false)
            }
            26901..=26923 => Self::utm(DATUM_NAD83, ellipsoid::grs80(), (epsg - 26900) as u8, true),
            26703..=26722 => {
                Self::utm(DATUM_NAD27, ellipsoid::clarke1866(), (epsg - 26700) as u8, true)
            }
            _ => return Err(ProjectionError::UnsupportedCrs(epsg)),
        };
        Ok(Self {
            epsg: Some(epsg),
            ..crs
        })
    }

    fn utm(datum: &str, ellipsoid: Ellipsoid, zone: u8, north: bool) -> Self {
        let lng0 = -183.0 + 6.0 * zone as f64;
        let false_northing = if north { 0.0 } else { 10_000_000.0 };
        let projection = ExtendedTransverseMercatorProjection::new(lng0, 0.0, 0.9996, &ellipsoid)
            .with_false_origin(500_000.0, false_northing);
        Self::projected(datum, ellipsoid, projection)
    }

    pub fn is_projected(&self) -> bool {
        matches!(self.kind, CrsKind::Projected(_))
    }

    /// Converts a coordinate expressed in this CRS into geographic
    /// (lng, lat, height) on this CRS's datum.
    pub fn to_geographic(&self, x: f64, y: f64, z: f64) -> Result<(f64, f64, f64), ProjectionError> {
        let (lng, lat, height) = match &self.kind {
            CrsKind::Geographic => (x, y, z),
            CrsKind::Geocentric => geocentric_to_geodetic(&self.ellipsoid, x, y, z),
            CrsKind::Projected(projection) => projection.project_inverse(x, y, z)?,
        };
        check_geographic(lng, lat)?;
        Ok((lng, lat, height))
    }

    /// Converts geographic (lng, lat, height) on this CRS's datum into this CRS.
    pub fn from_geographic(
        &self,
        lng: f64,
        lat: f64,
        height: f64,
    ) -> Result<(f64, f64, f64), ProjectionError> {
        check_geographic(lng, lat)?;
        match &self.kind {
            CrsKind::Geographic => Ok((lng, lat, height)),
            CrsKind::Geocentric => Ok(geodetic_to_geocentric(&self.ellipsoid, lng, lat, height)),
            CrsKind::Projected(projection) => projection.project_forward(lng, lat, height),
        }
    }
}

fn check_geographic(lng: f64, lat: f64) -> Result<(), ProjectionError> {
    if lng.is_finite() && lat.is_finite() && lat.abs() <= 90.0 && lng.abs() <= 540.0 {
        Ok(())
    } else {
        Err(ProjectionError::InvalidCoordinate { lng, lat })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_resolve() {
        assert_eq!(Crs::from_epsg(4326).unwrap().datum, DATUM_WGS84);
        assert_eq!(Crs::from_epsg(4267).unwrap().datum, DATUM_NAD27);
        assert_eq!(Crs::from_epsg(6677).unwrap().datum, DATUM_JGD2011);
        assert!(Crs::from_epsg(6677).unwrap().is_projected());
        assert!(Crs::from_epsg(32654).unwrap().is_projected());
        assert!(Crs::from_epsg(26910).unwrap().is_projected());
        assert_eq!(
            Crs::from_epsg(3857),
            Err(ProjectionError::UnsupportedCrs(3857))
        );
    }

    #[test]
    fn utm_south_uses_false_northing() {
        let crs = Crs::from_epsg(32756).unwrap();
        let (_, y, _) = crs.from_geographic(153.0, 0.0, 0.0).unwrap();
        assert!((y - 10_000_000.0).abs() < 1e-6);
    }

    #[test]
    fn geographic_rejects_invalid_latitude() {
        let crs = Crs::from_epsg(EPSG_WGS84_GEOGRAPHIC_3D).unwrap();
        assert!(matches!(
            crs.to_geographic(10.0, 95.0, 0.0),
            Err(ProjectionError::InvalidCoordinate { .. })
        ));
        assert!(crs.to_geographic(f64::NAN, 0.0, 0.0).is_err());
    }

    #[test]
    fn geocentric_round_trip_through_crs() {
        let crs = Crs::from_epsg(EPSG_WGS84_GEOCENTRIC).unwrap();
        let (x, y, z) = crs.from_geographic(139.0, 35.0, 100.0).unwrap();
        let (lng, lat, h) = crs.to_geographic(x, y, z).unwrap();
        assert!((lng - 139.0).abs() < 1e-9);
        assert!((lat - 35.0).abs() < 1e-9);
        assert!((h - 100.0).abs() < 1e-6);
    }
}
