//! Japan Plane Rectangular Coordinate System (JGD2011), zones I–XIX.

use crate::{crs::EpsgCode, ellipsoid::grs80, etmerc::ExtendedTransverseMercatorProjection};

const SCALE_FACTOR: f64 = 0.9999;
const FIRST_ZONE_EPSG: EpsgCode = 6669;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JPRZone {
    I,
    II,
    III,
    IV,
    V,
    VI,
    VII,
    VIII,
    IX,
    X,
    XI,
    XII,
    XIII,
    XIV,
    XV,
    XVI,
    XVII,
    XVIII,
    XIX,
}

const ZONES: [JPRZone; 19] = [
    JPRZone::I,
    JPRZone::II,
    JPRZone::III,
    JPRZone::IV,
    JPRZone::V,
    JPRZone::VI,
    JPRZone::VII,
    JPRZone::VIII,
    JPRZone::IX,
    JPRZone::X,
    JPRZone::XI,
    JPRZone::XII,
    JPRZone::XIII,
    JPRZone::XIV,
    JPRZone::XV,
    JPRZone::XVI,
    JPRZone::XVII,
    JPRZone::XVIII,
    JPRZone::XIX,
];

impl JPRZone {
    pub fn from_epsg(epsg: EpsgCode) -> Option<Self> {
        let index = epsg.checked_sub(FIRST_ZONE_EPSG)? as usize;
        ZONES.get(index).copied()
    }

    pub fn epsg(&self) -> EpsgCode {
        FIRST_ZONE_EPSG + *self as EpsgCode
    }

    /// Origin as (longitude, latitude) in degrees.
    pub fn origin(&self) -> (f64, f64) {
        let (lat, lng_deg, lng_min) = match self {
            JPRZone::I => (33.0, 129.0, 30.0),
            JPRZone::II => (33.0, 131.0, 0.0),
            JPRZone::III => (36.0, 132.0, 10.0),
            JPRZone::IV => (33.0, 133.0, 30.0),
            JPRZone::V => (36.0, 134.0, 20.0),
            JPRZone::VI => (36.0, 136.0, 0.0),
            JPRZone::VII => (36.0, 137.0, 10.0),
            JPRZone::VIII => (36.0, 138.0, 30.0),
            JPRZone::IX => (36.0, 139.0, 50.0),
            JPRZone::X => (40.0, 140.0, 50.0),
            JPRZone::XI => (44.0, 140.0, 15.0),
            JPRZone::XII => (44.0, 142.0, 15.0),
            JPRZone::XIII => (44.0, 144.0, 15.0),
            JPRZone::XIV => (26.0, 142.0, 0.0),
            JPRZone::XV => (26.0, 127.0, 30.0),
            JPRZone::XVI => (26.0, 124.0, 0.0),
            JPRZone::XVII => (26.0, 131.0, 0.0),
            JPRZone::XVIII => (20.0, 136.0, 0.0),
            JPRZone::XIX => (26.0, 154.0, 0.0),
        };
        (lng_deg + lng_min / 60.0, lat)
    }

    pub fn projection(&self) -> ExtendedTransverseMercatorProjection {
        let (lng0, lat0) = self.origin();
        ExtendedTransverseMercatorProjection::new(lng0, lat0, SCALE_FACTOR, &grs80())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epsg_codes_map_to_zones() {
        assert_eq!(JPRZone::from_epsg(6669), Some(JPRZone::I));
        assert_eq!(JPRZone::from_epsg(6677), Some(JPRZone::IX));
        assert_eq!(JPRZone::from_epsg(6687), Some(JPRZone::XIX));
        assert_eq!(JPRZone::from_epsg(6688), None);
        assert_eq!(JPRZone::from_epsg(4326), None);
        assert_eq!(JPRZone::IX.epsg(), 6677);
    }

    #[test]
    fn zone_origin_projects_to_zero() {
        let zone = JPRZone::IX;
        let (lng, lat) = zone.origin();
        let (x, y, _) = zone.projection().project_forward(lng, lat, 0.0).unwrap();
        assert!(x.abs() < 1e-6);
        assert!(y.abs() < 1e-6);
    }
}
