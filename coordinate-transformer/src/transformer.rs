use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use pcd_core::pointcloud::point::Point;
use projection_transform::{
    crs::{Crs, EpsgCode},
    grid::cache::ShiftGridCache,
    gridshift::{DatumShiftRegistry, GridShiftOperation, GridShiftSettings},
    ShiftError,
};
use rayon::prelude::*;

use crate::error::TransformError;

/// Transforms points between coordinate reference systems: source CRS to
/// geographic, datum shift, geographic to target CRS.
///
/// One grid shift operation is built per datum pair and reused.
pub struct CoordinateTransformer<'c> {
    cache: &'c ShiftGridCache,
    registry: DatumShiftRegistry,
    settings: GridShiftSettings,
    operations: Mutex<HashMap<(String, String), Arc<GridShiftOperation>>>,
}

impl CoordinateTransformer<'static> {
    /// Published grids resolved through the process-wide cache.
    pub fn global() -> Self {
        Self::new(
            ShiftGridCache::global(),
            DatumShiftRegistry::with_published_grids(),
        )
    }
}

impl<'c> CoordinateTransformer<'c> {
    pub fn new(cache: &'c ShiftGridCache, registry: DatumShiftRegistry) -> Self {
        Self {
            cache,
            registry,
            settings: GridShiftSettings::default(),
            operations: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_settings(mut self, settings: GridShiftSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn registry(&self) -> &DatumShiftRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &ShiftGridCache {
        self.cache
    }

    /// The shift between two datums, or `None` when coordinates pass
    /// through unchanged.
    pub fn operation(
        &self,
        source_datum: &str,
        target_datum: &str,
    ) -> Result<Option<Arc<GridShiftOperation>>, ShiftError> {
        if self.registry.are_aligned(source_datum, target_datum) {
            return Ok(None);
        }
        let key = (source_datum.to_string(), target_datum.to_string());
        if let Some(operation) = self.operations.lock().get(&key) {
            return Ok(Some(operation.clone()));
        }

        // Built unlocked: grid loads are serialized per grid by the cache.
        let operation = Arc::new(GridShiftOperation::from_registry(
            source_datum,
            target_datum,
            &self.registry,
            self.cache,
            self.settings,
        )?);
        log::debug!(
            "grid shift {} -> {} over {} grid(s)",
            source_datum,
            target_datum,
            operation.grids().len()
        );
        let operation = self
            .operations
            .lock()
            .entry(key)
            .or_insert(operation)
            .clone();
        Ok(Some(operation))
    }

    pub fn transform(&self, point: &Point, source: &Crs, target: &Crs) -> Result<Point, TransformError> {
        let (lng, lat, height) = source
            .to_geographic(point.x, point.y, point.z)
            .map_err(TransformError::Projection)?;

        let (lng, lat, height) = match self.operation(&source.datum, &target.datum)? {
            Some(operation) => operation.forward(lng, lat, height)?,
            None => (lng, lat, height),
        };

        let (x, y, z) = target
            .from_geographic(lng, lat, height)
            .map_err(TransformError::Reprojection)?;
        Ok(Point { x, y, z })
    }
}

/// A transform bound to one pair of EPSG codes.
pub enum PointTransformer<'a> {
    Identity,
    Pipeline {
        transformer: &'a CoordinateTransformer<'a>,
        source: Crs,
        target: Crs,
    },
}

impl<'a> PointTransformer<'a> {
    pub fn new(
        transformer: &'a CoordinateTransformer<'a>,
        input_epsg: EpsgCode,
        output_epsg: EpsgCode,
    ) -> Result<Self, TransformError> {
        if input_epsg == output_epsg {
            return Ok(Self::Identity);
        }

        let resolve = |epsg| Crs::from_epsg(epsg).map_err(|_| TransformError::UnsupportedCrs(epsg));
        let source = resolve(input_epsg)?;
        let target = resolve(output_epsg)?;
        // Fail early on pairs without a grid rather than on the first point.
        if transformer.operation(&source.datum, &target.datum)?.is_none() && source.datum != target.datum {
            log::debug!(
                "{} and {} are treated as aligned; EPSG:{} -> EPSG:{} applies no datum shift",
                source.datum,
                target.datum,
                input_epsg,
                output_epsg
            );
        }

        Ok(Self::Pipeline {
            transformer,
            source,
            target,
        })
    }

    pub fn transform(&self, point: &Point) -> Result<Point, TransformError> {
        match self {
            Self::Identity => Ok(*point),
            Self::Pipeline {
                transformer,
                source,
                target,
            } => transformer.transform(point, source, target),
        }
    }

    /// Transforms every point in parallel. On error the slice is left as it was.
    pub fn transform_points_in_place(&self, points: &mut [Point]) -> Result<(), TransformError> {
        if let Self::Identity = self {
            return Ok(());
        }
        let transformed = points
            .par_iter()
            .map(|point| self.transform(point))
            .collect::<Result<Vec<_>, _>>()?;
        points.copy_from_slice(&transformed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use projection_transform::{
        crs::{
            EPSG_JGD2011_GEOGRAPHIC_3D, EPSG_JGD2011_JPRECT_IX, EPSG_NAD27_GEOGRAPHIC,
            EPSG_NAD83_GEOGRAPHIC, EPSG_WGS84_GEOCENTRIC, EPSG_WGS84_GEOGRAPHIC_3D,
        },
        grid::{GridCell, GridExtent, ShiftGrid},
        GridError, ProjectionError,
    };

    use super::*;

    const SHIFT_LNG: f64 = 1e-3;
    const SHIFT_LAT: f64 = -2e-3;

    /// Constant NAD27 -> NAD83 shift over lng [-130, -120], lat [48, 55].
    fn pacific() -> Result<ShiftGrid, GridError> {
        let extent = GridExtent {
            lat_origin: 48.0,
            lng_origin: -130.0,
            lat_step: 1.0,
            lng_step: 1.0,
            rows: 8,
            columns: 11,
        };
        let cell = GridCell {
            shift_lng: SHIFT_LNG,
            shift_lat: SHIFT_LAT,
            ..Default::default()
        };
        ShiftGrid::new("pacific", extent, vec![cell; 88])
    }

    fn pacific_cache() -> ShiftGridCache {
        ShiftGridCache::new(|id: &str| match id {
            "pacific" => pacific(),
            _ => Err(GridError::NotFound(id.to_string())),
        })
    }

    fn pacific_registry() -> DatumShiftRegistry {
        let mut registry = DatumShiftRegistry::with_published_grids();
        registry.register("NAD27", "NAD83", ["pacific"]);
        registry
    }

    fn registry() -> DatumShiftRegistry {
        let mut registry = DatumShiftRegistry::new();
        registry.register("NAD27", "NAD83", ["pacific"]);
        registry.register_aligned("JGD2011", "WGS84");
        registry
    }

    #[test]
    fn identity_transform() {
        let cache = pacific_cache();
        let transformer = CoordinateTransformer::new(&cache, registry());
        let pt = PointTransformer::new(&transformer, EPSG_WGS84_GEOGRAPHIC_3D, EPSG_WGS84_GEOGRAPHIC_3D)
            .unwrap();
        let mut points = vec![Point::new(1.0, 2.0, 3.0)];
        pt.transform_points_in_place(&mut points).unwrap();
        assert_eq!(points[0], Point::new(1.0, 2.0, 3.0));
        assert!(cache.is_empty());
    }

    #[test]
    fn datum_shift_between_geographic_crs() {
        let cache = pacific_cache();
        let transformer = CoordinateTransformer::new(&cache, registry());
        let nad27 = Crs::from_epsg(EPSG_NAD27_GEOGRAPHIC).unwrap();
        let nad83 = Crs::from_epsg(EPSG_NAD83_GEOGRAPHIC).unwrap();

        let shifted = transformer
            .transform(&Point::new(-125.5, 51.5, 10.0), &nad27, &nad83)
            .unwrap();
        assert!((shifted.x - (-125.5 + SHIFT_LNG)).abs() < 1e-12);
        assert!((shifted.y - (51.5 + SHIFT_LAT)).abs() < 1e-12);
        assert_eq!(shifted.z, 10.0);

        // the reverse pair applies the same grid inversely
        let restored = transformer.transform(&shifted, &nad83, &nad27).unwrap();
        assert!((restored.x + 125.5).abs() < 1e-9);
        assert!((restored.y - 51.5).abs() < 1e-9);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn aligned_datums_pass_through_unshifted() {
        let cache = pacific_cache();
        let transformer = CoordinateTransformer::new(&cache, registry());
        let pt = PointTransformer::new(&transformer, EPSG_JGD2011_GEOGRAPHIC_3D, EPSG_WGS84_GEOGRAPHIC_3D)
            .unwrap();
        assert!(matches!(pt, PointTransformer::Pipeline { .. }));
        let point = Point::new(139.75, 35.68, 40.0);
        assert_eq!(pt.transform(&point).unwrap(), point);
        assert!(cache.is_empty());

        // without the alignment the pair has no operation at all
        let strict = CoordinateTransformer::new(&cache, DatumShiftRegistry::new());
        assert!(matches!(
            PointTransformer::new(&strict, EPSG_JGD2011_GEOGRAPHIC_3D, EPSG_WGS84_GEOGRAPHIC_3D),
            Err(TransformError::Shift(ShiftError::NoOperation { .. }))
        ));
    }

    #[test]
    fn operations_are_memoized() {
        let cache = pacific_cache();
        let transformer = CoordinateTransformer::new(&cache, registry());
        let first = transformer.operation("NAD27", "NAD83").unwrap().unwrap();
        let second = transformer.operation("NAD27", "NAD83").unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(transformer.operation("JGD2011", "WGS84").unwrap().is_none());
    }

    #[test]
    fn errors_are_tagged_by_stage() {
        let cache = pacific_cache();
        let transformer = CoordinateTransformer::new(&cache, registry());
        let nad27 = Crs::from_epsg(EPSG_NAD27_GEOGRAPHIC).unwrap();
        let nad83 = Crs::from_epsg(EPSG_NAD83_GEOGRAPHIC).unwrap();

        assert!(matches!(
            transformer.transform(&Point::new(-125.0, 95.0, 0.0), &nad27, &nad83),
            Err(TransformError::Projection(ProjectionError::InvalidCoordinate { .. }))
        ));
        assert!(matches!(
            transformer.transform(&Point::new(10.0, 10.0, 0.0), &nad27, &nad83),
            Err(TransformError::Shift(ShiftError::NoCoverage { .. }))
        ));

        // 95 degrees from the central meridian of zone 10
        let utm10 = Crs::from_epsg(26910).unwrap();
        let nad83_geo = Crs::from_epsg(EPSG_NAD83_GEOGRAPHIC).unwrap();
        assert!(matches!(
            transformer.transform(&Point::new(-28.0, 50.0, 0.0), &nad83_geo, &utm10),
            Err(TransformError::Reprojection(ProjectionError::OutOfDomain { .. }))
        ));
    }

    #[test]
    fn unregistered_pair_fails_at_construction() {
        let cache = pacific_cache();
        let transformer = CoordinateTransformer::new(&cache, registry());
        assert!(matches!(
            PointTransformer::new(&transformer, 4301, EPSG_WGS84_GEOGRAPHIC_3D),
            Err(TransformError::Shift(ShiftError::NoOperation { .. }))
        ));
        assert!(matches!(
            PointTransformer::new(&transformer, 1234, EPSG_WGS84_GEOGRAPHIC_3D),
            Err(TransformError::UnsupportedCrs(1234))
        ));
    }

    #[test]
    fn grid_load_failure_propagates() {
        let cache = ShiftGridCache::new(|id: &str| -> Result<ShiftGrid, GridError> {
            Err(GridError::NotFound(id.to_string()))
        });
        let transformer = CoordinateTransformer::new(&cache, pacific_registry());
        assert!(matches!(
            PointTransformer::new(&transformer, EPSG_NAD27_GEOGRAPHIC, EPSG_NAD83_GEOGRAPHIC),
            Err(TransformError::Shift(ShiftError::Grid(GridError::NotFound(_))))
        ));
    }

    #[test]
    fn jprect_to_geographic() {
        let cache = pacific_cache();
        let transformer = CoordinateTransformer::new(&cache, registry());
        let pt = PointTransformer::new(&transformer, EPSG_JGD2011_JPRECT_IX, EPSG_JGD2011_GEOGRAPHIC_3D)
            .unwrap();
        // the zone IX origin
        let origin = pt.transform(&Point::new(0.0, 0.0, 5.0)).unwrap();
        assert!((origin.x - (139.0 + 50.0 / 60.0)).abs() < 1e-9);
        assert!((origin.y - 36.0).abs() < 1e-9);
        assert_eq!(origin.z, 5.0);

        let to_wgs84 =
            PointTransformer::new(&transformer, EPSG_JGD2011_JPRECT_IX, EPSG_WGS84_GEOGRAPHIC_3D).unwrap();
        let p = Point::new(-5_000.0, 12_000.0, 40.0);
        let a = pt.transform(&p).unwrap();
        let b = to_wgs84.transform(&p).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn geocentric_round_trip() {
        let cache = pacific_cache();
        let transformer = CoordinateTransformer::new(&cache, registry());
        let to_ecef =
            PointTransformer::new(&transformer, EPSG_WGS84_GEOGRAPHIC_3D, EPSG_WGS84_GEOCENTRIC).unwrap();
        let back =
            PointTransformer::new(&transformer, EPSG_WGS84_GEOCENTRIC, EPSG_WGS84_GEOGRAPHIC_3D).unwrap();
        let p = Point::new(139.7, 35.6, 120.0);
        let ecef = to_ecef.transform(&p).unwrap();
        let q = back.transform(&ecef).unwrap();
        assert!((q.x - p.x).abs() < 1e-9);
        assert!((q.y - p.y).abs() < 1e-9);
        assert!((q.z - p.z).abs() < 1e-4);
    }

    #[test]
    fn bulk_transform_is_all_or_nothing() {
        let cache = pacific_cache();
        let transformer = CoordinateTransformer::new(&cache, registry());
        let pt = PointTransformer::new(&transformer, EPSG_NAD27_GEOGRAPHIC, EPSG_NAD83_GEOGRAPHIC).unwrap();

        let mut points: Vec<_> = (0..1_000)
            .map(|i| Point::new(-129.0 + i as f64 * 0.008, 49.0 + i as f64 * 0.005, i as f64))
            .collect();
        let original = points.clone();
        pt.transform_points_in_place(&mut points).unwrap();
        for (p, o) in points.iter().zip(&original) {
            assert!((p.x - (o.x + SHIFT_LNG)).abs() < 1e-12);
            assert!((p.y - (o.y + SHIFT_LAT)).abs() < 1e-12);
        }

        let mut with_outlier = original.clone();
        with_outlier[500] = Point::new(0.0, 0.0, 0.0);
        let snapshot = with_outlier.clone();
        assert!(pt.transform_points_in_place(&mut with_outlier).is_err());
        assert_eq!(with_outlier, snapshot);
    }
}
