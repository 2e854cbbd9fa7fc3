//! Datum shifts driven by one or more shift grids.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{
    error::ShiftError,
    grid::{cache::ShiftGridCache, GridShift, ShiftGrid},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridShiftSettings {
    /// Upper bound on fixed-point iterations when inverting a shift.
    pub max_iterations: usize,
    /// Convergence threshold for the inverse, in degrees.
    pub tolerance: f64,
}

impl Default for GridShiftSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            tolerance: 1e-9,
        }
    }
}

/// Which grids shift coordinates from one datum to another.
#[derive(Debug, Clone, Default)]
pub struct DatumShiftRegistry {
    entries: HashMap<(String, String), Vec<String>>,
    // pairs whose coordinates are used unshifted
    aligned: HashSet<(String, String)>,
}

impl DatumShiftRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with well-known published grids.
    pub fn with_published_grids() -> Self {
        use crate::crs::{DATUM_JGD2000, DATUM_JGD2011, DATUM_NAD27, DATUM_NAD83, DATUM_WGS84};

        let mut registry = Self::new();
        registry.register(DATUM_NAD27, DATUM_NAD83, ["ntv2_0.gsb"]);
        // ballpark equivalences, good to a couple of metres
        registry.register_aligned(DATUM_WGS84, DATUM_JGD2011);
        registry.register_aligned(DATUM_WGS84, DATUM_JGD2000);
        registry.register_aligned(DATUM_WGS84, DATUM_NAD83);
        registry
    }

    /// Treats two datums as coincident: no grid is applied between them.
    pub fn register_aligned(&mut self, datum_a: &str, datum_b: &str) -> &mut Self {
        self.aligned
            .insert((datum_a.to_string(), datum_b.to_string()));
        self
    }

    pub fn are_aligned(&self, datum_a: &str, datum_b: &str) -> bool {
        datum_a == datum_b
            || self.aligned.contains(&(datum_a.to_string(), datum_b.to_string()))
            || self.aligned.contains(&(datum_b.to_string(), datum_a.to_string()))
    }

    pub fn register<I, S>(&mut self, source_datum: &str, target_datum: &str, grids: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries
            .entry((source_datum.to_string(), target_datum.to_string()))
            .or_default()
            .extend(grids.into_iter().map(Into::into));
        self
    }

    /// Grid identifiers for the pair, and whether they were registered in
    /// the opposite direction.
    pub fn grids_for(&self, source_datum: &str, target_datum: &str) -> Option<(&[String], bool)> {
        let key = |a: &str, b: &str| (a.to_string(), b.to_string());
        if let Some(grids) = self.entries.get(&key(source_datum, target_datum)) {
            return Some((grids, false));
        }
        self.entries
            .get(&key(target_datum, source_datum))
            .map(|grids| (grids.as_slice(), true))
    }
}

/// Shifts geographic coordinates between two datums.
///
/// Grids are consulted finest first; the first one covering a point
/// supplies its shift.
#[derive(Debug, Clone)]
pub struct GridShiftOperation {
    source_datum: String,
    target_datum: String,
    grids: Vec<Arc<ShiftGrid>>,
    reversed: bool,
    settings: GridShiftSettings,
}

impl GridShiftOperation {
    pub fn new(
        source_datum: &str,
        target_datum: &str,
        mut grids: Vec<Arc<ShiftGrid>>,
        settings: GridShiftSettings,
    ) -> Self {
        grids.sort_by(|a, b| a.resolution().total_cmp(&b.resolution()));
        Self {
            source_datum: source_datum.to_string(),
            target_datum: target_datum.to_string(),
            grids,
            reversed: false,
            settings,
        }
    }

    pub fn from_registry(
        source_datum: &str,
        target_datum: &str,
        registry: &DatumShiftRegistry,
        cache: &ShiftGridCache,
        settings: GridShiftSettings,
    ) -> Result<Self, ShiftError> {
        let (identifiers, reversed) =
            registry
                .grids_for(source_datum, target_datum)
                .ok_or_else(|| ShiftError::NoOperation {
                    source_datum: source_datum.to_string(),
                    target_datum: target_datum.to_string(),
                })?;

        let grids = identifiers
            .iter()
            .map(|id| cache.get(id))
            .collect::<Result<Vec<_>, _>>()?;

        log::debug!(
            "grid shift {} -> {} using {:?}{}",
            source_datum,
            target_datum,
            identifiers,
            if reversed { " (inverse)" } else { "" }
        );
        let mut operation = Self::new(source_datum, target_datum, grids, settings);
        operation.reversed = reversed;
        Ok(operation)
    }

    pub fn source_datum(&self) -> &str {
        &self.source_datum
    }

    pub fn target_datum(&self) -> &str {
        &self.target_datum
    }

    /// Candidate grids, finest first.
    pub fn grids(&self) -> &[Arc<ShiftGrid>] {
        &self.grids
    }

    /// Source datum to target datum.
    pub fn forward(&self, lng: f64, lat: f64, height: f64) -> Result<(f64, f64, f64), ShiftError> {
        if self.reversed {
            self.unshift(lng, lat, height)
        } else {
            self.shift(lng, lat, height)
        }
    }

    /// Target datum back to source datum.
    pub fn inverse(&self, lng: f64, lat: f64, height: f64) -> Result<(f64, f64, f64), ShiftError> {
        if self.reversed {
            self.shift(lng, lat, height)
        } else {
            self.unshift(lng, lat, height)
        }
    }

    fn shift_at(&self, lng: f64, lat: f64) -> Result<GridShift, ShiftError> {
        self.grids
            .iter()
            .find_map(|grid| grid.sample(lng, lat).ok())
            .ok_or(ShiftError::NoCoverage { lng, lat })
    }

    fn shift(&self, lng: f64, lat: f64, height: f64) -> Result<(f64, f64, f64), ShiftError> {
        let shift = self.shift_at(lng, lat)?;
        Ok((lng + shift.lng, lat + shift.lat, height + shift.height))
    }

    // Fixed-point iteration: find p such that shift(p) == target.
    fn unshift(&self, lng: f64, lat: f64, height: f64) -> Result<(f64, f64, f64), ShiftError> {
        let (mut est_lng, mut est_lat) = (lng, lat);
        let mut residual = f64::INFINITY;

        for _ in 0..self.settings.max_iterations {
            let shift = self.shift_at(est_lng, est_lat)?;
            let d_lng = est_lng + shift.lng - lng;
            let d_lat = est_lat + shift.lat - lat;
            residual = d_lng.abs().max(d_lat.abs());
            if residual < self.settings.tolerance {
                return Ok((est_lng, est_lat, height - shift.height));
            }
            est_lng -= d_lng;
            est_lat -= d_lat;
        }

        Err(ShiftError::ConvergenceFailure {
            iterations: self.settings.max_iterations,
            residual,
        })
    }
}
