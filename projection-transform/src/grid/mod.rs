//! Regular grids of datum shift vectors.

pub mod cache;
pub mod format;

use crate::error::{GridError, OutOfCoverage};

// Relative rounding slack, in ulps, allowed when locating a position on
// an edge node.
const EDGE_ULPS: f64 = 4.0;

/// One grid node. Shifts and accuracies are in degrees, heights in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GridCell {
    pub shift_lng: f64,
    pub shift_lat: f64,
    pub shift_height: f64,
    pub accuracy_lng: f64,
    pub accuracy_lat: f64,
    pub accuracy_height: f64,
}

impl GridCell {
    fn shift(&self) -> GridShift {
        GridShift {
            lng: self.shift_lng,
            lat: self.shift_lat,
            height: self.shift_height,
        }
    }
}

/// Interpolated shift at a location.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GridShift {
    pub lng: f64,
    pub lat: f64,
    pub height: f64,
}

/// Node layout of a grid: south-west origin, step and node counts per axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridExtent {
    pub lat_origin: f64,
    pub lng_origin: f64,
    pub lat_step: f64,
    pub lng_step: f64,
    pub rows: usize,
    pub columns: usize,
}

impl GridExtent {
    pub fn lat_max(&self) -> f64 {
        self.lat_origin + (self.rows - 1) as f64 * self.lat_step
    }

    pub fn lng_max(&self) -> f64 {
        self.lng_origin + (self.columns - 1) as f64 * self.lng_step
    }
}

/// An immutable shift grid. Cells are row-major, starting at the southern
/// row and running west to east.
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftGrid {
    identifier: String,
    source_datum: String,
    target_datum: String,
    extent: GridExtent,
    cells: Vec<GridCell>,
}

impl ShiftGrid {
    pub fn new(
        identifier: &str,
        extent: GridExtent,
        cells: Vec<GridCell>,
    ) -> Result<Self, GridError> {
        if extent.rows < 2 || extent.columns < 2 {
            return Err(GridError::corrupt(
                identifier,
                format!("{} x {} nodes, at least 2 x 2 required", extent.rows, extent.columns),
            ));
        }
        let steps_valid = extent.lat_step.is_finite()
            && extent.lng_step.is_finite()
            && extent.lat_step > 0.0
            && extent.lng_step > 0.0;
        if !steps_valid || !extent.lat_origin.is_finite() || !extent.lng_origin.is_finite() {
            return Err(GridError::corrupt(identifier, "invalid origin or step"));
        }
        let expected = extent.rows.checked_mul(extent.columns).ok_or_else(|| {
            GridError::corrupt(identifier, format!("{} x {} nodes overflow", extent.rows, extent.columns))
        })?;
        if cells.len() != expected {
            return Err(GridError::corrupt(
                identifier,
                format!("{} cells present, {expected} declared", cells.len()),
            ));
        }

        Ok(Self {
            identifier: identifier.to_string(),
            source_datum: String::new(),
            target_datum: String::new(),
            extent,
            cells,
        })
    }

    pub fn with_datums(mut self, source: &str, target: &str) -> Self {
        self.source_datum = source.to_string();
        self.target_datum = target.to_string();
        self
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn source_datum(&self) -> &str {
        &self.source_datum
    }

    pub fn target_datum(&self) -> &str {
        &self.target_datum
    }

    pub fn extent(&self) -> &GridExtent {
        &self.extent
    }

    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&GridCell> {
        if row >= self.extent.rows || column >= self.extent.columns {
            return None;
        }
        self.cells.get(row * self.extent.columns + column)
    }

    /// Area of one grid cell in square degrees; smaller is finer.
    pub fn resolution(&self) -> f64 {
        self.extent.lat_step * self.extent.lng_step
    }

    pub fn covers(&self, lng: f64, lat: f64) -> bool {
        self.locate(lng, lat).is_some()
    }

    /// Bilinear interpolation of the four surrounding nodes. On a node, or
    /// along an axis whose position has no fractional part, the node value is
    /// used directly.
    ///
    /// A position past an edge by no more than the rounding error of
    /// `(value - origin) / step` is taken to lie on that edge; anything
    /// further out is `OutOfCoverage`.
    pub fn sample(&self, lng: f64, lat: f64) -> Result<GridShift, OutOfCoverage> {
        let ((column, fx), (row, fy)) = self.locate(lng, lat).ok_or(OutOfCoverage { lng, lat })?;

        let node = |row: usize, column: usize| self.cells[row * self.extent.columns + column];
        if fx == 0.0 && fy == 0.0 {
            return Ok(node(row, column).shift());
        }

        let column1 = if fx > 0.0 { column + 1 } else { column };
        let row1 = if fy > 0.0 { row + 1 } else { row };
        let c00 = node(row, column).shift();
        let c01 = node(row, column1).shift();
        let c10 = node(row1, column).shift();
        let c11 = node(row1, column1).shift();

        let w00 = (1.0 - fx) * (1.0 - fy);
        let w01 = fx * (1.0 - fy);
        let w10 = (1.0 - fx) * fy;
        let w11 = fx * fy;
        let blend = |f: fn(&GridShift) -> f64| {
            w00 * f(&c00) + w01 * f(&c01) + w10 * f(&c10) + w11 * f(&c11)
        };

        Ok(GridShift {
            lng: blend(|s| s.lng),
            lat: blend(|s| s.lat),
            height: blend(|s| s.height),
        })
    }

    fn locate(&self, lng: f64, lat: f64) -> Option<((usize, f64), (usize, f64))> {
        let extent = &self.extent;
        let column = axis_position(lng, extent.lng_origin, extent.lng_step, extent.columns)?;
        let row = axis_position(lat, extent.lat_origin, extent.lat_step, extent.rows)?;
        Some((column, row))
    }
}

/// Node index and fractional offset along one axis; `None` when outside.
fn axis_position(value: f64, origin: f64, step: f64, count: usize) -> Option<(usize, f64)> {
    let last = (count - 1) as f64;
    let mut position = (value - origin) / step;
    let slack = EDGE_ULPS * f64::EPSILON * value.abs().max(origin.abs()).max(1.0) / step;
    if position.is_nan() || position < -slack || position > last + slack {
        return None;
    }
    position = position.clamp(0.0, last);

    let index = position.floor();
    if index >= last {
        return Some((count - 1, 0.0));
    }
    Some((index as usize, position - index))
}
