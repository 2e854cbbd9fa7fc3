use serde::Serialize;

// A real-world coordinate. Records store i32 values; the actual coordinates
// are calculated with the header's scale and offset:
// x = (x * scale[0]) + offset[0]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn to_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[f64; 3]> for Point {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self { x, y, z }
    }
}

// This represents the maximum and minimum values of the real-world
// coordinates obtained by combining the scale and offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingVolume {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Default for BoundingVolume {
    fn default() -> Self {
        Self::empty()
    }
}

impl BoundingVolume {
    pub fn empty() -> Self {
        Self {
            min: [f64::MAX; 3],
            max: [f64::MIN; 3],
        }
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|axis| self.min[axis] > self.max[axis])
    }

    pub fn extend(&mut self, point: &Point) {
        for (axis, value) in point.to_array().into_iter().enumerate() {
            self.min[axis] = self.min[axis].min(value);
            self.max[axis] = self.max[axis].max(value);
        }
    }

    pub fn contains(&self, point: &Point) -> bool {
        point
            .to_array()
            .into_iter()
            .enumerate()
            .all(|(axis, value)| self.min[axis] <= value && value <= self.max[axis])
    }
}

impl FromIterator<Point> for BoundingVolume {
    fn from_iter<I: IntoIterator<Item = Point>>(iter: I) -> Self {
        let mut bounds = Self::empty();
        for point in iter {
            bounds.extend(&point);
        }
        bounds
    }
}
