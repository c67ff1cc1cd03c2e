use crate::geo::axis_offsets_m;
use crate::models::driver::GeoPoint;

pub const DEFAULT_MIN_MOVE_M: f64 = 5.0;

/// The path a vehicle has traveled, as drawn on a map. A point is recorded
/// only when it moved more than `min_move_m` along either axis from the last
/// recorded point, which keeps GPS jitter off the line.
#[derive(Debug, Clone)]
pub struct PathTrail {
    min_move_m: f64,
    points: Vec<GeoPoint>,
}

impl Default for PathTrail {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_MOVE_M)
    }
}

impl PathTrail {
    pub fn new(min_move_m: f64) -> Self {
        Self {
            min_move_m,
            points: Vec::new(),
        }
    }

    /// Returns whether the point was appended.
    pub fn record(&mut self, point: GeoPoint) -> bool {
        if let Some(last) = self.points.last() {
            let (north, east) = axis_offsets_m(last, &point);
            if north <= self.min_move_m && east <= self.min_move_m {
                return false;
            }
        }
        self.points.push(point);
        true
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}
