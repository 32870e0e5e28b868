/// Running mean of a value weighted by the distance over which it holds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DistanceAverage {
    total_distance: f64,
    weighted_sum: f64,
}

impl DistanceAverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_segment(&mut self, distance: f64, value: f64) {
        self.total_distance += distance;
        self.weighted_sum += distance * value;
    }

    pub fn total_distance(&self) -> f64 {
        self.total_distance
    }

    /// `None` until a segment with a non-zero length was added.
    pub fn average(&self) -> Option<f64> {
        if self.total_distance == 0.0 {
            return None;
        }
        Some(self.weighted_sum / self.total_distance)
    }
}
