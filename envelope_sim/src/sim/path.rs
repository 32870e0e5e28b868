use crate::utils::DoubleRangeMap;
use crate::EnvelopeSimError;

/// The physical properties of the path a train runs on.
///
/// Grades are in meters per kilometer, positive uphill.
pub trait PhysicsPath {
    fn length(&self) -> f64;

    /// Mean grade over `[begin, end]`, or the grade at `begin` when the range is empty.
    fn average_grade(&self, begin: f64, end: f64) -> f64;

    /// Lowest grade over `[begin, end]`, the worst case for braking.
    fn lowest_grade(&self, begin: f64, end: f64) -> f64;
}

/// A path made of constant grade ranges.
#[derive(Clone, Debug, PartialEq)]
pub struct EnvelopeSimPath {
    length: f64,
    grades: DoubleRangeMap,
}

impl EnvelopeSimPath {
    /// Builds a path from the positions where the grade changes and the grade between
    /// each pair of them. Positions must start at 0, end at `length` and increase.
    pub fn new(length: f64, grade_positions: &[f64], grade_values: &[f64]) -> Result<Self, EnvelopeSimError> {
        if !(length.is_finite() && length > 0.0) {
            return Err(EnvelopeSimError::InvalidParameter(format!(
                "path length must be positive, got {length}"
            )));
        }
        if grade_positions.first() != Some(&0.0) || grade_positions.last() != Some(&length) {
            return Err(EnvelopeSimError::InvalidParameter(
                "grade positions must span the whole path".to_string(),
            ));
        }
        if grade_positions.windows(2).any(|w| w[1] <= w[0]) {
            return Err(EnvelopeSimError::InvalidParameter(
                "grade positions must be strictly increasing".to_string(),
            ));
        }
        let grades = DoubleRangeMap::from_breakpoints(grade_positions, grade_values).ok_or_else(|| {
            EnvelopeSimError::InvalidParameter(format!(
                "expected {} grade values, got {}",
                grade_positions.len().saturating_sub(1),
                grade_values.len()
            ))
        })?;
        Ok(Self { length, grades })
    }

    pub fn flat(length: f64) -> Result<Self, EnvelopeSimError> {
        Self::new(length, &[0.0, length], &[0.0])
    }

    /// Builds a flat path, then applies each `(begin, end, grade)` range over it.
    /// Later ranges overwrite earlier ones.
    pub fn from_grade_ranges(length: f64, ranges: &[(f64, f64, f64)]) -> Result<Self, EnvelopeSimError> {
        let mut path = Self::flat(length)?;
        for &(begin, end, grade) in ranges {
            if begin < 0.0 || end > length || begin >= end {
                return Err(EnvelopeSimError::InvalidParameter(format!(
                    "grade range [{begin}, {end}] is not inside the path [0, {length}]"
                )));
            }
            path.grades.put(begin, end, grade);
        }
        Ok(path)
    }

    pub fn grades(&self) -> &DoubleRangeMap {
        &self.grades
    }

    fn clamp(&self, position: f64) -> f64 {
        position.clamp(0.0, self.length)
    }
}

impl PhysicsPath for EnvelopeSimPath {
    fn length(&self) -> f64 {
        self.length
    }

    fn average_grade(&self, begin: f64, end: f64) -> f64 {
        let (begin, end) = (self.clamp(begin), self.clamp(end));
        if begin >= end {
            return self.grades.value_at(begin).unwrap_or(0.0);
        }
        self.grades.integrate(begin, end) / (end - begin)
    }

    fn lowest_grade(&self, begin: f64, end: f64) -> f64 {
        let (begin, end) = (self.clamp(begin), self.clamp(end));
        self.grades.min_value(begin, end).unwrap_or(0.0)
    }
}
