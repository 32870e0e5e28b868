//! Tolerant floating point comparisons.

pub const POSITION_EPSILON: f64 = 1e-6;
pub const SPEED_EPSILON: f64 = 1e-6;
pub const TIME_EPSILON: f64 = 1e-6;

pub fn are_positions_equal(a: f64, b: f64) -> bool {
    (a - b).abs() < POSITION_EPSILON
}

pub fn are_speeds_equal(a: f64, b: f64) -> bool {
    (a - b).abs() < SPEED_EPSILON
}

pub fn are_times_equal(a: f64, b: f64) -> bool {
    (a - b).abs() < TIME_EPSILON
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOperator {
    StrictlyLower,
    Lower,
    Equal,
    Higher,
    StrictlyHigher,
}

impl CmpOperator {
    /// Evaluates `lhs <op> rhs`. `Equal` uses the speed tolerance.
    pub fn compare(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CmpOperator::StrictlyLower => lhs < rhs,
            CmpOperator::Lower => lhs <= rhs,
            CmpOperator::Equal => are_speeds_equal(lhs, rhs),
            CmpOperator::Higher => lhs >= rhs,
            CmpOperator::StrictlyHigher => lhs > rhs,
        }
    }

    /// The operator to use once both sides are swapped.
    pub fn flip(self) -> CmpOperator {
        match self {
            CmpOperator::StrictlyLower => CmpOperator::StrictlyHigher,
            CmpOperator::Lower => CmpOperator::Higher,
            CmpOperator::Equal => CmpOperator::Equal,
            CmpOperator::Higher => CmpOperator::Lower,
            CmpOperator::StrictlyHigher => CmpOperator::StrictlyLower,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tolerant_equality() {
        assert!(are_positions_equal(10.0, 10.0 + 1e-8));
        assert!(!are_positions_equal(10.0, 10.001));
        assert!(are_speeds_equal(3.0, 3.0 - 5e-7));
        assert!(are_times_equal(0.0, 1e-9));
    }

    #[test]
    fn test_cmp_operator() {
        assert!(CmpOperator::StrictlyLower.compare(1.0, 2.0));
        assert!(!CmpOperator::StrictlyLower.compare(2.0, 2.0));
        assert!(CmpOperator::Lower.compare(2.0, 2.0));
        assert!(CmpOperator::Equal.compare(2.0, 2.0 + 1e-9));
        assert!(CmpOperator::Higher.compare(2.0, 2.0));
        assert!(!CmpOperator::StrictlyHigher.compare(2.0, 2.0));
        for op in [CmpOperator::StrictlyLower, CmpOperator::Lower, CmpOperator::Higher] {
            assert_eq!(op.compare(1.0, 3.0), op.flip().compare(3.0, 1.0));
        }
    }
}
