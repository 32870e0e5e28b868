//! Numeric helpers shared by the envelope and simulation code.

pub mod binary_search;
pub mod distance_average;
pub mod float_cmp;
pub mod range_map;

pub use binary_search::DoubleBinarySearch;
pub use distance_average::DistanceAverage;
pub use float_cmp::{are_positions_equal, are_speeds_equal, are_times_equal, CmpOperator};
pub use range_map::DoubleRangeMap;
