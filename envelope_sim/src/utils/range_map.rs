//! Step functions over position ranges, such as grade profiles.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Included, Unbounded};

use ordered_float::OrderedFloat;

#[derive(Clone, Copy, Debug, PartialEq)]
struct RangeValue {
    end: f64,
    value: f64,
}

/// A map from disjoint `[begin, end)` ranges to values.
///
/// Inserting a range overwrites whatever it overlaps, splitting the ranges it only
/// partially covers. Positions outside of every range have no value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DoubleRangeMap {
    ranges: BTreeMap<OrderedFloat<f64>, RangeValue>,
}

impl DoubleRangeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map from `n + 1` breakpoints and `n` values.
    pub fn from_breakpoints(positions: &[f64], values: &[f64]) -> Option<Self> {
        if positions.len() != values.len() + 1 {
            return None;
        }
        let mut map = Self::new();
        for (bounds, &value) in positions.windows(2).zip(values) {
            if bounds[1] < bounds[0] {
                return None;
            }
            map.put(bounds[0], bounds[1], value);
        }
        Some(map)
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Sets `value` on `[begin, end)`. Empty ranges are ignored.
    pub fn put(&mut self, begin: f64, end: f64, value: f64) {
        if !(begin < end) {
            return;
        }

        // a range starting before `begin` may need to be cut in two
        let before = self
            .ranges
            .range((Unbounded, Excluded(OrderedFloat(begin))))
            .next_back()
            .map(|(&key, &range)| (key, range));
        if let Some((key, range)) = before {
            if range.end > begin {
                self.ranges.insert(
                    key,
                    RangeValue {
                        end: begin,
                        value: range.value,
                    },
                );
                if range.end > end {
                    self.ranges.insert(
                        OrderedFloat(end),
                        RangeValue {
                            end: range.end,
                            value: range.value,
                        },
                    );
                }
            }
        }

        // ranges starting inside the new one are removed, keeping their tail
        let covered: Vec<(OrderedFloat<f64>, RangeValue)> = self
            .ranges
            .range((Included(OrderedFloat(begin)), Excluded(OrderedFloat(end))))
            .map(|(&key, &range)| (key, range))
            .collect();
        for (key, range) in covered {
            self.ranges.remove(&key);
            if range.end > end {
                self.ranges.insert(
                    OrderedFloat(end),
                    RangeValue {
                        end: range.end,
                        value: range.value,
                    },
                );
            }
        }

        self.ranges.insert(OrderedFloat(begin), RangeValue { end, value });
    }

    /// The value of the range holding `position`.
    ///
    /// Ranges are half-open, except that the end of a range with no successor
    /// still maps to its value.
    pub fn value_at(&self, position: f64) -> Option<f64> {
        let (_, range) = self
            .ranges
            .range((Unbounded, Included(OrderedFloat(position))))
            .next_back()?;
        if position <= range.end {
            Some(range.value)
        } else {
            None
        }
    }

    /// Integral of the step function over `[begin, end]`. Gaps count as zero.
    pub fn integrate(&self, begin: f64, end: f64) -> f64 {
        if !(begin < end) {
            return 0.0;
        }
        self.overlapping(begin, end)
            .map(|(range_begin, range_end, value)| {
                (range_end.min(end) - range_begin.max(begin)) * value
            })
            .sum()
    }

    /// Smallest value among the ranges intersecting `[begin, end]`.
    pub fn min_value(&self, begin: f64, end: f64) -> Option<f64> {
        if begin >= end {
            return self.value_at(begin);
        }
        self.overlapping(begin, end)
            .map(|(_, _, value)| value)
            .fold(None, |acc: Option<f64>, value| {
                Some(acc.map_or(value, |acc| acc.min(value)))
            })
    }

    /// Iterates over `(begin, end, value)` in increasing position order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
        self.ranges
            .iter()
            .map(|(begin, range)| (begin.into_inner(), range.end, range.value))
    }

    fn overlapping(&self, begin: f64, end: f64) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
        let first_key = self
            .ranges
            .range((Unbounded, Included(OrderedFloat(begin))))
            .next_back()
            .map(|(&key, _)| key)
            .unwrap_or(OrderedFloat(begin));
        self.ranges
            .range((Included(first_key), Excluded(OrderedFloat(end))))
            .map(|(key, range)| (key.into_inner(), range.end, range.value))
            .filter(move |&(_, range_end, _)| range_end > begin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_splits_overlapped_ranges() {
        let mut map = DoubleRangeMap::new();
        map.put(0.0, 10.0, 1.0);
        map.put(4.0, 6.0, 2.0);
        let ranges: Vec<_> = map.iter().collect();
        assert_eq!(
            ranges,
            vec![(0.0, 4.0, 1.0), (4.0, 6.0, 2.0), (6.0, 10.0, 1.0)]
        );

        map.put(2.0, 8.0, 3.0);
        let ranges: Vec<_> = map.iter().collect();
        assert_eq!(
            ranges,
            vec![(0.0, 2.0, 1.0), (2.0, 8.0, 3.0), (8.0, 10.0, 1.0)]
        );
    }

    #[test]
    fn test_value_at_boundaries() {
        let map = DoubleRangeMap::from_breakpoints(&[0.0, 5.0, 10.0], &[1.0, -2.0]).unwrap();
        assert_eq!(map.value_at(-1.0), None);
        assert_eq!(map.value_at(0.0), Some(1.0));
        assert_eq!(map.value_at(5.0), Some(-2.0));
        assert_eq!(map.value_at(10.0), Some(-2.0));
        assert_eq!(map.value_at(10.5), None);
    }

    #[test]
    fn test_integrate_and_min() {
        let map = DoubleRangeMap::from_breakpoints(&[0.0, 5.0, 10.0], &[1.0, -2.0]).unwrap();
        assert!((map.integrate(0.0, 10.0) - (5.0 - 10.0)).abs() < 1e-12);
        assert!((map.integrate(4.0, 6.0) - (1.0 - 2.0)).abs() < 1e-12);
        assert!((map.integrate(-5.0, 1.0) - 1.0).abs() < 1e-12);
        assert_eq!(map.integrate(3.0, 3.0), 0.0);
        assert_eq!(map.min_value(0.0, 4.0), Some(1.0));
        assert_eq!(map.min_value(4.0, 6.0), Some(-2.0));
        assert_eq!(map.min_value(5.0, 5.0), Some(-2.0));
    }

    #[test]
    fn test_mismatched_breakpoints() {
        assert!(DoubleRangeMap::from_breakpoints(&[0.0, 1.0], &[1.0, 2.0]).is_none());
        assert!(DoubleRangeMap::from_breakpoints(&[0.0, 2.0, 1.0], &[1.0, 2.0]).is_none());
    }
}
