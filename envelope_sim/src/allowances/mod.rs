//! Allowances: extra running time spread along a region of an envelope.
//!
//! The region is split into user ranges, each with its own [`AllowanceValue`]. Ranges are
//! computed one at a time, from the shortest to the longest base running time, and the
//! speeds at the edges of a computed range are imposed on its neighbors so that the result
//! stays continuous. Inside a range, sections between stops are computed independently,
//! each with a binary search on the free parameter of the distribution.

pub mod coasting;
pub mod linear;
pub mod mareco;
pub mod value;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::envelope::attrs::{EnvelopeAttrs, EnvelopeProfile, LimitSource};
use crate::envelope::builder::{ConstrainedEnvelopePartBuilder, EnvelopePartBuilder};
use crate::envelope::constraint::EnvelopeConstraint;
use crate::envelope::part::EnvelopePart;
use crate::envelope::speed_cap::EnvelopeSpeedCap;
use crate::envelope::{Envelope, EnvelopeBuilder};
use crate::pipelines::overlays;
use crate::sim::EnvelopeSimContext;
use crate::utils::{are_positions_equal, are_speeds_equal, DoubleBinarySearch};
use crate::EnvelopeSimError;

pub use value::{AllowanceRange, AllowanceValue};

/// Binary search attempts per section.
const MAX_ITERATIONS: usize = 20;

/// How the added time is spread inside a section.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AllowanceDistribution {
    /// Lower the cruise speed and coast where it costs the least energy.
    #[default]
    Mareco,
    /// Scale every speed by the same ratio.
    Linear,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Allowance {
    pub begin_pos: f64,
    pub end_pos: f64,
    /// Speed under which the train would use too much line capacity. Zero disables it.
    #[serde(default)]
    pub capacity_speed_limit: f64,
    /// Must tile `[begin_pos, end_pos]`, in order.
    pub ranges: Vec<AllowanceRange>,
    #[serde(default)]
    pub distribution: AllowanceDistribution,
}

impl Allowance {
    pub fn new(
        begin_pos: f64,
        end_pos: f64,
        capacity_speed_limit: f64,
        ranges: Vec<AllowanceRange>,
        distribution: AllowanceDistribution,
    ) -> Self {
        Self {
            begin_pos,
            end_pos,
            capacity_speed_limit,
            ranges,
            distribution,
        }
    }

    pub fn distance(&self) -> f64 {
        self.end_pos - self.begin_pos
    }

    /// Time the ranges add to `base`, in seconds.
    pub fn added_time(&self, base: &Envelope) -> f64 {
        self.ranges
            .iter()
            .map(|range| {
                let base_time = base.time_between(range.begin_pos, range.end_pos);
                range.value.allowance_time(base_time, range.distance())
            })
            .sum()
    }

    /// Total running time of `base` once the allowance is applied.
    pub fn target_time(&self, base: &Envelope) -> f64 {
        base.total_time() + self.added_time(base)
    }

    fn validate(&self) -> Result<(), EnvelopeSimError> {
        if !(self.begin_pos < self.end_pos) {
            return Err(EnvelopeSimError::InvalidParameter(format!(
                "allowance region [{}, {}] is empty",
                self.begin_pos, self.end_pos
            )));
        }
        if self.ranges.is_empty() {
            return Err(EnvelopeSimError::InvalidParameter(
                "an allowance needs at least one range".to_string(),
            ));
        }
        if !(self.capacity_speed_limit >= 0.0) {
            return Err(EnvelopeSimError::InvalidParameter(format!(
                "capacity speed limit must not be negative, got {}",
                self.capacity_speed_limit
            )));
        }

        let mut expected_begin = self.begin_pos;
        for range in &self.ranges {
            if !are_positions_equal(range.begin_pos, expected_begin) || !(range.begin_pos < range.end_pos) {
                return Err(self.range_out_of_bounds(range));
            }
            if range.value.is_negative() {
                return Err(EnvelopeSimError::InvalidParameter(format!(
                    "allowance value of range [{}, {}] is negative",
                    range.begin_pos, range.end_pos
                )));
            }
            expected_begin = range.end_pos;
        }
        if !are_positions_equal(expected_begin, self.end_pos) {
            let last = &self.ranges[self.ranges.len() - 1];
            return Err(self.range_out_of_bounds(last));
        }
        Ok(())
    }

    fn range_out_of_bounds(&self, range: &AllowanceRange) -> EnvelopeSimError {
        EnvelopeSimError::AllowanceRangeOutOfBounds {
            begin_pos: range.begin_pos,
            end_pos: range.end_pos,
            region_begin: self.begin_pos,
            region_end: self.end_pos,
        }
    }

    /// Applies the allowance to `base`. Parts outside of the allowance region are kept as is.
    pub fn apply(&self, base: &Envelope, context: &EnvelopeSimContext) -> Result<Envelope, EnvelopeSimError> {
        self.validate()?;
        if base.begin_pos() > self.begin_pos || base.end_pos() < self.end_pos {
            return Err(EnvelopeSimError::AllowanceOutOfBounds {
                begin_pos: self.begin_pos,
                end_pos: self.end_pos,
                envelope_begin: base.begin_pos(),
                envelope_end: base.end_pos(),
            });
        }

        let region = Envelope::new(base.slice(self.begin_pos, self.end_pos))?;
        let ranges = self.compute_region(&region, context)?;

        let mut builder = EnvelopeBuilder::new();
        builder.add_parts(base.slice(f64::NEG_INFINITY, self.begin_pos));
        for range in &ranges {
            builder.add_envelope(range);
        }
        builder.add_parts(base.slice(self.end_pos, f64::INFINITY));
        builder.build()
    }

    fn compute_region(&self, region: &Envelope, context: &EnvelopeSimContext) -> Result<Vec<Envelope>, EnvelopeSimError> {
        let range_count = self.ranges.len();
        let mut transition_speeds: Vec<Option<f64>> = vec![None; range_count + 1];
        transition_speeds[0] = Some(region.begin_speed());
        transition_speeds[range_count] = Some(region.end_speed());

        let base_times: Vec<f64> = self
            .ranges
            .iter()
            .map(|range| region.time_between(range.begin_pos, range.end_pos))
            .collect();
        let mut order: Vec<usize> = (0..range_count).collect();
        order.sort_by(|&a, &b| base_times[a].total_cmp(&base_times[b]));

        let region_time = region.total_time();
        let mut res: Vec<Option<Envelope>> = vec![None; range_count];
        for index in order {
            let range = &self.ranges[index];
            debug!(index, begin = range.begin_pos, end = range.end_pos, "computing allowance range");
            let range_envelope = Envelope::new(region.slice(range.begin_pos, range.end_pos))?;
            let tolerance = context.time_step * range_envelope.total_time() / region_time;
            let computed = self.compute_range(
                &range_envelope,
                context,
                &range.value,
                transition_speeds[index],
                transition_speeds[index + 1],
                tolerance,
            )?;
            transition_speeds[index] = Some(computed.begin_speed());
            transition_speeds[index + 1] = Some(computed.end_speed());
            res[index] = Some(computed);
        }
        Ok(res.into_iter().flatten().collect())
    }

    fn compute_range(
        &self,
        range_envelope: &Envelope,
        context: &EnvelopeSimContext,
        value: &AllowanceValue,
        imposed_begin_speed: Option<f64>,
        imposed_end_speed: Option<f64>,
        tolerance: f64,
    ) -> Result<Envelope, EnvelopeSimError> {
        let base_time = range_envelope.total_time();
        let base_distance = range_envelope.total_distance();
        let added_time = value.allowance_time(base_time, base_distance);
        if added_time == 0.0 {
            return Ok(range_envelope.clone());
        }

        let target_time = base_time + added_time;
        if self.capacity_speed_limit > 0.0 {
            let slowest = EnvelopeSpeedCap::from(
                range_envelope,
                EnvelopeAttrs::new().with(LimitSource::CapacitySpeedLimit),
                self.capacity_speed_limit,
            )?;
            if target_time > slowest.total_time() {
                return Err(EnvelopeSimError::AllowanceConvergenceTooMuchTime);
            }
        }

        let range_begin = range_envelope.begin_pos();
        let range_end = range_envelope.end_pos();
        let mut split_points = vec![range_begin];
        split_points.extend(
            range_envelope
                .iter()
                .filter(|part| part.end_speed() == 0.0)
                .map(|part| part.end_pos()),
        );
        if split_points[split_points.len() - 1] != range_end {
            split_points.push(range_end);
        }

        let mut builder = EnvelopeBuilder::new();
        for (index, bounds) in split_points.windows(2).enumerate() {
            let (section_begin, section_end) = (bounds[0], bounds[1]);
            let section = Envelope::new(range_envelope.slice(section_begin, section_end))?;
            let section_time = section.total_time();
            let ratio = value.section_ratio(section_time, base_time, section.total_distance(), base_distance);
            let section_target = section_time + added_time * ratio;

            let imposed_begin = if section_begin == range_begin { imposed_begin_speed } else { None };
            let imposed_end = if section_end == range_end { imposed_end_speed } else { None };
            debug!(index, begin = section_begin, end = section_end, target = section_target, "computing allowance section");
            let computed = self.compute_section(
                &section,
                context,
                section_target,
                imposed_begin,
                imposed_end,
                tolerance * ratio,
            )?;
            builder.add_envelope(&computed);
        }
        builder.build()
    }

    fn initial_bounds(&self, section: &Envelope, context: &EnvelopeSimContext) -> (f64, f64) {
        match self.distribution {
            AllowanceDistribution::Mareco => (
                mareco::initial_low_bound(self.capacity_speed_limit),
                mareco::initial_high_bound(section, context.rolling_stock),
            ),
            AllowanceDistribution::Linear => (
                linear::initial_low_bound(section, self.capacity_speed_limit),
                linear::initial_high_bound(),
            ),
        }
    }

    /// Searches the distribution parameter for which `section` runs in `target_time`.
    fn compute_section(
        &self,
        section: &Envelope,
        context: &EnvelopeSimContext,
        target_time: f64,
        imposed_begin_speed: Option<f64>,
        imposed_end_speed: Option<f64>,
        tolerance: f64,
    ) -> Result<Envelope, EnvelopeSimError> {
        let (low_bound, high_bound) = self.initial_bounds(section, context);
        // the capacity speed limit is above anything the train reaches
        if low_bound > high_bound {
            return Err(EnvelopeSimError::AllowanceConvergenceTooMuchTime);
        }

        let mut search = DoubleBinarySearch::new(low_bound, high_bound, target_time, tolerance, true);
        let mut last_error = None;
        for attempt in 1..=MAX_ITERATIONS {
            let input = search.input();
            match self.compute_iteration(section, context, input, imposed_begin_speed, imposed_end_speed) {
                Ok(envelope) => {
                    let time = envelope.total_time();
                    debug!(attempt, input, time, target_time, "allowance attempt");
                    search.feedback(time);
                    if search.complete() {
                        return Ok(envelope);
                    }
                }
                Err(err @ EnvelopeSimError::AllowanceConvergenceTooMuchTime) => {
                    debug!(attempt, input, "allowance attempt cannot go slow enough");
                    search.feedback(f64::INFINITY);
                    last_error = Some(err);
                }
                Err(err @ EnvelopeSimError::AllowanceConvergenceNotEnoughTime) => {
                    debug!(attempt, input, "allowance attempt cannot go fast enough");
                    search.feedback(0.0);
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(convergence_error(&search, last_error))
    }

    /// Builds the envelope of `section` for one value of the distribution parameter.
    ///
    /// The result is made of an optional left junction, the core of the distribution and
    /// an optional right junction. Junctions bring the speed from the imposed edge speeds
    /// to the core envelope.
    pub fn compute_iteration(
        &self,
        section: &Envelope,
        context: &EnvelopeSimContext,
        input: f64,
        imposed_begin_speed: Option<f64>,
        imposed_end_speed: Option<f64>,
    ) -> Result<Envelope, EnvelopeSimError> {
        let core = match self.distribution {
            AllowanceDistribution::Mareco => mareco::core(section, context, input)?,
            AllowanceDistribution::Linear => linear::core(section, input, self.capacity_speed_limit)?,
        };

        let left = left_junction(section, &core, context, imposed_begin_speed)?;
        let (left_end, left_end_speed) = match &left {
            Some(part) => (part.end_pos(), Some(part.end_speed())),
            None => (section.begin_pos(), imposed_begin_speed),
        };

        let mut with_left = Vec::new();
        with_left.extend(left.clone());
        with_left.extend(core.slice_with_speeds(left_end, left_end_speed, f64::INFINITY, None));
        let core_with_left = Envelope::new(with_left)?;

        let right = right_junction(section, &core_with_left, context, imposed_end_speed)?;
        let (right_begin, right_begin_speed) = match &right {
            Some(part) => (part.begin_pos(), Some(part.begin_speed())),
            None => (section.end_pos(), imposed_end_speed),
        };

        if right_begin <= left_end {
            return intersect_junctions(left, right);
        }

        let mut builder = EnvelopeBuilder::new();
        builder.add_parts(left);
        builder.add_parts(core.slice_with_speeds(left_end, left_end_speed, right_begin, right_begin_speed));
        builder.add_parts(right);
        builder.build()
    }
}

/// The error of a search that ran out of attempts. A failed iteration takes precedence
/// over the bounds the search moved.
fn convergence_error(search: &DoubleBinarySearch, last_error: Option<EnvelopeSimError>) -> EnvelopeSimError {
    if let Some(err) = last_error {
        err
    } else if !search.has_raised_low_bound() {
        EnvelopeSimError::AllowanceConvergenceTooMuchTime
    } else if !search.has_lowered_high_bound() {
        EnvelopeSimError::AllowanceConvergenceNotEnoughTime
    } else {
        EnvelopeSimError::AllowanceConvergenceDiscontinuity
    }
}

/// Slows down or speeds up from the imposed begin speed until the curve meets `target`.
fn left_junction(
    section: &Envelope,
    target: &Envelope,
    context: &EnvelopeSimContext,
    imposed_speed: Option<f64>,
) -> Result<Option<EnvelopePart>, EnvelopeSimError> {
    let Some(imposed_speed) = imposed_speed else {
        return Ok(None);
    };
    let target_speed = target.begin_speed();
    if are_speeds_equal(imposed_speed, target_speed) {
        return Ok(None);
    }
    // distribution cores never run faster than the section they slow down
    debug_assert!(
        target_speed <= section.begin_speed() || are_speeds_equal(target_speed, section.begin_speed()),
        "core begins at {target_speed}, above the section speed {}",
        section.begin_speed()
    );

    let position = section.begin_pos();
    let mut constraints = vec![EnvelopeConstraint::PositionRange {
        begin: section.begin_pos(),
        end: section.end_pos(),
    }];
    let mut part_builder = EnvelopePartBuilder::new();
    let last_intersection = if imposed_speed > target_speed {
        constraints.push(EnvelopeConstraint::EnvelopeFloor(target));
        let mut constrained = ConstrainedEnvelopePartBuilder::new(&mut part_builder, constraints);
        constrained.set_attr(EnvelopeProfile::Braking);
        overlays::decelerate(context, position, imposed_speed, &mut constrained, 1.0)?;
        constrained.last_intersection()
    } else {
        constraints.push(EnvelopeConstraint::EnvelopeCeiling(target));
        constraints.push(EnvelopeConstraint::EnvelopeCeiling(section));
        let mut constrained = ConstrainedEnvelopePartBuilder::new(&mut part_builder, constraints);
        constrained.set_attr(EnvelopeProfile::Accelerating);
        overlays::accelerate(context, position, imposed_speed, &mut constrained, 1.0)?;
        constrained.last_intersection()
    };
    // reached the end of the section without meeting the target
    if last_intersection == Some(0) {
        return Err(EnvelopeSimError::AllowanceConvergenceTooMuchTime);
    }
    part_builder.build()
}

/// Curve ending at the imposed end speed, coming from `target`.
fn right_junction(
    section: &Envelope,
    target: &Envelope,
    context: &EnvelopeSimContext,
    imposed_speed: Option<f64>,
) -> Result<Option<EnvelopePart>, EnvelopeSimError> {
    let Some(imposed_speed) = imposed_speed else {
        return Ok(None);
    };
    let target_speed = target.end_speed();
    if are_speeds_equal(imposed_speed, target_speed) {
        return Ok(None);
    }

    let position = section.end_pos();
    let mut constraints = vec![EnvelopeConstraint::PositionRange {
        begin: section.begin_pos(),
        end: section.end_pos(),
    }];
    let mut part_builder = EnvelopePartBuilder::new();
    let last_intersection = if imposed_speed > target_speed {
        constraints.push(EnvelopeConstraint::EnvelopeFloor(target));
        let mut constrained = ConstrainedEnvelopePartBuilder::new(&mut part_builder, constraints);
        constrained.set_attr(EnvelopeProfile::Accelerating);
        overlays::accelerate(context, position, imposed_speed, &mut constrained, -1.0)?;
        constrained.last_intersection()
    } else {
        constraints.push(EnvelopeConstraint::EnvelopeCeiling(target));
        let mut constrained = ConstrainedEnvelopePartBuilder::new(&mut part_builder, constraints);
        constrained.set_attr(EnvelopeProfile::Braking);
        overlays::decelerate(context, position, imposed_speed, &mut constrained, -1.0)?;
        constrained.last_intersection()
    };
    if last_intersection == Some(0) {
        return Err(EnvelopeSimError::AllowanceConvergenceTooMuchTime);
    }
    part_builder.build()
}

/// Joins junctions which overlap, leaving no room for the core.
fn intersect_junctions(
    left: Option<EnvelopePart>,
    right: Option<EnvelopePart>,
) -> Result<Envelope, EnvelopeSimError> {
    let (Some(left), Some(right)) = (left, right) else {
        return Err(EnvelopeSimError::AllowanceConvergenceTooMuchTime);
    };
    let sliced = left.slice_with_speeds(
        f64::NEG_INFINITY,
        None,
        right.begin_pos(),
        Some(right.begin_speed()),
    );
    match sliced {
        // the curves can miss each other when one of them is shorter than a time step
        Some(sliced) if sliced.end_pos() == right.begin_pos() => Envelope::new(vec![sliced, right]),
        _ => Err(EnvelopeSimError::AllowanceConvergenceTooMuchTime),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{check_shape, max_effort, transitions, Shape, TestSim};

    fn single_range(begin: f64, end: f64, value: AllowanceValue, capacity: f64, distribution: AllowanceDistribution) -> Allowance {
        Allowance::new(begin, end, capacity, vec![AllowanceRange::new(begin, end, value)], distribution)
    }

    #[test]
    fn test_mareco_flat_shape() {
        let sim = TestSim::flat(10_000.0);
        let context = sim.context(2.0);
        let base = max_effort(&context, 44.4, &[6000.0, 10_000.0]);
        let allowance = single_range(
            0.0,
            10_000.0,
            AllowanceValue::Percentage { percentage: 10.0 },
            0.0,
            AllowanceDistribution::Mareco,
        );
        let res = allowance.apply(&base, &context).unwrap();
        check_shape(
            &res,
            &[
                Shape::Increasing,
                Shape::Decreasing,
                Shape::Decreasing,
                Shape::Increasing,
                Shape::Decreasing,
                Shape::Decreasing,
            ],
        );
        assert!(res.is_continuous());
        let tolerance = 2.0 * res.max_speed() * context.time_step;
        for (position, expected) in transitions(&res)
            .into_iter()
            .zip([1411.0, 5094.0, 6000.0, 6931.0, 9339.0])
        {
            assert!(
                (position - expected).abs() < tolerance,
                "transition at {position}, expected {expected}"
            );
        }
        assert_eq!(res.part(1).profile(), Some(EnvelopeProfile::Coasting));
        assert_eq!(res.part(4).profile(), Some(EnvelopeProfile::Coasting));
    }

    #[test]
    fn test_reaches_target_time() {
        let sim = TestSim::flat(10_000.0);
        let context = sim.context(2.0);
        let base = max_effort(&context, 44.4, &[6000.0, 10_000.0]);
        for distribution in [AllowanceDistribution::Mareco, AllowanceDistribution::Linear] {
            let allowance = single_range(
                0.0,
                10_000.0,
                AllowanceValue::Percentage { percentage: 10.0 },
                0.0,
                distribution,
            );
            let target = allowance.target_time(&base);
            assert!((target - 1.1 * base.total_time()).abs() < 1e-9);
            let res = allowance.apply(&base, &context).unwrap();
            assert!(
                (res.total_time() - target).abs() <= 2.0 * context.time_step,
                "{distribution:?}: {} instead of {target}",
                res.total_time()
            );
            assert!(res.is_continuous());
            assert_eq!(res.begin_pos(), base.begin_pos());
            assert_eq!(res.end_pos(), base.end_pos());
            assert_eq!(res.end_speed(), 0.0);
        }
    }

    #[test]
    fn test_allowance_on_a_segment() {
        let sim = TestSim::flat(20_000.0);
        let context = sim.context(2.0);
        let base = max_effort(&context, 44.4, &[20_000.0]);
        for distribution in [AllowanceDistribution::Mareco, AllowanceDistribution::Linear] {
            let allowance = single_range(
                5000.0,
                15_000.0,
                AllowanceValue::FixedTime { seconds: 30.0 },
                8.33,
                distribution,
            );
            assert_eq!(allowance.added_time(&base), 30.0);
            let res = allowance.apply(&base, &context).unwrap();
            assert!(res.is_continuous());
            assert!(
                (res.interpolate_total_time(5000.0) - base.interpolate_total_time(5000.0)).abs() < 1e-6
            );
            let expected_end_time = base.interpolate_total_time(15_000.0) + 30.0;
            assert!(
                (res.interpolate_total_time(15_000.0) - expected_end_time).abs() <= 5.0 * context.time_step,
                "{distribution:?}: reached 15000 at {}",
                res.interpolate_total_time(15_000.0)
            );
            assert!((res.interpolate_speed(5000.0) - base.interpolate_speed(5000.0)).abs() < 1e-6);
            assert!((res.interpolate_speed(15_000.0) - base.interpolate_speed(15_000.0)).abs() < 1e-6);
            assert!(res.min_speed() >= 0.0);
        }
    }

    #[test]
    fn test_ranges_stay_continuous() {
        let sim = TestSim::flat(10_000.0);
        let context = sim.context(2.0);
        let base = max_effort(&context, 44.4, &[10_000.0]);
        let allowance = Allowance::new(
            0.0,
            10_000.0,
            0.0,
            vec![
                AllowanceRange::new(0.0, 5000.0, AllowanceValue::Percentage { percentage: 5.0 }),
                AllowanceRange::new(5000.0, 10_000.0, AllowanceValue::Percentage { percentage: 10.0 }),
            ],
            AllowanceDistribution::Mareco,
        );
        let res = allowance.apply(&base, &context).unwrap();
        assert!(res.is_continuous());
        let target = allowance.target_time(&base);
        assert!((res.total_time() - target).abs() <= 2.0 * context.time_step);
        let first_range_time = res.interpolate_total_time(5000.0);
        let expected = 1.05 * base.interpolate_total_time(5000.0);
        assert!((first_range_time - expected).abs() <= 2.0 * context.time_step);
    }

    #[test]
    fn test_zero_allowance_keeps_the_base() {
        let sim = TestSim::flat(10_000.0);
        let context = sim.context(2.0);
        let base = max_effort(&context, 44.4, &[10_000.0]);
        let allowance = single_range(
            0.0,
            10_000.0,
            AllowanceValue::Percentage { percentage: 0.0 },
            0.0,
            AllowanceDistribution::Mareco,
        );
        let res = allowance.apply(&base, &context).unwrap();
        assert!((res.total_time() - base.total_time()).abs() < 1e-9);
        assert_eq!(res.len(), base.len());
    }

    #[test]
    fn test_too_much_time() {
        let sim = TestSim::flat(20_000.0);
        let context = sim.context(2.0);
        let base = max_effort(&context, 44.4, &[20_000.0]);

        // slower than the capacity speed limit allows
        let allowance = single_range(
            5000.0,
            15_000.0,
            AllowanceValue::FixedTime { seconds: 20_000.0 },
            8.33,
            AllowanceDistribution::Mareco,
        );
        assert_eq!(
            allowance.apply(&base, &context),
            Err(EnvelopeSimError::AllowanceConvergenceTooMuchTime)
        );

        // too short to slow down and get back to speed
        for distribution in [AllowanceDistribution::Mareco, AllowanceDistribution::Linear] {
            let allowance = single_range(
                5000.0,
                5500.0,
                AllowanceValue::FixedTime { seconds: 20.0 },
                0.0,
                distribution,
            );
            assert_eq!(
                allowance.apply(&base, &context),
                Err(EnvelopeSimError::AllowanceConvergenceTooMuchTime),
                "{distribution:?}"
            );
        }
    }

    #[test]
    fn test_cores_stay_under_the_section() {
        let sim = TestSim::flat(20_000.0);
        let context = sim.context(2.0);
        let base = max_effort(&context, 44.4, &[20_000.0]);
        let section = Envelope::new(base.slice(5000.0, 15_000.0)).unwrap();
        let cores = [20.0, 30.0, 40.0]
            .map(|v1| mareco::core(&section, &context, v1).unwrap())
            .into_iter()
            .chain([0.5, 0.8].map(|ratio| linear::core(&section, ratio, 8.33).unwrap()));
        for core in cores {
            assert!(core.begin_speed() <= section.begin_speed() + 1e-9);
            for point in core.iterate_points() {
                assert!(point.speed <= section.interpolate_speed(point.position) + 1e-6);
            }
        }

        let imposed = Some(section.begin_speed());
        for (distribution, input) in [(AllowanceDistribution::Mareco, 40.0), (AllowanceDistribution::Linear, 0.9)] {
            let allowance = single_range(
                5000.0,
                15_000.0,
                AllowanceValue::FixedTime { seconds: 0.0 },
                0.0,
                distribution,
            );
            let res = allowance
                .compute_iteration(&section, &context, input, imposed, None)
                .unwrap();
            assert!((res.begin_speed() - section.begin_speed()).abs() < 1e-6, "{distribution:?}");
            assert!(res.is_continuous());
        }
    }

    #[test]
    fn test_target_faster_than_max_effort() {
        let sim = TestSim::flat(10_000.0);
        let context = sim.context(2.0);
        let base = max_effort(&context, 44.4, &[10_000.0]);
        let target = base.total_time() - 30.0;
        for distribution in [AllowanceDistribution::Mareco, AllowanceDistribution::Linear] {
            let allowance = single_range(
                0.0,
                10_000.0,
                AllowanceValue::FixedTime { seconds: 0.0 },
                0.0,
                distribution,
            );
            assert_eq!(
                allowance.compute_section(&base, &context, target, None, None, context.time_step),
                Err(EnvelopeSimError::AllowanceConvergenceNotEnoughTime),
                "{distribution:?}"
            );
        }
    }

    fn exhaust(search: &mut DoubleBinarySearch, f: impl Fn(f64) -> f64) {
        for _ in 0..MAX_ITERATIONS {
            search.feedback(f(search.input()));
        }
        assert!(!search.complete());
    }

    #[test]
    fn test_convergence_errors() {
        // running time drops from 10 to 0 at input 3: no input gives 5
        let mut search = DoubleBinarySearch::new(0.0, 10.0, 5.0, 0.1, true);
        exhaust(&mut search, |input| if input < 3.0 { 10.0 } else { 0.0 });
        assert_eq!(
            convergence_error(&search, None),
            EnvelopeSimError::AllowanceConvergenceDiscontinuity
        );
        assert_eq!(
            convergence_error(&search, Some(EnvelopeSimError::AllowanceConvergenceNotEnoughTime)),
            EnvelopeSimError::AllowanceConvergenceNotEnoughTime
        );

        let mut too_fast = DoubleBinarySearch::new(0.0, 10.0, 5.0, 0.1, true);
        exhaust(&mut too_fast, |_| 0.0);
        assert_eq!(
            convergence_error(&too_fast, None),
            EnvelopeSimError::AllowanceConvergenceTooMuchTime
        );

        let mut too_slow = DoubleBinarySearch::new(0.0, 10.0, 5.0, 0.1, true);
        exhaust(&mut too_slow, |_| 10.0);
        assert_eq!(
            convergence_error(&too_slow, None),
            EnvelopeSimError::AllowanceConvergenceNotEnoughTime
        );
        assert_eq!(
            convergence_error(&too_slow, Some(EnvelopeSimError::AllowanceConvergenceTooMuchTime)),
            EnvelopeSimError::AllowanceConvergenceTooMuchTime
        );
    }

    #[test]
    fn test_invalid_allowances() {
        let sim = TestSim::flat(10_000.0);
        let context = sim.context(2.0);
        let base = max_effort(&context, 44.4, &[10_000.0]);
        let value = AllowanceValue::Percentage { percentage: 5.0 };

        let outside = single_range(0.0, 12_000.0, value, 0.0, AllowanceDistribution::Mareco);
        assert!(matches!(
            outside.apply(&base, &context),
            Err(EnvelopeSimError::AllowanceOutOfBounds { envelope_end, .. }) if envelope_end == 10_000.0
        ));

        let gap = Allowance::new(
            0.0,
            10_000.0,
            0.0,
            vec![
                AllowanceRange::new(0.0, 4000.0, value),
                AllowanceRange::new(5000.0, 10_000.0, value),
            ],
            AllowanceDistribution::Mareco,
        );
        assert!(matches!(
            gap.apply(&base, &context),
            Err(EnvelopeSimError::AllowanceRangeOutOfBounds { begin_pos, .. }) if begin_pos == 5000.0
        ));

        let short = Allowance::new(
            0.0,
            10_000.0,
            0.0,
            vec![AllowanceRange::new(0.0, 8000.0, value)],
            AllowanceDistribution::Mareco,
        );
        assert!(matches!(
            short.apply(&base, &context),
            Err(EnvelopeSimError::AllowanceRangeOutOfBounds { end_pos, .. }) if end_pos == 8000.0
        ));

        let negative = single_range(
            0.0,
            10_000.0,
            AllowanceValue::FixedTime { seconds: -5.0 },
            0.0,
            AllowanceDistribution::Linear,
        );
        assert!(matches!(
            negative.apply(&base, &context),
            Err(EnvelopeSimError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_json_format() {
        let allowance: Allowance = serde_json::from_str(
            r#"{
                "begin_pos": 0,
                "end_pos": 1000,
                "ranges": [
                    {"begin_pos": 0, "end_pos": 1000, "value": {"value_type": "fixed_time", "seconds": 12}}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(allowance.distribution, AllowanceDistribution::Mareco);
        assert_eq!(allowance.capacity_speed_limit, 0.0);
        assert_eq!(allowance.distance(), 1000.0);
        let linear: AllowanceDistribution = serde_json::from_str(r#""linear""#).unwrap();
        assert_eq!(linear, AllowanceDistribution::Linear);
    }
}
