//! MARECO allowance distribution.
//!
//! The train cruises at a reduced speed `v1` and coasts wherever coasting costs the least
//! energy per second lost: before braking phases, down to the speed `vf`, and before
//! accelerating slopes, where gravity gives the lost speed back.

use tracing::trace;

use crate::allowances::coasting::coast_from_end;
use crate::envelope::attrs::{EnvelopeAttrs, EnvelopeProfile, LimitSource};
use crate::envelope::cursor::EnvelopeCursor;
use crate::envelope::overlay::OverlayEnvelopeBuilder;
use crate::envelope::part::EnvelopePart;
use crate::envelope::speed_cap::EnvelopeSpeedCap;
use crate::envelope::Envelope;
use crate::pipelines::max_effort::is_plateau;
use crate::sim::integrator::{self, Action};
use crate::sim::rolling_stock::PhysicsRollingStock;
use crate::sim::EnvelopeSimContext;
use crate::utils::{are_positions_equal, are_speeds_equal, DistanceAverage};
use crate::EnvelopeSimError;

/// Step used to look for the exact start of an accelerating slope, in meters.
const SLOPE_START_STEP: f64 = 10.0;

/// Upper bound on the number of times the cruise speed is doubled to find a search bracket.
const MAX_BOUND_DOUBLINGS: usize = 64;

/// Speed at which braking phases start when cruising at `v1`.
pub fn compute_vf(v1: f64, rolling_stock: &dyn PhysicsRollingStock) -> f64 {
    let wle = v1 * v1 * rolling_stock.rolling_resistance_deriv(v1);
    wle * v1 / (wle + rolling_stock.rolling_resistance(v1) * v1)
}

/// Lowest cruise speed the binary search may try.
pub fn initial_low_bound(capacity_speed_limit: f64) -> f64 {
    capacity_speed_limit
}

/// A cruise speed high enough for `vf` to exceed every speed of the section.
pub fn initial_high_bound(section: &Envelope, rolling_stock: &dyn PhysicsRollingStock) -> f64 {
    let section_max_speed = section.max_speed();
    let mut max_speed = section_max_speed;
    for _ in 0..MAX_BOUND_DOUBLINGS {
        if compute_vf(max_speed, rolling_stock) >= section_max_speed {
            break;
        }
        max_speed *= 2.0;
    }
    max_speed
}

/// A place where the train could coast, ending at a known position.
#[derive(Clone, Debug, PartialEq)]
pub enum CoastingOpportunity {
    AcceleratingSlope(AcceleratingSlopeCoast),
    BrakingPhase(BrakingPhaseCoast),
}

impl CoastingOpportunity {
    /// Where the coasting curve joins the base envelope again.
    pub fn end_position(&self) -> f64 {
        match self {
            CoastingOpportunity::AcceleratingSlope(slope) => slope.end_position(),
            CoastingOpportunity::BrakingPhase(braking) => braking.end_position(),
        }
    }

    pub fn compute(
        &self,
        base: &Envelope,
        context: &EnvelopeSimContext,
        v1: f64,
        vf: f64,
    ) -> Result<Option<EnvelopePart>, EnvelopeSimError> {
        match self {
            CoastingOpportunity::AcceleratingSlope(slope) => slope.compute(base, context, v1, vf),
            CoastingOpportunity::BrakingPhase(braking) => braking.compute(base, context, vf),
        }
    }
}

/// Coasting before a braking phase, down to `vf`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BrakingPhaseCoast {
    end_pos: f64,
}

impl BrakingPhaseCoast {
    /// Braking parts starting above `vf`. Coasting ends where braking goes below `vf`.
    pub fn find_all(envelope: &Envelope, vf: f64) -> Vec<BrakingPhaseCoast> {
        envelope
            .iter()
            .filter(|part| part.profile() == Some(EnvelopeProfile::Braking) && part.begin_speed() > vf)
            .filter_map(|part| {
                if part.end_speed() >= vf {
                    return Some(part.end_pos());
                }
                part.interpolate_position(vf)
            })
            .map(|end_pos| BrakingPhaseCoast { end_pos })
            .collect()
    }

    pub fn end_position(&self) -> f64 {
        self.end_pos
    }

    pub fn compute(
        &self,
        base: &Envelope,
        context: &EnvelopeSimContext,
        vf: f64,
    ) -> Result<Option<EnvelopePart>, EnvelopeSimError> {
        coast_from_end(base, context, self.end_pos, vf)
    }
}

/// A range of a plateau where the train speeds up when coasting.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AcceleratingSlopeCoast {
    /// Where coasting stops speeding the train up.
    end_pos: f64,
    /// Mean coasting acceleration over the slope.
    slope_average_acceleration: f64,
    /// Coasting acceleration before the slope, never positive.
    previous_acceleration_estimate: f64,
    /// First position found with a positive coasting acceleration.
    acceleration_start_position: f64,
    /// Plateau speed.
    speed_limit: f64,
}

/// An accelerating slope whose end is not known yet.
struct SlopeScan {
    start_position: f64,
    speed_limit: f64,
    mean_acceleration: DistanceAverage,
}

impl SlopeScan {
    fn new(start_position: f64, speed_limit: f64) -> Self {
        Self {
            start_position,
            speed_limit,
            mean_acceleration: DistanceAverage::new(),
        }
    }

    fn finish(self, end_pos: f64, context: &EnvelopeSimContext) -> Option<AcceleratingSlopeCoast> {
        let slope_average_acceleration = self.mean_acceleration.average()?;
        let previous_acceleration_estimate =
            estimate_previous_acceleration(context, self.start_position, self.speed_limit);
        Some(AcceleratingSlopeCoast {
            end_pos,
            slope_average_acceleration,
            previous_acceleration_estimate,
            acceleration_start_position: self.start_position,
            speed_limit: self.speed_limit,
        })
    }
}

impl AcceleratingSlopeCoast {
    /// Walks every plateau above `vf`, one time step of travel at a time, and collects
    /// the ranges where coasting accelerates the train.
    pub fn find_all(envelope: &Envelope, context: &EnvelopeSimContext, vf: f64) -> Vec<AcceleratingSlopeCoast> {
        let mut res = Vec::new();
        let mut cursor = EnvelopeCursor::forward(envelope);
        while cursor.find_part(is_plateau) {
            let speed = cursor.step_begin_speed();
            if speed <= vf {
                cursor.next_part();
                continue;
            }

            let part_end = cursor.part().end_pos();
            let position_step = context.time_step * speed;
            let mut previous: Option<(f64, f64)> = None;
            let mut current: Option<SlopeScan> = None;

            while !cursor.has_reached_end() && cursor.position() <= part_end {
                let position = cursor.position();
                let acceleration = natural_acceleration(context, position, speed);
                if acceleration > 0.0 {
                    current
                        .get_or_insert_with(|| SlopeScan::new(position, speed))
                        .mean_acceleration
                        .add_segment(position_step, acceleration);
                } else if let Some(scan) = current.take() {
                    let (previous_position, previous_acceleration) = previous.unwrap_or((position, acceleration));
                    let end_pos = interpolate_acceleration_sign_change(
                        acceleration,
                        previous_acceleration,
                        position,
                        previous_position,
                    );
                    res.extend(scan.finish(end_pos, context));
                }
                previous = Some((position, acceleration));
                if !cursor.find_position(position + position_step) {
                    break;
                }
            }

            // the plateau ends on an accelerating slope
            if let (Some(scan), Some((previous_position, _))) = (current, previous) {
                res.extend(scan.finish(previous_position, context));
            }
        }
        trace!(count = res.len(), "accelerating slopes");
        res
    }

    pub fn end_position(&self) -> f64 {
        self.end_pos
    }

    pub fn slope_average_acceleration(&self) -> f64 {
        self.slope_average_acceleration
    }

    pub fn previous_acceleration_estimate(&self) -> f64 {
        self.previous_acceleration_estimate
    }

    pub fn acceleration_start_position(&self) -> f64 {
        self.acceleration_start_position
    }

    /// Speed at which the train should enter the slope.
    ///
    /// If the slope is too short to get back to the plateau speed from there, the train
    /// enters it with the lowest speed which still catches up by its end.
    pub fn compute_v(&self, rolling_stock: &dyn PhysicsRollingStock, v1: f64, vf: f64) -> f64 {
        let wle = rolling_stock.rolling_resistance(v1) * v1 * vf / (v1 - vf);
        let acceleration_ratio = self.previous_acceleration_estimate / self.slope_average_acceleration;
        1.0 / (1.0 / self.speed_limit
            + rolling_stock.rolling_resistance(self.speed_limit) / (wle * (1.0 - acceleration_ratio)))
    }

    /// Coasts backward from the end of the slope, never below `vf` nor the entry speed.
    pub fn compute(
        &self,
        base: &Envelope,
        context: &EnvelopeSimContext,
        v1: f64,
        vf: f64,
    ) -> Result<Option<EnvelopePart>, EnvelopeSimError> {
        let v = self.compute_v(context.rolling_stock, v1, vf);
        coast_from_end(base, context, self.end_pos, v.max(vf))
    }
}

/// Acceleration of a coasting train.
fn natural_acceleration(context: &EnvelopeSimContext, position: f64, speed: f64) -> f64 {
    integrator::step(context, position, speed, Action::Coast, 1.0).acceleration
}

/// Coasting acceleration one train length before the slope, so that the head of the
/// train is not on the slope yet.
fn estimate_previous_acceleration(context: &EnvelopeSimContext, start_position: f64, speed_limit: f64) -> f64 {
    let slope_start = find_exact_slope_start(context, start_position, speed_limit);
    let estimate_position = (slope_start - context.rolling_stock.length()).max(0.0);
    natural_acceleration(context, estimate_position, speed_limit).min(0.0)
}

/// Where the coasting acceleration goes from negative to positive, going back from
/// `start_position` as long as the acceleration stays positive.
fn find_exact_slope_start(context: &EnvelopeSimContext, start_position: f64, speed: f64) -> f64 {
    let mut position = start_position;
    while position > 0.0 && natural_acceleration(context, position, speed) > 0.0 {
        position -= SLOPE_START_STEP;
    }
    // the path starts on the slope
    if position <= 0.0 {
        return 0.0;
    }
    let previous = natural_acceleration(context, position, speed);
    let next = natural_acceleration(context, position + SLOPE_START_STEP, speed);
    interpolate_acceleration_sign_change(next, previous, position + SLOPE_START_STEP, position)
}

/// Position where the acceleration crosses zero, assuming it is linear between both points.
fn interpolate_acceleration_sign_change(
    current_acceleration: f64,
    previous_acceleration: f64,
    current_position: f64,
    previous_position: f64,
) -> f64 {
    if are_positions_equal(current_position, previous_position)
        || are_speeds_equal(current_acceleration, previous_acceleration)
    {
        return current_position;
    }
    let factor = (previous_acceleration - current_acceleration) / (previous_position - current_position);
    let y0 = previous_acceleration - factor * previous_position;
    -y0 / factor
}

/// The envelope of one binary search attempt: `base` capped at `v1`, with coasting
/// phases laid from the end of the section backward.
pub fn core(base: &Envelope, context: &EnvelopeSimContext, v1: f64) -> Result<Envelope, EnvelopeSimError> {
    let vf = compute_vf(v1, context.rolling_stock);
    let capped = EnvelopeSpeedCap::from(base, EnvelopeAttrs::new().with(LimitSource::MarecoSpeedLimit), v1)?;

    let mut opportunities: Vec<CoastingOpportunity> = BrakingPhaseCoast::find_all(&capped, vf)
        .into_iter()
        .map(CoastingOpportunity::BrakingPhase)
        .collect();
    opportunities.extend(
        AcceleratingSlopeCoast::find_all(&capped, context, vf)
            .into_iter()
            .map(CoastingOpportunity::AcceleratingSlope),
    );
    opportunities.sort_by(|a, b| b.end_position().total_cmp(&a.end_position()));

    let mut builder = OverlayEnvelopeBuilder::backward(&capped);
    for opportunity in &opportunities {
        // covered by the coasting phase of a later opportunity
        if opportunity.end_position() > builder.free_position() {
            continue;
        }
        let Some(overlay) = opportunity.compute(&capped, context, v1, vf)? else {
            continue;
        };
        if overlay.end_pos() > builder.free_position() {
            continue;
        }
        trace!(begin = overlay.begin_pos(), end = overlay.end_pos(), "coasting phase");
        builder.add_part(overlay)?;
    }
    builder.build()
}
