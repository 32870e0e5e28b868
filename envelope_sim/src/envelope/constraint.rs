//! Bounds that curves built by a
//! [`ConstrainedEnvelopePartBuilder`](crate::envelope::builder::ConstrainedEnvelopePartBuilder)
//! must stay within.
//!
//! A candidate step goes from `(x0, v0)` to `(x1, v1)` under constant acceleration: the
//! square of its speed is linear in position, which makes intersections with horizontal
//! speed bounds and with other envelopes exact.

use crate::envelope::physics::interpolate_step_speed;
use crate::envelope::Envelope;
use crate::utils::float_cmp::{POSITION_EPSILON, SPEED_EPSILON};

/// Where a candidate step leaves the valid region.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConstraintHit {
    pub position: f64,
    pub speed: f64,
}

#[derive(Clone, Copy, Debug)]
pub enum EnvelopeConstraint<'a> {
    /// The speed must not go below this value.
    SpeedFloor(f64),
    /// The speed must not go above this value.
    SpeedCeiling(f64),
    /// Positions must stay inside `[begin, end]`.
    PositionRange { begin: f64, end: f64 },
    /// The curve must stay under an envelope, and inside its position range.
    EnvelopeCeiling(&'a Envelope),
    /// The curve must stay above an envelope, and inside its position range.
    EnvelopeFloor(&'a Envelope),
}

impl<'a> EnvelopeConstraint<'a> {
    /// Whether a curve may start at this point, heading in `direction`.
    pub fn is_valid(&self, position: f64, speed: f64, direction: f64) -> bool {
        match *self {
            EnvelopeConstraint::SpeedFloor(floor) => speed >= floor - SPEED_EPSILON,
            EnvelopeConstraint::SpeedCeiling(ceiling) => speed <= ceiling + SPEED_EPSILON,
            EnvelopeConstraint::PositionRange { begin, end } => {
                position >= begin - POSITION_EPSILON && position <= end + POSITION_EPSILON
            }
            EnvelopeConstraint::EnvelopeCeiling(envelope) => {
                envelope.contains(position)
                    && speed <= envelope.interpolate_speed_right_dir(position, direction) + SPEED_EPSILON
            }
            EnvelopeConstraint::EnvelopeFloor(envelope) => {
                envelope.contains(position)
                    && speed >= envelope.interpolate_speed_right_dir(position, direction) - SPEED_EPSILON
            }
        }
    }

    /// The first point of the step `(x0, v0) -> (x1, v1)` which reaches the bound, if any.
    ///
    /// Reaching the bound exactly at `x1` counts as a hit, so that curves stop on it.
    pub fn intersect(&self, x0: f64, v0: f64, x1: f64, v1: f64) -> Option<ConstraintHit> {
        match *self {
            EnvelopeConstraint::SpeedFloor(floor) => {
                if v1 > floor {
                    return None;
                }
                Some(speed_bound_hit(x0, v0, x1, v1, floor))
            }
            EnvelopeConstraint::SpeedCeiling(ceiling) => {
                if v1 < ceiling {
                    return None;
                }
                Some(speed_bound_hit(x0, v0, x1, v1, ceiling))
            }
            EnvelopeConstraint::PositionRange { begin, end } => {
                let bound = if x1 >= x0 {
                    if x1 < end {
                        return None;
                    }
                    end
                } else {
                    if x1 > begin {
                        return None;
                    }
                    begin
                };
                Some(ConstraintHit {
                    position: bound,
                    speed: interpolate_step_speed(x0, x1, v0, v1, bound),
                })
            }
            EnvelopeConstraint::EnvelopeCeiling(envelope) => envelope_hit(envelope, x0, v0, x1, v1, false),
            EnvelopeConstraint::EnvelopeFloor(envelope) => envelope_hit(envelope, x0, v0, x1, v1, true),
        }
    }
}

fn speed_bound_hit(x0: f64, v0: f64, x1: f64, v1: f64, bound: f64) -> ConstraintHit {
    let denominator = v1 * v1 - v0 * v0;
    let t = if denominator == 0.0 {
        1.0
    } else {
        ((bound * bound - v0 * v0) / denominator).clamp(0.0, 1.0)
    };
    ConstraintHit {
        position: x0 + t * (x1 - x0),
        speed: bound,
    }
}

/// Walks the step alongside the envelope, one envelope step at a time.
fn envelope_hit(envelope: &Envelope, x0: f64, v0: f64, x1: f64, v1: f64, is_floor: bool) -> Option<ConstraintHit> {
    let direction = if x1 >= x0 { 1.0 } else { -1.0 };
    if !envelope.contains(x0) {
        return Some(ConstraintHit { position: x0, speed: v0 });
    }

    // the step is cut where it leaves the envelope
    let out_of_range = !envelope.contains(x1);
    let last = x1.clamp(envelope.begin_pos(), envelope.end_pos());

    let (low, high) = if direction > 0.0 { (x0, last) } else { (last, x0) };
    let mut breakpoints = vec![x0];
    let first_part = envelope.find_left(low).unwrap_or(0);
    let last_part = envelope.find_right(high).unwrap_or(envelope.len() - 1);
    let mut inner: Vec<f64> = envelope.parts()[first_part..=last_part]
        .iter()
        .flat_map(|part| part.positions().iter().copied())
        .filter(|&pos| pos > low && pos < high)
        .collect();
    if direction < 0.0 {
        inner.reverse();
    }
    inner.dedup();
    breakpoints.extend(inner);
    breakpoints.push(last);

    let segment_speed = |pos: f64| interpolate_step_speed(x0, x1, v0, v1, pos);
    // positive inside the valid region
    let margin = |bound_speed: f64, speed: f64| {
        let diff = bound_speed * bound_speed - speed * speed;
        if is_floor {
            -diff
        } else {
            diff
        }
    };

    for (i, window) in breakpoints.windows(2).enumerate() {
        let (a, b) = (window[0], window[1]);
        if a == b {
            continue;
        }
        let seg_a = segment_speed(a);
        let env_a = envelope.interpolate_speed_right_dir(a, direction);
        let mut margin_a = margin(env_a, seg_a);
        if i == 0 && (env_a - seg_a).abs() < SPEED_EPSILON {
            margin_a = margin_a.max(0.0);
        }
        if margin_a < 0.0 {
            // the envelope jumps across the step at a
            return Some(ConstraintHit { position: a, speed: seg_a });
        }

        let seg_b = segment_speed(b);
        let env_b = envelope.interpolate_speed_left_dir(b, direction);
        let margin_b = margin(env_b, seg_b);
        let is_final = b == x1;
        if margin_b < 0.0 || (is_final && margin_b <= 0.0) {
            let t = if margin_a - margin_b == 0.0 {
                1.0
            } else {
                (margin_a / (margin_a - margin_b)).clamp(0.0, 1.0)
            };
            let position = a + t * (b - a);
            let squared = env_a * env_a + t * (env_b * env_b - env_a * env_a);
            return Some(ConstraintHit {
                position,
                speed: squared.max(0.0).sqrt(),
            });
        }
    }

    if out_of_range {
        return Some(ConstraintHit {
            position: last,
            speed: segment_speed(last),
        });
    }
    None
}
