//! Numerical integration of train movement.
//!
//! Each call to [`step`] moves the train for one time step, using a Runge-Kutta estimate
//! of the mean acceleration over the step followed by a single constant acceleration move.
//! Integration can run backward (`direction_sign < 0`), which is how braking curves are
//! built from their target point.

use serde::{Deserialize, Serialize};

use crate::sim::rolling_stock::GammaType;
use crate::sim::{BrakingUseCase, EnvelopeSimContext};
use crate::utils::float_cmp::{POSITION_EPSILON, SPEED_EPSILON};

pub const GRAVITY: f64 = 9.81;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Accelerate,
    Brake,
    Coast,
    /// Hold the current speed, using as much traction as available.
    Maintain,
}

/// The outcome of one integration step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IntegrationStep {
    pub time_delta: f64,
    pub position_delta: f64,
    pub start_speed: f64,
    pub end_speed: f64,
    pub acceleration: f64,
    pub direction_sign: f64,
}

impl IntegrationStep {
    /// Moves at constant `acceleration` for `time_delta`.
    ///
    /// When the speed would cross zero, the step is cut short at the instant the train
    /// stops, so that it never moves against `direction_sign`.
    pub fn from_naive_step(time_delta: f64, speed: f64, acceleration: f64, direction_sign: f64) -> Self {
        let mut time_delta = time_delta;
        let mut end_speed = speed + acceleration * time_delta * direction_sign;
        if end_speed < 0.0 {
            end_speed = 0.0;
            time_delta = -speed / (acceleration * direction_sign);
        }
        let mut position_delta =
            direction_sign * speed * time_delta + 0.5 * acceleration * time_delta * time_delta;

        if end_speed.abs() < SPEED_EPSILON {
            end_speed = 0.0;
        }
        if position_delta.abs() < POSITION_EPSILON {
            position_delta = 0.0;
        }
        Self {
            time_delta,
            position_delta,
            start_speed: speed,
            end_speed,
            acceleration,
            direction_sign,
        }
    }
}

/// Integrates one time step of `action`, starting at `position` and `speed`.
pub fn step(
    context: &EnvelopeSimContext,
    position: f64,
    speed: f64,
    action: Action,
    direction_sign: f64,
) -> IntegrationStep {
    let time_step = context.time_step;
    let half_step = time_step / 2.0;

    let a1 = compute_acceleration(context, position, speed, action, direction_sign);
    let s1 = IntegrationStep::from_naive_step(half_step, speed, a1, direction_sign);

    let a2 = compute_acceleration(context, position + s1.position_delta, s1.end_speed, action, direction_sign);
    let s2 = IntegrationStep::from_naive_step(half_step, speed, a2, direction_sign);

    let a3 = compute_acceleration(context, position + s2.position_delta, s2.end_speed, action, direction_sign);
    let s3 = IntegrationStep::from_naive_step(time_step, speed, a3, direction_sign);

    let a4 = compute_acceleration(context, position + s3.position_delta, s3.end_speed, action, direction_sign);

    let mean_acceleration = (a1 + 2.0 * a2 + 2.0 * a3 + a4) / 6.0;
    IntegrationStep::from_naive_step(time_step, speed, mean_acceleration, direction_sign)
}

/// Acceleration of the train at `position` and `speed` when performing `action`.
///
/// The result is expressed in the frame of forward movement: integrating backward
/// flips its effect on speed, not its sign.
pub fn compute_acceleration(
    context: &EnvelopeSimContext,
    position: f64,
    speed: f64,
    action: Action,
    direction_sign: f64,
) -> f64 {
    let rolling_stock = context.rolling_stock;
    let rolling_resistance = rolling_stock.rolling_resistance(speed);
    let weight = weight_force(context, position);
    let max_traction = rolling_stock.max_effort(speed);

    let (traction, braking) = match action {
        Action::Accelerate => (max_traction, 0.0),
        Action::Coast => (0.0, 0.0),
        Action::Maintain => {
            let needed = rolling_resistance - weight;
            if needed <= max_traction {
                return 0.0;
            }
            (max_traction, 0.0)
        }
        Action::Brake => match braking_force(context, speed) {
            Some(force) => (0.0, force),
            None => return -rolling_stock.timetable_deceleration(),
        },
    };

    // forces which always oppose the movement
    let opposite = rolling_resistance + braking;
    if speed == 0.0 && direction_sign > 0.0 && (traction + weight).abs() < opposite {
        return 0.0;
    }
    (traction + weight - opposite) / rolling_stock.inertia()
}

/// The braking force for the context's use case, or `None` for a constant deceleration.
fn braking_force(context: &EnvelopeSimContext, speed: f64) -> Option<f64> {
    let rolling_stock = context.rolling_stock;
    match context.braking_use_case {
        BrakingUseCase::Timetable => match rolling_stock.gamma_type() {
            GammaType::Const => None,
            GammaType::Max => Some(rolling_stock.max_braking_force(speed)),
        },
        BrakingUseCase::Emergency => Some(rolling_stock.safe_braking_force(speed)),
        BrakingUseCase::Service => Some(rolling_stock.service_braking_force(speed)),
        BrakingUseCase::NormalService => Some(rolling_stock.normal_service_braking_force(speed)),
    }
}

/// Gravity along the track for a train whose head is at `position`, positive downhill.
///
/// The grade is averaged under the train, or taken at its worst for ETCS braking.
pub fn weight_force(context: &EnvelopeSimContext, position: f64) -> f64 {
    let path = context.path;
    let rolling_stock = context.rolling_stock;
    let head = position.clamp(0.0, path.length());
    let tail = (position - rolling_stock.length()).clamp(0.0, path.length());
    let grade = if context.braking_use_case.is_etcs() {
        path.lowest_grade(tail, head)
    } else {
        path.average_grade(tail, head)
    };
    -rolling_stock.mass() * GRAVITY * (grade / 1000.0).atan().sin()
}
