//! Curves built by repeating one integrator action until a constraint stops them.

use crate::envelope::builder::InteractiveEnvelopePartConsumer;
use crate::sim::integrator::{self, Action};
use crate::sim::EnvelopeSimContext;
use crate::EnvelopeSimError;

/// Upper bound on the number of steps of a single curve.
pub const MAX_STEPS: usize = 1_000_000;

pub fn accelerate<C: InteractiveEnvelopePartConsumer>(
    context: &EnvelopeSimContext,
    start_position: f64,
    start_speed: f64,
    consumer: &mut C,
    direction: f64,
) -> Result<(), EnvelopeSimError> {
    integrate(context, start_position, start_speed, consumer, direction, Action::Accelerate)
}

pub fn decelerate<C: InteractiveEnvelopePartConsumer>(
    context: &EnvelopeSimContext,
    start_position: f64,
    start_speed: f64,
    consumer: &mut C,
    direction: f64,
) -> Result<(), EnvelopeSimError> {
    integrate(context, start_position, start_speed, consumer, direction, Action::Brake)
}

pub fn coast<C: InteractiveEnvelopePartConsumer>(
    context: &EnvelopeSimContext,
    start_position: f64,
    start_speed: f64,
    consumer: &mut C,
    direction: f64,
) -> Result<(), EnvelopeSimError> {
    integrate(context, start_position, start_speed, consumer, direction, Action::Coast)
}

fn integrate<C: InteractiveEnvelopePartConsumer>(
    context: &EnvelopeSimContext,
    start_position: f64,
    start_speed: f64,
    consumer: &mut C,
    direction: f64,
    action: Action,
) -> Result<(), EnvelopeSimError> {
    if !consumer.init_envelope_part(start_position, start_speed, direction) {
        return Ok(());
    }
    let mut position = start_position;
    let mut speed = start_speed;
    for _ in 0..MAX_STEPS {
        let step = integrator::step(context, position, speed, action, direction);
        if step.position_delta == 0.0 {
            return Err(EnvelopeSimError::ImpossibleSimulation(format!(
                "the train cannot move from position {position} at speed {speed} ({action:?})"
            )));
        }
        position += step.position_delta;
        speed = step.end_speed;
        if !consumer.add_step_with_time(position, speed, step.time_delta) {
            return Ok(());
        }
    }
    Err(EnvelopeSimError::ImpossibleSimulation(format!(
        "no constraint ended the curve starting at {start_position} after {MAX_STEPS} steps ({action:?})"
    )))
}
