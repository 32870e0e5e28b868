//! The fastest profile the train can actually run: the max speed envelope, plus full
//! traction curves where the train cannot keep up with it.

use tracing::trace;

use crate::envelope::attrs::EnvelopeProfile;
use crate::envelope::builder::{ConstrainedEnvelopePartBuilder, EnvelopePartBuilder, InteractiveEnvelopePartConsumer};
use crate::envelope::constraint::EnvelopeConstraint;
use crate::envelope::cursor::EnvelopeCursor;
use crate::envelope::overlay::OverlayEnvelopeBuilder;
use crate::envelope::part::EnvelopePart;
use crate::envelope::Envelope;
use crate::pipelines::max_speed::increase;
use crate::pipelines::overlays;
use crate::sim::integrator::{self, Action};
use crate::sim::EnvelopeSimContext;
use crate::utils::float_cmp::{POSITION_EPSILON, SPEED_EPSILON};
use crate::EnvelopeSimError;

/// Parts where the train holds a constant speed.
pub fn is_plateau(part: &EnvelopePart) -> bool {
    part.profile() == Some(EnvelopeProfile::ConstantSpeed)
}

/// Replaces plateau ranges the train cannot hold, such as steep climbs, with max effort
/// curves that lose speed and catch up with the plateau afterwards.
pub fn add_maintain_speed_curves(
    context: &EnvelopeSimContext,
    max_speed_profile: &Envelope,
) -> Result<Envelope, EnvelopeSimError> {
    let mut builder = OverlayEnvelopeBuilder::forward(max_speed_profile);
    let mut cursor = EnvelopeCursor::forward(max_speed_profile);

    'parts: while cursor.find_part(|part| is_plateau(part) && part.begin_speed() > 0.0) {
        let part = cursor.part();
        let speed = part.begin_speed();
        let part_end = part.end_pos();
        let mut position = cursor.position();

        while position < part_end {
            let step = integrator::step(context, position, speed, Action::Maintain, 1.0);
            if step.acceleration >= 0.0 {
                position += step.position_delta.max(POSITION_EPSILON);
                continue;
            }

            let mut part_builder = EnvelopePartBuilder::new();
            let mut constrained = ConstrainedEnvelopePartBuilder::new(
                &mut part_builder,
                vec![
                    EnvelopeConstraint::SpeedFloor(0.0),
                    EnvelopeConstraint::EnvelopeCeiling(max_speed_profile),
                ],
            );
            constrained.set_attr(EnvelopeProfile::CatchingUp);
            overlays::accelerate(context, position, speed, &mut constrained, 1.0)?;
            if constrained.last_intersection() == Some(0) {
                return Err(EnvelopeSimError::ImpossibleSimulation(format!(
                    "the train stalls after starting a climb at {position}"
                )));
            }
            let end = constrained.last_pos();
            let Some(curve) = part_builder.build()? else {
                position += step.position_delta.max(POSITION_EPSILON);
                continue;
            };
            trace!(begin = curve.begin_pos(), end, "catching up curve");
            builder.add_part(curve)?;
            if !cursor.find_position(end) {
                break 'parts;
            }
            continue 'parts;
        }
        if !cursor.next_part() {
            break;
        }
    }
    builder.build()
}

/// Adds a full acceleration curve from the start of the path, and wherever the speed
/// limit goes up.
pub fn add_acceleration_curves(
    context: &EnvelopeSimContext,
    max_speed_profile: &Envelope,
    initial_speed: f64,
) -> Result<Envelope, EnvelopeSimError> {
    let mut builder = OverlayEnvelopeBuilder::forward(max_speed_profile);
    let mut cursor = EnvelopeCursor::forward(max_speed_profile);

    let begin_speed = max_speed_profile.begin_speed();
    if initial_speed > begin_speed + SPEED_EPSILON {
        return Err(EnvelopeSimError::InvalidParameter(format!(
            "initial speed {initial_speed} is above the allowed speed {begin_speed}"
        )));
    }
    if initial_speed < begin_speed {
        let begin = max_speed_profile.begin_pos();
        if let Some((curve, end)) = accelerate_under(context, max_speed_profile, begin, initial_speed)? {
            builder.add_part(curve)?;
            if !cursor.find_position(end) {
                return builder.build();
            }
        }
    }

    while let Some(transition) = cursor.find_part_transition(increase) {
        let curve = accelerate_under(context, max_speed_profile, transition.position, transition.prev_speed)?;
        let Some((curve, end)) = curve else {
            cursor.next_part();
            continue;
        };
        builder.add_part(curve)?;
        if !cursor.find_position(end) {
            break;
        }
    }
    builder.build()
}

/// Accelerates from `(position, speed)` until the curve meets `ceiling`.
fn accelerate_under(
    context: &EnvelopeSimContext,
    ceiling: &Envelope,
    position: f64,
    speed: f64,
) -> Result<Option<(EnvelopePart, f64)>, EnvelopeSimError> {
    let mut part_builder = EnvelopePartBuilder::new();
    let mut constrained =
        ConstrainedEnvelopePartBuilder::new(&mut part_builder, vec![EnvelopeConstraint::EnvelopeCeiling(ceiling)]);
    constrained.set_attr(EnvelopeProfile::Accelerating);
    overlays::accelerate(context, position, speed, &mut constrained, 1.0)?;
    let end = constrained.last_pos();
    let curve = part_builder.build()?;
    if let Some(curve) = &curve {
        trace!(begin = curve.begin_pos(), end, "acceleration curve");
    }
    Ok(curve.map(|curve| (curve, end)))
}

/// Builds the max effort envelope from the max speed envelope and the speed the train
/// has at the start of the path.
pub fn max_effort_envelope(
    context: &EnvelopeSimContext,
    max_speed_profile: &Envelope,
    initial_speed: f64,
) -> Result<Envelope, EnvelopeSimError> {
    let maintained = add_maintain_speed_curves(context, max_speed_profile)?;
    add_acceleration_curves(context, &maintained, initial_speed)
}
