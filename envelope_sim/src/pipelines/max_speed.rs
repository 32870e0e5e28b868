//! The fastest profile allowed by braking: MRSP plus braking curves for slowdowns and stops.

use tracing::trace;

use crate::envelope::attrs::{EnvelopeProfile, StopMeta};
use crate::envelope::builder::{ConstrainedEnvelopePartBuilder, EnvelopePartBuilder, InteractiveEnvelopePartConsumer};
use crate::envelope::constraint::EnvelopeConstraint;
use crate::envelope::cursor::{EnvelopeCursor, PartTransition};
use crate::envelope::overlay::OverlayEnvelopeBuilder;
use crate::envelope::Envelope;
use crate::pipelines::overlays;
use crate::sim::EnvelopeSimContext;
use crate::utils::are_positions_equal;
use crate::EnvelopeSimError;

/// Whether the speed goes up across a transition, in the direction of the cursor.
pub(crate) fn increase(transition: &PartTransition) -> bool {
    transition.prev_speed < transition.next_speed
}

/// Adds a braking curve before each drop of the speed limit.
pub fn add_braking_curves(context: &EnvelopeSimContext, mrsp: &Envelope) -> Result<Envelope, EnvelopeSimError> {
    let mut builder = OverlayEnvelopeBuilder::backward(mrsp);
    let mut cursor = EnvelopeCursor::backward(mrsp);
    let mut last_position = mrsp.end_pos();
    while let Some(transition) = cursor.find_part_transition(increase) {
        // already covered by the braking curve of a later slowdown
        if transition.position > last_position {
            cursor.next_part();
            continue;
        }
        let mut part_builder = EnvelopePartBuilder::new();
        let mut constrained = ConstrainedEnvelopePartBuilder::new(
            &mut part_builder,
            vec![
                EnvelopeConstraint::SpeedFloor(0.0),
                EnvelopeConstraint::EnvelopeCeiling(mrsp),
            ],
        );
        constrained.set_attr(EnvelopeProfile::Braking);
        overlays::decelerate(context, transition.position, transition.prev_speed, &mut constrained, -1.0)?;
        let reached = constrained.last_pos();
        if let Some(part) = part_builder.build()? {
            trace!(begin = part.begin_pos(), end = part.end_pos(), "slowdown braking curve");
            last_position = reached;
            builder.add_part(part)?;
        }
        cursor.next_part();
    }
    builder.build()
}

/// Adds a braking curve ending at each stop.
///
/// Stops at the very beginning of the path need no curve. A stop within tolerance of the
/// end of the envelope is moved onto it.
pub fn add_stop_braking_curves(
    context: &EnvelopeSimContext,
    stops: &[f64],
    envelope: Envelope,
) -> Result<Envelope, EnvelopeSimError> {
    let mut res = envelope;
    for (index, &stop) in stops.iter().enumerate() {
        if stop == res.begin_pos() {
            continue;
        }
        let stop = if stop > res.end_pos() && are_positions_equal(stop, res.end_pos()) {
            res.end_pos()
        } else {
            stop
        };
        if !res.contains(stop) {
            return Err(EnvelopeSimError::InvalidParameter(format!(
                "stop {index} at {stop} is outside of the path [{}, {}]",
                res.begin_pos(),
                res.end_pos()
            )));
        }

        let mut part_builder = EnvelopePartBuilder::new();
        let mut constrained = ConstrainedEnvelopePartBuilder::new(
            &mut part_builder,
            vec![
                EnvelopeConstraint::SpeedFloor(0.0),
                EnvelopeConstraint::EnvelopeCeiling(&res),
            ],
        );
        constrained.set_attr(EnvelopeProfile::Braking);
        constrained.set_attr(StopMeta { index });
        overlays::decelerate(context, stop, 0.0, &mut constrained, -1.0)?;
        let Some(part) = part_builder.build()? else {
            continue;
        };
        trace!(index, begin = part.begin_pos(), end = part.end_pos(), "stop braking curve");
        let mut builder = OverlayEnvelopeBuilder::backward(&res);
        builder.add_part(part)?;
        res = builder.build()?;
    }
    Ok(res)
}

/// Builds the max speed envelope from a most restrictive speed profile and the positions
/// of the stops.
pub fn max_speed_envelope(
    context: &EnvelopeSimContext,
    mrsp: &Envelope,
    stops: &[f64],
) -> Result<Envelope, EnvelopeSimError> {
    let with_slowdowns = add_braking_curves(context, mrsp)?;
    add_stop_braking_curves(context, stops, with_slowdowns)
}
