//! Coasting curves spliced into an envelope.

use crate::envelope::attrs::EnvelopeProfile;
use crate::envelope::builder::{ConstrainedEnvelopePartBuilder, EnvelopePartBuilder, InteractiveEnvelopePartConsumer};
use crate::envelope::constraint::EnvelopeConstraint;
use crate::envelope::part::EnvelopePart;
use crate::envelope::Envelope;
use crate::pipelines::overlays;
use crate::sim::EnvelopeSimContext;
use crate::{CoastingFailure, EnvelopeSimError};

/// Lowest speed backward coasting may go down to.
const MIN_COASTING_SPEED: f64 = 1.0;

/// Coasts backward from `end_pos` until the curve meets `envelope`, without going below
/// `low_speed_limit`.
///
/// If the backward curve reaches the speed limit, or the beginning of the envelope, the
/// train instead coasts forward from that point until it meets the envelope.
pub fn coast_from_end(
    envelope: &Envelope,
    context: &EnvelopeSimContext,
    end_pos: f64,
    low_speed_limit: f64,
) -> Result<Option<EnvelopePart>, EnvelopeSimError> {
    let speed = envelope.interpolate_speed(end_pos);
    let mut part_builder = EnvelopePartBuilder::new();
    let mut constrained = ConstrainedEnvelopePartBuilder::new(
        &mut part_builder,
        vec![
            EnvelopeConstraint::SpeedFloor(low_speed_limit.max(MIN_COASTING_SPEED)),
            EnvelopeConstraint::EnvelopeCeiling(envelope),
        ],
    );
    constrained.set_attr(EnvelopeProfile::Coasting);
    overlays::coast(context, end_pos, speed, &mut constrained, -1.0)?;

    let reached_floor = constrained.last_intersection() == Some(0);
    let last_pos = constrained.last_pos();
    let last_speed = constrained.last_speed();
    if reached_floor || last_pos == envelope.begin_pos() {
        return Ok(coast_from_beginning(envelope, context, last_pos, last_speed)?);
    }
    part_builder.build()
}

/// Coasts forward from `(start_pos, start_speed)` until the curve meets `envelope`.
///
/// Fails if the train stops before that.
pub fn coast_from_beginning(
    envelope: &Envelope,
    context: &EnvelopeSimContext,
    start_pos: f64,
    start_speed: f64,
) -> Result<Option<EnvelopePart>, CoastingFailure> {
    if start_speed <= 0.0 {
        return Err(CoastingFailure::ReachedStop { position: start_pos });
    }
    let mut part_builder = EnvelopePartBuilder::new();
    let mut constrained = ConstrainedEnvelopePartBuilder::new(
        &mut part_builder,
        vec![
            EnvelopeConstraint::SpeedFloor(0.0),
            EnvelopeConstraint::EnvelopeCeiling(envelope),
        ],
    );
    constrained.set_attr(EnvelopeProfile::Coasting);
    overlays::coast(context, start_pos, start_speed, &mut constrained, 1.0)?;
    if constrained.last_intersection() == Some(0) {
        return Err(CoastingFailure::ReachedStop {
            position: constrained.last_pos(),
        });
    }
    Ok(part_builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{max_effort, TestSim};

    #[test]
    fn test_coast_before_braking() {
        let sim = TestSim::flat(10_000.0);
        let context = sim.context(2.0);
        let envelope = max_effort(&context, 30.0, &[10_000.0]);
        // braking from 30 m/s starts at 9100 m, speeds on the curve follow v² = 10000 - x
        let part = coast_from_end(&envelope, &context, 9136.0, 20.0).unwrap().unwrap();
        assert_eq!(part.profile(), Some(EnvelopeProfile::Coasting));
        assert_eq!(part.end_pos(), 9136.0);
        assert!((part.end_speed() - 864f64.sqrt()).abs() < 1e-6);
        assert!(part.begin_pos() > 8000.0 && part.begin_pos() < 9100.0);
        assert!((part.begin_speed() - 30.0).abs() < 1e-6);
        assert!(part.speeds().windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_coast_from_beginning_reaches_a_stop() {
        let sim = TestSim::flat(10_000.0);
        let context = sim.context(2.0);
        let envelope = max_effort(&context, 30.0, &[10_000.0]);
        // far from any point where the envelope is low enough to meet the coasting curve
        let res = coast_from_beginning(&envelope, &context, 2000.0, 5.0);
        assert!(matches!(res, Err(CoastingFailure::ReachedStop { .. })));
        assert!(matches!(
            coast_from_beginning(&envelope, &context, 2000.0, 0.0),
            Err(CoastingFailure::ReachedStop { position }) if position == 2000.0
        ));
    }

    #[test]
    fn test_coast_from_beginning_keeps_simulation_errors() {
        let sim = TestSim::flat(10_000.0);
        let context = sim.context(2.0);
        let envelope = max_effort(&context, 30.0, &[10_000.0]);
        // the train stops within a fraction of a micrometer: the integrator cannot move it
        let res = coast_from_beginning(&envelope, &context, 2000.0, 1e-9);
        assert!(matches!(
            res,
            Err(CoastingFailure::Simulation(EnvelopeSimError::ImpossibleSimulation(_)))
        ));
        let err: EnvelopeSimError = res.unwrap_err().into();
        assert!(matches!(err, EnvelopeSimError::ImpossibleSimulation(ref msg) if msg.contains("cannot move")));
    }
}
