//! Incremental construction of envelope parts.
//!
//! Simulation loops push points into an [`InteractiveEnvelopePartConsumer`], usually a
//! [`ConstrainedEnvelopePartBuilder`] which clips the curve against its constraints and
//! forwards accepted points to an [`EnvelopePartBuilder`].

use crate::envelope::attrs::{EnvelopeAttr, EnvelopeAttrs};
use crate::envelope::constraint::EnvelopeConstraint;
use crate::envelope::part::EnvelopePart;
use crate::envelope::physics::compute_step_time;
use crate::EnvelopeSimError;

/// Receives the points of a curve, in the order they are computed.
pub trait EnvelopePartConsumer {
    fn init_envelope_part(&mut self, position: f64, speed: f64, direction: f64);
    fn add_step(&mut self, position: f64, speed: f64, time_delta: f64);
    fn set_attr(&mut self, attr: EnvelopeAttr);
}

impl<T: EnvelopePartConsumer + ?Sized> EnvelopePartConsumer for &mut T {
    fn init_envelope_part(&mut self, position: f64, speed: f64, direction: f64) {
        (**self).init_envelope_part(position, speed, direction)
    }

    fn add_step(&mut self, position: f64, speed: f64, time_delta: f64) {
        (**self).add_step(position, speed, time_delta)
    }

    fn set_attr(&mut self, attr: EnvelopeAttr) {
        (**self).set_attr(attr)
    }
}

/// A consumer which may refuse points. Once a method returns `false`, the curve is over.
pub trait InteractiveEnvelopePartConsumer {
    fn init_envelope_part(&mut self, position: f64, speed: f64, direction: f64) -> bool;
    fn add_step(&mut self, position: f64, speed: f64) -> bool;
    fn add_step_with_time(&mut self, position: f64, speed: f64, time_delta: f64) -> bool;
    fn last_pos(&self) -> f64;
    fn last_speed(&self) -> f64;
}

/// Accumulates points into an [`EnvelopePart`].
///
/// Points can be added backward (`direction < 0`), in which case they are reversed on build.
#[derive(Clone, Debug, Default)]
pub struct EnvelopePartBuilder {
    attrs: EnvelopeAttrs,
    direction: f64,
    positions: Vec<f64>,
    speeds: Vec<f64>,
    time_deltas: Vec<f64>,
}

impl EnvelopePartBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn point_count(&self) -> usize {
        self.positions.len()
    }

    pub fn step_count(&self) -> usize {
        self.time_deltas.len()
    }

    pub fn last_pos(&self) -> Option<f64> {
        self.positions.last().copied()
    }

    pub fn last_speed(&self) -> Option<f64> {
        self.speeds.last().copied()
    }

    /// Adds a step whose duration is derived from the mean speed.
    pub fn add_step_auto(&mut self, position: f64, speed: f64) {
        let time_delta = match (self.positions.last(), self.speeds.last()) {
            (Some(&last_pos), Some(&last_speed)) => compute_step_time(last_pos, position, last_speed, speed),
            _ => 0.0,
        };
        EnvelopePartConsumer::add_step(self, position, speed, time_delta);
    }

    /// The finished part, or `None` if fewer than two points were added.
    pub fn build(mut self) -> Result<Option<EnvelopePart>, EnvelopeSimError> {
        if self.positions.len() < 2 {
            return Ok(None);
        }
        if self.direction < 0.0 {
            self.positions.reverse();
            self.speeds.reverse();
            self.time_deltas.reverse();
        }
        EnvelopePart::new(self.attrs, self.positions, self.speeds, self.time_deltas).map(Some)
    }
}

impl EnvelopePartConsumer for EnvelopePartBuilder {
    fn init_envelope_part(&mut self, position: f64, speed: f64, direction: f64) {
        self.direction = direction;
        self.positions.clear();
        self.speeds.clear();
        self.time_deltas.clear();
        self.positions.push(position);
        self.speeds.push(speed);
    }

    fn add_step(&mut self, position: f64, speed: f64, time_delta: f64) {
        self.positions.push(position);
        self.speeds.push(speed);
        self.time_deltas.push(time_delta);
    }

    fn set_attr(&mut self, attr: EnvelopeAttr) {
        self.attrs.set(attr);
    }
}

/// Clips the curve it is fed against a list of constraints.
///
/// When a step crosses one or more constraints, the step is cut at the crossing closest
/// to the last point, ties going to the constraint listed first. The index of that
/// constraint is kept in [`ConstrainedEnvelopePartBuilder::last_intersection`].
pub struct ConstrainedEnvelopePartBuilder<'a, C: EnvelopePartConsumer> {
    sink: C,
    constraints: Vec<EnvelopeConstraint<'a>>,
    direction: f64,
    last_pos: f64,
    last_speed: f64,
    last_intersection: Option<usize>,
}

impl<'a, C: EnvelopePartConsumer> ConstrainedEnvelopePartBuilder<'a, C> {
    pub fn new(sink: C, constraints: Vec<EnvelopeConstraint<'a>>) -> Self {
        Self {
            sink,
            constraints,
            direction: 1.0,
            last_pos: f64::NAN,
            last_speed: f64::NAN,
            last_intersection: None,
        }
    }

    /// Index of the constraint which ended the curve.
    pub fn last_intersection(&self) -> Option<usize> {
        self.last_intersection
    }

    pub fn set_attr(&mut self, attr: impl Into<EnvelopeAttr>) {
        self.sink.set_attr(attr.into());
    }

    pub fn into_inner(self) -> C {
        self.sink
    }

    fn add_checked_step(&mut self, position: f64, speed: f64, time_delta: Option<f64>) -> bool {
        let (x0, v0) = (self.last_pos, self.last_speed);
        let mut closest = None;
        for (index, constraint) in self.constraints.iter().enumerate() {
            let Some(hit) = constraint.intersect(x0, v0, position, speed) else {
                continue;
            };
            let distance = (hit.position - x0).abs();
            match closest {
                Some((_, _, best)) if distance >= best => {}
                _ => closest = Some((index, hit, distance)),
            }
        }

        let Some((index, hit, _)) = closest else {
            let time_delta = time_delta.unwrap_or_else(|| compute_step_time(x0, position, v0, speed));
            self.sink.add_step(position, speed, time_delta);
            self.last_pos = position;
            self.last_speed = speed;
            return true;
        };

        if (hit.position - x0) * self.direction > 0.0 {
            let time_delta = compute_step_time(x0, hit.position, v0, hit.speed);
            self.sink.add_step(hit.position, hit.speed, time_delta);
            self.last_pos = hit.position;
            self.last_speed = hit.speed;
        }
        self.last_intersection = Some(index);
        false
    }
}

impl<'a, C: EnvelopePartConsumer> InteractiveEnvelopePartConsumer for ConstrainedEnvelopePartBuilder<'a, C> {
    fn init_envelope_part(&mut self, position: f64, speed: f64, direction: f64) -> bool {
        if let Some(index) = self
            .constraints
            .iter()
            .position(|constraint| !constraint.is_valid(position, speed, direction))
        {
            self.last_intersection = Some(index);
            return false;
        }
        self.direction = direction;
        self.last_pos = position;
        self.last_speed = speed;
        self.last_intersection = None;
        self.sink.init_envelope_part(position, speed, direction);
        true
    }

    fn add_step(&mut self, position: f64, speed: f64) -> bool {
        self.add_checked_step(position, speed, None)
    }

    fn add_step_with_time(&mut self, position: f64, speed: f64, time_delta: f64) -> bool {
        self.add_checked_step(position, speed, Some(time_delta))
    }

    fn last_pos(&self) -> f64 {
        self.last_pos
    }

    fn last_speed(&self) -> f64 {
        self.last_speed
    }
}
