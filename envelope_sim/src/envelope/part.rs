use crate::envelope::attrs::{EnvelopeAttr, EnvelopeAttrs, EnvelopeProfile};
use crate::envelope::physics::{
    compute_step_time, intersect_step_with_speed, interpolate_step_speed, interpolate_step_time,
};
use crate::EnvelopeSimError;

/// An immutable curve segment: speeds and step durations at strictly increasing positions.
///
/// Parts are built once, either through [`EnvelopePart::new`] /
/// [`EnvelopePart::generate_times`] or by an
/// [`EnvelopePartBuilder`](crate::envelope::builder::EnvelopePartBuilder), and never
/// mutated afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct EnvelopePart {
    attrs: EnvelopeAttrs,
    positions: Vec<f64>,
    speeds: Vec<f64>,
    time_deltas: Vec<f64>,
    /// Time elapsed from the beginning of the part to each point.
    cumulative_times: Vec<f64>,
}

impl EnvelopePart {
    /// Builds a part, checking its invariants.
    pub fn new(
        attrs: EnvelopeAttrs,
        positions: Vec<f64>,
        speeds: Vec<f64>,
        time_deltas: Vec<f64>,
    ) -> Result<Self, EnvelopeSimError> {
        check_invariants(&positions, &speeds, &time_deltas)?;
        Ok(Self::new_unchecked(attrs, positions, speeds, time_deltas))
    }

    /// Builds a part whose step durations are derived from positions and speeds.
    pub fn generate_times(
        attrs: EnvelopeAttrs,
        positions: Vec<f64>,
        speeds: Vec<f64>,
    ) -> Result<Self, EnvelopeSimError> {
        if positions.len() != speeds.len() {
            return Err(EnvelopeSimError::InvalidEnvelopePart(format!(
                "{} positions but {} speeds",
                positions.len(),
                speeds.len()
            )));
        }
        let time_deltas = positions
            .windows(2)
            .zip(speeds.windows(2))
            .map(|(pos, speed)| compute_step_time(pos[0], pos[1], speed[0], speed[1]))
            .collect();
        Self::new(attrs, positions, speeds, time_deltas)
    }

    /// Builds a part from points known to uphold the invariants, such as slices of another part.
    pub(crate) fn new_unchecked(
        attrs: EnvelopeAttrs,
        positions: Vec<f64>,
        speeds: Vec<f64>,
        time_deltas: Vec<f64>,
    ) -> Self {
        let mut cumulative_times = Vec::with_capacity(positions.len());
        let mut total = 0.0;
        cumulative_times.push(total);
        for delta in &time_deltas {
            total += delta;
            cumulative_times.push(total);
        }
        Self {
            attrs,
            positions,
            speeds,
            time_deltas,
            cumulative_times,
        }
    }

    pub fn attrs(&self) -> &EnvelopeAttrs {
        &self.attrs
    }

    pub fn has_attr(&self, attr: &EnvelopeAttr) -> bool {
        self.attrs.has(attr)
    }

    pub fn profile(&self) -> Option<EnvelopeProfile> {
        self.attrs.profile()
    }

    /// Same part, with other attributes.
    pub fn with_attrs(&self, attrs: EnvelopeAttrs) -> Self {
        Self {
            attrs,
            ..self.clone()
        }
    }

    pub fn point_count(&self) -> usize {
        self.positions.len()
    }

    pub fn step_count(&self) -> usize {
        self.positions.len() - 1
    }

    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    pub fn speeds(&self) -> &[f64] {
        &self.speeds
    }

    pub fn time_deltas(&self) -> &[f64] {
        &self.time_deltas
    }

    pub fn position(&self, index: usize) -> f64 {
        self.positions[index]
    }

    pub fn speed(&self, index: usize) -> f64 {
        self.speeds[index]
    }

    pub fn time_delta(&self, step_index: usize) -> f64 {
        self.time_deltas[step_index]
    }

    pub fn begin_pos(&self) -> f64 {
        self.positions[0]
    }

    pub fn end_pos(&self) -> f64 {
        self.positions[self.positions.len() - 1]
    }

    pub fn begin_speed(&self) -> f64 {
        self.speeds[0]
    }

    pub fn end_speed(&self) -> f64 {
        self.speeds[self.speeds.len() - 1]
    }

    pub fn total_distance(&self) -> f64 {
        self.end_pos() - self.begin_pos()
    }

    pub fn total_time(&self) -> f64 {
        self.cumulative_times[self.cumulative_times.len() - 1]
    }

    pub fn min_speed(&self) -> f64 {
        self.speeds.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max_speed(&self) -> f64 {
        self.speeds.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Whether all speeds are the same.
    pub fn is_flat(&self) -> bool {
        self.speeds.iter().all(|&speed| speed == self.speeds[0])
    }

    pub fn contains(&self, position: f64) -> bool {
        position >= self.begin_pos() && position <= self.end_pos()
    }

    /// Index of the step holding `position`. On a point shared by two steps,
    /// the step starting there is returned, unless it is the last point.
    pub fn find_step(&self, position: f64) -> Option<usize> {
        if !self.contains(position) {
            return None;
        }
        let index = self.positions.partition_point(|&pos| pos <= position);
        Some(index.saturating_sub(1).min(self.step_count() - 1))
    }

    /// Index of the step holding `position`. On a point shared by two steps,
    /// the step ending there is returned, unless it is the first point.
    pub fn find_step_left(&self, position: f64) -> Option<usize> {
        if !self.contains(position) {
            return None;
        }
        let index = self.positions.partition_point(|&pos| pos < position);
        Some(index.saturating_sub(1).min(self.step_count() - 1))
    }

    /// Speed at `position`, clamped to the bounds of the part.
    pub fn interpolate_speed(&self, position: f64) -> f64 {
        let position = position.clamp(self.begin_pos(), self.end_pos());
        let step = self.find_step(position).unwrap_or(0);
        self.interpolate_speed_in_step(step, position)
    }

    pub(crate) fn interpolate_speed_in_step(&self, step: usize, position: f64) -> f64 {
        interpolate_step_speed(
            self.positions[step],
            self.positions[step + 1],
            self.speeds[step],
            self.speeds[step + 1],
            position,
        )
    }

    /// Time elapsed between the beginning of the part and `position`, clamped to the part.
    pub fn interpolate_total_time(&self, position: f64) -> f64 {
        let position = position.clamp(self.begin_pos(), self.end_pos());
        let step = self.find_step(position).unwrap_or(0);
        self.cumulative_times[step]
            + interpolate_step_time(
                self.positions[step],
                self.positions[step + 1],
                self.speeds[step],
                self.speeds[step + 1],
                position,
            )
    }

    /// First position at which the part reaches `speed`, for parts whose speed only
    /// increases or only decreases.
    pub fn interpolate_position(&self, speed: f64) -> Option<f64> {
        for step in 0..self.step_count() {
            let (speed_a, speed_b) = (self.speeds[step], self.speeds[step + 1]);
            let in_step = (speed_a <= speed && speed <= speed_b) || (speed_b <= speed && speed <= speed_a);
            if !in_step {
                continue;
            }
            if speed == speed_a {
                return Some(self.positions[step]);
            }
            if speed == speed_b {
                return Some(self.positions[step + 1]);
            }
            return Some(intersect_step_with_speed(
                self.positions[step],
                self.positions[step + 1],
                speed_a,
                speed_b,
                speed,
            ));
        }
        None
    }

    /// The part restricted to `[begin, end]`, or `None` if nothing remains.
    pub fn slice(&self, begin: f64, end: f64) -> Option<EnvelopePart> {
        self.slice_with_speeds(begin, None, end, None)
    }

    /// The part restricted to `[begin, end]`, optionally forcing the speeds at both ends.
    ///
    /// Bounds are clamped to the part. Steps fully inside the slice keep their durations,
    /// the two edge steps are recomputed from their speeds.
    pub fn slice_with_speeds(
        &self,
        begin: f64,
        begin_speed: Option<f64>,
        end: f64,
        end_speed: Option<f64>,
    ) -> Option<EnvelopePart> {
        let begin = begin.max(self.begin_pos());
        let end = end.min(self.end_pos());
        if !(begin < end) {
            return None;
        }

        if begin == self.begin_pos()
            && end == self.end_pos()
            && begin_speed.map_or(true, |speed| speed == self.begin_speed())
            && end_speed.map_or(true, |speed| speed == self.end_speed())
        {
            return Some(self.clone());
        }

        let first_inner = self.positions.partition_point(|&pos| pos <= begin);
        let last_inner = self.positions.partition_point(|&pos| pos < end);

        let mut positions = Vec::with_capacity(last_inner.saturating_sub(first_inner) + 2);
        let mut speeds = Vec::with_capacity(positions.capacity());
        positions.push(begin);
        speeds.push(begin_speed.unwrap_or_else(|| self.interpolate_speed(begin)));
        for index in first_inner..last_inner {
            positions.push(self.positions[index]);
            speeds.push(self.speeds[index]);
        }
        positions.push(end);
        speeds.push(end_speed.unwrap_or_else(|| self.interpolate_speed_left(end)));

        let mut time_deltas = Vec::with_capacity(positions.len() - 1);
        let step_count = positions.len() - 1;
        for i in 0..step_count {
            let inner_step = i > 0 && i + 1 < step_count;
            if inner_step {
                // both ends are original points: the original step duration holds
                let original = first_inner + i - 1;
                time_deltas.push(self.time_deltas[original]);
            } else {
                time_deltas.push(compute_step_time(
                    positions[i],
                    positions[i + 1],
                    speeds[i],
                    speeds[i + 1],
                ));
            }
        }
        Some(EnvelopePart::new_unchecked(
            self.attrs.clone(),
            positions,
            speeds,
            time_deltas,
        ))
    }

    fn interpolate_speed_left(&self, position: f64) -> f64 {
        let position = position.clamp(self.begin_pos(), self.end_pos());
        let step = self.find_step_left(position).unwrap_or(0);
        self.interpolate_speed_in_step(step, position)
    }

    /// A copy of the part moved by `offset` meters.
    pub fn shift(&self, offset: f64) -> EnvelopePart {
        EnvelopePart {
            positions: self.positions.iter().map(|pos| pos + offset).collect(),
            ..self.clone()
        }
    }
}

fn check_invariants(positions: &[f64], speeds: &[f64], time_deltas: &[f64]) -> Result<(), EnvelopeSimError> {
    let invalid = |msg: String| Err(EnvelopeSimError::InvalidEnvelopePart(msg));
    if positions.len() < 2 {
        return invalid(format!("{} points, at least 2 are needed", positions.len()));
    }
    if speeds.len() != positions.len() {
        return invalid(format!("{} positions but {} speeds", positions.len(), speeds.len()));
    }
    if time_deltas.len() != positions.len() - 1 {
        return invalid(format!(
            "{} positions but {} time deltas",
            positions.len(),
            time_deltas.len()
        ));
    }
    if let Some(index) = positions.windows(2).position(|pos| !(pos[0] < pos[1])) {
        return invalid(format!("positions are not strictly increasing at index {}", index));
    }
    if let Some(index) = speeds.iter().position(|speed| !(speed.is_finite() && *speed >= 0.0)) {
        return invalid(format!("invalid speed {} at index {}", speeds[index], index));
    }
    if let Some(index) = time_deltas.iter().position(|dt| !(dt.is_finite() && *dt > 0.0)) {
        return invalid(format!("invalid time delta {} at index {}", time_deltas[index], index));
    }
    Ok(())
}
