//! Envelopes: position-contiguous sequences of [`EnvelopePart`]s.

pub mod attrs;
pub mod builder;
pub mod constraint;
pub mod cursor;
pub mod mrsp;
pub mod overlay;
pub mod part;
pub mod physics;
pub mod speed_cap;

use serde::{Deserialize, Serialize};

use crate::EnvelopeSimError;
use part::EnvelopePart;

/// One point of an envelope, with the time elapsed since its beginning.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct EnvelopePoint {
    pub time: f64,
    pub speed: f64,
    pub position: f64,
}

/// An immutable speed profile over a position range.
///
/// Parts are position-contiguous: each part begins where the previous one ends. Speeds
/// may jump at part transitions, in which case the envelope is not continuous.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    parts: Vec<EnvelopePart>,
    continuous: bool,
    /// Part transitions, including the begin and end positions.
    part_positions: Vec<f64>,
    /// Time from the beginning to each part transition.
    cumulative_times: Vec<f64>,
    min_speed: f64,
    max_speed: f64,
}

impl Envelope {
    pub fn new(parts: Vec<EnvelopePart>) -> Result<Self, EnvelopeSimError> {
        if parts.is_empty() {
            return Err(EnvelopeSimError::EmptyEnvelope);
        }

        let mut continuous = true;
        for (index, pair) in parts.windows(2).enumerate() {
            if pair[0].end_pos() != pair[1].begin_pos() {
                return Err(EnvelopeSimError::EnvelopePartsNotContiguous {
                    index,
                    end_pos: pair[0].end_pos(),
                    next_begin_pos: pair[1].begin_pos(),
                });
            }
            if pair[0].end_speed() != pair[1].begin_speed() {
                continuous = false;
            }
        }

        let min_speed = parts.iter().map(EnvelopePart::min_speed).fold(f64::INFINITY, f64::min);
        let max_speed = parts.iter().map(EnvelopePart::max_speed).fold(f64::NEG_INFINITY, f64::max);

        let mut part_positions = Vec::with_capacity(parts.len() + 1);
        part_positions.push(parts[0].begin_pos());
        part_positions.extend(parts.iter().map(EnvelopePart::end_pos));

        let mut cumulative_times = Vec::with_capacity(parts.len() + 1);
        let mut total = 0.0;
        cumulative_times.push(total);
        for part in &parts {
            total += part.total_time();
            cumulative_times.push(total);
        }

        Ok(Self {
            parts,
            continuous,
            part_positions,
            cumulative_times,
            min_speed,
            max_speed,
        })
    }

    /// An envelope made of a single part.
    pub fn from_part(part: EnvelopePart) -> Self {
        let begin_pos = part.begin_pos();
        let end_pos = part.end_pos();
        let total_time = part.total_time();
        Self {
            continuous: true,
            part_positions: vec![begin_pos, end_pos],
            cumulative_times: vec![0.0, total_time],
            min_speed: part.min_speed(),
            max_speed: part.max_speed(),
            parts: vec![part],
        }
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn part(&self, index: usize) -> &EnvelopePart {
        &self.parts[index]
    }

    pub fn parts(&self) -> &[EnvelopePart] {
        &self.parts
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EnvelopePart> {
        self.parts.iter()
    }

    pub fn is_continuous(&self) -> bool {
        self.continuous
    }

    pub fn begin_pos(&self) -> f64 {
        self.part_positions[0]
    }

    pub fn end_pos(&self) -> f64 {
        self.part_positions[self.part_positions.len() - 1]
    }

    pub fn total_distance(&self) -> f64 {
        self.end_pos() - self.begin_pos()
    }

    pub fn begin_speed(&self) -> f64 {
        self.parts[0].begin_speed()
    }

    pub fn end_speed(&self) -> f64 {
        self.parts[self.parts.len() - 1].end_speed()
    }

    pub fn min_speed(&self) -> f64 {
        self.min_speed
    }

    pub fn max_speed(&self) -> f64 {
        self.max_speed
    }

    pub fn contains(&self, position: f64) -> bool {
        position >= self.begin_pos() && position <= self.end_pos()
    }

    /// Index of the part holding `position`. On a transition, the part ending there wins.
    pub fn find_left(&self, position: f64) -> Option<usize> {
        if !self.contains(position) {
            return None;
        }
        let index = self.part_positions.partition_point(|&pos| pos < position);
        Some(index.saturating_sub(1))
    }

    /// Index of the part holding `position`. On a transition, the part starting there wins.
    pub fn find_right(&self, position: f64) -> Option<usize> {
        if !self.contains(position) {
            return None;
        }
        let index = self.part_positions.partition_point(|&pos| pos <= position);
        Some(index.saturating_sub(1).min(self.parts.len() - 1))
    }

    /// Like [`Envelope::find_left`], where left means behind when traveling in `direction`.
    pub fn find_left_dir(&self, position: f64, direction: f64) -> Option<usize> {
        if direction > 0.0 {
            self.find_left(position)
        } else {
            self.find_right(position)
        }
    }

    /// Like [`Envelope::find_right`], where right means ahead when traveling in `direction`.
    pub fn find_right_dir(&self, position: f64, direction: f64) -> Option<usize> {
        if direction > 0.0 {
            self.find_right(position)
        } else {
            self.find_left(position)
        }
    }

    fn clamp_position(&self, position: f64) -> f64 {
        position.clamp(self.begin_pos(), self.end_pos())
    }

    /// Speed at `position`, clamped to the envelope. On a discontinuity, the part ending
    /// there is used, so a part boundary belongs to the part on its left. Use
    /// [`Envelope::interpolate_speed_right_dir`] for the part starting there.
    pub fn interpolate_speed(&self, position: f64) -> f64 {
        let position = self.clamp_position(position);
        let index = self.find_left(position).unwrap_or(0);
        self.parts[index].interpolate_speed(position)
    }

    /// Speed at `position`, preferring the part coming from behind along `direction`.
    pub fn interpolate_speed_left_dir(&self, position: f64, direction: f64) -> f64 {
        let position = self.clamp_position(position);
        let index = self.find_left_dir(position, direction).unwrap_or(0);
        self.parts[index].interpolate_speed(position)
    }

    /// Speed at `position`, preferring the part ahead along `direction`.
    pub fn interpolate_speed_right_dir(&self, position: f64, direction: f64) -> f64 {
        let position = self.clamp_position(position);
        let index = self.find_right_dir(position, direction).unwrap_or(0);
        self.parts[index].interpolate_speed(position)
    }

    /// Highest speed over `[begin, end]`.
    pub fn max_speed_in_range(&self, begin: f64, end: f64) -> f64 {
        let begin = self.clamp_position(begin);
        let end = self.clamp_position(end);
        let begin_index = self.find_right(begin).unwrap_or(0);
        let end_index = self.find_left(end).unwrap_or(self.parts.len() - 1);
        let mut max_speed = self.parts[begin_index]
            .interpolate_speed(begin)
            .max(self.parts[end_index].interpolate_speed(end));
        if begin_index == end_index {
            let part = &self.parts[begin_index];
            for (&pos, &speed) in part.positions().iter().zip(part.speeds()) {
                if pos > begin && pos < end {
                    max_speed = max_speed.max(speed);
                }
            }
            return max_speed;
        }
        for (index, part) in self.parts.iter().enumerate().take(end_index + 1).skip(begin_index) {
            for (&pos, &speed) in part.positions().iter().zip(part.speeds()) {
                let inside = (index != begin_index || pos > begin) && (index != end_index || pos < end);
                if inside {
                    max_speed = max_speed.max(speed);
                }
            }
        }
        max_speed
    }

    /// Time from the beginning of the envelope to the beginning of part `index`.
    /// `index == len()` gives the total time.
    pub fn cumulative_time(&self, index: usize) -> f64 {
        self.cumulative_times[index]
    }

    pub fn total_time(&self) -> f64 {
        self.cumulative_times[self.cumulative_times.len() - 1]
    }

    /// Time from the beginning of the envelope to `position`, clamped to the envelope.
    pub fn interpolate_total_time(&self, position: f64) -> f64 {
        let position = self.clamp_position(position);
        let index = self.find_left(position).unwrap_or(0);
        self.cumulative_times[index] + self.parts[index].interpolate_total_time(position)
    }

    /// Same as [`Envelope::interpolate_total_time`], with negative positions mapped to zero.
    pub fn interpolate_total_time_clamp(&self, position: f64) -> f64 {
        self.interpolate_total_time(position.max(0.0))
    }

    pub fn time_between(&self, begin: f64, end: f64) -> f64 {
        self.interpolate_total_time(end) - self.interpolate_total_time(begin)
    }

    /// Parts covering `[begin, end]`, cut at both ends. Infinite bounds are allowed.
    pub fn slice(&self, begin: f64, end: f64) -> Vec<EnvelopePart> {
        self.slice_with_speeds(begin, None, end, None)
    }

    /// Parts covering `[begin, end]`, cut at both ends, optionally forcing the edge speeds.
    pub fn slice_with_speeds(
        &self,
        begin: f64,
        begin_speed: Option<f64>,
        end: f64,
        end_speed: Option<f64>,
    ) -> Vec<EnvelopePart> {
        let begin = self.clamp_position(begin);
        let end = self.clamp_position(end);
        if !(begin < end) {
            return Vec::new();
        }
        let (begin_index, end_index) = match (self.find_right(begin), self.find_left(end)) {
            (Some(begin_index), Some(end_index)) => (begin_index, end_index),
            _ => return Vec::new(),
        };

        if begin_index == end_index {
            return self.parts[begin_index]
                .slice_with_speeds(begin, begin_speed, end, end_speed)
                .into_iter()
                .collect();
        }

        let begin_part = &self.parts[begin_index];
        let end_part = &self.parts[end_index];
        let mut res = Vec::with_capacity(end_index - begin_index + 1);
        res.extend(begin_part.slice_with_speeds(begin, begin_speed, begin_part.end_pos(), None));
        res.extend(self.parts[begin_index + 1..end_index].iter().cloned());
        res.extend(end_part.slice_with_speeds(end_part.begin_pos(), None, end, end_speed));
        res
    }

    /// Every point of every part, in order. Part transitions appear twice.
    pub fn iterate_points(&self) -> Vec<EnvelopePoint> {
        let mut res = Vec::new();
        let mut time = 0.0;
        for part in &self.parts {
            for i in 0..part.point_count() {
                res.push(EnvelopePoint {
                    time,
                    speed: part.speed(i),
                    position: part.position(i),
                });
                if i < part.step_count() {
                    time += part.time_delta(i);
                }
            }
        }
        res
    }
}

impl<'a> IntoIterator for &'a Envelope {
    type Item = &'a EnvelopePart;
    type IntoIter = std::slice::Iter<'a, EnvelopePart>;

    fn into_iter(self) -> Self::IntoIter {
        self.parts.iter()
    }
}

/// Concatenates parts into an envelope.
#[derive(Clone, Debug, Default)]
pub struct EnvelopeBuilder {
    parts: Vec<EnvelopePart>,
}

impl EnvelopeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_part(&mut self, part: EnvelopePart) {
        self.parts.push(part);
    }

    pub fn add_parts(&mut self, parts: impl IntoIterator<Item = EnvelopePart>) {
        self.parts.extend(parts);
    }

    pub fn add_envelope(&mut self, envelope: &Envelope) {
        self.parts.extend(envelope.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn last_part(&self) -> Option<&EnvelopePart> {
        self.parts.last()
    }

    /// Reverses the order of the parts added so far, for builders filled backward.
    pub fn reverse(&mut self) {
        self.parts.reverse();
    }

    pub fn build(self) -> Result<Envelope, EnvelopeSimError> {
        Envelope::new(self.parts)
    }
}
