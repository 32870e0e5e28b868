//! Fixtures shared by unit tests.

use crate::envelope::attrs::{EnvelopeAttrs, EnvelopeProfile, LimitSource};
use crate::envelope::mrsp::mrsp_part;
use crate::envelope::part::EnvelopePart;
use crate::envelope::Envelope;
use crate::pipelines::max_effort::max_effort_envelope;
use crate::pipelines::max_speed::max_speed_envelope;
use crate::sim::path::EnvelopeSimPath;
use crate::sim::rolling_stock::SimpleRollingStock;
use crate::sim::EnvelopeSimContext;

pub(crate) fn flat_part(begin: f64, end: f64, speed: f64) -> EnvelopePart {
    EnvelopePart::generate_times(EnvelopeAttrs::new(), vec![begin, end], vec![speed, speed]).unwrap()
}

pub(crate) fn part_from(positions: &[f64], speeds: &[f64]) -> EnvelopePart {
    EnvelopePart::generate_times(EnvelopeAttrs::new(), positions.to_vec(), speeds.to_vec()).unwrap()
}

/// Owns the train and path a test context borrows.
pub(crate) struct TestSim {
    pub train: SimpleRollingStock,
    pub path: EnvelopeSimPath,
}

impl TestSim {
    pub fn flat(length: f64) -> Self {
        Self {
            train: SimpleRollingStock::standard_train(),
            path: EnvelopeSimPath::flat(length).unwrap(),
        }
    }

    pub fn with_grades(length: f64, grades: &[(f64, f64, f64)]) -> Self {
        Self {
            train: SimpleRollingStock::standard_train(),
            path: EnvelopeSimPath::from_grade_ranges(length, grades).unwrap(),
        }
    }

    pub fn context(&self, time_step: f64) -> EnvelopeSimContext<'_> {
        EnvelopeSimContext::new(&self.train, &self.path, time_step).unwrap()
    }
}

/// A single speed limit over the whole path.
pub(crate) fn flat_mrsp(length: f64, speed: f64) -> Envelope {
    let attrs = EnvelopeAttrs::new()
        .with(EnvelopeProfile::ConstantSpeed)
        .with(LimitSource::SpeedSection("line".to_string()));
    Envelope::from_part(mrsp_part(0.0, length, speed, attrs).unwrap())
}

/// Max effort envelope for a train starting from rest under a flat speed limit.
pub(crate) fn max_effort(context: &EnvelopeSimContext, speed: f64, stops: &[f64]) -> Envelope {
    let mrsp = flat_mrsp(context.path.length(), speed);
    let max_speed = max_speed_envelope(context, &mrsp, stops).unwrap();
    max_effort_envelope(context, &max_speed, 0.0).unwrap()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Shape {
    Increasing,
    Constant,
    Decreasing,
    Mixed,
}

pub(crate) fn part_shape(part: &EnvelopePart) -> Shape {
    let speeds = part.speeds();
    if speeds.windows(2).all(|w| w[0] == w[1]) {
        Shape::Constant
    } else if speeds.windows(2).all(|w| w[0] <= w[1]) {
        Shape::Increasing
    } else if speeds.windows(2).all(|w| w[0] >= w[1]) {
        Shape::Decreasing
    } else {
        Shape::Mixed
    }
}

pub(crate) fn check_shape(envelope: &Envelope, expected: &[Shape]) {
    let shapes: Vec<Shape> = envelope.iter().map(part_shape).collect();
    assert_eq!(shapes, expected);
}

/// Positions where consecutive parts meet.
pub(crate) fn transitions(envelope: &Envelope) -> Vec<f64> {
    envelope.iter().skip(1).map(|part| part.begin_pos()).collect()
}

/// Checks that an envelope never goes above another one.
pub(crate) fn check_under(envelope: &Envelope, ceiling: &Envelope, tolerance: f64) {
    for part in envelope {
        for (&position, &speed) in part.positions().iter().zip(part.speeds()) {
            let limit = f64::max(
                ceiling.interpolate_speed_left_dir(position, 1.0),
                ceiling.interpolate_speed_right_dir(position, 1.0),
            );
            assert!(
                speed <= limit + tolerance,
                "speed {speed} above {limit} at {position}"
            );
        }
    }
}
