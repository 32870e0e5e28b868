//! Linear allowance distribution: every speed of the section is scaled by the same ratio.

use crate::envelope::part::EnvelopePart;
use crate::envelope::{Envelope, EnvelopeBuilder};
use crate::EnvelopeSimError;

pub fn initial_low_bound(section: &Envelope, capacity_speed_limit: f64) -> f64 {
    let max_speed = section.max_speed();
    if max_speed <= 0.0 {
        return 0.0;
    }
    capacity_speed_limit / max_speed
}

pub fn initial_high_bound() -> f64 {
    1.0
}

/// Scales the speeds of `base` by `ratio`, without going under the capacity speed limit
/// where the base was above it.
pub fn core(base: &Envelope, ratio: f64, capacity_speed_limit: f64) -> Result<Envelope, EnvelopeSimError> {
    let mut builder = EnvelopeBuilder::new();
    for part in base {
        builder.add_part(scale_part(part, ratio, capacity_speed_limit)?);
    }
    builder.build()
}

fn scale_part(part: &EnvelopePart, ratio: f64, capacity_speed_limit: f64) -> Result<EnvelopePart, EnvelopeSimError> {
    let speeds = part
        .speeds()
        .iter()
        .map(|&speed| (speed * ratio).max(speed.min(capacity_speed_limit)))
        .collect();
    EnvelopePart::generate_times(part.attrs().clone(), part.positions().to_vec(), speeds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{max_effort, TestSim};

    #[test]
    fn test_scaled_speeds() {
        let sim = TestSim::flat(10_000.0);
        let context = sim.context(2.0);
        let envelope = max_effort(&context, 40.0, &[10_000.0]);
        let res = core(&envelope, 0.5, 10.0).unwrap();
        assert_eq!(res.len(), envelope.len());
        assert!((res.max_speed() - 20.0).abs() < 1e-9);
        assert_eq!(res.end_speed(), 0.0);
        for (scaled, part) in res.iter().zip(&envelope) {
            assert_eq!(scaled.positions(), part.positions());
            assert_eq!(scaled.profile(), part.profile());
            for (&scaled_speed, &speed) in scaled.speeds().iter().zip(part.speeds()) {
                assert!((scaled_speed - (speed / 2.0).max(speed.min(10.0))).abs() < 1e-9);
            }
        }
        assert!(res.total_time() > envelope.total_time());
        assert!(res.total_time() <= 2.0 * envelope.total_time() + 1e-6);
    }

    #[test]
    fn test_bounds() {
        let sim = TestSim::flat(10_000.0);
        let context = sim.context(2.0);
        let envelope = max_effort(&context, 40.0, &[10_000.0]);
        assert!((initial_low_bound(&envelope, 10.0) - 0.25).abs() < 1e-9);
        assert_eq!(initial_high_bound(), 1.0);
        let unchanged = core(&envelope, 1.0, 0.0).unwrap();
        assert!((unchanged.total_time() - envelope.total_time()).abs() < 1e-6);
    }
}
