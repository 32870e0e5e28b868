use crate::envelope::attrs::{EnvelopeAttrs, EnvelopeProfile};
use crate::envelope::mrsp::mrsp_part;
use crate::envelope::part::EnvelopePart;
use crate::envelope::physics::intersect_step_with_speed;
use crate::envelope::Envelope;
use crate::EnvelopeSimError;

/// Caps the speed of an envelope.
///
/// Ranges under the cap are kept as slices of the original parts. Ranges over the cap,
/// even when they span several parts, become a single flat part at the cap speed, with
/// the given attributes and the `ConstantSpeed` profile.
pub struct EnvelopeSpeedCap;

impl EnvelopeSpeedCap {
    pub fn from(envelope: &Envelope, attrs: EnvelopeAttrs, cap: f64) -> Result<Envelope, EnvelopeSimError> {
        let flat_attrs = attrs.with(EnvelopeProfile::ConstantSpeed);
        let mut res = Vec::with_capacity(envelope.len());
        let mut flat_begin: Option<f64> = None;

        for part in envelope {
            for (begin, end, over) in split_at_cap(part, cap) {
                if over {
                    flat_begin.get_or_insert(begin);
                    continue;
                }
                if let Some(flat_begin) = flat_begin.take() {
                    res.push(mrsp_part(flat_begin, begin, cap, flat_attrs.clone())?);
                }
                let begin_speed = (begin != part.begin_pos()).then_some(cap);
                let end_speed = (end != part.end_pos()).then_some(cap);
                res.extend(part.slice_with_speeds(begin, begin_speed, end, end_speed));
            }
        }
        if let Some(flat_begin) = flat_begin {
            res.push(mrsp_part(flat_begin, envelope.end_pos(), cap, flat_attrs)?);
        }
        Envelope::new(res)
    }
}

/// Cuts a part where it crosses the cap, as `(begin, end, over_the_cap)` ranges.
fn split_at_cap(part: &EnvelopePart, cap: f64) -> Vec<(f64, f64, bool)> {
    let mut cuts = vec![part.begin_pos()];
    for step in 0..part.step_count() {
        let (speed_a, speed_b) = (part.speed(step), part.speed(step + 1));
        if (speed_a - cap) * (speed_b - cap) < 0.0 {
            let position = intersect_step_with_speed(
                part.position(step),
                part.position(step + 1),
                speed_a,
                speed_b,
                cap,
            );
            if position > part.position(step) && position < part.position(step + 1) {
                cuts.push(position);
            }
        }
    }
    cuts.push(part.end_pos());

    let mut ranges: Vec<(f64, f64, bool)> = Vec::with_capacity(cuts.len());
    for bounds in cuts.windows(2) {
        let (begin, end) = (bounds[0], bounds[1]);
        let over = part.interpolate_speed((begin + end) / 2.0) > cap;
        match ranges.last_mut() {
            Some(range) if range.2 == over => range.1 = end,
            _ => ranges.push((begin, end, over)),
        }
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::attrs::LimitSource;
    use crate::testing::{flat_part, part_from};

    fn envelope() -> Envelope {
        Envelope::new(vec![
            part_from(&[0.0, 2.0, 8.0], &[0.0, 2.0, 4.0]),
            flat_part(8.0, 12.0, 4.0),
            part_from(&[12.0, 18.0, 20.0], &[4.0, 2.0, 0.0]),
        ])
        .unwrap()
    }

    fn assert_similar(a: &Envelope, b: &Envelope) {
        assert_eq!(a.len(), b.len());
        for (part_a, part_b) in a.iter().zip(b) {
            assert_eq!(part_a.point_count(), part_b.point_count());
            for i in 0..part_a.point_count() {
                assert!((part_a.position(i) - part_b.position(i)).abs() < 1e-9);
                assert!((part_a.speed(i) - part_b.speed(i)).abs() < 1e-9);
            }
            assert_eq!(part_a.attrs(), part_b.attrs());
        }
    }

    #[test]
    fn test_cap() {
        let attrs = EnvelopeAttrs::new().with(LimitSource::MarecoSpeedLimit);
        let capped = EnvelopeSpeedCap::from(&envelope(), attrs, 3.0).unwrap();
        assert_eq!(capped.len(), 3);
        assert!(capped.is_continuous());
        assert!((capped.max_speed() - 3.0).abs() < 1e-9);
        // speed² = 2x until 8 m, then 40 - 2x from 12 m
        assert!((capped.part(1).begin_pos() - 4.5).abs() < 1e-9);
        assert!((capped.part(1).end_pos() - 15.5).abs() < 1e-9);
        assert_eq!(capped.part(1).profile(), Some(EnvelopeProfile::ConstantSpeed));
        assert_eq!(capped.part(1).attrs().limit_source(), Some(&LimitSource::MarecoSpeedLimit));
        assert!(capped.total_time() > envelope().total_time());
    }

    #[test]
    fn test_cap_above_max_changes_nothing() {
        let capped = EnvelopeSpeedCap::from(&envelope(), EnvelopeAttrs::new(), 5.0).unwrap();
        assert_eq!(capped, envelope());
    }

    #[test]
    fn test_cap_twice() {
        let attrs = EnvelopeAttrs::new();
        let once = EnvelopeSpeedCap::from(&envelope(), attrs.clone(), 1.0).unwrap();
        let first = EnvelopeSpeedCap::from(&envelope(), attrs.clone(), 1.5).unwrap();
        let twice = EnvelopeSpeedCap::from(&first, attrs, 1.0).unwrap();
        assert_similar(&once, &twice);
    }
}
