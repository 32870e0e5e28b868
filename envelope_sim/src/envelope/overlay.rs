use crate::envelope::part::EnvelopePart;
use crate::envelope::Envelope;
use crate::utils::are_speeds_equal;
use crate::EnvelopeSimError;

/// Replaces ranges of a base envelope with overlay parts.
///
/// Overlays are added in the direction of the builder and must not overlap each other.
/// Between overlays, the base envelope is kept. Where an overlay starts or ends at a speed
/// within tolerance of the base, the base is nudged so that the result stays continuous.
#[derive(Clone, Debug)]
pub struct OverlayEnvelopeBuilder<'a> {
    base: &'a Envelope,
    reverse: bool,
    overlays: Vec<EnvelopePart>,
}

impl<'a> OverlayEnvelopeBuilder<'a> {
    pub fn forward(base: &'a Envelope) -> Self {
        Self {
            base,
            reverse: false,
            overlays: Vec::new(),
        }
    }

    pub fn backward(base: &'a Envelope) -> Self {
        Self {
            base,
            reverse: true,
            overlays: Vec::new(),
        }
    }

    pub fn base(&self) -> &'a Envelope {
        self.base
    }

    /// Where the next overlay may start, in the direction of the builder.
    pub fn free_position(&self) -> f64 {
        match (self.overlays.last(), self.reverse) {
            (Some(last), false) => last.end_pos(),
            (Some(last), true) => last.begin_pos(),
            (None, false) => self.base.begin_pos(),
            (None, true) => self.base.end_pos(),
        }
    }

    pub fn add_part(&mut self, part: EnvelopePart) -> Result<(), EnvelopeSimError> {
        let out_of_order = EnvelopeSimError::OverlayOutOfOrder {
            begin_pos: part.begin_pos(),
            end_pos: part.end_pos(),
        };
        if part.begin_pos() < self.base.begin_pos() || part.end_pos() > self.base.end_pos() {
            return Err(out_of_order);
        }
        let free = self.free_position();
        let in_order = if self.reverse {
            part.end_pos() <= free
        } else {
            part.begin_pos() >= free
        };
        if !in_order {
            return Err(out_of_order);
        }
        self.overlays.push(part);
        Ok(())
    }

    pub fn build(mut self) -> Result<Envelope, EnvelopeSimError> {
        if self.reverse {
            self.overlays.reverse();
        }
        let base = self.base;
        let mut parts = Vec::with_capacity(base.len() + 2 * self.overlays.len());
        let mut position = base.begin_pos();
        let mut prev_overlay_speed: Option<f64> = None;
        for overlay in self.overlays {
            let begin_speed = prev_overlay_speed.filter(|&speed| {
                are_speeds_equal(speed, base.interpolate_speed_right_dir(position, 1.0))
            });
            let end_speed = Some(overlay.begin_speed()).filter(|&speed| {
                are_speeds_equal(speed, base.interpolate_speed_left_dir(overlay.begin_pos(), 1.0))
            });
            parts.extend(base.slice_with_speeds(position, begin_speed, overlay.begin_pos(), end_speed));
            position = overlay.end_pos();
            prev_overlay_speed = Some(overlay.end_speed());
            parts.push(overlay);
        }
        let begin_speed = prev_overlay_speed
            .filter(|&speed| are_speeds_equal(speed, base.interpolate_speed_right_dir(position, 1.0)));
        parts.extend(base.slice_with_speeds(position, begin_speed, base.end_pos(), None));
        Envelope::new(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{flat_part, part_from};

    #[test]
    fn test_no_change() {
        let base = Envelope::new(vec![flat_part(0.0, 8.0, 1.0), flat_part(8.0, 16.0, 2.0)]).unwrap();
        assert_eq!(OverlayEnvelopeBuilder::forward(&base).build().unwrap(), base);
        assert_eq!(OverlayEnvelopeBuilder::backward(&base).build().unwrap(), base);
    }

    #[test]
    fn test_constant_speed_overlay() {
        //  +====+     +====+
        //        \   /
        //          +
        //  0    3  4  5    8
        let base_part = flat_part(0.0, 8.0, 2.0);
        let base = Envelope::new(vec![base_part.clone()]).unwrap();
        let overlay = part_from(&[3.0, 4.0, 5.0], &[2.0, 1.0, 2.0]);
        for reverse in [false, true] {
            let mut builder = if reverse {
                OverlayEnvelopeBuilder::backward(&base)
            } else {
                OverlayEnvelopeBuilder::forward(&base)
            };
            builder.add_part(overlay.clone()).unwrap();
            let envelope = builder.build().unwrap();
            assert_eq!(envelope.len(), 3);
            assert!(envelope.is_continuous());
            assert_eq!(*envelope.part(0), base_part.slice(0.0, 3.0).unwrap());
            assert_eq!(*envelope.part(1), overlay);
            assert!(envelope.total_time() > base.total_time());
        }
    }

    #[test]
    fn test_multiple_overlays() {
        let base_part = flat_part(0.0, 8.0, 2.0);
        let base = Envelope::new(vec![base_part.clone()]).unwrap();
        let mut builder = OverlayEnvelopeBuilder::forward(&base);
        builder.add_part(part_from(&[0.0, 1.0, 3.0], &[2.0, 1.0, 2.0])).unwrap();
        builder.add_part(part_from(&[6.0, 7.0, 8.0], &[2.0, 1.0, 2.0])).unwrap();
        let envelope = builder.build().unwrap();
        assert_eq!(envelope.len(), 3);
        assert!(envelope.is_continuous());
        assert_eq!(*envelope.part(1), base_part.slice(3.0, 6.0).unwrap());
    }

    #[test]
    fn test_out_of_order() {
        let base = Envelope::new(vec![flat_part(0.0, 8.0, 2.0)]).unwrap();
        let mut builder = OverlayEnvelopeBuilder::forward(&base);
        builder.add_part(part_from(&[4.0, 5.0, 6.0], &[2.0, 1.0, 2.0])).unwrap();
        let err = builder.add_part(part_from(&[1.0, 2.0, 3.0], &[2.0, 1.0, 2.0]));
        assert!(matches!(err, Err(EnvelopeSimError::OverlayOutOfOrder { .. })));

        let mut builder = OverlayEnvelopeBuilder::backward(&base);
        builder.add_part(part_from(&[4.0, 5.0, 6.0], &[2.0, 1.0, 2.0])).unwrap();
        builder.add_part(part_from(&[1.0, 2.0, 3.0], &[2.0, 1.0, 2.0])).unwrap();
        assert!(builder.add_part(part_from(&[3.5, 4.5], &[2.0, 2.0])).is_err());
        assert_eq!(builder.build().unwrap().len(), 5);
    }

    #[test]
    fn test_near_equal_junction_is_snapped() {
        let base = Envelope::new(vec![flat_part(0.0, 8.0, 2.0)]).unwrap();
        let mut builder = OverlayEnvelopeBuilder::forward(&base);
        builder
            .add_part(part_from(&[3.0, 4.0, 5.0], &[2.0 - 1e-8, 1.0, 2.0 + 1e-8]))
            .unwrap();
        let envelope = builder.build().unwrap();
        assert!(envelope.is_continuous());
    }
}
