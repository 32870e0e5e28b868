//! Most restrictive speed profile: the lowest of all speed limits, at every position.

use crate::envelope::attrs::EnvelopeAttrs;
use crate::envelope::part::EnvelopePart;
use crate::envelope::Envelope;
use crate::EnvelopeSimError;

/// A constant speed limit over `[begin, end]`.
pub fn mrsp_part(begin: f64, end: f64, speed: f64, attrs: EnvelopeAttrs) -> Result<EnvelopePart, EnvelopeSimError> {
    EnvelopePart::generate_times(attrs, vec![begin, end], vec![speed, speed])
}

/// Merges overlapping speed limits into the lowest one.
///
/// Each resulting part is a slice of the limit active over its range, keeping its
/// attributes. When several limits share the lowest speed, the limit already in effect
/// keeps going; otherwise the limit added first wins.
#[derive(Clone, Debug, Default)]
pub struct MrspEnvelopeBuilder {
    parts: Vec<EnvelopePart>,
}

impl MrspEnvelopeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_part(&mut self, part: EnvelopePart) -> &mut Self {
        self.parts.push(part);
        self
    }

    pub fn build(self) -> Result<Envelope, EnvelopeSimError> {
        let mut breakpoints: Vec<f64> = self
            .parts
            .iter()
            .flat_map(|part| part.positions().iter().copied())
            .collect();
        breakpoints.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        breakpoints.dedup();
        if breakpoints.len() < 2 {
            return Err(EnvelopeSimError::EmptyEnvelope);
        }

        // (begin, end, index of the winning limit)
        let mut runs: Vec<(f64, f64, usize)> = Vec::new();
        for bounds in breakpoints.windows(2) {
            let (begin, end) = (bounds[0], bounds[1]);
            let covering: Vec<usize> = (0..self.parts.len())
                .filter(|&i| self.parts[i].begin_pos() <= begin && self.parts[i].end_pos() >= end)
                .collect();
            if covering.is_empty() {
                return Err(EnvelopeSimError::InvalidParameter(format!(
                    "no speed limit covers [{}, {}]",
                    begin, end
                )));
            }

            for (sub_begin, sub_end) in self.split_at_crossings(&covering, begin, end) {
                let middle = (sub_begin + sub_end) / 2.0;
                let current = runs.last().map(|&(_, _, index)| index);
                let winner = self.lowest_at(&covering, middle, current);
                match runs.last_mut() {
                    Some(run) if run.2 == winner && run.1 == sub_begin => run.1 = sub_end,
                    _ => runs.push((sub_begin, sub_end, winner)),
                }
            }
        }

        let mut res = Vec::with_capacity(runs.len());
        for (begin, end, index) in runs {
            let part = self.parts[index].slice(begin, end).ok_or_else(|| {
                EnvelopeSimError::InvalidEnvelopePart(format!("empty speed limit slice [{}, {}]", begin, end))
            })?;
            res.push(part);
        }
        Envelope::new(res)
    }

    fn squared_speed(&self, index: usize, position: f64) -> f64 {
        let speed = self.parts[index].interpolate_speed(position);
        speed * speed
    }

    /// Splits `[begin, end]` where two covering limits cross.
    fn split_at_crossings(&self, covering: &[usize], begin: f64, end: f64) -> Vec<(f64, f64)> {
        let mut cuts = vec![begin, end];
        for (k, &i) in covering.iter().enumerate() {
            for &j in &covering[k + 1..] {
                // squared speeds are linear inside an elementary interval
                let diff_begin = self.squared_speed(i, begin) - self.squared_speed(j, begin);
                let diff_end = self.squared_speed(i, end) - self.squared_speed(j, end);
                if diff_begin * diff_end < 0.0 {
                    let t = diff_begin / (diff_begin - diff_end);
                    let cut = begin + t * (end - begin);
                    if cut > begin && cut < end {
                        cuts.push(cut);
                    }
                }
            }
        }
        cuts.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        cuts.dedup();
        cuts.windows(2).map(|w| (w[0], w[1])).collect()
    }

    fn lowest_at(&self, covering: &[usize], position: f64, current: Option<usize>) -> usize {
        let mut lowest = f64::INFINITY;
        let mut winner = covering[0];
        for &index in covering {
            let speed = self.parts[index].interpolate_speed(position);
            if speed < lowest {
                lowest = speed;
                winner = index;
            }
        }
        match current {
            Some(current)
                if covering.contains(&current) && self.parts[current].interpolate_speed(position) == lowest =>
            {
                current
            }
            _ => winner,
        }
    }
}
