use crate::envelope::part::EnvelopePart;
use crate::envelope::physics::intersect_step_with_speed;
use crate::envelope::Envelope;
use crate::utils::CmpOperator;

/// The junction between two consecutive parts, seen in the direction of travel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PartTransition {
    pub position: f64,
    /// Speed at the end of the part the cursor comes from.
    pub prev_speed: f64,
    /// Speed at the beginning of the part the cursor goes into.
    pub next_speed: f64,
}

/// Scans an envelope forward or backward, one step at a time.
///
/// Step accessors follow the direction of travel: when going backward, the beginning of a
/// step is its highest position.
#[derive(Clone, Debug)]
pub struct EnvelopeCursor<'a> {
    envelope: &'a Envelope,
    reverse: bool,
    part_index: usize,
    step_index: usize,
    position: f64,
    /// Set when the position was found by speed, to avoid interpolating it back.
    speed: Option<f64>,
    reached_end: bool,
}

impl<'a> EnvelopeCursor<'a> {
    fn new(envelope: &'a Envelope, reverse: bool) -> Self {
        let part_index = if reverse { envelope.len() - 1 } else { 0 };
        let step_count = envelope.part(part_index).step_count();
        let step_index = if reverse { step_count - 1 } else { 0 };
        let mut cursor = Self {
            envelope,
            reverse,
            part_index,
            step_index,
            position: 0.0,
            speed: None,
            reached_end: false,
        };
        cursor.position = cursor.step_begin_pos();
        cursor
    }

    pub fn forward(envelope: &'a Envelope) -> Self {
        Self::new(envelope, false)
    }

    pub fn backward(envelope: &'a Envelope) -> Self {
        Self::new(envelope, true)
    }

    pub fn envelope(&self) -> &'a Envelope {
        self.envelope
    }

    pub fn is_reverse(&self) -> bool {
        self.reverse
    }

    pub fn direction(&self) -> f64 {
        if self.reverse {
            -1.0
        } else {
            1.0
        }
    }

    pub fn has_reached_end(&self) -> bool {
        self.reached_end
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn part_index(&self) -> usize {
        self.part_index
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn part(&self) -> &'a EnvelopePart {
        self.envelope.part(self.part_index)
    }

    pub fn step_begin_pos(&self) -> f64 {
        let part = self.part();
        if self.reverse {
            part.position(self.step_index + 1)
        } else {
            part.position(self.step_index)
        }
    }

    pub fn step_end_pos(&self) -> f64 {
        let part = self.part();
        if self.reverse {
            part.position(self.step_index)
        } else {
            part.position(self.step_index + 1)
        }
    }

    pub fn step_begin_speed(&self) -> f64 {
        let part = self.part();
        if self.reverse {
            part.speed(self.step_index + 1)
        } else {
            part.speed(self.step_index)
        }
    }

    pub fn step_end_speed(&self) -> f64 {
        let part = self.part();
        if self.reverse {
            part.speed(self.step_index)
        } else {
            part.speed(self.step_index + 1)
        }
    }

    /// Speed at the current position.
    pub fn speed(&self) -> f64 {
        if let Some(speed) = self.speed {
            return speed;
        }
        self.part().interpolate_speed_in_step(self.step_index, self.position)
    }

    /// Distance from `b` to `a`, counted positively in the direction of travel.
    pub fn compare_pos(&self, a: f64, b: f64) -> f64 {
        if self.reverse {
            b - a
        } else {
            a - b
        }
    }

    fn first_step_index(&self, part: &EnvelopePart) -> usize {
        if self.reverse {
            part.step_count() - 1
        } else {
            0
        }
    }

    fn last_step_index(&self, part: &EnvelopePart) -> usize {
        if self.reverse {
            0
        } else {
            part.step_count() - 1
        }
    }

    fn next_part_index(&self) -> Option<usize> {
        if self.reverse {
            self.part_index.checked_sub(1)
        } else if self.part_index + 1 < self.envelope.len() {
            Some(self.part_index + 1)
        } else {
            None
        }
    }

    fn set_position(&mut self, position: f64) {
        self.position = position;
        self.speed = None;
    }

    pub fn move_to_end(&mut self) {
        self.reached_end = true;
        self.position = if self.reverse {
            self.envelope.begin_pos()
        } else {
            self.envelope.end_pos()
        };
        self.speed = None;
    }

    /// Moves to the beginning of the next part. Returns `false` once the end is reached.
    pub fn next_part(&mut self) -> bool {
        if self.reached_end {
            return false;
        }
        let Some(next_index) = self.next_part_index() else {
            self.move_to_end();
            return false;
        };
        self.part_index = next_index;
        self.step_index = self.first_step_index(self.part());
        self.set_position(self.step_begin_pos());
        true
    }

    /// Moves to the beginning of the next step, which may be in the next part.
    /// Returns `false` once the end is reached.
    pub fn next_step(&mut self) -> bool {
        if self.reached_end {
            return false;
        }
        let part = self.part();
        let next_step = if self.reverse {
            self.step_index.checked_sub(1)
        } else if self.step_index + 1 < part.step_count() {
            Some(self.step_index + 1)
        } else {
            None
        };
        match next_step {
            Some(step_index) => {
                self.step_index = step_index;
                self.set_position(self.step_begin_pos());
                true
            }
            None => self.next_part(),
        }
    }

    /// Moves to `position`, which must not be behind the cursor. Returns `false` if the
    /// position is past the end of the envelope.
    pub fn find_position(&mut self, position: f64) -> bool {
        if self.reached_end {
            return false;
        }
        loop {
            let part = self.part();
            let part_end = part.position(if self.reverse { 0 } else { part.point_count() - 1 });
            if self.compare_pos(part_end, position) >= 0.0 {
                break;
            }
            if !self.next_part() {
                return false;
            }
        }
        while self.compare_pos(self.step_end_pos(), position) < 0.0 {
            if !self.next_step() {
                return false;
            }
        }
        self.set_position(position);
        true
    }

    /// Stops on the first part, starting with the current one, which matches.
    pub fn find_part<P: Fn(&EnvelopePart) -> bool>(&mut self, predicate: P) -> bool {
        if self.reached_end {
            return false;
        }
        loop {
            if predicate(self.part()) {
                return true;
            }
            if !self.next_part() {
                return false;
            }
        }
    }

    /// Looks for a matching transition, starting with the end of the current part.
    ///
    /// On success, the cursor stands at the end of the part preceding the transition.
    pub fn find_part_transition<P: Fn(&PartTransition) -> bool>(&mut self, predicate: P) -> Option<PartTransition> {
        if self.reached_end {
            return None;
        }
        loop {
            let next_index = self.next_part_index()?;
            let part = self.part();
            let next_part = self.envelope.part(next_index);
            let (position, prev_speed, next_speed) = if self.reverse {
                (part.begin_pos(), part.begin_speed(), next_part.end_speed())
            } else {
                (part.end_pos(), part.end_speed(), next_part.begin_speed())
            };
            self.step_index = self.last_step_index(part);
            self.set_position(position);
            let transition = PartTransition {
                position,
                prev_speed,
                next_speed,
            };
            if predicate(&transition) {
                return Some(transition);
            }
            if !self.next_part() {
                return None;
            }
        }
    }

    /// Moves to the first point whose speed satisfies `speed_at_point <operator> speed`.
    pub fn find_speed(&mut self, speed: f64, operator: CmpOperator) -> bool {
        let part_bound = |part: &EnvelopePart| match operator {
            CmpOperator::StrictlyHigher | CmpOperator::Higher => part.max_speed(),
            _ => part.min_speed(),
        };
        let part_matches = |part: &EnvelopePart| operator.compare(part_bound(part), speed);
        if !self.find_part(part_matches) {
            return false;
        }
        while !operator.compare(self.speed(), speed) && !operator.compare(self.step_end_speed(), speed) {
            let part_index = self.part_index;
            if !self.next_step() {
                return false;
            }
            if self.part_index != part_index && !self.find_part(part_matches) {
                return false;
            }
        }
        if operator.compare(self.speed(), speed) {
            return true;
        }
        let position = intersect_step_with_speed(
            self.step_begin_pos(),
            self.step_end_pos(),
            self.step_begin_speed(),
            self.step_end_speed(),
            speed,
        );
        self.position = position;
        self.speed = Some(speed);
        true
    }
}
