use serde::{Deserialize, Serialize};

/// How much time an allowance adds to a base running time.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "value_type", rename_all = "snake_case")]
pub enum AllowanceValue {
    /// A fixed number of seconds.
    FixedTime { seconds: f64 },
    /// A percentage of the base running time.
    Percentage { percentage: f64 },
    /// Minutes per 100 kilometers.
    TimePerDistance { minutes_per_100km: f64 },
}

impl AllowanceValue {
    /// Seconds to add to a trip of `base_time` seconds over `distance` meters.
    pub fn allowance_time(&self, base_time: f64, distance: f64) -> f64 {
        match *self {
            AllowanceValue::FixedTime { seconds } => seconds,
            AllowanceValue::Percentage { percentage } => base_time * percentage / 100.0,
            AllowanceValue::TimePerDistance { minutes_per_100km } => minutes_per_100km * 60.0 * distance / 100_000.0,
        }
    }

    /// Added time relative to the base running time.
    pub fn allowance_ratio(&self, base_time: f64, distance: f64) -> f64 {
        if base_time == 0.0 {
            return 0.0;
        }
        self.allowance_time(base_time, distance) / base_time
    }

    /// Share of the added time which goes to a section of the allowance range.
    ///
    /// Time per distance allowances are spread according to distance, the others
    /// according to the base running time.
    pub fn section_ratio(&self, section_time: f64, base_time: f64, section_distance: f64, base_distance: f64) -> f64 {
        let (part, total) = match self {
            AllowanceValue::TimePerDistance { .. } => (section_distance, base_distance),
            _ => (section_time, base_time),
        };
        if total == 0.0 {
            return 0.0;
        }
        part / total
    }

    pub(crate) fn is_negative(&self) -> bool {
        let value = match *self {
            AllowanceValue::FixedTime { seconds } => seconds,
            AllowanceValue::Percentage { percentage } => percentage,
            AllowanceValue::TimePerDistance { minutes_per_100km } => minutes_per_100km,
        };
        !(value >= 0.0)
    }
}

/// An allowance value applying over `[begin_pos, end_pos]`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct AllowanceRange {
    pub begin_pos: f64,
    pub end_pos: f64,
    pub value: AllowanceValue,
}

impl AllowanceRange {
    pub fn new(begin_pos: f64, end_pos: f64, value: AllowanceValue) -> Self {
        Self {
            begin_pos,
            end_pos,
            value,
        }
    }

    pub fn distance(&self) -> f64 {
        self.end_pos - self.begin_pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowance_times() {
        let fixed = AllowanceValue::FixedTime { seconds: 60.0 };
        assert_eq!(fixed.allowance_time(1000.0, 50_000.0), 60.0);
        let percentage = AllowanceValue::Percentage { percentage: 10.0 };
        assert_eq!(percentage.allowance_time(1000.0, 50_000.0), 100.0);
        assert_eq!(percentage.allowance_ratio(1000.0, 50_000.0), 0.1);
        // 4.5 min/100km over 200 km
        let per_distance = AllowanceValue::TimePerDistance { minutes_per_100km: 4.5 };
        assert!((per_distance.allowance_time(1000.0, 200_000.0) - 540.0).abs() < 1e-9);
    }

    #[test]
    fn test_section_ratios() {
        let percentage = AllowanceValue::Percentage { percentage: 5.0 };
        assert_eq!(percentage.section_ratio(30.0, 120.0, 500.0, 1000.0), 0.25);
        let per_distance = AllowanceValue::TimePerDistance { minutes_per_100km: 5.0 };
        assert_eq!(per_distance.section_ratio(30.0, 120.0, 500.0, 1000.0), 0.5);
        assert_eq!(percentage.section_ratio(0.0, 0.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn test_json_format() {
        let range: AllowanceRange = serde_json::from_str(
            r#"{"begin_pos": 0, "end_pos": 1000, "value": {"value_type": "percentage", "percentage": 5}}"#,
        )
        .unwrap();
        assert_eq!(range.value, AllowanceValue::Percentage { percentage: 5.0 });
        assert_eq!(range.distance(), 1000.0);
        assert!(AllowanceValue::FixedTime { seconds: -1.0 }.is_negative());
        assert!(!AllowanceValue::FixedTime { seconds: 0.0 }.is_negative());
    }
}
