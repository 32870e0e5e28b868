//! Whole simulations described by serializable scenarios.
//!
//! A [`Scenario`] holds a path, a rolling stock, speed limits, stops and allowances.
//! [`simulate`] runs every pass over it and keeps the envelope produced by each one.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::allowances::Allowance;
use crate::envelope::attrs::{EnvelopeAttrs, EnvelopeProfile, LimitSource};
use crate::envelope::mrsp::{mrsp_part, MrspEnvelopeBuilder};
use crate::envelope::Envelope;
use crate::pipelines::max_effort::max_effort_envelope;
use crate::pipelines::max_speed::max_speed_envelope;
use crate::sim::path::EnvelopeSimPath;
use crate::sim::rolling_stock::SimpleRollingStock;
use crate::sim::{BrakingUseCase, EnvelopeSimContext};
use crate::EnvelopeSimError;

fn default_time_step() -> f64 {
    2.0
}

/// A constant grade over `[begin, end]`, in meters per kilometer.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct GradeRange {
    pub begin: f64,
    pub end: f64,
    pub grade: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PathDescription {
    pub length: f64,
    /// Flat where no range applies. Later ranges overwrite earlier ones.
    #[serde(default)]
    pub grades: Vec<GradeRange>,
}

impl PathDescription {
    pub fn build(&self) -> Result<EnvelopeSimPath, EnvelopeSimError> {
        let ranges: Vec<(f64, f64, f64)> = self
            .grades
            .iter()
            .map(|range| (range.begin, range.end, range.grade))
            .collect();
        EnvelopeSimPath::from_grade_ranges(self.length, &ranges)
    }
}

/// A speed limit over `[begin, end]`, in meters per second.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SpeedLimit {
    pub begin: f64,
    pub end: f64,
    pub speed: f64,
    /// Defaults to a speed section named after the range.
    #[serde(default)]
    pub source: Option<LimitSource>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    /// Integration time step, in seconds.
    #[serde(default = "default_time_step")]
    pub time_step: f64,
    #[serde(default)]
    pub initial_speed: f64,
    #[serde(default)]
    pub braking_use_case: BrakingUseCase,
    pub path: PathDescription,
    #[serde(default)]
    pub rolling_stock: SimpleRollingStock,
    #[serde(default)]
    pub speed_limits: Vec<SpeedLimit>,
    /// Positions where the train stops, the end of the path included if it stops there.
    #[serde(default)]
    pub stops: Vec<f64>,
    /// Applied in order, each one on the result of the previous one.
    #[serde(default)]
    pub allowances: Vec<Allowance>,
}

impl Scenario {
    /// A flat path run by the standard train, without speed limits other than its own.
    pub fn new(length: f64) -> Self {
        Self {
            time_step: default_time_step(),
            initial_speed: 0.0,
            braking_use_case: BrakingUseCase::default(),
            path: PathDescription {
                length,
                grades: Vec::new(),
            },
            rolling_stock: SimpleRollingStock::standard_train(),
            speed_limits: Vec::new(),
            stops: Vec::new(),
            allowances: Vec::new(),
        }
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// The most restrictive speed profile: the speed limits and the train's own maximum speed.
    pub fn mrsp(&self) -> Result<Envelope, EnvelopeSimError> {
        let length = self.path.length;
        let mut builder = MrspEnvelopeBuilder::new();
        let train_attrs = EnvelopeAttrs::new()
            .with(EnvelopeProfile::ConstantSpeed)
            .with(LimitSource::TrainLimit);
        builder.add_part(mrsp_part(0.0, length, self.rolling_stock.max_speed, train_attrs)?);

        for limit in &self.speed_limits {
            if limit.begin < 0.0 || limit.end > length || !(limit.begin < limit.end) {
                return Err(EnvelopeSimError::InvalidParameter(format!(
                    "speed limit [{}, {}] is not inside the path [0, {length}]",
                    limit.begin, limit.end
                )));
            }
            if !(limit.speed > 0.0) {
                return Err(EnvelopeSimError::InvalidParameter(format!(
                    "speed limit [{}, {}] must be positive, got {}",
                    limit.begin, limit.end, limit.speed
                )));
            }
            let source = limit
                .source
                .clone()
                .unwrap_or_else(|| LimitSource::SpeedSection(format!("{}-{}", limit.begin, limit.end)));
            let attrs = EnvelopeAttrs::new().with(EnvelopeProfile::ConstantSpeed).with(source);
            builder.add_part(mrsp_part(limit.begin, limit.end, limit.speed, attrs)?);
        }
        builder.build()
    }
}

/// The envelopes a simulation goes through.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SimulationStage {
    Mrsp,
    MaxSpeed,
    MaxEffort,
    Final,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SimulationResult {
    pub mrsp: Envelope,
    pub max_speed: Envelope,
    pub max_effort: Envelope,
    /// The max effort envelope with every allowance applied.
    pub final_envelope: Envelope,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct SimulationSummary {
    pub distance: f64,
    pub max_speed: f64,
    /// Running time at max effort, in seconds.
    pub min_running_time: f64,
    pub running_time: f64,
    pub added_time: f64,
}

impl SimulationResult {
    pub fn stage(&self, stage: SimulationStage) -> &Envelope {
        match stage {
            SimulationStage::Mrsp => &self.mrsp,
            SimulationStage::MaxSpeed => &self.max_speed,
            SimulationStage::MaxEffort => &self.max_effort,
            SimulationStage::Final => &self.final_envelope,
        }
    }

    pub fn summary(&self) -> SimulationSummary {
        let min_running_time = self.max_effort.total_time();
        let running_time = self.final_envelope.total_time();
        SimulationSummary {
            distance: self.final_envelope.total_distance(),
            max_speed: self.final_envelope.max_speed(),
            min_running_time,
            running_time,
            added_time: running_time - min_running_time,
        }
    }
}

/// Runs every pass of `scenario`: speed limits, braking curves, acceleration curves and
/// allowances.
pub fn simulate(scenario: &Scenario) -> Result<SimulationResult, EnvelopeSimError> {
    scenario.rolling_stock.validate()?;
    let path = scenario.path.build()?;
    let context = EnvelopeSimContext::new(&scenario.rolling_stock, &path, scenario.time_step)?
        .with_braking_use_case(scenario.braking_use_case);

    let mrsp = scenario.mrsp()?;
    debug!(parts = mrsp.len(), "built the most restrictive speed profile");
    let max_speed = max_speed_envelope(&context, &mrsp, &scenario.stops)?;
    debug!(parts = max_speed.len(), "built the max speed envelope");
    let max_effort = max_effort_envelope(&context, &max_speed, scenario.initial_speed)?;
    debug!(
        parts = max_effort.len(),
        time = max_effort.total_time(),
        "built the max effort envelope"
    );

    let mut final_envelope = max_effort.clone();
    for (index, allowance) in scenario.allowances.iter().enumerate() {
        final_envelope = allowance.apply(&final_envelope, &context)?;
        debug!(index, time = final_envelope.total_time(), "applied allowance");
    }

    Ok(SimulationResult {
        mrsp,
        max_speed,
        max_effort,
        final_envelope,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allowances::{AllowanceDistribution, AllowanceRange, AllowanceValue};

    const SCENARIO: &str = r#"{
        "path": {"length": 10000, "grades": [{"begin": 3000, "end": 4000, "grade": 5}]},
        "speed_limits": [{"begin": 0, "end": 10000, "speed": 44.4}],
        "stops": [6000, 10000],
        "allowances": [{
            "begin_pos": 0,
            "end_pos": 10000,
            "ranges": [{"begin_pos": 0, "end_pos": 10000, "value": {"value_type": "percentage", "percentage": 10}}]
        }]
    }"#;

    #[test]
    fn test_json_defaults() {
        let scenario = Scenario::from_json(SCENARIO).unwrap();
        assert_eq!(scenario.time_step, 2.0);
        assert_eq!(scenario.initial_speed, 0.0);
        assert_eq!(scenario.braking_use_case, BrakingUseCase::Timetable);
        assert_eq!(scenario.rolling_stock, SimpleRollingStock::standard_train());
        assert_eq!(scenario.allowances[0].distribution, AllowanceDistribution::Mareco);
    }

    #[test]
    fn test_simulate() {
        let scenario = Scenario::from_json(SCENARIO).unwrap();
        let res = simulate(&scenario).unwrap();

        assert_eq!(res.mrsp.max_speed(), 44.4);
        assert_eq!(res.mrsp.len(), 1);
        assert_eq!(
            res.mrsp.part(0).attrs().limit_source(),
            Some(&LimitSource::SpeedSection("0-10000".to_string()))
        );
        for stage in [SimulationStage::MaxSpeed, SimulationStage::MaxEffort, SimulationStage::Final] {
            let envelope = res.stage(stage);
            assert_eq!(envelope.begin_pos(), 0.0);
            assert_eq!(envelope.end_pos(), 10_000.0);
            assert_eq!(envelope.end_speed(), 0.0);
        }
        for envelope in [&res.max_effort, &res.final_envelope] {
            assert!(envelope.interpolate_speed(6000.0).abs() < 1e-6);
        }
        assert!(res.max_effort.is_continuous());
        assert!(res.final_envelope.is_continuous());

        let summary = res.summary();
        assert_eq!(summary.distance, 10_000.0);
        let expected = 0.1 * summary.min_running_time;
        assert!((summary.added_time - expected).abs() <= 2.0 * scenario.time_step);
    }

    #[test]
    fn test_train_limit() {
        let mut scenario = Scenario::new(10_000.0);
        scenario.rolling_stock.max_speed = 30.0;
        scenario.speed_limits.push(SpeedLimit {
            begin: 2000.0,
            end: 4000.0,
            speed: 20.0,
            source: None,
        });
        let mrsp = scenario.mrsp().unwrap();
        assert_eq!(mrsp.len(), 3);
        assert_eq!(mrsp.part(0).attrs().limit_source(), Some(&LimitSource::TrainLimit));
        assert_eq!(mrsp.interpolate_speed(3000.0), 20.0);

        let res = simulate(&scenario).unwrap();
        assert_eq!(res.final_envelope, res.max_effort);
        assert!(res.max_effort.max_speed() <= 30.0);
        assert!(res.max_effort.interpolate_speed(3000.0) <= 20.0);
    }

    #[test]
    fn test_invalid_scenarios() {
        let mut outside = Scenario::new(10_000.0);
        outside.speed_limits.push(SpeedLimit {
            begin: 5000.0,
            end: 12_000.0,
            speed: 20.0,
            source: None,
        });
        assert!(matches!(simulate(&outside), Err(EnvelopeSimError::InvalidParameter(_))));

        let mut bad_step = Scenario::new(10_000.0);
        bad_step.time_step = 0.0;
        assert!(matches!(simulate(&bad_step), Err(EnvelopeSimError::InvalidParameter(_))));

        let mut too_long = Scenario::new(10_000.0);
        too_long.stops.push(10_000.0);
        too_long.allowances.push(Allowance::new(
            0.0,
            12_000.0,
            0.0,
            vec![AllowanceRange::new(0.0, 12_000.0, AllowanceValue::FixedTime { seconds: 10.0 })],
            AllowanceDistribution::Linear,
        ));
        assert!(matches!(
            simulate(&too_long),
            Err(EnvelopeSimError::AllowanceOutOfBounds { .. })
        ));
    }
}
