use serde::{Deserialize, Serialize};

use crate::EnvelopeSimError;

/// How the braking performance of a rolling stock is expressed.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GammaType {
    /// A constant deceleration, regardless of slopes and resistance.
    Const,
    /// A maximum braking force, which combines with the other forces.
    Max,
}

impl Default for GammaType {
    fn default() -> Self {
        GammaType::Const
    }
}

/// Physical properties of a train, as seen by the integrator.
///
/// Forces are in newtons, masses in kilograms and speeds in meters per second.
pub trait PhysicsRollingStock {
    /// Length of the train, in meters.
    fn length(&self) -> f64;

    fn mass(&self) -> f64;

    /// Mass including the inertia of rotating parts.
    fn inertia(&self) -> f64;

    fn max_speed(&self) -> f64;

    /// Davis resistance to movement at `speed`.
    fn rolling_resistance(&self, speed: f64) -> f64;

    /// Derivative of [`Self::rolling_resistance`] with respect to speed.
    fn rolling_resistance_deriv(&self, speed: f64) -> f64;

    /// Highest tractive effort available at `speed`.
    fn max_effort(&self, speed: f64) -> f64;

    /// Braking force used for timetable braking, when the gamma type is [`GammaType::Max`].
    fn max_braking_force(&self, speed: f64) -> f64;

    /// Guaranteed emergency braking force.
    fn safe_braking_force(&self, speed: f64) -> f64;

    fn service_braking_force(&self, speed: f64) -> f64;

    fn normal_service_braking_force(&self, speed: f64) -> f64;

    /// Constant deceleration used for timetable braking, as a positive value.
    fn timetable_deceleration(&self) -> f64;

    fn gamma_type(&self) -> GammaType;
}

/// One point of a tractive effort curve.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct TractiveEffortPoint {
    pub speed: f64,
    pub max_effort: f64,
}

/// A rolling stock described by a handful of constants and a tractive effort table.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimpleRollingStock {
    pub length: f64,
    pub mass: f64,
    pub inertia_coefficient: f64,
    /// Davis coefficients: `a + b * v + c * v²`.
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub max_speed: f64,
    /// Timetable deceleration, or the braking force per unit of inertia with [`GammaType::Max`].
    pub gamma: f64,
    pub gamma_type: GammaType,
    pub safe_deceleration: f64,
    pub service_deceleration: f64,
    pub normal_service_deceleration: f64,
    /// Sorted by increasing speed.
    pub tractive_effort: Vec<TractiveEffortPoint>,
}

impl Default for SimpleRollingStock {
    fn default() -> Self {
        Self::standard_train()
    }
}

impl SimpleRollingStock {
    /// A 400 m long, 900 t passenger train.
    pub fn standard_train() -> Self {
        let mass = 900_000.0;
        let tractive_effort = (0..=84)
            .map(|speed| {
                let speed = speed as f64;
                TractiveEffortPoint {
                    speed,
                    max_effort: if speed == 0.0 {
                        450_000.0
                    } else {
                        f64::min(450_000.0, 12_500_000.0 / speed)
                    },
                }
            })
            .collect();
        Self {
            length: 400.0,
            mass,
            inertia_coefficient: 1.05,
            a: 0.65 * mass / 100.0,
            b: 0.008 * mass / 100.0 * 3.6,
            c: 0.00012 * mass / 100.0 * 3.6 * 3.6,
            max_speed: 300.0 / 3.6,
            gamma: 0.5,
            gamma_type: GammaType::Const,
            safe_deceleration: 0.75,
            service_deceleration: 0.65,
            normal_service_deceleration: 0.5,
            tractive_effort,
        }
    }

    pub fn validate(&self) -> Result<(), EnvelopeSimError> {
        let positive = [
            ("length", self.length),
            ("mass", self.mass),
            ("inertia_coefficient", self.inertia_coefficient),
            ("max_speed", self.max_speed),
            ("gamma", self.gamma),
            ("safe_deceleration", self.safe_deceleration),
            ("service_deceleration", self.service_deceleration),
            ("normal_service_deceleration", self.normal_service_deceleration),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(EnvelopeSimError::InvalidParameter(format!(
                    "rolling stock {name} must be positive, got {value}"
                )));
            }
        }
        if self.tractive_effort.is_empty() {
            return Err(EnvelopeSimError::InvalidParameter(
                "the tractive effort curve is empty".to_string(),
            ));
        }
        if self
            .tractive_effort
            .windows(2)
            .any(|points| points[1].speed <= points[0].speed)
        {
            return Err(EnvelopeSimError::InvalidParameter(
                "tractive effort speeds must be strictly increasing".to_string(),
            ));
        }
        Ok(())
    }
}

/// Linear interpolation over the effort table, flat outside of it.
fn interpolate_effort(curve: &[TractiveEffortPoint], speed: f64) -> f64 {
    let Some(first) = curve.first() else {
        return 0.0;
    };
    if speed <= first.speed {
        return first.max_effort;
    }
    for points in curve.windows(2) {
        let (low, high) = (points[0], points[1]);
        if speed <= high.speed {
            let t = (speed - low.speed) / (high.speed - low.speed);
            return low.max_effort + t * (high.max_effort - low.max_effort);
        }
    }
    curve.last().map_or(0.0, |last| last.max_effort)
}

impl PhysicsRollingStock for SimpleRollingStock {
    fn length(&self) -> f64 {
        self.length
    }

    fn mass(&self) -> f64 {
        self.mass
    }

    fn inertia(&self) -> f64 {
        self.mass * self.inertia_coefficient
    }

    fn max_speed(&self) -> f64 {
        self.max_speed
    }

    fn rolling_resistance(&self, speed: f64) -> f64 {
        let speed = speed.abs();
        self.a + self.b * speed + self.c * speed * speed
    }

    fn rolling_resistance_deriv(&self, speed: f64) -> f64 {
        self.b + 2.0 * self.c * speed.abs()
    }

    fn max_effort(&self, speed: f64) -> f64 {
        interpolate_effort(&self.tractive_effort, speed.abs())
    }

    fn max_braking_force(&self, _speed: f64) -> f64 {
        self.gamma * self.inertia()
    }

    fn safe_braking_force(&self, _speed: f64) -> f64 {
        self.safe_deceleration * self.inertia()
    }

    fn service_braking_force(&self, _speed: f64) -> f64 {
        self.service_deceleration * self.inertia()
    }

    fn normal_service_braking_force(&self, _speed: f64) -> f64 {
        self.normal_service_deceleration * self.inertia()
    }

    fn timetable_deceleration(&self) -> f64 {
        self.gamma
    }

    fn gamma_type(&self) -> GammaType {
        self.gamma_type
    }
}
