//! Train physics: the path, the rolling stock and the integrator moving one over the other.

use serde::{Deserialize, Serialize};

use crate::EnvelopeSimError;

pub mod integrator;
pub mod path;
pub mod rolling_stock;

use path::PhysicsPath;
use rolling_stock::PhysicsRollingStock;

/// Which braking model the simulation uses.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BrakingUseCase {
    /// Regular timetable braking, driven by the rolling stock gamma.
    Timetable,
    /// ETCS emergency braking, on the worst grade under the train.
    Emergency,
    /// ETCS service braking, on the worst grade under the train.
    Service,
    /// ETCS normal service braking, on the worst grade under the train.
    NormalService,
}

impl Default for BrakingUseCase {
    fn default() -> Self {
        BrakingUseCase::Timetable
    }
}

impl BrakingUseCase {
    pub fn is_etcs(self) -> bool {
        !matches!(self, BrakingUseCase::Timetable)
    }
}

/// Everything a simulation needs besides the envelopes it works on.
#[derive(Clone, Copy)]
pub struct EnvelopeSimContext<'a> {
    pub rolling_stock: &'a dyn PhysicsRollingStock,
    pub path: &'a dyn PhysicsPath,
    /// Integration time step, in seconds.
    pub time_step: f64,
    pub braking_use_case: BrakingUseCase,
}

impl<'a> EnvelopeSimContext<'a> {
    pub fn new(
        rolling_stock: &'a dyn PhysicsRollingStock,
        path: &'a dyn PhysicsPath,
        time_step: f64,
    ) -> Result<Self, EnvelopeSimError> {
        if !(time_step.is_finite() && time_step > 0.0) {
            return Err(EnvelopeSimError::InvalidParameter(format!(
                "time step must be positive, got {time_step}"
            )));
        }
        Ok(Self {
            rolling_stock,
            path,
            time_step,
            braking_use_case: BrakingUseCase::Timetable,
        })
    }

    pub fn with_braking_use_case(mut self, braking_use_case: BrakingUseCase) -> Self {
        self.braking_use_case = braking_use_case;
        self
    }
}

impl std::fmt::Debug for EnvelopeSimContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeSimContext")
            .field("path_length", &self.path.length())
            .field("train_length", &self.rolling_stock.length())
            .field("time_step", &self.time_step)
            .field("braking_use_case", &self.braking_use_case)
            .finish()
    }
}
