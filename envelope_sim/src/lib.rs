//! Train speed envelope construction and physics simulation.
//!
//! An [`Envelope`] is a speed/time profile over positions along a path. Envelopes are
//! built in passes: speed limits are merged into a most restrictive speed profile
//! ([`MrspEnvelopeBuilder`]), braking curves are added for slowdowns and stops
//! ([`max_speed_envelope`]), acceleration curves are added using the rolling stock's
//! tractive effort ([`max_effort_envelope`]), and finally allowances spread extra
//! running time along the path ([`Allowance`]).

use thiserror::Error;

pub mod allowances;
pub mod envelope;
pub mod pipelines;
pub mod scenario;
pub mod sim;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use allowances::{Allowance, AllowanceDistribution, AllowanceRange, AllowanceValue};
pub use envelope::attrs::{EnvelopeAttr, EnvelopeAttrs, EnvelopeProfile, LimitSource, StopMeta};
pub use envelope::part::EnvelopePart;
pub use envelope::{Envelope, EnvelopeBuilder, EnvelopePoint};
pub use envelope::mrsp::{mrsp_part, MrspEnvelopeBuilder};
pub use envelope::speed_cap::EnvelopeSpeedCap;
pub use pipelines::max_effort::max_effort_envelope;
pub use pipelines::max_speed::max_speed_envelope;
pub use scenario::{simulate, Scenario, SimulationResult, SimulationStage, SimulationSummary};
pub use sim::integrator::{Action, IntegrationStep};
pub use sim::path::{EnvelopeSimPath, PhysicsPath};
pub use sim::rolling_stock::{GammaType, PhysicsRollingStock, SimpleRollingStock};
pub use sim::{BrakingUseCase, EnvelopeSimContext};

/// Who is expected to fix a failed computation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCause {
    /// The inputs cannot produce a valid result.
    User,
    /// An invariant of the library itself was broken.
    Internal,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnvelopeSimError {
    #[error("envelope parts are not contiguous: part {index} ends at {end_pos} but the next one begins at {next_begin_pos}")]
    EnvelopePartsNotContiguous {
        index: usize,
        end_pos: f64,
        next_begin_pos: f64,
    },
    #[error("an envelope needs at least one part")]
    EmptyEnvelope,
    #[error("invalid envelope part: {0}")]
    InvalidEnvelopePart(String),
    #[error("impossible simulation: {0}")]
    ImpossibleSimulation(String),
    #[error("allowance did not converge: discontinuity in the search space")]
    AllowanceConvergenceDiscontinuity,
    #[error("allowance did not converge: the requested time cannot be lost in this setting")]
    AllowanceConvergenceTooMuchTime,
    #[error("allowance did not converge: the train cannot go fast enough in this setting")]
    AllowanceConvergenceNotEnoughTime,
    #[error("allowance [{begin_pos}, {end_pos}] is outside of the envelope [{envelope_begin}, {envelope_end}]")]
    AllowanceOutOfBounds {
        begin_pos: f64,
        end_pos: f64,
        envelope_begin: f64,
        envelope_end: f64,
    },
    #[error("allowance range [{begin_pos}, {end_pos}] does not tile the allowance region [{region_begin}, {region_end}]")]
    AllowanceRangeOutOfBounds {
        begin_pos: f64,
        end_pos: f64,
        region_begin: f64,
        region_end: f64,
    },
    #[error("overlay [{begin_pos}, {end_pos}] overlaps or precedes the previous overlay")]
    OverlayOutOfOrder { begin_pos: f64, end_pos: f64 },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl EnvelopeSimError {
    pub fn cause(&self) -> ErrorCause {
        match self {
            EnvelopeSimError::EnvelopePartsNotContiguous { .. }
            | EnvelopeSimError::InvalidEnvelopePart(_)
            | EnvelopeSimError::OverlayOutOfOrder { .. }
            | EnvelopeSimError::AllowanceConvergenceDiscontinuity => ErrorCause::Internal,
            _ => ErrorCause::User,
        }
    }
}

/// Forward coasting did not meet the envelope, or its simulation failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoastingFailure {
    #[error("reached a stop while coasting, at position {position}")]
    ReachedStop { position: f64 },
    #[error(transparent)]
    Simulation(#[from] EnvelopeSimError),
}

impl From<CoastingFailure> for EnvelopeSimError {
    fn from(failure: CoastingFailure) -> Self {
        match failure {
            CoastingFailure::Simulation(err) => err,
            failure => EnvelopeSimError::ImpossibleSimulation(failure.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_causes() {
        assert_eq!(
            EnvelopeSimError::AllowanceConvergenceTooMuchTime.cause(),
            ErrorCause::User
        );
        assert_eq!(EnvelopeSimError::EmptyEnvelope.cause(), ErrorCause::User);
        assert_eq!(
            EnvelopeSimError::AllowanceConvergenceDiscontinuity.cause(),
            ErrorCause::Internal
        );
        let err: EnvelopeSimError = CoastingFailure::ReachedStop { position: 12.0 }.into();
        assert!(matches!(err, EnvelopeSimError::ImpossibleSimulation(_)));
        let err: EnvelopeSimError = CoastingFailure::Simulation(EnvelopeSimError::EmptyEnvelope).into();
        assert_eq!(err, EnvelopeSimError::EmptyEnvelope);
    }
}
