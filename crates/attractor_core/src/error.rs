//! Error types for the simulation core.
//!
//! Numerical failures carry the data produced before the failure so that a
//! caller (for instance a parameter sweep) can decide whether to keep the
//! partial result, retry with a smaller step, or skip the parameter set.

use crate::trajectory::Trajectory;
use serde::Serialize;
use std::fmt;

/// Primary error type for core operations.
#[derive(Debug, thiserror::Error)]
pub enum DynamicsError {
    /// The caller supplied inconsistent input (dimensions, spans, counts).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Integration(#[from] IntegrationFailure),

    #[error(transparent)]
    Divergence(#[from] DivergenceFailure),
}

/// Why the integrator stopped making progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StallReason {
    /// Error control drove the step below the configured minimum.
    StepUnderflow,
    /// The vector field returned NaN or infinity.
    NonFiniteDerivative,
    /// The configured step-attempt budget was exhausted.
    StepLimit,
}

impl fmt::Display for StallReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StallReason::StepUnderflow => "step size underflow",
            StallReason::NonFiniteDerivative => "non-finite derivative",
            StallReason::StepLimit => "step limit exhausted",
        };
        f.write_str(text)
    }
}

/// The solver could not reach the end of the requested span.
///
/// `partial` holds every accepted step up to `last_time`, dense output included.
#[derive(Debug, thiserror::Error)]
#[error("integration failed at t = {last_time}: {reason}")]
pub struct IntegrationFailure {
    pub reason: StallReason,
    pub last_time: f64,
    pub partial: Trajectory,
}

/// Where in an iteration run the state escaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationPhase {
    Transient,
    Retained,
}

/// A map iteration produced a non-finite state.
///
/// `iteration` is the zero-based index (seed = 0) of `last_finite_state`.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize)]
#[error("map diverged after iteration {iteration} during the {phase:?} phase")]
pub struct DivergenceFailure {
    pub iteration: usize,
    pub last_finite_state: Vec<f64>,
    pub phase: IterationPhase,
}

pub type DynamicsResult<T> = Result<T, DynamicsError>;

#[cfg(test)]
mod tests {
    use super::{DivergenceFailure, DynamicsError, IterationPhase, StallReason};

    #[test]
    fn messages_name_the_failure() {
        let err = DynamicsError::InvalidInput("seed must be finite.".to_string());
        assert_eq!(err.to_string(), "invalid input: seed must be finite.");

        let err: DynamicsError = DivergenceFailure {
            iteration: 7,
            last_finite_state: vec![1e200, 0.0],
            phase: IterationPhase::Transient,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "map diverged after iteration 7 during the Transient phase"
        );
        assert_eq!(StallReason::StepLimit.to_string(), "step limit exhausted");
    }
}
