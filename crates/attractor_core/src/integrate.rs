//! Adaptive integration of continuous systems.

use crate::error::{DynamicsError, DynamicsResult, IntegrationFailure, StallReason};
use crate::solvers::{all_finite, initial_step, DormandPrince45, ERROR_ORDER};
use crate::traits::DynamicalSystem;
use crate::trajectory::{IntegrationStats, Trajectory};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorSettings {
    /// Upper bound on every internal step; `None` leaves steps unbounded.
    pub max_step: Option<f64>,
    pub rtol: f64,
    pub atol: f64,
    /// Starting step; estimated from the field when absent.
    pub first_step: Option<f64>,
    /// Steps below this size count as a stall.
    pub min_step: f64,
    /// Budget of step attempts (accepted + rejected).
    pub max_steps: usize,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            max_step: None,
            rtol: 1e-3,
            atol: 1e-6,
            first_step: None,
            min_step: 1e-12,
            max_steps: 10_000_000,
        }
    }
}

impl IntegratorSettings {
    pub fn with_max_step(max_step: f64) -> Self {
        Self {
            max_step: Some(max_step),
            ..Self::default()
        }
    }

    fn validate(&self) -> DynamicsResult<()> {
        if let Some(max_step) = self.max_step {
            if !(max_step > 0.0) {
                return Err(invalid("max_step must be positive."));
            }
        }
        if !(self.rtol > 0.0) || !(self.atol > 0.0) {
            return Err(invalid("tolerances must be positive."));
        }
        if !(self.min_step > 0.0) {
            return Err(invalid("min_step must be positive."));
        }
        if let Some(h) = self.first_step {
            if !(h > 0.0) {
                return Err(invalid("first_step must be positive."));
            }
            if h < self.min_step {
                return Err(invalid("first_step must be at least min_step."));
            }
        }
        if self.max_steps == 0 {
            return Err(invalid("max_steps must be greater than zero."));
        }
        Ok(())
    }
}

/// Integrates `system` over `t_span` from `state0` with default tolerances,
/// never taking an internal step larger than `max_step`.
pub fn integrate<S>(
    system: &S,
    t_span: (f64, f64),
    state0: &[f64],
    max_step: f64,
) -> DynamicsResult<Trajectory>
where
    S: DynamicalSystem<f64> + ?Sized,
{
    integrate_with(system, t_span, state0, &IntegratorSettings::with_max_step(max_step))
}

pub fn integrate_with<S>(
    system: &S,
    t_span: (f64, f64),
    state0: &[f64],
    settings: &IntegratorSettings,
) -> DynamicsResult<Trajectory>
where
    S: DynamicalSystem<f64> + ?Sized,
{
    settings.validate()?;
    let (t0, t1) = t_span;
    if !t0.is_finite() || !t1.is_finite() {
        return Err(invalid("time span must be finite."));
    }
    if t1 < t0 {
        return Err(invalid("time span must not run backwards."));
    }
    let dim = system.dimension();
    if state0.len() != dim {
        return Err(DynamicsError::InvalidInput(format!(
            "initial state dimension mismatch. Expected {}, got {}.",
            dim,
            state0.len()
        )));
    }
    if !all_finite(state0) {
        return Err(invalid("initial state must be finite."));
    }

    let mut trajectory = Trajectory::start(t0, state0.to_vec());
    if t1 == t0 {
        return Ok(trajectory);
    }

    let mut stepper = DormandPrince45::new(dim);
    let mut stats = IntegrationStats::default();
    let mut t = t0;
    let mut y = state0.to_vec();

    if !stepper.prime(&system, t, &y) {
        return Err(stall(trajectory, stepper, stats, StallReason::NonFiniteDerivative, t));
    }

    let max_step = settings.max_step.unwrap_or(f64::INFINITY);
    let mut h = settings
        .first_step
        .unwrap_or_else(|| initial_step(&mut stepper, &system, t, &y, settings.rtol, settings.atol))
        .min(max_step);
    let mut rejected_non_finite = false;

    while t < t1 {
        if stats.accepted_steps + stats.rejected_steps >= settings.max_steps {
            return Err(stall(trajectory, stepper, stats, StallReason::StepLimit, t));
        }

        let remaining = t1 - t;
        h = h.min(max_step);
        // Land on t1 exactly instead of leaving a sliver step, unless that
        // would break the step bound.
        if h >= remaining || (remaining - h <= settings.min_step && remaining <= max_step) {
            h = remaining;
        }
        if (h < settings.min_step || t + h == t) && h < remaining {
            let reason = if rejected_non_finite {
                StallReason::NonFiniteDerivative
            } else {
                StallReason::StepUnderflow
            };
            return Err(stall(trajectory, stepper, stats, reason, t));
        }

        let attempt = stepper.attempt(&system, t, &y, h, settings.rtol, settings.atol);
        if attempt.error_norm <= 1.0 {
            let segment = stepper.dense_segment(t, &y, h);
            stepper.accept(&mut y);
            t = if h == remaining { t1 } else { t + h };
            trajectory.push_step(segment, t, y.clone());
            stats.accepted_steps += 1;
            rejected_non_finite = false;

            let factor = if attempt.error_norm == 0.0 {
                MAX_FACTOR
            } else {
                (SAFETY * attempt.error_norm.powf(-1.0 / (ERROR_ORDER + 1.0)))
                    .clamp(MIN_FACTOR, MAX_FACTOR)
            };
            h *= factor;
        } else {
            stats.rejected_steps += 1;
            rejected_non_finite = !attempt.is_finite();
            let factor = if attempt.is_finite() {
                (SAFETY * attempt.error_norm.powf(-1.0 / (ERROR_ORDER + 1.0))).max(MIN_FACTOR)
            } else {
                MIN_FACTOR
            };
            h *= factor.min(1.0);
        }
    }

    stats.evaluations = stepper.evaluations();
    trajectory.set_stats(stats);
    debug!(
        t0,
        t1,
        accepted = stats.accepted_steps,
        rejected = stats.rejected_steps,
        evaluations = stats.evaluations,
        "integration finished"
    );
    Ok(trajectory)
}

fn stall(
    mut partial: Trajectory,
    stepper: DormandPrince45,
    mut stats: IntegrationStats,
    reason: StallReason,
    last_time: f64,
) -> DynamicsError {
    stats.evaluations = stepper.evaluations();
    partial.set_stats(stats);
    warn!(%reason, last_time, accepted = stats.accepted_steps, "integration stalled");
    DynamicsError::Integration(IntegrationFailure {
        reason,
        last_time,
        partial,
    })
}

fn invalid(message: &str) -> DynamicsError {
    DynamicsError::InvalidInput(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::{integrate, integrate_with, IntegratorSettings};
    use crate::error::{DynamicsError, StallReason};
    use crate::systems::{Flow, Lorenz, VanDerPol};
    use crate::traits::{DynamicalSystem, Scalar};

    struct Decay;

    impl<T: Scalar> DynamicalSystem<T> for Decay {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
            out[0] = -x[0];
        }
    }

    /// `x' = x^2` escapes to infinity at `t = 1 / x0`.
    struct FiniteTimeBlowup;

    impl DynamicalSystem<f64> for FiniteTimeBlowup {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = x[0] * x[0];
        }
    }

    struct NanField;

    impl DynamicalSystem<f64> for NanField {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, t: f64, _x: &[f64], out: &mut [f64]) {
            out[0] = if t > 0.5 { f64::NAN } else { 1.0 };
        }
    }

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T, DynamicsError>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    #[test]
    fn rejects_invalid_inputs() {
        assert_err_contains(integrate(&Decay, (0.0, 1.0), &[1.0], 0.0), "max_step");
        assert_err_contains(integrate(&Decay, (1.0, 0.0), &[1.0], 0.1), "backwards");
        assert_err_contains(integrate(&Decay, (0.0, 1.0), &[1.0, 2.0], 0.1), "dimension");
        assert_err_contains(integrate(&Decay, (0.0, 1.0), &[f64::NAN], 0.1), "finite");
    }

    #[test]
    fn empty_span_returns_initial_state() {
        let trajectory = integrate(&Decay, (2.0, 2.0), &[1.0], 0.1).expect("integrate");
        assert_eq!(trajectory.len(), 1);
        assert_eq!(trajectory.at(2.0), Some(vec![1.0]));
    }

    #[test]
    fn exponential_decay_matches_closed_form_at_arbitrary_times() {
        let settings = IntegratorSettings {
            max_step: Some(0.5),
            rtol: 1e-8,
            atol: 1e-10,
            ..IntegratorSettings::default()
        };
        let trajectory = integrate_with(&Decay, (0.0, 3.0), &[1.0], &settings).expect("integrate");
        assert_eq!(trajectory.t_span(), (0.0, 3.0));
        for t in [0.0, 0.123, 1.0, 1.77, 2.5, 3.0] {
            let value = trajectory.at(t).expect("inside span")[0];
            assert!((value - (-t).exp()).abs() < 1e-7, "t = {t}");
        }
    }

    #[test]
    fn steps_never_exceed_max_step() {
        let trajectory =
            integrate(&VanDerPol { mu: 2.0 }, (0.0, 5.0), &[0.1, 0.0], 0.01).expect("integrate");
        for window in trajectory.times().windows(2) {
            assert!(window[1] - window[0] <= 0.01 + 1e-12);
        }
        assert_eq!(trajectory.t_span().1, 5.0);
        let stats = trajectory.stats();
        assert_eq!(stats.accepted_steps + 1, trajectory.len());
        assert!(stats.evaluations > 6 * stats.accepted_steps);
    }

    #[test]
    fn span_just_over_max_step_keeps_the_bound() {
        let t1 = 0.01 + 5e-13;
        let trajectory = integrate(&Decay, (0.0, t1), &[1.0], 0.01).expect("integrate");
        assert_eq!(trajectory.t_span(), (0.0, t1));
        assert!(trajectory.len() >= 3);
        for window in trajectory.times().windows(2) {
            // Allow rounding in the differences, not a 5e-13 overshoot.
            assert!(window[1] - window[0] <= 0.01 + 1e-14, "step {}", window[1] - window[0]);
        }
    }

    #[test]
    fn first_step_below_min_step_is_rejected() {
        let settings = IntegratorSettings {
            max_step: Some(0.1),
            first_step: Some(1e-13),
            ..IntegratorSettings::default()
        };
        assert_err_contains(
            integrate_with(&Decay, (0.0, 1.0), &[1.0], &settings),
            "first_step must be at least min_step",
        );

        let settings = IntegratorSettings {
            first_step: Some(1e-3),
            ..settings
        };
        let trajectory = integrate_with(&Decay, (0.0, 1.0), &[1.0], &settings).expect("integrate");
        assert_eq!(trajectory.t_span().1, 1.0);
    }

    #[test]
    fn settings_survive_a_json_round_trip() {
        for settings in [IntegratorSettings::default(), IntegratorSettings::with_max_step(0.01)] {
            let json = serde_json::to_string(&settings).expect("serialize");
            let back: IntegratorSettings = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(back, settings);
        }
        let parsed: IntegratorSettings = serde_json::from_str(r#"{"rtol": 1e-6}"#).expect("parse");
        assert_eq!(parsed.max_step, None);
        assert_eq!(parsed.rtol, 1e-6);
    }

    #[test]
    fn identical_inputs_give_identical_trajectories() {
        let flow = Flow::Lorenz(Lorenz::default());
        let a = integrate(&flow, (0.0, 10.0), &[1.0, 1.0, 1.0], 0.01).expect("integrate");
        let b = integrate(&flow, (0.0, 10.0), &[1.0, 1.0, 1.0], 0.01).expect("integrate");
        assert_eq!(a.times(), b.times());
        assert_eq!(a.states(), b.states());
        assert_eq!(a.sample_uniform(777), b.sample_uniform(777));
    }

    #[test]
    fn blowup_reports_partial_trajectory() {
        let result = integrate(&FiniteTimeBlowup, (0.0, 2.0), &[1.0], 0.1);
        match result {
            Err(DynamicsError::Integration(failure)) => {
                assert_eq!(failure.reason, StallReason::StepUnderflow);
                assert!(failure.last_time < 1.0);
                assert!(failure.last_time > 0.5);
                assert_eq!(failure.partial.t_span().1, failure.last_time);
                assert!(failure.partial.len() > 1);
            }
            other => panic!("expected integration failure, got {other:?}"),
        }
    }

    #[test]
    fn non_finite_derivative_is_reported() {
        let result = integrate(&NanField, (0.0, 1.0), &[0.0], 0.1);
        match result {
            Err(DynamicsError::Integration(failure)) => {
                assert_eq!(failure.reason, StallReason::NonFiniteDerivative);
                assert!(failure.last_time <= 0.5 + 1e-9);
                let partial_end = failure.partial.final_state().expect("partial state")[0];
                assert!((partial_end - failure.last_time).abs() < 1e-9);
            }
            other => panic!("expected integration failure, got {other:?}"),
        }
    }

    #[test]
    fn step_budget_is_enforced() {
        let settings = IntegratorSettings {
            max_step: Some(0.01),
            max_steps: 10,
            ..IntegratorSettings::default()
        };
        match integrate_with(&Decay, (0.0, 1.0), &[1.0], &settings) {
            Err(DynamicsError::Integration(failure)) => {
                assert_eq!(failure.reason, StallReason::StepLimit);
                assert_eq!(failure.partial.len(), 11);
            }
            other => panic!("expected step limit, got {other:?}"),
        }
    }
}
