//! End-to-end pipelines built from the integrator, the section detector and
//! the return-map builder.

use crate::integrate::integrate;
use crate::return_map::{build_return_map, ReturnMapPair};
use crate::section::{detect_crossings_where, Crossing, SectionSpec};
use crate::traits::DynamicalSystem;
use crate::trajectory::{IntegrationStats, Samples};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Time span, step bound and uniform resampling density of one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingPlan {
    pub t_span: (f64, f64),
    pub max_step: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoincareRun {
    pub crossings: Vec<Crossing>,
    pub pairs: Vec<ReturnMapPair>,
    pub stats: IntegrationStats,
}

/// Integrates, resamples uniformly, detects the crossings of `section` that
/// satisfy `predicate`, and pairs consecutive crossings through `selector`.
pub fn poincare_return_map<S, P, F>(
    system: &S,
    state0: &[f64],
    plan: &SamplingPlan,
    section: &SectionSpec,
    predicate: P,
    selector: F,
) -> Result<PoincareRun>
where
    S: DynamicalSystem<f64> + ?Sized,
    P: Fn(&[f64]) -> bool,
    F: Fn(&Crossing) -> f64,
{
    if plan.samples < 2 {
        bail!("At least two samples are needed to detect crossings.");
    }
    let trajectory = integrate(system, plan.t_span, state0, plan.max_step)
        .context("Integration failed while building the return map.")?;
    let samples = trajectory.sample_uniform(plan.samples);
    let crossings = detect_crossings_where(&samples, section, predicate)
        .context("Section scan failed.")?;
    let pairs = build_return_map(&crossings, selector);
    Ok(PoincareRun {
        crossings,
        pairs,
        stats: trajectory.stats(),
    })
}

/// Samples of the orbit over `[settle_time, settle_time + window]`, after
/// integrating through the transient from `t = 0`.
pub fn limit_cycle_tail<S>(
    system: &S,
    state0: &[f64],
    settle_time: f64,
    window: f64,
    max_step: f64,
    samples: usize,
) -> Result<Samples>
where
    S: DynamicalSystem<f64> + ?Sized,
{
    if !(settle_time >= 0.0) || !(window > 0.0) {
        bail!("settle_time must be non-negative and window positive.");
    }
    let end = settle_time + window;
    let trajectory = integrate(system, (0.0, end), state0, max_step)
        .context("Integration failed before reaching the limit cycle.")?;
    Ok(trajectory.sample_window(settle_time, end, samples))
}

/// Largest value of component `index` over `states`.
pub fn max_coordinate(states: &[Vec<f64>], index: usize) -> Option<f64> {
    states
        .iter()
        .filter_map(|s| s.get(index).copied())
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))))
}
