//! Poincare-section crossing detection on sampled trajectories.

use crate::error::{DynamicsError, DynamicsResult};
use crate::trajectory::Samples;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Below this bracket width the interpolation fraction falls back to 0.5.
pub const DEGENERATE_EPS: f64 = 1e-10;

/// Scalar functional of the state whose level set is the section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionFunctional {
    Coordinate(usize),
    /// Dot product with a fixed weight vector.
    Linear(Vec<f64>),
}

impl SectionFunctional {
    pub fn evaluate(&self, state: &[f64]) -> f64 {
        match self {
            SectionFunctional::Coordinate(index) => state[*index],
            SectionFunctional::Linear(weights) => {
                weights.iter().zip(state).map(|(w, x)| w * x).sum()
            }
        }
    }

    fn check_dimension(&self, dim: usize) -> DynamicsResult<()> {
        match self {
            SectionFunctional::Coordinate(index) if *index >= dim => {
                Err(DynamicsError::InvalidInput(format!(
                    "section coordinate {} out of range for dimension {}.",
                    index, dim
                )))
            }
            SectionFunctional::Linear(weights) if weights.len() != dim => {
                Err(DynamicsError::InvalidInput(format!(
                    "section weights have length {}, expected {}.",
                    weights.len(),
                    dim
                )))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increasing,
    Decreasing,
    Either,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSpec {
    pub functional: SectionFunctional,
    pub threshold: f64,
    pub direction: Direction,
}

impl SectionSpec {
    pub fn coordinate(index: usize, threshold: f64, direction: Direction) -> Self {
        Self {
            functional: SectionFunctional::Coordinate(index),
            threshold,
            direction,
        }
    }

    /// Van der Pol section `y = 0` on the `x > 0` side. Pair with [`positive_x`].
    ///
    /// On `y = 0` the field gives `dy/dt = -x`, so every crossing with `x > 0`
    /// runs downward; these are the amplitude maxima of the oscillation.
    pub fn van_der_pol() -> Self {
        Self::coordinate(1, 0.0, Direction::Decreasing)
    }

    /// Lorenz section `z = 27` crossed upward.
    pub fn lorenz() -> Self {
        Self::coordinate(2, 27.0, Direction::Increasing)
    }

    /// Rossler section `y = 0` crossed upward.
    pub fn rossler() -> Self {
        Self::coordinate(1, 0.0, Direction::Increasing)
    }

    /// Whether the bracket `(prev, next)` of section values crosses the threshold.
    /// The upper sample is inclusive so an exact hit is counted once.
    pub fn brackets(&self, prev: f64, next: f64) -> bool {
        let c = self.threshold;
        match self.direction {
            Direction::Increasing => prev < c && c <= next,
            Direction::Decreasing => prev > c && c >= next,
            Direction::Either => (prev < c && c <= next) || (prev > c && c >= next),
        }
    }
}

/// Auxiliary filter for the Van der Pol section.
///
/// Evaluated on the interpolated crossing state rather than on the raw
/// bracketing samples, so a crossing whose endpoints straddle `x = 0` is
/// judged at the point where it actually meets the section.
pub fn positive_x(state: &[f64]) -> bool {
    state[0] > 0.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Crossing {
    pub time: f64,
    pub state: Vec<f64>,
}

/// All crossings of `section` in `samples`, in chronological order.
pub fn detect_crossings(samples: &Samples, section: &SectionSpec) -> DynamicsResult<Vec<Crossing>> {
    detect_crossings_where(samples, section, |_| true)
}

/// Like [`detect_crossings`], keeping only crossings whose interpolated state
/// satisfies `predicate`.
pub fn detect_crossings_where<F>(
    samples: &Samples,
    section: &SectionSpec,
    predicate: F,
) -> DynamicsResult<Vec<Crossing>>
where
    F: Fn(&[f64]) -> bool,
{
    if samples.times.len() != samples.states.len() {
        return Err(DynamicsError::InvalidInput(
            "sample times and states differ in length.".to_string(),
        ));
    }
    let Some(first) = samples.states.first() else {
        return Ok(Vec::new());
    };
    let dim = first.len();
    section.functional.check_dimension(dim)?;
    if let Some((i, state)) = samples.states.iter().enumerate().find(|(_, s)| s.len() != dim) {
        return Err(DynamicsError::InvalidInput(format!(
            "sample {} has dimension {}, expected {}.",
            i,
            state.len(),
            dim
        )));
    }

    let values: Vec<f64> = samples
        .states
        .iter()
        .map(|s| section.functional.evaluate(s))
        .collect();

    let mut crossings = Vec::new();
    for i in 1..values.len() {
        let (prev, next) = (values[i - 1], values[i]);
        if !section.brackets(prev, next) {
            continue;
        }
        let frac = interpolation_fraction(prev, next, section.threshold);
        let crossing = interpolate(samples, i, frac);
        if predicate(&crossing.state) {
            crossings.push(crossing);
        }
    }

    debug!(
        samples = values.len(),
        crossings = crossings.len(),
        threshold = section.threshold,
        "section scan finished"
    );
    Ok(crossings)
}

/// Position of the threshold inside `[prev, next]`, clamped to `[0, 1]`.
pub fn interpolation_fraction(prev: f64, next: f64, threshold: f64) -> f64 {
    let denom = next - prev;
    if denom.abs() < DEGENERATE_EPS {
        trace!(prev, next, "degenerate section bracket; using midpoint");
        return 0.5;
    }
    ((threshold - prev) / denom).clamp(0.0, 1.0)
}

fn interpolate(samples: &Samples, i: usize, frac: f64) -> Crossing {
    let (t0, t1) = (samples.times[i - 1], samples.times[i]);
    let (a, b) = (&samples.states[i - 1], &samples.states[i]);
    Crossing {
        time: t0 + frac * (t1 - t0),
        state: a.iter().zip(b).map(|(x0, x1)| x0 + frac * (x1 - x0)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(values: &[f64]) -> Samples {
        let times = (0..values.len()).map(|i| i as f64).collect();
        let states = values.iter().map(|&v| vec![v, 10.0 * v]).collect();
        Samples::new(times, states)
    }

    #[test]
    fn symmetric_bracket_interpolates_to_exact_midpoint() {
        let samples = Samples::new(vec![2.0, 3.0], vec![vec![-1.0, 4.0], vec![1.0, 8.0]]);
        let section = SectionSpec::coordinate(0, 0.0, Direction::Increasing);
        let crossings = detect_crossings(&samples, &section).expect("detect");
        assert_eq!(crossings.len(), 1);
        assert_eq!(crossings[0].time, 2.5);
        assert_eq!(crossings[0].state, vec![0.0, 6.0]);
    }

    #[test]
    fn direction_filters_crossings() {
        let data = samples(&[-1.0, 1.0, -1.0, 1.0]);
        let up = SectionSpec::coordinate(0, 0.0, Direction::Increasing);
        let down = SectionSpec::coordinate(0, 0.0, Direction::Decreasing);
        let either = SectionSpec::coordinate(0, 0.0, Direction::Either);
        assert_eq!(detect_crossings(&data, &up).expect("up").len(), 2);
        assert_eq!(detect_crossings(&data, &down).expect("down").len(), 1);
        let all = detect_crossings(&data, &either).expect("either");
        let times: Vec<f64> = all.iter().map(|c| c.time).collect();
        assert_eq!(times, vec![0.5, 1.5, 2.5]);
    }

    #[test]
    fn exact_hit_counts_once_on_upper_sample() {
        let data = samples(&[-1.0, 0.0, 1.0]);
        let up = SectionSpec::coordinate(0, 0.0, Direction::Increasing);
        let crossings = detect_crossings(&data, &up).expect("detect");
        assert_eq!(crossings.len(), 1);
        assert_eq!(crossings[0].time, 1.0);
    }

    #[test]
    fn degenerate_bracket_uses_midpoint() {
        assert_eq!(interpolation_fraction(-1e-12, 1e-12, 0.0), 0.5);
        assert_eq!(interpolation_fraction(0.0, 4.0, 1.0), 0.25);
    }

    #[test]
    fn predicate_sees_interpolated_state() {
        // x goes from -1 to 3 while y crosses zero at the midpoint, where x = 1.
        let data = Samples::new(vec![0.0, 1.0], vec![vec![-1.0, 1.0], vec![3.0, -1.0]]);
        let crossings =
            detect_crossings_where(&data, &SectionSpec::van_der_pol(), positive_x).expect("detect");
        assert_eq!(crossings.len(), 1);
        assert_eq!(crossings[0].state, vec![1.0, 0.0]);

        let data = Samples::new(vec![0.0, 1.0], vec![vec![-3.0, 1.0], vec![1.0, -1.0]]);
        let crossings =
            detect_crossings_where(&data, &SectionSpec::van_der_pol(), positive_x).expect("detect");
        assert!(crossings.is_empty());
    }

    #[test]
    fn linear_functional_section() {
        let data = Samples::new(vec![0.0, 1.0], vec![vec![0.0, 0.0], vec![1.0, 1.0]]);
        let section = SectionSpec {
            functional: SectionFunctional::Linear(vec![1.0, 1.0]),
            threshold: 1.0,
            direction: Direction::Either,
        };
        let crossings = detect_crossings(&data, &section).expect("detect");
        assert_eq!(crossings[0].state, vec![0.5, 0.5]);
    }

    #[test]
    fn rejects_out_of_range_section() {
        let data = samples(&[0.0, 1.0]);
        let section = SectionSpec::coordinate(5, 0.0, Direction::Either);
        assert!(detect_crossings(&data, &section).is_err());
        assert!(detect_crossings(&Samples::default(), &section)
            .expect("empty")
            .is_empty());
    }

    #[test]
    fn ragged_samples_are_rejected() {
        let data = Samples {
            times: vec![0.0, 1.0, 2.0],
            states: vec![vec![-1.0, 0.0], vec![1.0, 0.0], vec![2.0]],
        };
        let section = SectionSpec::coordinate(1, 0.5, Direction::Either);
        match detect_crossings(&data, &section) {
            Err(DynamicsError::InvalidInput(message)) => {
                assert!(message.contains("sample 2"), "{message}");
            }
            other => panic!("expected invalid input, got {other:?}"),
        }
    }
}
