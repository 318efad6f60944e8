//! Iteration of discrete maps with transient (burn-in) removal.

use crate::error::{DivergenceFailure, DynamicsError, DynamicsResult, IterationPhase};
use crate::solvers::{all_finite, DiscreteMap};
use crate::traits::DynamicalSystem;
use serde::Serialize;
use tracing::{debug, warn};

/// Points reserved up front; the cloud grows on demand past this.
const MAX_PREALLOCATED_POINTS: usize = 1 << 20;

/// The retained iterates of a map, in iteration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointCloud {
    points: Vec<Vec<f64>>,
    transient_discarded: usize,
}

impl PointCloud {
    pub fn points(&self) -> &[Vec<f64>] {
        &self.points
    }

    pub fn into_points(self) -> Vec<Vec<f64>> {
        self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn transient_discarded(&self) -> usize {
        self.transient_discarded
    }

    /// Column `index` of every retained point.
    pub fn coordinate(&self, index: usize) -> Vec<f64> {
        self.points.iter().map(|p| p[index]).collect()
    }
}

/// Applies `map` to `seed` `transient_count + retained_count` times and keeps
/// the last `retained_count` images. The seed itself is never retained.
pub fn iterate<S>(
    map: &S,
    seed: &[f64],
    transient_count: usize,
    retained_count: usize,
) -> DynamicsResult<PointCloud>
where
    S: DynamicalSystem<f64> + ?Sized,
{
    let dim = map.dimension();
    if seed.len() != dim {
        return Err(DynamicsError::InvalidInput(format!(
            "seed dimension mismatch. Expected {}, got {}.",
            dim,
            seed.len()
        )));
    }
    if !all_finite(seed) {
        return Err(DynamicsError::InvalidInput(
            "seed must be finite.".to_string(),
        ));
    }

    let mut stepper = DiscreteMap::new(dim);
    let mut state = seed.to_vec();
    let mut points = Vec::with_capacity(retained_count.min(MAX_PREALLOCATED_POINTS));
    let total = transient_count
        .checked_add(retained_count)
        .ok_or_else(|| DynamicsError::InvalidInput("iteration counts overflow usize.".to_string()))?;

    for iteration in 0..total {
        if !stepper.step(&map, iteration, &mut state) {
            let phase = if iteration < transient_count {
                IterationPhase::Transient
            } else {
                IterationPhase::Retained
            };
            warn!(iteration, ?phase, "map iteration diverged");
            return Err(DivergenceFailure {
                iteration,
                last_finite_state: state,
                phase,
            }
            .into());
        }
        if iteration >= transient_count {
            points.push(state.clone());
        }
    }

    debug!(
        transient = transient_count,
        retained = points.len(),
        "map iteration finished"
    );
    Ok(PointCloud {
        points,
        transient_discarded: transient_count,
    })
}

#[cfg(test)]
mod tests {
    use super::iterate;
    use crate::error::{DynamicsError, IterationPhase};
    use crate::systems::Henon;
    use crate::traits::DynamicalSystem;

    fn apply_n(map: &Henon, seed: [f64; 2], n: usize) -> Vec<f64> {
        let mut state = seed.to_vec();
        let mut out = vec![0.0; 2];
        for _ in 0..n {
            map.apply(0.0, &state, &mut out);
            state.copy_from_slice(&out);
        }
        state
    }

    #[test]
    fn transient_is_discarded_and_counts_are_exact() {
        let henon = Henon::default();
        let cloud = iterate(&henon, &[0.0, 0.0], 100, 250).expect("iterate");
        assert_eq!(cloud.len(), 250);
        assert_eq!(cloud.transient_discarded(), 100);
        assert_eq!(cloud.points()[0], apply_n(&henon, [0.0, 0.0], 101));
        assert_eq!(cloud.points()[249], apply_n(&henon, [0.0, 0.0], 350));
    }

    #[test]
    fn zero_transient_starts_at_first_image() {
        let henon = Henon::default();
        let cloud = iterate(&henon, &[0.1, 0.2], 0, 3).expect("iterate");
        assert_eq!(cloud.points()[0], apply_n(&henon, [0.1, 0.2], 1));
        assert_eq!(cloud.coordinate(1).len(), 3);
    }

    #[test]
    fn attractor_points_stay_bounded() {
        let cloud = iterate(&Henon::default(), &[0.0, 0.0], 1000, 5000).expect("iterate");
        for point in cloud.points() {
            assert!(point[0].abs() < 1.5);
            assert!(point[1].abs() < 0.5);
        }
    }

    #[test]
    fn divergence_reports_last_finite_state() {
        let retained = 1000;
        let result = iterate(&Henon::default(), &[10.0, 10.0], 0, retained);
        match result {
            Err(DynamicsError::Divergence(failure)) => {
                assert!(failure.iteration < retained);
                assert_eq!(failure.phase, IterationPhase::Retained);
                assert!(failure.last_finite_state.iter().all(|v| v.is_finite()));
            }
            other => panic!("expected divergence, got {other:?}"),
        }
    }

    #[test]
    fn huge_retained_count_still_reports_divergence() {
        let result = iterate(&Henon::default(), &[10.0, 10.0], 0, usize::MAX);
        match result {
            Err(DynamicsError::Divergence(failure)) => {
                assert_eq!(failure.phase, IterationPhase::Retained);
                assert!(failure.iteration < 100);
            }
            other => panic!("expected divergence, got {other:?}"),
        }
    }

    #[test]
    fn divergence_during_transient_is_flagged() {
        let result = iterate(&Henon::default(), &[10.0, 10.0], 500, 10);
        match result {
            Err(DynamicsError::Divergence(failure)) => {
                assert_eq!(failure.phase, IterationPhase::Transient);
            }
            other => panic!("expected divergence, got {other:?}"),
        }
    }

    #[test]
    fn seed_dimension_is_checked() {
        assert!(matches!(
            iterate(&Henon::default(), &[1.0], 0, 1),
            Err(DynamicsError::InvalidInput(_))
        ));
    }
}
