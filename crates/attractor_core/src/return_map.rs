use crate::section::Crossing;
use serde::Serialize;

/// Section value at one crossing and at the next one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReturnMapPair {
    pub current: f64,
    pub next: f64,
}

/// Consecutive pairs `(selector(c_i), selector(c_{i+1}))`.
///
/// `k` crossings give `k - 1` pairs; fewer than two give none.
pub fn build_return_map<F>(crossings: &[Crossing], selector: F) -> Vec<ReturnMapPair>
where
    F: Fn(&Crossing) -> f64,
{
    crossings
        .windows(2)
        .map(|pair| ReturnMapPair {
            current: selector(&pair[0]),
            next: selector(&pair[1]),
        })
        .collect()
}

/// Selector reading one component of the crossing state.
pub fn coordinate(index: usize) -> impl Fn(&Crossing) -> f64 {
    move |crossing| crossing.state[index]
}

/// The value at which the map has settled onto the diagonal `next = current`.
///
/// Returns the last pair's `next` when it is within `tolerance` of the
/// diagonal, which for a converging orbit is the limit-cycle crossing.
pub fn diagonal_estimate(pairs: &[ReturnMapPair], tolerance: f64) -> Option<f64> {
    let last = pairs.last()?;
    ((last.next - last.current).abs() <= tolerance).then_some(last.next)
}
