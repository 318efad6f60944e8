use serde::Serialize;

/// Polynomial interpolant over one accepted step `[t0, t0 + h]`.
///
/// `coefficients` is row-major `dim x 4`; component `i` at `theta = (t - t0) / h`
/// is `y0[i] + h * sum_m c[i][m] theta^(m+1)`.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseSegment {
    t0: f64,
    h: f64,
    y0: Vec<f64>,
    coefficients: Vec<f64>,
}

impl DenseSegment {
    pub(crate) fn new(t0: f64, h: f64, y0: Vec<f64>, coefficients: Vec<f64>) -> Self {
        Self {
            t0,
            h,
            y0,
            coefficients,
        }
    }

    pub fn start(&self) -> f64 {
        self.t0
    }

    pub fn end(&self) -> f64 {
        self.t0 + self.h
    }

    pub fn evaluate(&self, t: f64) -> Vec<f64> {
        let theta = (t - self.t0) / self.h;
        let powers = [theta, theta * theta, theta.powi(3), theta.powi(4)];
        self.y0
            .iter()
            .enumerate()
            .map(|(i, y)| {
                let row = &self.coefficients[i * 4..i * 4 + 4];
                let poly: f64 = row.iter().zip(powers.iter()).map(|(c, p)| c * p).sum();
                y + self.h * poly
            })
            .collect()
    }
}

/// Solver bookkeeping for one integration call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IntegrationStats {
    pub accepted_steps: usize,
    pub rejected_steps: usize,
    pub evaluations: usize,
}

/// Time-ordered samples of a state, the input of crossing detection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Samples {
    pub times: Vec<f64>,
    pub states: Vec<Vec<f64>>,
}

impl Samples {
    pub fn new(times: Vec<f64>, states: Vec<Vec<f64>>) -> Self {
        debug_assert_eq!(times.len(), states.len());
        Self { times, states }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Column `index` of every state.
    pub fn coordinate(&self, index: usize) -> Vec<f64> {
        self.states.iter().map(|s| s[index]).collect()
    }
}

/// The accepted steps of one integration plus their dense output.
///
/// Immutable once produced: consumers read it through accessors only.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    dimension: usize,
    times: Vec<f64>,
    states: Vec<Vec<f64>>,
    segments: Vec<DenseSegment>,
    stats: IntegrationStats,
}

impl Trajectory {
    pub(crate) fn start(t0: f64, state0: Vec<f64>) -> Self {
        Self {
            dimension: state0.len(),
            times: vec![t0],
            states: vec![state0],
            segments: Vec::new(),
            stats: IntegrationStats::default(),
        }
    }

    pub(crate) fn push_step(&mut self, segment: DenseSegment, t: f64, state: Vec<f64>) {
        self.segments.push(segment);
        self.times.push(t);
        self.states.push(state);
    }

    pub(crate) fn set_stats(&mut self, stats: IntegrationStats) {
        self.stats = stats;
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored step points, the initial state included.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn states(&self) -> &[Vec<f64>] {
        &self.states
    }

    pub fn t_span(&self) -> (f64, f64) {
        let first = self.times.first().copied().unwrap_or(f64::NAN);
        let last = self.times.last().copied().unwrap_or(f64::NAN);
        (first, last)
    }

    pub fn final_state(&self) -> Option<&[f64]> {
        self.states.last().map(|s| s.as_slice())
    }

    pub fn stats(&self) -> IntegrationStats {
        self.stats
    }

    /// State at an arbitrary `t` inside the span, or `None` outside it.
    pub fn at(&self, t: f64) -> Option<Vec<f64>> {
        let (t0, t1) = self.t_span();
        if !(t >= t0 && t <= t1) {
            return None;
        }
        // Index of the first step point strictly after t.
        let upper = self.times.partition_point(|&ti| ti <= t);
        if upper > 0 && self.times[upper - 1] == t {
            return Some(self.states[upper - 1].clone());
        }
        let segment = self.segments.get(upper.saturating_sub(1))?;
        Some(segment.evaluate(t))
    }

    /// `n` evenly spaced samples over the whole span (endpoints included).
    pub fn sample_uniform(&self, n: usize) -> Samples {
        let (t0, t1) = self.t_span();
        self.sample_window(t0, t1, n)
    }

    /// `n` evenly spaced samples over `[ta, tb]`, clipped to the span.
    pub fn sample_window(&self, ta: f64, tb: f64, n: usize) -> Samples {
        let (t0, t1) = self.t_span();
        let ta = ta.max(t0);
        let tb = tb.min(t1);
        if n == 0 || !(ta <= tb) {
            return Samples::default();
        }
        let times = linspace(ta, tb, n);
        let states = times
            .iter()
            .filter_map(|&t| self.at(t))
            .collect::<Vec<_>>();
        Samples::new(times, states)
    }

    /// The stored step points as samples.
    pub fn step_samples(&self) -> Samples {
        Samples::new(self.times.clone(), self.states.clone())
    }
}

pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}
