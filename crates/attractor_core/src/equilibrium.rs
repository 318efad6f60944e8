use crate::autodiff::{jacobian, Dual};
use crate::systems::{Flow, Henon, Lorenz, Rossler};
use crate::traits::DynamicalSystem;
use anyhow::{anyhow, bail, Context, Result};
use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Imaginary parts at or below this magnitude count as real.
pub const IMAG_EPS: f64 = 1e-10;
/// Half-width of the band around the stability boundary reported as marginal.
pub const MARGINAL_EPS: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemKind {
    Flow,
    Map,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NewtonSettings {
    pub max_steps: usize,
    pub damping: f64,
    pub tolerance: f64,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            max_steps: 25,
            damping: 1.0,
            tolerance: 1e-9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComplexNumber {
    pub re: f64,
    pub im: f64,
}

impl ComplexNumber {
    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    pub fn norm(&self) -> f64 {
        self.re.hypot(self.im)
    }

    pub fn is_real(&self) -> bool {
        self.im.abs() <= IMAG_EPS
    }
}

impl From<Complex64> for ComplexNumber {
    fn from(value: Complex64) -> Self {
        Self {
            re: value.re,
            im: value.im,
        }
    }
}

/// Linear stability of a fixed point.
///
/// Maps use `|lambda|` against 1, flows use the sign of `Re(lambda)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityClass {
    // maps
    Stable,
    Repelling,
    Spiral,
    // flows
    StableNode,
    UnstableNode,
    StableFocus,
    UnstableFocus,
    Center,
    // both
    Saddle,
    Marginal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedPoint {
    pub state: Vec<f64>,
    /// Row-major Jacobian of the field or map at `state`.
    pub jacobian: Vec<f64>,
    pub eigenvalues: Vec<ComplexNumber>,
    pub stability: StabilityClass,
}

/// Result of a numeric fixed-point solve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinedFixedPoint {
    pub point: FixedPoint,
    pub residual_norm: f64,
    pub iterations: usize,
}

/// What to search for fixed points in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FixedPointSource {
    Flow { flow: Flow },
    Henon { map: Henon },
}

/// Fixed points of `source` for its current parameters, each classified.
///
/// An empty result means no real fixed point exists; it is not an error.
pub fn find_fixed_points(source: &FixedPointSource) -> Vec<FixedPoint> {
    match source {
        FixedPointSource::Flow { flow } => flow_equilibria(flow)
            .into_iter()
            .map(|state| analyze_point(flow, SystemKind::Flow, state))
            .collect(),
        FixedPointSource::Henon { map } => henon_fixed_points(map),
    }
}

/// Closed-form equilibria of the registered flows.
pub fn flow_equilibria(flow: &Flow) -> Vec<Vec<f64>> {
    match flow {
        Flow::VanDerPol(_) | Flow::Hopf(_) => vec![vec![0.0, 0.0]],
        Flow::Pendulum(_) => vec![vec![0.0, 0.0], vec![PI, 0.0]],
        Flow::Lorenz(params) => lorenz_equilibria(params),
        Flow::Rossler(params) => rossler_equilibria(params),
    }
}

fn lorenz_equilibria(params: &Lorenz) -> Vec<Vec<f64>> {
    let mut points = vec![vec![0.0, 0.0, 0.0]];
    let square = params.beta * (params.rho - 1.0);
    if square > 0.0 {
        let q = square.sqrt();
        let z = params.rho - 1.0;
        points.push(vec![q, q, z]);
        points.push(vec![-q, -q, z]);
    }
    points
}

// x = a z, y = -z with a z^2 - c z + b = 0.
fn rossler_equilibria(params: &Rossler) -> Vec<Vec<f64>> {
    let roots: Vec<f64> = if params.a == 0.0 {
        if params.c == 0.0 {
            Vec::new()
        } else {
            vec![params.b / params.c]
        }
    } else {
        match solve_quadratic(params.a, -params.c, params.b) {
            Some((z1, z2)) => vec![z1, z2],
            None => Vec::new(),
        }
    };
    roots
        .into_iter()
        .map(|z| vec![params.a * z, -z, z])
        .collect()
}

/// Real roots of `a x^2 + b x + c = 0` with `a != 0`, larger-numerator root first.
///
/// `None` when the discriminant is negative. A zero discriminant yields the
/// double root twice.
pub fn solve_quadratic(a: f64, b: f64, c: f64) -> Option<(f64, f64)> {
    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 || a == 0.0 {
        return None;
    }
    let sqrt_disc = discriminant.sqrt();
    Some(((-b + sqrt_disc) / (2.0 * a), (-b - sqrt_disc) / (2.0 * a)))
}

/// Fixed points of the Henon map: `a x^2 + (1 - b) x - 1 = 0`, `y = b x`.
pub fn henon_fixed_points(map: &Henon) -> Vec<FixedPoint> {
    let xs: Vec<f64> = if map.a == 0.0 {
        // The quadratic term vanishes and the map is affine in x.
        if map.b == 1.0 {
            Vec::new()
        } else {
            vec![1.0 / (1.0 - map.b)]
        }
    } else {
        match solve_quadratic(map.a, 1.0 - map.b, -1.0) {
            Some((x1, x2)) => vec![x1, x2],
            None => Vec::new(),
        }
    };
    xs.into_iter()
        .map(|x| analyze_point(map, SystemKind::Map, vec![x, map.b * x]))
        .collect()
}

/// Jacobian, eigenvalues and stability class of `system` at `state`.
pub fn analyze_point<S>(system: &S, kind: SystemKind, state: Vec<f64>) -> FixedPoint
where
    S: DynamicalSystem<Dual> + ?Sized,
{
    let dim = state.len();
    let jacobian = jacobian(system, 0.0, &state);
    let eigenvalues = eigenvalues(dim, &jacobian);
    let stability = classify(kind, &eigenvalues);
    FixedPoint {
        state,
        jacobian,
        eigenvalues: eigenvalues.into_iter().map(ComplexNumber::from).collect(),
        stability,
    }
}

/// Roots of `lambda^2 - trace lambda + det`.
pub fn eigenvalues_2x2(trace: f64, det: f64) -> [Complex64; 2] {
    let disc = trace * trace - 4.0 * det;
    if disc >= 0.0 {
        let root = disc.sqrt();
        [
            Complex64::new((trace + root) / 2.0, 0.0),
            Complex64::new((trace - root) / 2.0, 0.0),
        ]
    } else {
        let re = trace / 2.0;
        let im = (-disc).sqrt() / 2.0;
        [Complex64::new(re, im), Complex64::new(re, -im)]
    }
}

/// Eigenvalues of a row-major `dim x dim` matrix.
pub fn eigenvalues(dim: usize, matrix: &[f64]) -> Vec<Complex64> {
    match dim {
        0 => Vec::new(),
        1 => vec![Complex64::new(matrix[0], 0.0)],
        2 => {
            let trace = matrix[0] + matrix[3];
            let det = matrix[0] * matrix[3] - matrix[1] * matrix[2];
            eigenvalues_2x2(trace, det).to_vec()
        }
        _ => DMatrix::from_row_slice(dim, dim, matrix)
            .complex_eigenvalues()
            .iter()
            .cloned()
            .collect(),
    }
}

pub fn classify(kind: SystemKind, eigenvalues: &[Complex64]) -> StabilityClass {
    match kind {
        SystemKind::Map => classify_map(eigenvalues),
        SystemKind::Flow => classify_flow(eigenvalues),
    }
}

fn classify_map(eigenvalues: &[Complex64]) -> StabilityClass {
    if eigenvalues.iter().any(|l| l.im.abs() > IMAG_EPS) {
        return StabilityClass::Spiral;
    }
    let magnitudes: Vec<f64> = eigenvalues.iter().map(|l| l.re.abs()).collect();
    if magnitudes.iter().any(|m| (m - 1.0).abs() <= MARGINAL_EPS) {
        return StabilityClass::Marginal;
    }
    let expanding = magnitudes.iter().filter(|&&m| m > 1.0).count();
    if expanding == 0 {
        StabilityClass::Stable
    } else if expanding == magnitudes.len() {
        StabilityClass::Repelling
    } else {
        StabilityClass::Saddle
    }
}

fn classify_flow(eigenvalues: &[Complex64]) -> StabilityClass {
    let oscillatory = eigenvalues.iter().any(|l| l.im.abs() > IMAG_EPS);
    let on_axis = |l: &Complex64| l.re.abs() <= MARGINAL_EPS;

    if eigenvalues.iter().any(on_axis) {
        return if oscillatory && eigenvalues.iter().all(on_axis) {
            StabilityClass::Center
        } else {
            StabilityClass::Marginal
        };
    }

    let growing = eigenvalues.iter().filter(|l| l.re > 0.0).count();
    match (growing, oscillatory) {
        (0, false) => StabilityClass::StableNode,
        (0, true) => StabilityClass::StableFocus,
        (g, false) if g == eigenvalues.len() => StabilityClass::UnstableNode,
        (g, true) if g == eigenvalues.len() => StabilityClass::UnstableFocus,
        _ => StabilityClass::Saddle,
    }
}

/// Damped Newton iteration on `f(x) = 0` (flows) or `F(x) - x = 0` (maps),
/// started from `initial_guess`.
pub fn refine_fixed_point<S>(
    system: &S,
    kind: SystemKind,
    initial_guess: &[f64],
    settings: NewtonSettings,
) -> Result<RefinedFixedPoint>
where
    S: DynamicalSystem<f64> + DynamicalSystem<Dual> + ?Sized,
{
    let dim = DynamicalSystem::<f64>::dimension(system);
    if dim == 0 {
        bail!("System has zero dimension.");
    }
    if initial_guess.len() != dim {
        bail!(
            "Initial guess dimension mismatch. Expected {}, got {}.",
            dim,
            initial_guess.len()
        );
    }
    if settings.max_steps == 0 {
        bail!("max_steps must be greater than zero.");
    }
    if settings.damping <= 0.0 {
        bail!("damping must be positive.");
    }
    if settings.tolerance <= 0.0 {
        bail!("tolerance must be positive.");
    }

    let mut state = initial_guess.to_vec();
    let mut residual = vec![0.0; dim];
    evaluate_residual(system, kind, &state, &mut residual);
    let mut residual_norm = l2_norm(&residual);
    let mut iterations = 0usize;

    loop {
        if !residual_norm.is_finite() {
            bail!("Residual became non-finite after {} Newton steps.", iterations);
        }
        if residual_norm <= settings.tolerance {
            break;
        }
        if iterations >= settings.max_steps {
            bail!(
                "Newton solver failed to converge in {} steps (‖f(x)‖ = {}).",
                settings.max_steps,
                residual_norm
            );
        }

        let mut jac = jacobian(system, 0.0, &state);
        if kind == SystemKind::Map {
            for i in 0..dim {
                jac[i * dim + i] -= 1.0;
            }
        }
        let delta = solve_linear_system(dim, &jac, &residual)
            .context("Failed to solve linear system during Newton iteration.")?;

        for i in 0..dim {
            state[i] -= settings.damping * delta[i];
        }

        iterations += 1;
        evaluate_residual(system, kind, &state, &mut residual);
        residual_norm = l2_norm(&residual);
    }

    Ok(RefinedFixedPoint {
        point: analyze_point(system, kind, state),
        residual_norm,
        iterations,
    })
}

fn evaluate_residual<S>(system: &S, kind: SystemKind, state: &[f64], out: &mut [f64])
where
    S: DynamicalSystem<f64> + ?Sized,
{
    system.apply(0.0, state, out);
    if kind == SystemKind::Map {
        for i in 0..out.len() {
            out[i] -= state[i];
        }
    }
}

fn solve_linear_system(dim: usize, jacobian: &[f64], residual: &[f64]) -> Result<Vec<f64>> {
    let j_matrix = DMatrix::from_row_slice(dim, dim, jacobian);
    let rhs = DVector::from_column_slice(residual);
    j_matrix
        .lu()
        .solve(&rhs)
        .map(|v| v.iter().cloned().collect())
        .ok_or_else(|| anyhow!("Jacobian is singular."))
}

fn l2_norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}
