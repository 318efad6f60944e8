//! Registry of the supported systems.
//!
//! Each system is a small parameter struct that implements
//! [`DynamicalSystem`] for every [`Scalar`], so one definition serves both
//! plain evaluation and dual-number Jacobians.

use crate::error::{DynamicsError, DynamicsResult};
use crate::traits::{DynamicalSystem, Scalar};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemId {
    VanDerPol,
    Lorenz,
    Rossler,
    Hopf,
    Pendulum,
    Henon,
}

impl SystemId {
    pub fn dimension(self) -> usize {
        match self {
            SystemId::Lorenz | SystemId::Rossler => 3,
            _ => 2,
        }
    }

    pub fn is_map(self) -> bool {
        matches!(self, SystemId::Henon)
    }
}

/// Van der Pol oscillator: `x' = y`, `y' = mu (1 - x^2) y - x`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VanDerPol {
    pub mu: f64,
}

impl Default for VanDerPol {
    fn default() -> Self {
        Self { mu: 1.0 }
    }
}

impl<T: Scalar> DynamicalSystem<T> for VanDerPol {
    fn dimension(&self) -> usize {
        2
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let mu = T::from_f64(self.mu);
        out[0] = x[1];
        out[1] = mu * (T::one() - x[0] * x[0]) * x[1] - x[0];
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Lorenz {
    pub sigma: f64,
    pub rho: f64,
    pub beta: f64,
}

impl Default for Lorenz {
    fn default() -> Self {
        Self {
            sigma: 10.0,
            rho: 28.0,
            beta: 8.0 / 3.0,
        }
    }
}

impl<T: Scalar> DynamicalSystem<T> for Lorenz {
    fn dimension(&self) -> usize {
        3
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let sigma = T::from_f64(self.sigma);
        let rho = T::from_f64(self.rho);
        let beta = T::from_f64(self.beta);
        out[0] = sigma * (x[1] - x[0]);
        out[1] = x[0] * (rho - x[2]) - x[1];
        out[2] = x[0] * x[1] - beta * x[2];
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rossler {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Default for Rossler {
    fn default() -> Self {
        Self {
            a: 0.2,
            b: 0.2,
            c: 5.7,
        }
    }
}

impl<T: Scalar> DynamicalSystem<T> for Rossler {
    fn dimension(&self) -> usize {
        3
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let a = T::from_f64(self.a);
        let b = T::from_f64(self.b);
        let c = T::from_f64(self.c);
        out[0] = -x[1] - x[2];
        out[1] = x[0] + a * x[1];
        out[2] = b + x[2] * (x[0] - c);
    }
}

/// Supercritical Hopf normal form in Cartesian coordinates.
/// In polar form `r' = mu r - r^3`, `theta' = 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hopf {
    pub mu: f64,
}

impl Default for Hopf {
    fn default() -> Self {
        Self { mu: 0.5 }
    }
}

impl Hopf {
    /// Radius of the stable limit cycle, which exists only for `mu > 0`.
    pub fn limit_cycle_radius(&self) -> Option<f64> {
        (self.mu > 0.0).then(|| self.mu.sqrt())
    }
}

impl<T: Scalar> DynamicalSystem<T> for Hopf {
    fn dimension(&self) -> usize {
        2
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let mu = T::from_f64(self.mu);
        let r_sq = x[0] * x[0] + x[1] * x[1];
        out[0] = mu * x[0] - x[1] - x[0] * r_sq;
        out[1] = x[0] + mu * x[1] - x[1] * r_sq;
    }
}

/// Damped pendulum with state `[theta, omega]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pendulum {
    pub g_over_l: f64,
    pub damping: f64,
}

impl Default for Pendulum {
    fn default() -> Self {
        Self {
            g_over_l: 1.0,
            damping: 0.0,
        }
    }
}

impl Pendulum {
    /// Total energy per unit inertia: `omega^2 / 2 - (g/L) cos(theta)`.
    pub fn energy(&self, theta: f64, omega: f64) -> f64 {
        0.5 * omega * omega - self.g_over_l * theta.cos()
    }
}

impl<T: Scalar> DynamicalSystem<T> for Pendulum {
    fn dimension(&self) -> usize {
        2
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let g_over_l = T::from_f64(self.g_over_l);
        let damping = T::from_f64(self.damping);
        out[0] = x[1];
        out[1] = -g_over_l * x[0].sin() - damping * x[1];
    }
}

/// Henon map: `x' = 1 - a x^2 + y`, `y' = b x`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Henon {
    pub a: f64,
    pub b: f64,
}

impl Default for Henon {
    fn default() -> Self {
        Self { a: 1.4, b: 0.3 }
    }
}

impl<T: Scalar> DynamicalSystem<T> for Henon {
    fn dimension(&self) -> usize {
        2
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let a = T::from_f64(self.a);
        let b = T::from_f64(self.b);
        out[0] = T::one() - a * x[0] * x[0] + x[1];
        out[1] = b * x[0];
    }
}

/// A continuous system together with its parameters.
///
/// Serialized with a `system` tag, e.g.
/// `{"system": "lorenz", "sigma": 10.0, "rho": 28.0, "beta": 2.667}`.
/// Omitted parameters take their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "system", rename_all = "snake_case")]
pub enum Flow {
    VanDerPol(VanDerPol),
    Lorenz(Lorenz),
    Rossler(Rossler),
    Hopf(Hopf),
    Pendulum(Pendulum),
}

impl Flow {
    pub fn with_defaults(id: SystemId) -> DynamicsResult<Self> {
        match id {
            SystemId::VanDerPol => Ok(Flow::VanDerPol(VanDerPol::default())),
            SystemId::Lorenz => Ok(Flow::Lorenz(Lorenz::default())),
            SystemId::Rossler => Ok(Flow::Rossler(Rossler::default())),
            SystemId::Hopf => Ok(Flow::Hopf(Hopf::default())),
            SystemId::Pendulum => Ok(Flow::Pendulum(Pendulum::default())),
            SystemId::Henon => Err(DynamicsError::InvalidInput(
                "henon is a discrete map, not a flow".to_string(),
            )),
        }
    }

    pub fn id(&self) -> SystemId {
        match self {
            Flow::VanDerPol(_) => SystemId::VanDerPol,
            Flow::Lorenz(_) => SystemId::Lorenz,
            Flow::Rossler(_) => SystemId::Rossler,
            Flow::Hopf(_) => SystemId::Hopf,
            Flow::Pendulum(_) => SystemId::Pendulum,
        }
    }
}

impl<T: Scalar> DynamicalSystem<T> for Flow {
    fn dimension(&self) -> usize {
        self.id().dimension()
    }

    fn apply(&self, t: T, x: &[T], out: &mut [T]) {
        match self {
            Flow::VanDerPol(s) => s.apply(t, x, out),
            Flow::Lorenz(s) => s.apply(t, x, out),
            Flow::Rossler(s) => s.apply(t, x, out),
            Flow::Hopf(s) => s.apply(t, x, out),
            Flow::Pendulum(s) => s.apply(t, x, out),
        }
    }
}
