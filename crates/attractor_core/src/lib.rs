//! The `attractor_core` crate is the numerical engine behind the attractor
//! visualizations. It produces the numeric sequences a front end animates:
//! trajectories of continuous flows, point clouds of discrete maps,
//! Poincare-section crossings with their return maps, and classified fixed
//! points.
//!
//! Every system is generic over [`traits::Scalar`], so the same definition is
//! evaluated with `f64` for simulation and with [`autodiff::Dual`] for exact
//! Jacobians.
//!
//! Key components:
//! - **Systems**: Van der Pol, Lorenz, Rossler, Hopf normal form, damped pendulum and the Henon map.
//! - **Solvers**: adaptive Dormand-Prince 5(4) with dense output, and a discrete map stepper.
//! - **Sections**: crossing detection with sub-sample interpolation and return-map assembly.
//! - **Equilibrium**: closed-form fixed points, Newton refinement and linear stability classes.
pub mod analysis;
pub mod autodiff;
pub mod equilibrium;
pub mod error;
pub mod integrate;
pub mod maps;
pub mod return_map;
pub mod section;
pub mod solvers;
pub mod sweep;
pub mod systems;
pub mod traits;
pub mod trajectory;

pub use error::{DynamicsError, DynamicsResult};
