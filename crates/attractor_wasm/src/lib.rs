//! JavaScript bindings for `attractor_core`.
//!
//! Every result crosses the boundary as plain serialized data; the numerical
//! work all happens in the core crate.

use attractor_core::analysis::{poincare_return_map, SamplingPlan};
use attractor_core::equilibrium::{self, find_fixed_points, FixedPointSource};
use attractor_core::error::{IterationPhase, StallReason};
use attractor_core::integrate::integrate;
use attractor_core::maps::iterate;
use attractor_core::return_map::coordinate;
use attractor_core::section::{positive_x, SectionSpec};
use attractor_core::systems::{Flow, Henon};
use attractor_core::trajectory::IntegrationStats;
use attractor_core::DynamicsError;
use js_sys::Float64Array;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmFlow {
    flow: Flow,
}

#[derive(Serialize)]
struct TrajectoryPayload {
    times: Vec<f64>,
    states: Vec<Vec<f64>>,
    stats: IntegrationStats,
}

/// A core failure as seen from JavaScript, discriminated by `kind`.
#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum FailurePayload {
    InvalidInput {
        message: String,
    },
    Integration {
        message: String,
        reason: StallReason,
        last_time: f64,
        times: Vec<f64>,
        states: Vec<Vec<f64>>,
    },
    Divergence {
        message: String,
        iteration: usize,
        last_finite_state: Vec<f64>,
        phase: IterationPhase,
    },
}

/// Converts a core error into a structured JS object. A partial trajectory is
/// resampled to `samples` points.
fn dynamics_error(err: &DynamicsError, samples: usize) -> JsValue {
    let payload = match err {
        DynamicsError::InvalidInput(message) => FailurePayload::InvalidInput {
            message: message.clone(),
        },
        DynamicsError::Integration(failure) => {
            let partial = failure.partial.sample_uniform(samples);
            FailurePayload::Integration {
                message: err.to_string(),
                reason: failure.reason,
                last_time: failure.last_time,
                times: partial.times,
                states: partial.states,
            }
        }
        DynamicsError::Divergence(failure) => FailurePayload::Divergence {
            message: err.to_string(),
            iteration: failure.iteration,
            last_finite_state: failure.last_finite_state.clone(),
            phase: failure.phase,
        },
    };
    to_value(&payload).unwrap_or_else(|_| JsValue::from_str(&err.to_string()))
}

fn parse_params<T: DeserializeOwned + Default>(params: JsValue) -> Result<T, JsValue> {
    if params.is_undefined() || params.is_null() {
        return Ok(T::default());
    }
    from_value(params).map_err(|e| JsValue::from_str(&format!("Invalid parameters: {}", e)))
}

fn serialize<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    to_value(value).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

#[wasm_bindgen]
impl WasmFlow {
    /// `system` is one of `van_der_pol`, `lorenz`, `rossler`, `hopf`,
    /// `pendulum`; `params` is an object of named parameters, any of which may
    /// be omitted.
    #[wasm_bindgen(constructor)]
    pub fn new(system: &str, params: JsValue) -> Result<WasmFlow, JsValue> {
        console_error_panic_hook::set_once();

        let flow = match system {
            "van_der_pol" => Flow::VanDerPol(parse_params(params)?),
            "lorenz" => Flow::Lorenz(parse_params(params)?),
            "rossler" => Flow::Rossler(parse_params(params)?),
            "hopf" => Flow::Hopf(parse_params(params)?),
            "pendulum" => Flow::Pendulum(parse_params(params)?),
            _ => return Err(JsValue::from_str(&format!("Unknown system: {}", system))),
        };
        Ok(WasmFlow { flow })
    }

    pub fn dimension(&self) -> usize {
        self.flow.id().dimension()
    }

    /// Integrates over `[t0, t1]` and returns `samples` evenly spaced states.
    pub fn integrate(
        &self,
        state0: Vec<f64>,
        t0: f64,
        t1: f64,
        max_step: f64,
        samples: u32,
    ) -> Result<JsValue, JsValue> {
        let trajectory = integrate(&self.flow, (t0, t1), &state0, max_step)
            .map_err(|e| dynamics_error(&e, samples as usize))?;
        let resampled = trajectory.sample_uniform(samples as usize);
        serialize(&TrajectoryPayload {
            times: resampled.times,
            states: resampled.states,
            stats: trajectory.stats(),
        })
    }

    /// Crossings of `section` and the return map of component
    /// `selector_index`. `positive_x_only` keeps crossings with `x > 0`.
    pub fn poincare(
        &self,
        state0: Vec<f64>,
        plan: JsValue,
        section: JsValue,
        selector_index: u32,
        positive_x_only: bool,
    ) -> Result<JsValue, JsValue> {
        let plan: SamplingPlan =
            from_value(plan).map_err(|e| JsValue::from_str(&format!("Invalid plan: {}", e)))?;
        let section: SectionSpec = from_value(section)
            .map_err(|e| JsValue::from_str(&format!("Invalid section: {}", e)))?;
        let index = selector_index as usize;
        if index >= self.dimension() {
            return Err(JsValue::from_str("Selector index out of range"));
        }

        let run = if positive_x_only {
            poincare_return_map(&self.flow, &state0, &plan, &section, positive_x, coordinate(index))
        } else {
            poincare_return_map(&self.flow, &state0, &plan, &section, |_| true, coordinate(index))
        }
        .map_err(|e| match e.downcast_ref::<DynamicsError>() {
            Some(err) => dynamics_error(err, plan.samples),
            None => JsValue::from_str(&format!("Return map failed: {:#}", e)),
        })?;
        serialize(&run)
    }

    /// Equilibria with eigenvalues and stability labels.
    pub fn equilibria(&self) -> Result<JsValue, JsValue> {
        serialize(&find_fixed_points(&FixedPointSource::Flow { flow: self.flow }))
    }
}

/// Henon point cloud flattened as `[x0, y0, x1, y1, ...]`.
#[wasm_bindgen]
pub fn iterate_henon(
    a: f64,
    b: f64,
    seed: Vec<f64>,
    transient: u32,
    retained: u32,
) -> Result<Float64Array, JsValue> {
    console_error_panic_hook::set_once();

    let cloud = iterate(&Henon { a, b }, &seed, transient as usize, retained as usize)
        .map_err(|e| dynamics_error(&e, 0))?;
    let flat: Vec<f64> = cloud.into_points().into_iter().flatten().collect();
    Ok(Float64Array::from(&flat[..]))
}

#[wasm_bindgen]
pub fn henon_fixed_points(a: f64, b: f64) -> Result<JsValue, JsValue> {
    serialize(&equilibrium::henon_fixed_points(&Henon { a, b }))
}

#[cfg(test)]
mod tests {
    use super::{henon_fixed_points, iterate_henon, WasmFlow};
    use attractor_core::equilibrium::{FixedPoint, StabilityClass};
    use serde::Deserialize;
    use serde_wasm_bindgen::from_value;
    use wasm_bindgen::JsValue;
    use wasm_bindgen_test::wasm_bindgen_test;

    #[wasm_bindgen_test]
    fn unknown_system_is_rejected() {
        let result = WasmFlow::new("duffing", JsValue::UNDEFINED);
        let message = result
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default();
        assert!(message.contains("Unknown system"));
    }

    #[wasm_bindgen_test]
    fn henon_cloud_is_flattened() {
        let cloud = iterate_henon(1.4, 0.3, vec![0.0, 0.0], 100, 25).expect("iterate");
        assert_eq!(cloud.length(), 50);
    }

    #[derive(Deserialize)]
    struct Divergence {
        kind: String,
        iteration: usize,
        last_finite_state: Vec<f64>,
        phase: String,
    }

    #[derive(Deserialize)]
    struct Stall {
        kind: String,
        reason: String,
        last_time: f64,
        times: Vec<f64>,
    }

    #[wasm_bindgen_test]
    fn henon_divergence_is_reported() {
        let err = iterate_henon(1.4, 0.3, vec![10.0, 10.0], 0, 1000)
            .err()
            .expect("diverges");
        let failure: Divergence = from_value(err).expect("structured failure");
        assert_eq!(failure.kind, "divergence");
        assert_eq!(failure.phase, "retained");
        assert!(failure.iteration < 1000);
        assert_eq!(failure.last_finite_state.len(), 2);
        assert!(failure.last_finite_state.iter().all(|v| v.is_finite()));
    }

    #[wasm_bindgen_test]
    fn integration_stall_carries_partial_trajectory() {
        // r^2 overflows, so the very first derivative is infinite.
        let flow = WasmFlow::new("hopf", JsValue::UNDEFINED).expect("flow");
        let err = flow
            .integrate(vec![1e200, 0.0], 0.0, 1.0, 0.01, 20)
            .expect_err("stalls");
        let failure: Stall = from_value(err).expect("structured failure");
        assert_eq!(failure.kind, "integration");
        assert_eq!(failure.reason, "non_finite_derivative");
        assert_eq!(failure.last_time, 0.0);
        assert_eq!(failure.times.len(), 20);
    }

    #[wasm_bindgen_test]
    fn invalid_seed_is_tagged_invalid_input() {
        let err = iterate_henon(1.4, 0.3, vec![0.0], 0, 10)
            .err()
            .expect("bad seed");
        let kind = js_sys::Reflect::get(&err, &JsValue::from_str("kind"))
            .ok()
            .and_then(|v| v.as_string());
        assert_eq!(kind.as_deref(), Some("invalid_input"));
    }

    #[wasm_bindgen_test]
    fn fixed_points_round_trip_through_js() {
        let value = henon_fixed_points(1.4, 0.3).expect("fixed points");
        let points: Vec<FixedPoint> = from_value(value).expect("deserialize");
        assert_eq!(points.len(), 2);
        assert!(points.iter().all(|p| p.stability == StabilityClass::Saddle));
    }

    #[wasm_bindgen_test]
    fn lorenz_equilibria_default_parameters() {
        let flow = WasmFlow::new("lorenz", JsValue::NULL).expect("flow");
        assert_eq!(flow.dimension(), 3);
        let points: Vec<FixedPoint> = from_value(flow.equilibria().expect("equilibria"))
            .expect("deserialize");
        assert_eq!(points.len(), 3);
    }
}
