use crate::traits::DynamicalSystem;
use crate::trajectory::DenseSegment;

const STAGES: usize = 7;

const C: [f64; 6] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0];

const A: [[f64; 5]; 6] = [
    [0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 5.0, 0.0, 0.0, 0.0, 0.0],
    [3.0 / 40.0, 9.0 / 40.0, 0.0, 0.0, 0.0],
    [44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0, 0.0, 0.0],
    [
        19372.0 / 6561.0,
        -25360.0 / 2187.0,
        64448.0 / 6561.0,
        -212.0 / 729.0,
        0.0,
    ],
    [
        9017.0 / 3168.0,
        -355.0 / 33.0,
        46732.0 / 5247.0,
        49.0 / 176.0,
        -5103.0 / 18656.0,
    ],
];

// 5th order weights
const B: [f64; 6] = [
    35.0 / 384.0,
    0.0,
    500.0 / 1113.0,
    125.0 / 192.0,
    -2187.0 / 6784.0,
    11.0 / 84.0,
];

// Difference between the 5th and embedded 4th order weights (7th stage is FSAL).
const E: [f64; STAGES] = [
    -71.0 / 57600.0,
    0.0,
    71.0 / 16695.0,
    -71.0 / 1920.0,
    17253.0 / 339200.0,
    -22.0 / 525.0,
    1.0 / 40.0,
];

// Quartic continuous extension: y(t0 + theta h) = y0 + h sum_j k_j sum_m P[j][m] theta^(m+1)
const P: [[f64; 4]; STAGES] = [
    [
        1.0,
        -8048581381.0 / 2820520608.0,
        8663915743.0 / 2820520608.0,
        -12715105075.0 / 11282082432.0,
    ],
    [0.0, 0.0, 0.0, 0.0],
    [
        0.0,
        131558114200.0 / 32700410799.0,
        -68118460800.0 / 10900136933.0,
        87487479700.0 / 32700410799.0,
    ],
    [
        0.0,
        -1754552775.0 / 470086768.0,
        14199869525.0 / 1410260304.0,
        -10690763975.0 / 1880347072.0,
    ],
    [
        0.0,
        127303824393.0 / 49829197408.0,
        -318862633887.0 / 49829197408.0,
        701980252875.0 / 199316789632.0,
    ],
    [
        0.0,
        -282668133.0 / 205662961.0,
        2019193451.0 / 616988883.0,
        -1453857185.0 / 822651844.0,
    ],
    [
        0.0,
        40617522.0 / 29380423.0,
        -110615467.0 / 29380423.0,
        69997945.0 / 29380423.0,
    ],
];

/// Error order of the embedded pair, used by the step controller.
pub const ERROR_ORDER: f64 = 4.0;

/// Dormand-Prince 5(4) embedded Runge-Kutta stepper with dense output.
///
/// The stepper keeps `k[0] = f(t, y)` for the current accepted state
/// (first-same-as-last), so each attempt costs six evaluations.
pub struct DormandPrince45 {
    k: [Vec<f64>; STAGES],
    tmp: Vec<f64>,
    y_new: Vec<f64>,
    evaluations: usize,
}

/// Outcome of a single trial step.
#[derive(Debug, Clone, Copy)]
pub struct StepAttempt {
    /// RMS of the scaled local error; the step is acceptable when `<= 1`.
    /// Infinite when a stage produced a non-finite value.
    pub error_norm: f64,
}

impl StepAttempt {
    pub fn is_finite(&self) -> bool {
        self.error_norm.is_finite()
    }
}

impl DormandPrince45 {
    pub fn new(dim: usize) -> Self {
        Self {
            k: std::array::from_fn(|_| vec![0.0; dim]),
            tmp: vec![0.0; dim],
            y_new: vec![0.0; dim],
            evaluations: 0,
        }
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// Evaluates `f(t, y)` into the first stage. Returns false if it is not finite.
    pub fn prime(&mut self, system: &impl DynamicalSystem<f64>, t: f64, y: &[f64]) -> bool {
        system.apply(t, y, &mut self.k[0]);
        self.evaluations += 1;
        all_finite(&self.k[0])
    }

    /// Derivative at the current accepted state.
    pub fn derivative(&self) -> &[f64] {
        &self.k[0]
    }

    /// Candidate state from the last attempt.
    pub fn proposed(&self) -> &[f64] {
        &self.y_new
    }

    /// Tries a step of size `h` from `(t, y)`; `prime` must have been called for `(t, y)`.
    pub fn attempt(
        &mut self,
        system: &impl DynamicalSystem<f64>,
        t: f64,
        y: &[f64],
        h: f64,
        rtol: f64,
        atol: f64,
    ) -> StepAttempt {
        let dim = y.len();

        for s in 1..6 {
            for i in 0..dim {
                let mut acc = 0.0;
                for j in 0..s {
                    acc += A[s][j] * self.k[j][i];
                }
                self.tmp[i] = y[i] + h * acc;
            }
            system.apply(t + C[s] * h, &self.tmp, &mut self.k[s]);
        }

        for i in 0..dim {
            let mut acc = 0.0;
            for j in 0..6 {
                acc += B[j] * self.k[j][i];
            }
            self.y_new[i] = y[i] + h * acc;
        }

        system.apply(t + h, &self.y_new, &mut self.k[6]);
        self.evaluations += 6;

        if !all_finite(&self.y_new) || self.k.iter().any(|k| !all_finite(k)) {
            return StepAttempt {
                error_norm: f64::INFINITY,
            };
        }

        let mut sum = 0.0;
        for i in 0..dim {
            let mut err = 0.0;
            for j in 0..STAGES {
                err += E[j] * self.k[j][i];
            }
            let scale = atol + rtol * y[i].abs().max(self.y_new[i].abs());
            let ratio = h * err / scale;
            sum += ratio * ratio;
        }
        let error_norm = if dim == 0 {
            0.0
        } else {
            (sum / dim as f64).sqrt()
        };

        StepAttempt {
            error_norm: if error_norm.is_nan() {
                f64::INFINITY
            } else {
                error_norm
            },
        }
    }

    /// Dense-output polynomial for the step just attempted from `(t, y)` with size `h`.
    pub fn dense_segment(&self, t: f64, y: &[f64], h: f64) -> DenseSegment {
        let dim = y.len();
        let mut coefficients = vec![0.0; dim * 4];
        for i in 0..dim {
            for m in 0..4 {
                let mut acc = 0.0;
                for j in 0..STAGES {
                    acc += self.k[j][i] * P[j][m];
                }
                coefficients[i * 4 + m] = acc;
            }
        }
        DenseSegment::new(t, h, y.to_vec(), coefficients)
    }

    /// Commits the last attempt: `y` takes the proposed state and the final
    /// stage becomes the first stage of the next step.
    pub fn accept(&mut self, y: &mut [f64]) {
        y.copy_from_slice(&self.y_new);
        self.k.swap(0, 6);
    }
}

/// Starting step estimate following Hairer, Norsett & Wanner (II.4).
///
/// Requires `stepper.prime(system, t, y)` to have succeeded.
pub fn initial_step(
    stepper: &mut DormandPrince45,
    system: &impl DynamicalSystem<f64>,
    t: f64,
    y: &[f64],
    rtol: f64,
    atol: f64,
) -> f64 {
    let dim = y.len();
    if dim == 0 {
        return 1e-6;
    }
    let scaled_norm = |v: &[f64]| -> f64 {
        let sum: f64 = v
            .iter()
            .zip(y)
            .map(|(vi, yi)| {
                let r = vi / (atol + yi.abs() * rtol);
                r * r
            })
            .sum();
        (sum / dim as f64).sqrt()
    };

    let f0 = stepper.k[0].clone();
    let d0 = scaled_norm(y);
    let d1 = scaled_norm(&f0);
    let h0 = if d0 < 1e-5 || d1 < 1e-5 {
        1e-6
    } else {
        0.01 * d0 / d1
    };

    for i in 0..dim {
        stepper.tmp[i] = y[i] + h0 * f0[i];
    }
    let mut f1 = vec![0.0; dim];
    system.apply(t + h0, &stepper.tmp, &mut f1);
    stepper.evaluations += 1;

    let diff: Vec<f64> = f1.iter().zip(&f0).map(|(a, b)| a - b).collect();
    let d2 = scaled_norm(&diff) / h0;
    let h1 = if d1.max(d2) <= 1e-15 || !d2.is_finite() {
        (h0 * 1e-3).max(1e-6)
    } else {
        (0.01 / d1.max(d2)).powf(1.0 / (ERROR_ORDER + 1.0))
    };
    (100.0 * h0).min(h1)
}

/// Discrete Map Stepper
/// Just evaluates x_{n+1} = f(x_n), passing the iteration index as the time argument.
pub struct DiscreteMap {
    tmp: Vec<f64>,
}

impl DiscreteMap {
    pub fn new(dim: usize) -> Self {
        Self {
            tmp: vec![0.0; dim],
        }
    }

    /// Advances `state` in place. Returns false when the image is not finite,
    /// in which case `state` is left untouched.
    pub fn step(
        &mut self,
        system: &impl DynamicalSystem<f64>,
        iteration: usize,
        state: &mut [f64],
    ) -> bool {
        system.apply(iteration as f64, state, &mut self.tmp);
        if !all_finite(&self.tmp) {
            return false;
        }
        state.copy_from_slice(&self.tmp);
        true
    }
}

pub(crate) fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}
