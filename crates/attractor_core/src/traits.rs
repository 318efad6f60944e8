use num_traits::Num;
use std::fmt::Debug;
use std::ops::Neg;

/// A trait for types that can be used as scalars in our dynamical systems.
/// Implemented by `f64` for evaluation and by `Dual` for exact Jacobians.
pub trait Scalar: Num + Neg<Output = Self> + Copy + Debug + PartialOrd + 'static {
    fn from_f64(value: f64) -> Self;

    /// The real value, dropping any derivative part.
    fn value(self) -> f64;

    fn sin(self) -> Self;

    fn cos(self) -> Self;
}

impl Scalar for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }

    fn value(self) -> f64 {
        self
    }

    fn sin(self) -> Self {
        f64::sin(self)
    }

    fn cos(self) -> Self {
        f64::cos(self)
    }
}

/// Represents a dynamical system (Flow or Map).
pub trait DynamicalSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field (flow) or map function.
    /// x: current state
    /// t: current time
    /// out: buffer to write the result (dx/dt or x_{n+1})
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}

impl<T: Scalar, S: DynamicalSystem<T> + ?Sized> DynamicalSystem<T> for &S {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn apply(&self, t: T, x: &[T], out: &mut [T]) {
        (**self).apply(t, x, out)
    }
}
