//! Adaptive integration of ordinary differential equations.
//!
//! The building blocks, from the bottom up:
//!
//! * [`StateAlgebra`]: arithmetic over the state container.
//! * [`rk::RungeKutta`]: embedded explicit Runge–Kutta steps with an error
//!   estimate and dense output.
//! * [`ErrorChecker`]: scaled error norms and step-size control.
//! * [`ControlledStepper`]: the accept/reject loop around a base stepper.
//! * [`DenseOutputStepper`]: controlled steps plus interpolation inside the
//!   last step.
//! * [`AdamsBashforth`]: a self-starting explicit multistep stepper of order
//!   2 to 8.
//! * [`integrate`]: drivers that step across a time span and report to an
//!   observer.

pub mod adams;
pub mod algebra;
pub mod controlled;
pub mod dense;
pub mod error;
pub mod error_checker;
pub mod integrate;
pub mod rk;

pub use crate::adams::AdamsBashforth;
pub use crate::algebra::StateAlgebra;
pub use crate::controlled::{ControlledStepper, Trial};
pub use crate::dense::DenseOutputStepper;
pub use crate::error::{ConfigError, StepError};
pub use crate::error_checker::{ErrorChecker, ErrorNorm};
pub use crate::integrate::{integrate_adaptive, integrate_const, integrate_dense, integrate_n_steps};

/// Right-hand side of an ODE system `dx/dt = f(t, x)`.
pub trait System<S> {
    /// Writes the derivative of `x` at time `t` into `dxdt`.
    fn rhs(&mut self, t: f64, x: &S, dxdt: &mut S);
}

impl<S, F> System<S> for F
where
    F: FnMut(f64, &S, &mut S),
{
    fn rhs(&mut self, t: f64, x: &S, dxdt: &mut S) {
        self(t, x, dxdt)
    }
}

/// Receives the state at the times chosen by an integration driver.
pub trait Observer<S> {
    fn observe(&mut self, x: &S, t: f64);
}

impl<S, F> Observer<S> for F
where
    F: FnMut(&S, f64),
{
    fn observe(&mut self, x: &S, t: f64) {
        self(x, t)
    }
}
