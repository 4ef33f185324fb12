//! Error-controlled steps.

use log::{debug, trace, warn};

use crate::algebra::StateAlgebra;
use crate::error::{check_step_size, StepError};
use crate::error_checker::ErrorChecker;
use crate::rk::{select_initial_step, EmbeddedStep, ErrorStepper};
use crate::System;

/// Outcome of a single trial step.
#[derive(Debug, Clone, PartialEq)]
pub enum Trial<S> {
    /// The error was within tolerance.
    Accepted {
        /// State at `t + dt`.
        x: S,
        /// Derivative at `t + dt`.
        dxdt: S,
        /// Step size actually taken (after applying the ceiling).
        dt: f64,
        /// Suggested size of the next step.
        dt_next: f64,
    },
    /// The error was too large; retry from the same point with `dt_retry`.
    Rejected { dt_retry: f64 },
}

/// Computes the next representable floating-point value following `x` in the
/// direction of `y`.
///
/// Special cases:
///
/// * If `x` equals `y`, then `y` is returned.
/// * If `x` or `y` is NAN, a NAN is returned.
///
/// There is no special handling for overflow of finite values to ±∞ or
/// subnormals.
fn next_after(x: f64, y: f64) -> f64 {
    if x.is_nan() || y.is_nan() {
        f64::NAN
    } else if x == y {
        y
    } else if x == 0. {
        if y < 0. {
            -f64::from_bits(1)
        } else {
            f64::from_bits(1)
        }
    } else if (y > x) == (x > 0.) {
        f64::from_bits(x.to_bits().wrapping_add(1))
    } else {
        f64::from_bits(x.to_bits().wrapping_sub(1))
    }
}

/// Smallest step that still moves `t` by a meaningful amount.
pub(crate) fn min_step(t: f64) -> f64 {
    10. * (next_after(t, f64::INFINITY) - t).abs()
}

/// Wraps a base stepper into an accept/reject loop.
///
/// A trial step is taken with the base stepper and judged by the
/// [`ErrorChecker`]. Accepted steps suggest a (possibly larger) next step,
/// rejected ones are retried from the same point with a smaller step until
/// the step size underflows.
#[derive(Debug, Clone)]
pub struct ControlledStepper<B> {
    stepper: B,
    checker: ErrorChecker,
}

impl<B> ControlledStepper<B> {
    pub fn new(stepper: B, checker: ErrorChecker) -> Self {
        ControlledStepper { stepper, checker }
    }

    pub fn stepper(&self) -> &B {
        &self.stepper
    }

    pub fn error_checker(&self) -> &ErrorChecker {
        &self.checker
    }

    /// Order of the base stepper.
    pub fn order<S>(&self) -> usize
    where
        B: ErrorStepper<S>,
    {
        self.stepper.order()
    }

    /// Suggests a first step size for starting at `(t, x)`.
    ///
    /// See [`select_initial_step`]; the result respects the step-size
    /// ceiling.
    pub fn initial_step<S, F>(&self, system: &mut F, t: f64, x: &S) -> f64
    where
        S: StateAlgebra,
        B: ErrorStepper<S>,
        F: System<S>,
    {
        let mut dxdt = x.zeros_like();
        system.rhs(t, x, &mut dxdt);
        let dt = select_initial_step(
            system,
            t,
            x,
            &dxdt,
            self.stepper.error_order(),
            self.checker.rel_tol(),
            self.checker.abs_tol(),
        );
        self.checker.limit_step(dt)
    }

    /// Attempts one step of size `dt` from `(t, x)` where `dxdt = f(t, x)`.
    ///
    /// Nothing the caller passed in is modified, whatever the outcome.
    pub fn try_step<S, F>(&mut self, system: &mut F, x: &S, dxdt: &S, t: f64, dt: f64) -> Result<Trial<S>, StepError>
    where
        S: StateAlgebra,
        B: ErrorStepper<S>,
        F: System<S>,
    {
        check_step_size(dt)?;
        let dt = self.checker.limit_step(dt);
        let allowable = min_step(t);
        if dt < allowable {
            warn!("step size {} underflows at t = {}", dt, t);
            return Err(StepError::TooSmallStep {
                required: dt,
                allowable,
            });
        }

        let EmbeddedStep {
            x: x_new,
            dxdt: dxdt_new,
            x_err,
        } = self.stepper.step_with_error(system, t, x, dxdt, dt);
        let error = self.checker.compute_error(&x_new, x, &x_err);

        let order = self.stepper.order();
        if error <= 1. {
            let dt_next = self.checker.increase_step(dt, error, order);
            trace!("accepted step t = {} dt = {} error = {}", t, dt, error);
            Ok(Trial::Accepted {
                x: x_new,
                dxdt: dxdt_new,
                dt,
                dt_next,
            })
        } else {
            let dt_retry = self.checker.decrease_step(dt, error, order);
            debug!(
                "rejected step t = {} dt = {} error = {}, retrying with dt = {}",
                t, dt, error, dt_retry
            );
            Ok(Trial::Rejected { dt_retry })
        }
    }

    /// Takes one error-controlled step, retrying until it is accepted.
    ///
    /// On success `x` and `dxdt` hold the new state and its derivative, `t` is
    /// advanced by the accepted step and `dt` holds the suggested next step.
    /// `dxdt` must be `f(t, x)` on entry.
    pub fn step_dxdt<S, F>(
        &mut self,
        system: &mut F,
        x: &mut S,
        dxdt: &mut S,
        t: &mut f64,
        dt: &mut f64,
    ) -> Result<(), StepError>
    where
        S: StateAlgebra,
        B: ErrorStepper<S>,
        F: System<S>,
    {
        loop {
            match self.try_step(system, x, dxdt, *t, *dt)? {
                Trial::Accepted {
                    x: x_new,
                    dxdt: dxdt_new,
                    dt: dt_taken,
                    dt_next,
                } => {
                    *x = x_new;
                    *dxdt = dxdt_new;
                    *t += dt_taken;
                    *dt = dt_next;
                    return Ok(());
                }
                Trial::Rejected { dt_retry } => *dt = dt_retry,
            }
        }
    }

    /// Like [`step_dxdt`](Self::step_dxdt), evaluating the derivative at the
    /// start point first.
    pub fn step<S, F>(&mut self, system: &mut F, x: &mut S, t: &mut f64, dt: &mut f64) -> Result<(), StepError>
    where
        S: StateAlgebra,
        B: ErrorStepper<S>,
        F: System<S>,
    {
        let mut dxdt = x.zeros_like();
        system.rhs(*t, x, &mut dxdt);
        self.step_dxdt(system, x, &mut dxdt, t, dt)
    }
}
