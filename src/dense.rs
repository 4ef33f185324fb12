//! Controlled stepping with interpolation inside the last step.

use std::mem;

use crate::algebra::StateAlgebra;
use crate::controlled::{ControlledStepper, Trial};
use crate::error::{check_step_size, StepError};
use crate::rk::{DenseInterpolant, ErrorStepper};
use crate::System;

#[derive(Debug, Clone)]
struct Current<S> {
    x: S,
    /// `f(t, x)`, or `None` if it has to be evaluated before the next step.
    dxdt: Option<S>,
    t: f64,
    /// Proposed size of the next step.
    dt: f64,
    /// State and time at the start of the last accepted step, or `None` if
    /// there hasn't been any since `initialize`.
    last: Option<(S, f64)>,
}

/// A [`ControlledStepper`] that can report the state anywhere inside its last
/// accepted step.
///
/// Output at arbitrary times is interpolated from the stages the base method
/// already computed, so the adaptive step grid doesn't have to hit output
/// times exactly.
#[derive(Debug, Clone)]
pub struct DenseOutputStepper<B, S> {
    controlled: ControlledStepper<B>,
    current: Option<Current<S>>,
}

impl<B, S> DenseOutputStepper<B, S>
where
    B: ErrorStepper<S> + DenseInterpolant<S>,
    S: StateAlgebra,
{
    pub fn new(controlled: ControlledStepper<B>) -> Self {
        DenseOutputStepper {
            controlled,
            current: None,
        }
    }

    /// Sets the state, time and next step proposal, discarding the last
    /// step.
    pub fn initialize(&mut self, x0: S, t0: f64, dt0: f64) -> Result<(), StepError> {
        check_step_size(dt0)?;
        self.current = Some(Current {
            x: x0,
            dxdt: None,
            t: t0,
            dt: dt0,
            last: None,
        });
        Ok(())
    }

    /// Takes one controlled step and returns the interval it covers.
    pub fn do_step<F>(&mut self, system: &mut F) -> Result<(f64, f64), StepError>
    where
        F: System<S>,
    {
        let current = self.current.as_mut().ok_or(StepError::Uninitialized)?;
        let dxdt = match current.dxdt.take() {
            Some(dxdt) => dxdt,
            None => {
                let mut dxdt = current.x.zeros_like();
                system.rhs(current.t, &current.x, &mut dxdt);
                dxdt
            }
        };

        let mut dt = current.dt;
        loop {
            // Rejected trials overwrite the stages of the last step.
            let trial = match self.controlled.try_step(system, &current.x, &dxdt, current.t, dt) {
                Ok(trial) => trial,
                Err(err) => {
                    current.last = None;
                    current.dxdt = Some(dxdt);
                    return Err(err);
                }
            };
            match trial {
                Trial::Accepted {
                    x,
                    dxdt: dxdt_new,
                    dt: dt_taken,
                    dt_next,
                } => {
                    let t_old = current.t;
                    let x_old = mem::replace(&mut current.x, x);
                    current.last = Some((x_old, t_old));
                    current.dxdt = Some(dxdt_new);
                    current.t = t_old + dt_taken;
                    current.dt = dt_next;
                    return Ok((t_old, current.t));
                }
                Trial::Rejected { dt_retry } => {
                    current.last = None;
                    dt = dt_retry;
                }
            }
        }
    }

    /// Interpolated state at `t`, which must lie within the last step.
    pub fn calc_state(&self, t: f64) -> Result<S, StepError> {
        let current = self.current.as_ref().ok_or(StepError::Uninitialized)?;
        if t == current.t {
            return Ok(current.x.clone());
        }
        match &current.last {
            Some((x_old, t_old)) if *t_old <= t && t <= current.t => {
                let dt = current.t - t_old;
                let theta = (t - t_old) / dt;
                Ok(self.controlled.stepper().interpolate(x_old, dt, theta))
            }
            Some((_, t_old)) => Err(StepError::OutOfRange {
                t,
                start: *t_old,
                end: current.t,
            }),
            None => Err(StepError::OutOfRange {
                t,
                start: current.t,
                end: current.t,
            }),
        }
    }

    pub fn current_state(&self) -> Option<&S> {
        self.current.as_ref().map(|c| &c.x)
    }

    pub fn current_time(&self) -> Option<f64> {
        self.current.as_ref().map(|c| c.t)
    }

    /// Start time of the last accepted step.
    pub fn previous_time(&self) -> Option<f64> {
        self.current.as_ref().and_then(|c| c.last.as_ref()).map(|(_, t)| *t)
    }

    /// Size proposed for the next step.
    pub fn current_time_step(&self) -> Option<f64> {
        self.current.as_ref().map(|c| c.dt)
    }

    pub fn controlled(&self) -> &ControlledStepper<B> {
        &self.controlled
    }

    pub fn order(&self) -> usize {
        self.controlled.stepper().order()
    }
}
