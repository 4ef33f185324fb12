//! Explicit Adams–Bashforth multistep stepper.

use log::{debug, trace};
use std::collections::VecDeque;
use std::iter;

use crate::algebra::StateAlgebra;
use crate::error::{check_step_size, ConfigError, StepError};
use crate::rk::{ErrorStepper, RungeKutta, RK45};
use crate::System;

/// Supported orders.
pub const MIN_ORDER: usize = 2;
pub const MAX_ORDER: usize = 8;

/// Relative tolerance within which history spacings count as equal to the
/// step size, so that the fixed coefficients apply.
const UNIFORM_GRID_RTOL: f64 = 1e-10;

/// Largest ratio of the step size to the smallest history spacing that the
/// variable-step coefficients are used for. Extrapolating further is badly
/// conditioned, so the history is rebuilt on the step's grid instead.
const MAX_SPACING_RATIO: f64 = 2.;

/// Classical Adams–Bashforth coefficients for a uniform grid, indexed by
/// `order - MIN_ORDER`. Entry `j` multiplies the derivative `j` steps back.
const COEFFICIENTS: [&[f64]; MAX_ORDER - MIN_ORDER + 1] = [
    &[3. / 2., -1. / 2.],
    &[23. / 12., -16. / 12., 5. / 12.],
    &[55. / 24., -59. / 24., 37. / 24., -9. / 24.],
    &[1901. / 720., -2774. / 720., 2616. / 720., -1274. / 720., 251. / 720.],
    &[
        4277. / 1440.,
        -7923. / 1440.,
        9982. / 1440.,
        -7298. / 1440.,
        2877. / 1440.,
        -475. / 1440.,
    ],
    &[
        198721. / 60480.,
        -447288. / 60480.,
        705549. / 60480.,
        -688256. / 60480.,
        407139. / 60480.,
        -134472. / 60480.,
        19087. / 60480.,
    ],
    &[
        434241. / 120960.,
        -1152169. / 120960.,
        2183877. / 120960.,
        -2664477. / 120960.,
        2102243. / 120960.,
        -1041723. / 120960.,
        295767. / 120960.,
        -36799. / 120960.,
    ],
];

/// Coefficients for a step from the newest node over one unit of time.
///
/// `nodes` are the sample times relative to the newest one and divided by the
/// step size, newest first (so `nodes[0] == 0`). Coefficient `j` is the
/// integral over `[0, 1]` of the Lagrange basis polynomial of node `j`.
fn variable_coefficients(nodes: &[f64]) -> Vec<f64> {
    nodes
        .iter()
        .enumerate()
        .map(|(j, &u_j)| {
            // Coefficients of the basis polynomial, lowest degree first.
            let mut poly = vec![1.];
            let mut denom = 1.;
            for (m, &u_m) in nodes.iter().enumerate() {
                if m == j {
                    continue;
                }
                let mut next = vec![0.; poly.len() + 1];
                for (i, &c) in poly.iter().enumerate() {
                    next[i + 1] += c;
                    next[i] -= u_m * c;
                }
                poly = next;
                denom *= u_j - u_m;
            }
            let integral: f64 = poly
                .iter()
                .enumerate()
                .map(|(i, &c)| c / (i as f64 + 1.))
                .sum();
            integral / denom
        })
        .collect()
}

#[derive(Debug, Clone)]
struct Sample<S> {
    t: f64,
    dxdt: S,
}

/// Adams–Bashforth stepper of order 2 to 8.
///
/// The stepper keeps the derivatives of the last `order` steps. It starts
/// itself: [`initialize`](Self::initialize) fills the history using
/// Dormand–Prince steps, after which [`do_step`](Self::do_step) costs a single
/// evaluation of the system per step. Steps of varying size are allowed; the
/// coefficients are recomputed from the sample times whenever the grid isn't
/// uniform, and a step much longer than the history spacing rebuilds the
/// history first.
#[derive(Debug, Clone)]
pub struct AdamsBashforth<S> {
    order: usize,
    /// Newest sample last.
    history: VecDeque<Sample<S>>,
    starter: RungeKutta<RK45, S>,
}

impl<S> AdamsBashforth<S>
where
    S: StateAlgebra,
{
    pub fn new(order: usize) -> Result<Self, ConfigError> {
        if !(MIN_ORDER..=MAX_ORDER).contains(&order) {
            return Err(ConfigError::UnsupportedOrder(order));
        }
        Ok(AdamsBashforth {
            order,
            history: VecDeque::with_capacity(order),
            starter: RungeKutta::new(),
        })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Number of derivative samples currently held.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn is_initialized(&self) -> bool {
        self.history.len() == self.order
    }

    /// Discards the history; the stepper must be initialized again.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Fills the history starting from `(t, x)`.
    ///
    /// Takes `order - 1` steps of size `dt`, each made of `order` Dormand–Prince
    /// sub-steps, and records the derivative at every step boundary. `x` and
    /// `t` are advanced to the end of the last one.
    pub fn initialize<F>(&mut self, system: &mut F, x: &mut S, t: &mut f64, dt: f64) -> Result<(), StepError>
    where
        F: System<S>,
    {
        check_step_size(dt)?;
        self.history.clear();

        let mut dxdt = x.zeros_like();
        system.rhs(*t, x, &mut dxdt);
        self.history.push_back(Sample {
            t: *t,
            dxdt: dxdt.clone(),
        });

        let substep = dt / self.order as f64;
        for _ in 1..self.order {
            let t_start = *t;
            for i in 0..self.order {
                let t_sub = t_start + i as f64 * substep;
                let step = self.starter.step_with_error(system, t_sub, x, &dxdt, substep);
                *x = step.x;
                dxdt = step.dxdt;
            }
            *t = t_start + dt;
            self.history.push_back(Sample {
                t: *t,
                dxdt: dxdt.clone(),
            });
        }
        trace!("initialized order {} history up to t = {}", self.order, *t);
        Ok(())
    }

    fn min_spacing(&self) -> f64 {
        self.history
            .iter()
            .zip(self.history.iter().skip(1))
            .map(|(older, newer)| newer.t - older.t)
            .fold(f64::INFINITY, f64::min)
    }

    /// Replaces the history by samples spaced `dt` apart that end at the
    /// newest one, integrating backward from `x` with Dormand–Prince steps.
    fn resample<F>(&mut self, system: &mut F, x: &S, dt: f64)
    where
        F: System<S>,
    {
        let newest = match self.history.pop_back() {
            Some(sample) => sample,
            None => return,
        };
        let t_newest = newest.t;
        let mut x_back = x.clone();
        let mut dxdt = newest.dxdt.clone();
        self.history.clear();
        self.history.push_front(newest);

        let substep = dt / self.order as f64;
        for j in 1..self.order {
            let t_start = t_newest - (j - 1) as f64 * dt;
            for i in 0..self.order {
                let t_sub = t_start - i as f64 * substep;
                let step = self.starter.step_with_error(system, t_sub, &x_back, &dxdt, -substep);
                x_back = step.x;
                dxdt = step.dxdt;
            }
            self.history.push_front(Sample {
                t: t_newest - j as f64 * dt,
                dxdt: dxdt.clone(),
            });
        }
        debug!(
            "rebuilt order {} history with spacing {} at t = {}",
            self.order, dt, t_newest
        );
    }

    /// Coefficients for a step of size `dt` from the newest sample.
    fn coefficients(&self, dt: f64) -> Vec<f64> {
        let newest = self.history[self.history.len() - 1].t;
        let uniform = self
            .history
            .iter()
            .zip(self.history.iter().skip(1))
            .all(|(older, newer)| ((newer.t - older.t) - dt).abs() <= UNIFORM_GRID_RTOL * dt);
        if uniform {
            COEFFICIENTS[self.order - MIN_ORDER].to_vec()
        } else {
            let nodes: Vec<f64> = self.history.iter().rev().map(|s| (s.t - newest) / dt).collect();
            variable_coefficients(&nodes)
        }
    }

    /// Advances `x` and `t` by one step of size `dt`.
    ///
    /// `t` must be the time of the newest history sample, which is the case
    /// after `initialize` or a previous `do_step`. A step more than twice as
    /// long as the closest history spacing first rebuilds the history on a
    /// grid of `dt`, which integrates the system backward from `(t, x)`.
    pub fn do_step<F>(&mut self, system: &mut F, x: &mut S, t: &mut f64, dt: f64) -> Result<(), StepError>
    where
        F: System<S>,
    {
        if !self.is_initialized() {
            return Err(StepError::NotInitialized {
                filled: self.history.len(),
                order: self.order,
            });
        }
        check_step_size(dt)?;
        let expected = self.history[self.history.len() - 1].t;
        if (expected - *t).abs() > UNIFORM_GRID_RTOL * expected.abs().max(dt) {
            return Err(StepError::TimeMismatch {
                expected,
                actual: *t,
            });
        }

        if dt > MAX_SPACING_RATIO * self.min_spacing() {
            self.resample(system, x, dt);
        }
        let coefficients = self.coefficients(dt);
        // The evicted sample's buffer is recycled for the new derivative.
        let mut oldest = match self.history.pop_front() {
            Some(sample) => sample,
            None => return Err(StepError::NotInitialized { filled: 0, order: self.order }),
        };
        let samples = self.history.iter().rev().chain(iter::once(&oldest));
        for (beta, sample) in coefficients.iter().zip(samples) {
            x.add_scaled(dt * beta, &sample.dxdt);
        }
        *t += dt;

        system.rhs(*t, x, &mut oldest.dxdt);
        oldest.t = *t;
        self.history.push_back(oldest);
        Ok(())
    }
}
