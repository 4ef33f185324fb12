//! Error norms and step-size control.

use crate::algebra::StateAlgebra;
use crate::error::ConfigError;

/// Multiply steps computed from asymptotic behaviour of errors by this.
pub const SAFETY: f64 = 0.9;
/// Minimum allowed decrease in a step size.
pub const MIN_FACTOR: f64 = 0.2;
/// Maximum allowed increase in a step size.
pub const MAX_FACTOR: f64 = 10.;
/// Steps are only grown when the error is at most this.
///
/// Growing right after a near-rejection tends to cause the next step to be
/// rejected.
pub const GROWTH_THRESHOLD: f64 = 0.5;

/// Reduction applied to the per-component scaled errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorNorm {
    /// Largest scaled component error.
    Max,
    /// Root mean square of the scaled component errors.
    Rms,
}

impl Default for ErrorNorm {
    fn default() -> Self {
        ErrorNorm::Max
    }
}

/// Decides whether a step is accurate enough and how to size the next one.
///
/// The local error of a step is kept below `atol + rtol * abs(x)` in each
/// component. Here `rtol` controls a relative accuracy (number of correct
/// digits). But if a component of `x` is approximately below `atol` then the
/// error only needs to fall within the same `atol` threshold, and the number
/// of correct digits is not guaranteed.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorChecker {
    abs_tol: f64,
    rel_tol: f64,
    /// Step-size ceiling, `None` if unbounded.
    max_step: Option<f64>,
    norm: ErrorNorm,
}

impl ErrorChecker {
    /// Creates a checker without a step-size ceiling using the max norm.
    pub fn new(abs_tol: f64, rel_tol: f64) -> Result<ErrorChecker, ConfigError> {
        if !(abs_tol > 0.) {
            return Err(ConfigError::NonPositiveAbsTol(abs_tol));
        }
        if !(rel_tol > 0.) {
            return Err(ConfigError::NonPositiveRelTol(rel_tol));
        }
        if rel_tol < 100. * f64::EPSILON {
            return Err(ConfigError::TooSmallRelTol(rel_tol));
        }
        Ok(ErrorChecker {
            abs_tol,
            rel_tol,
            max_step: None,
            norm: ErrorNorm::default(),
        })
    }

    /// Sets the step-size ceiling. `None` and `Some(0.)` mean unbounded.
    pub fn with_max_step(mut self, max_step: Option<f64>) -> Result<ErrorChecker, ConfigError> {
        self.max_step = match max_step {
            Some(dt) if dt < 0. || dt.is_nan() => return Err(ConfigError::NegativeMaxStep(dt)),
            Some(dt) if dt == 0. || dt.is_infinite() => None,
            other => other,
        };
        Ok(self)
    }

    pub fn with_norm(mut self, norm: ErrorNorm) -> ErrorChecker {
        self.norm = norm;
        self
    }

    pub fn abs_tol(&self) -> f64 {
        self.abs_tol
    }

    pub fn rel_tol(&self) -> f64 {
        self.rel_tol
    }

    pub fn max_step(&self) -> Option<f64> {
        self.max_step
    }

    pub fn norm(&self) -> ErrorNorm {
        self.norm
    }

    /// Clamps `dt` to the step-size ceiling.
    pub fn limit_step(&self, dt: f64) -> f64 {
        match self.max_step {
            Some(max_step) => dt.min(max_step),
            None => dt,
        }
    }

    /// Per-component tolerance `atol + rtol * max(|x_old|, |x|)`.
    fn weight(&self, x_old: f64, x: f64) -> f64 {
        self.abs_tol + self.rel_tol * x_old.abs().max(x.abs())
    }

    /// Scaled error of a step from `x_old` to `x`, given its error estimate.
    ///
    /// A value of at most one means the step meets the tolerances.
    pub fn compute_error<S: StateAlgebra>(&self, x: &S, x_old: &S, x_err: &S) -> f64 {
        match self.norm {
            // `f64::max` would drop NaNs and accept a diverged step.
            ErrorNorm::Max => x_err.fold3(x_old, x, 0., |acc, err, x_old, x| {
                let scaled = err.abs() / self.weight(x_old, x);
                if scaled > acc || scaled.is_nan() {
                    scaled
                } else {
                    acc
                }
            }),
            ErrorNorm::Rms => {
                if x.dim() == 0 {
                    return 0.;
                }
                let sum = x_err.fold3(x_old, x, 0., |acc, err, x_old, x| {
                    let scaled = err / self.weight(x_old, x);
                    acc + scaled * scaled
                });
                (sum / x.dim() as f64).sqrt()
            }
        }
    }

    /// Shrinks `dt` after a step with `error > 1` was rejected.
    ///
    /// The embedded estimate of a method of order `order` is of order
    /// `order - 1`, which sets the exponent. The result is strictly smaller
    /// than `dt` for any `error > 1`.
    pub fn decrease_step(&self, dt: f64, error: f64, order: usize) -> f64 {
        let exponent = -1. / (order as f64 - 1.);
        let factor = (SAFETY * error.powf(exponent)).max(MIN_FACTOR);
        self.limit_step(dt * factor)
    }

    /// Proposes the next step size after an accepted step.
    ///
    /// The step only grows for `error <= GROWTH_THRESHOLD`; otherwise `dt` is
    /// returned as is (up to the ceiling). Growth never shrinks the step.
    ///
    /// The growth factor is `SAFETY * error^(-1/order)`, which only exceeds
    /// one for `error < SAFETY^order`. That is below `GROWTH_THRESHOLD` for
    /// orders 7 and 8, so for errors between `SAFETY^order` and
    /// `GROWTH_THRESHOLD` those orders keep `dt` unchanged.
    pub fn increase_step(&self, dt: f64, error: f64, order: usize) -> f64 {
        if error <= GROWTH_THRESHOLD {
            let factor = (SAFETY * error.powf(-1. / order as f64)).min(MAX_FACTOR).max(1.);
            self.limit_step(dt * factor)
        } else {
            self.limit_step(dt)
        }
    }
}
