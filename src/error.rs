//! Error types.

use thiserror::Error;

/// Invalid stepper configuration, reported at construction time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("absolute tolerance must be positive, got {0}")]
    NonPositiveAbsTol(f64),
    #[error("relative tolerance must be positive, got {0}")]
    NonPositiveRelTol(f64),
    /// The relative tolerance was too small.
    ///
    /// It must be at least `100. * f64::EPSILON`.
    #[error("relative tolerance {0} is too small")]
    TooSmallRelTol(f64),
    #[error("maximum step size must be positive, got {0}")]
    NegativeMaxStep(f64),
    #[error("order {0} is outside the supported range [2, 8]")]
    UnsupportedOrder(usize),
}

/// Failure while advancing a stepper.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepError {
    #[error("step size must be positive and finite, got {0}")]
    InvalidStepSize(f64),
    /// Repeated rejections drove the step size below what the current time
    /// can resolve.
    #[error("required step size {required} is smaller than min allowable step size {allowable}")]
    TooSmallStep { required: f64, allowable: f64 },
    #[error("multistep history holds {filled} of {order} samples, call `initialize` first")]
    NotInitialized { filled: usize, order: usize },
    #[error("time {actual} does not match the latest history time {expected}")]
    TimeMismatch { expected: f64, actual: f64 },
    #[error("dense output stepper used before `initialize`")]
    Uninitialized,
    #[error("time {t} lies outside the last step [{start}, {end}]")]
    OutOfRange { t: f64, start: f64, end: f64 },
    /// Only forward integration over a non-empty span is supported.
    #[error("cannot integrate from t = {start} to t = {end}")]
    InvalidSpan { start: f64, end: f64 },
}

/// Checks that `dt` can be used as a forward step.
pub(crate) fn check_step_size(dt: f64) -> Result<(), StepError> {
    if dt > 0. && dt.is_finite() {
        Ok(())
    } else {
        Err(StepError::InvalidStepSize(dt))
    }
}

/// Checks that `[t0, t1]` is a non-empty forward span.
pub(crate) fn check_span(t0: f64, t1: f64) -> Result<(), StepError> {
    if t1 > t0 && t0.is_finite() && t1.is_finite() {
        Ok(())
    } else {
        Err(StepError::InvalidSpan { start: t0, end: t1 })
    }
}
