//! Drivers that step across a time span and report to an observer.
//!
//! Every driver returns the number of steps it took, or the first error, in
//! which case the run stops where it failed. Spans must run forward and must
//! not be empty.

use log::debug;

use crate::adams::AdamsBashforth;
use crate::algebra::StateAlgebra;
use crate::controlled::{min_step, ControlledStepper};
use crate::dense::DenseOutputStepper;
use crate::error::{check_span, check_step_size, StepError};
use crate::rk::{DenseInterpolant, ErrorStepper};
use crate::{Observer, System};

/// Returns `true` if `t` hasn't reached `t1` yet, up to rounding.
fn before_end(t: f64, t1: f64) -> bool {
    t1 - t > min_step(t1)
}

/// Integrates from `t0` to `t1` with adaptive steps, starting with a step of
/// `dt`.
///
/// The observer sees the start, then the state after every accepted step. The
/// last step is shortened to land on `t1`. On success `x` holds the state at
/// `t1`.
pub fn integrate_adaptive<B, S, F, O>(
    stepper: &mut ControlledStepper<B>,
    mut system: F,
    x: &mut S,
    t0: f64,
    t1: f64,
    dt: f64,
    mut observer: O,
) -> Result<usize, StepError>
where
    S: StateAlgebra,
    B: ErrorStepper<S>,
    F: System<S>,
    O: Observer<S>,
{
    check_span(t0, t1)?;
    check_step_size(dt)?;
    debug!("adaptive integration from t = {} to t = {}", t0, t1);
    let mut t = t0;
    let mut dt = dt;
    let mut dxdt = x.zeros_like();
    system.rhs(t, x, &mut dxdt);

    let mut steps = 0;
    while before_end(t, t1) {
        observer.observe(x, t);
        if t + dt > t1 {
            dt = t1 - t;
        }
        stepper.step_dxdt(&mut system, x, &mut dxdt, &mut t, &mut dt)?;
        steps += 1;
    }
    observer.observe(x, t);
    debug!("adaptive integration reached t = {} in {} steps", t, steps);
    Ok(steps)
}

/// Like [`integrate_adaptive`], using a dense-output stepper.
///
/// The stepper is initialized from `(t0, x)` and is left positioned at the
/// end of the run, so its last step can still be interpolated.
pub fn integrate_dense<B, S, F, O>(
    dense: &mut DenseOutputStepper<B, S>,
    mut system: F,
    x: &mut S,
    t0: f64,
    t1: f64,
    dt: f64,
    mut observer: O,
) -> Result<usize, StepError>
where
    S: StateAlgebra,
    B: ErrorStepper<S> + DenseInterpolant<S>,
    F: System<S>,
    O: Observer<S>,
{
    check_span(t0, t1)?;
    dense.initialize(x.clone(), t0, dt)?;
    debug!("dense integration from t = {} to t = {}", t0, t1);
    observer.observe(x, t0);

    let mut steps = 0;
    let mut t = t0;
    while before_end(t, t1) {
        clip_to_end(dense, t1)?;
        let (_, t_new) = dense.do_step(&mut system)?;
        steps += 1;
        t = t_new;
        observer.observe(current_state(dense)?, t);
    }
    *x = current_state(dense)?.clone();
    debug!("dense integration reached t = {} in {} steps", t, steps);
    Ok(steps)
}

/// Integrates from `t0` to `t1`, observing at `t0 + i * dt`.
///
/// The internal steps are chosen adaptively, starting with `dt`; observed
/// states are interpolated inside them. On success `x` holds the state at
/// `t1`.
pub fn integrate_const<B, S, F, O>(
    dense: &mut DenseOutputStepper<B, S>,
    mut system: F,
    x: &mut S,
    t0: f64,
    t1: f64,
    dt: f64,
    mut observer: O,
) -> Result<usize, StepError>
where
    S: StateAlgebra,
    B: ErrorStepper<S> + DenseInterpolant<S>,
    F: System<S>,
    O: Observer<S>,
{
    check_span(t0, t1)?;
    dense.initialize(x.clone(), t0, dt)?;
    debug!("constant-output integration from t = {} to t = {} every {}", t0, t1, dt);

    let mut steps = 0;
    let mut i = 0;
    loop {
        let t_out = t0 + i as f64 * dt;
        if t_out - t1 > min_step(t1) {
            break;
        }
        let target = t_out.min(t1);
        let mut t = current_time(dense)?;
        while t < target && before_end(t, t1) {
            clip_to_end(dense, t1)?;
            let (_, t_new) = dense.do_step(&mut system)?;
            steps += 1;
            t = t_new;
        }
        // Within rounding of the end the current state stands in for `t1`.
        let x_out = dense.calc_state(target.min(t))?;
        observer.observe(&x_out, t_out);
        i += 1;
    }
    *x = current_state(dense)?.clone();
    debug!("constant-output integration took {} steps for {} outputs", steps, i);
    Ok(steps)
}

/// Takes `n` steps of size `dt` with a multistep stepper, starting from
/// `(t0, x)`.
///
/// A stepper without a full history is initialized first, which advances
/// the state by `order - 1` steps of `dt` before the `n` steps begin; its
/// history must otherwise end at `t0`. The observer sees the start, the end
/// of the start-up phase if there is one, and every step after it.
pub fn integrate_n_steps<S, F, O>(
    adams: &mut AdamsBashforth<S>,
    mut system: F,
    x: &mut S,
    t0: f64,
    dt: f64,
    n: usize,
    mut observer: O,
) -> Result<usize, StepError>
where
    S: StateAlgebra,
    F: System<S>,
    O: Observer<S>,
{
    check_step_size(dt)?;
    debug!("{} multistep steps of order {} from t = {}", n, adams.order(), t0);
    let mut t = t0;
    observer.observe(x, t);
    if !adams.is_initialized() {
        adams.initialize(&mut system, x, &mut t, dt)?;
        observer.observe(x, t);
    }
    for _ in 0..n {
        adams.do_step(&mut system, x, &mut t, dt)?;
        observer.observe(x, t);
    }
    debug!("multistep integration reached t = {}", t);
    Ok(n)
}

fn current_state<B, S>(dense: &DenseOutputStepper<B, S>) -> Result<&S, StepError>
where
    S: StateAlgebra,
    B: ErrorStepper<S> + DenseInterpolant<S>,
{
    dense.current_state().ok_or(StepError::Uninitialized)
}

fn current_time<B, S>(dense: &DenseOutputStepper<B, S>) -> Result<f64, StepError>
where
    S: StateAlgebra,
    B: ErrorStepper<S> + DenseInterpolant<S>,
{
    dense.current_time().ok_or(StepError::Uninitialized)
}

/// Restarts `dense` with a step that ends on `t1` if its next step would
/// overshoot.
fn clip_to_end<B, S>(dense: &mut DenseOutputStepper<B, S>, t1: f64) -> Result<(), StepError>
where
    S: StateAlgebra,
    B: ErrorStepper<S> + DenseInterpolant<S>,
{
    let t = current_time(dense)?;
    let dt = dense.current_time_step().ok_or(StepError::Uninitialized)?;
    if t + dt > t1 {
        let x = current_state(dense)?.clone();
        dense.initialize(x, t, t1 - t)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_checker::ErrorChecker;
    use crate::rk::{RungeKutta, RK45};
    use approx::assert_abs_diff_eq;

    fn decay(_t: f64, x: &[f64; 1], dxdt: &mut [f64; 1]) {
        dxdt[0] = -x[0];
    }

    fn checker() -> ErrorChecker {
        ErrorChecker::new(1e-9, 1e-9).unwrap()
    }

    #[test]
    fn adaptive_lands_on_end() {
        let mut stepper = ControlledStepper::new(RungeKutta::<RK45, _>::new(), checker());
        let mut x = [1.];
        let mut times = Vec::new();
        let steps = integrate_adaptive(&mut stepper, decay, &mut x, 0., 2., 0.3, |_: &[f64; 1], t: f64| {
            times.push(t)
        })
        .unwrap();
        assert_eq!(times.len(), steps + 1);
        assert_eq!(times[0], 0.);
        assert_abs_diff_eq!(*times.last().unwrap(), 2., epsilon = 1e-14);
        assert!(times.windows(2).all(|w| w[0] < w[1]));
        assert_abs_diff_eq!(x[0], (-2f64).exp(), epsilon = 1e-8);
    }

    #[test]
    fn adaptive_rejects_bad_step() {
        let mut stepper = ControlledStepper::new(RungeKutta::<RK45, _>::new(), checker());
        let mut x = [1.];
        let result = integrate_adaptive(&mut stepper, decay, &mut x, 0., 1., f64::NAN, |_: &[f64; 1], _: f64| {});
        assert!(matches!(result, Err(StepError::InvalidStepSize(dt)) if dt.is_nan()));
        assert_eq!(x, [1.]);
    }

    #[test]
    fn backward_or_empty_spans_are_rejected() {
        let mut stepper = ControlledStepper::new(RungeKutta::<RK45, _>::new(), checker());
        let mut x = [1.];
        let mut calls = 0;
        assert_eq!(
            integrate_adaptive(&mut stepper, decay, &mut x, 1., 0., 0.1, |_: &[f64; 1], _: f64| calls += 1),
            Err(StepError::InvalidSpan { start: 1., end: 0. })
        );
        assert_eq!(
            integrate_adaptive(&mut stepper, decay, &mut x, 1., 1., 0.1, |_: &[f64; 1], _: f64| calls += 1),
            Err(StepError::InvalidSpan { start: 1., end: 1. })
        );
        let mut dense = DenseOutputStepper::new(ControlledStepper::new(RungeKutta::<RK45, _>::new(), checker()));
        assert!(matches!(
            integrate_dense(&mut dense, decay, &mut x, 2., 0., 0.1, |_: &[f64; 1], _: f64| calls += 1),
            Err(StepError::InvalidSpan { .. })
        ));
        assert!(matches!(
            integrate_const(&mut dense, decay, &mut x, 0., f64::NAN, 0.1, |_: &[f64; 1], _: f64| calls += 1),
            Err(StepError::InvalidSpan { .. })
        ));
        assert_eq!(calls, 0);
        assert_eq!(x, [1.]);
        assert_eq!(dense.current_time(), None);
    }

    #[test]
    fn dense_lands_on_end() {
        let controlled = ControlledStepper::new(RungeKutta::<RK45, _>::new(), checker());
        let mut dense = DenseOutputStepper::new(controlled);
        let mut x = [1.];
        let mut times = Vec::new();
        let steps = integrate_dense(&mut dense, decay, &mut x, 0., 1.5, 0.1, |_: &[f64; 1], t: f64| {
            times.push(t)
        })
        .unwrap();
        assert_eq!(times.len(), steps + 1);
        assert_abs_diff_eq!(*times.last().unwrap(), 1.5, epsilon = 1e-14);
        assert_eq!(dense.current_time(), times.last().copied());
        assert_abs_diff_eq!(x[0], (-1.5f64).exp(), epsilon = 1e-8);
    }

    #[test]
    fn const_observes_on_grid() {
        let controlled = ControlledStepper::new(RungeKutta::<RK45, _>::new(), checker());
        let mut dense = DenseOutputStepper::new(controlled);
        let mut x = [1.];
        let mut observed = Vec::new();
        let steps = integrate_const(&mut dense, decay, &mut x, 0., 1., 0.1, |x: &[f64; 1], t: f64| {
            observed.push((t, x[0]))
        })
        .unwrap();
        assert_eq!(observed.len(), 11);
        for (i, &(t, x)) in observed.iter().enumerate() {
            assert_eq!(t, i as f64 * 0.1);
            assert_abs_diff_eq!(x, (-t).exp(), epsilon = 1e-7);
        }
        assert!(steps > 0);
        assert_abs_diff_eq!(x[0], (-1f64).exp(), epsilon = 1e-8);
    }

    #[test]
    fn n_steps_starts_once() {
        let mut adams = AdamsBashforth::new(3).unwrap();
        let mut x = [1.];
        let mut times = Vec::new();
        let steps = integrate_n_steps(&mut adams, decay, &mut x, 0., 0.01, 5, |_: &[f64; 1], t: f64| {
            times.push(t)
        })
        .unwrap();
        assert_eq!(steps, 5);
        // start, end of start-up, then every step
        assert_eq!(times.len(), 7);
        assert_abs_diff_eq!(times[1], 0.02, epsilon = 1e-15);
        assert_abs_diff_eq!(times[6], 0.07, epsilon = 1e-14);
        assert_abs_diff_eq!(x[0], (-0.07f64).exp(), epsilon = 1e-7);

        // a started stepper continues from where it stopped
        let t = times[6];
        let mut count = 0;
        integrate_n_steps(&mut adams, decay, &mut x, t, 0.01, 3, |_: &[f64; 1], _: f64| count += 1).unwrap();
        assert_eq!(count, 4);
        assert!(matches!(
            integrate_n_steps(&mut adams, decay, &mut x, 0., 0.01, 1, |_: &[f64; 1], _: f64| {}),
            Err(StepError::TimeMismatch { .. })
        ));
    }
}
