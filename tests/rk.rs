extern crate ndarray;
extern crate ndarray_odeint;

use ndarray::prelude::*;

use ndarray_odeint::rk::{RungeKutta, RK23, RK45};
use ndarray_odeint::{integrate_adaptive, integrate_dense, ControlledStepper, DenseOutputStepper, ErrorChecker};

fn fun_rational(t: f64, y: &Array1<f64>, dy: &mut Array1<f64>) {
    dy[0] = y[1] / t;
    dy[1] = y[1] * (y[0] + 2. * y[1] - 1.) / (t * (y[0] - 1.));
}

fn sol_rational(t: f64) -> Array1<f64> {
    array![t / (t + 10.), 10. * t / (t + 10.).powi(2)]
}

fn compute_error(y: ArrayView1<f64>, y_true: ArrayView1<f64>, rtol: f64, atol: f64) -> Array1<f64> {
    let e = (&y - &y_true) / (y_true.mapv(f64::abs) * rtol + atol);
    (&e * &e / e.len() as f64).mapv(f64::sqrt)
}

const T0: f64 = 5.;
const T_BOUND: f64 = 9.;
const RTOL: f64 = 1e-3;
const ATOL: f64 = 1e-6;

#[test]
fn integration() {
    let mut y = array![1. / 3., 2. / 9.];
    let checker = ErrorChecker::new(ATOL, RTOL).unwrap();
    let mut stepper = ControlledStepper::new(RungeKutta::<RK45, _>::new(), checker);
    let dt = stepper.initial_step(&mut fun_rational, T0, &y);
    let mut last = T0;
    integrate_adaptive(&mut stepper, fun_rational, &mut y, T0, T_BOUND, dt, |_: &Array1<f64>, t: f64| {
        last = t
    })
    .unwrap();
    assert!((last - T_BOUND).abs() < 1e-12);
    assert!(compute_error(y.view(), sol_rational(T_BOUND).view(), RTOL, ATOL)
        .iter()
        .all(|&e| e < 5.));
}

#[test]
fn integration_low_order() {
    let mut y = array![1. / 3., 2. / 9.];
    let checker = ErrorChecker::new(ATOL, RTOL).unwrap();
    let mut stepper = ControlledStepper::new(RungeKutta::<RK23, _>::new(), checker);
    let dt = stepper.initial_step(&mut fun_rational, T0, &y);
    let steps = integrate_adaptive(&mut stepper, fun_rational, &mut y, T0, T_BOUND, dt, |_: &Array1<f64>, _: f64| {})
        .unwrap();
    assert!(steps > 1);
    assert!(compute_error(y.view(), sol_rational(T_BOUND).view(), RTOL, ATOL)
        .iter()
        .all(|&e| e < 5.));
}

#[test]
fn dense_integration() {
    let mut y = array![1. / 3., 2. / 9.];
    let checker = ErrorChecker::new(ATOL, RTOL).unwrap().with_max_step(Some(0.5)).unwrap();
    let mut dense = DenseOutputStepper::new(ControlledStepper::new(RungeKutta::<RK45, _>::new(), checker));
    let mut observed = Vec::new();
    integrate_dense(&mut dense, fun_rational, &mut y, T0, T_BOUND, 0.1, |y: &Array1<f64>, t: f64| {
        observed.push((t, y.clone()))
    })
    .unwrap();
    assert!(observed.len() >= 9);
    for (t, y) in &observed {
        assert!(compute_error(y.view(), sol_rational(*t).view(), RTOL, ATOL)
            .iter()
            .all(|&e| e < 5.));
    }

    // interpolate inside the last step
    let t_prev = dense.previous_time().unwrap();
    let t_mid = 0.5 * (t_prev + T_BOUND);
    let y_mid = dense.calc_state(t_mid).unwrap();
    assert!(compute_error(y_mid.view(), sol_rational(t_mid).view(), RTOL, ATOL)
        .iter()
        .all(|&e| e < 5.));
}
