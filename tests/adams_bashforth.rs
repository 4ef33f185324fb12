extern crate ndarray;
extern crate ndarray_odeint;

use ndarray::prelude::*;

use ndarray_odeint::adams::{MAX_ORDER, MIN_ORDER};
use ndarray_odeint::{integrate_n_steps, AdamsBashforth};

fn osc(_t: f64, x: &[f64; 2], dxdt: &mut [f64; 2]) {
    dxdt[0] = x[1];
    dxdt[1] = -x[0];
}

/// Amplitude and phase of the oscillation passing through `x` at `t`.
fn trajectory(x: &[f64; 2], t: f64) -> (f64, f64) {
    (x[0].hypot(x[1]), x[0].atan2(x[1]) - t)
}

fn distance(x: &[f64; 2], t: f64, (amplitude, phase): (f64, f64)) -> f64 {
    (x[0] - amplitude * (t + phase).sin()).hypot(x[1] - amplitude * (t + phase).cos())
}

/// Spacing of the history built by `initialize`, much finer than the steps.
const START_STEP: f64 = 1e-5;

/// Amplitude and phase of the first component's sine, from the state at `t`.
fn sine_fit(x: &[f64; 2], t: f64) -> (f64, f64) {
    let amplitude = x[0].hypot(x[1]);
    (amplitude, (x[0] / amplitude).asin() - t)
}

#[test]
fn convergence() {
    for order in MIN_ORDER..=MAX_ORDER {
        let o = (order + 1) as i32;
        let mut stepper = AdamsBashforth::new(order).unwrap();

        // error constant from a longer reference run
        let mut dt = 0.2;
        let mut x = [0., 1.];
        let mut t = 0.;
        stepper.initialize(&mut osc, &mut x, &mut t, START_STEP).unwrap();
        let (amplitude, phase) = sine_fit(&x, t);
        for _ in 0..3 * (order + 1) {
            stepper.do_step(&mut osc, &mut x, &mut t, dt).unwrap();
        }
        stepper.do_step(&mut osc, &mut x, &mut t, dt).unwrap();
        let f = 2. * (amplitude * (t + phase).sin() - x[0]).abs() / dt.powi(o);

        // as long as the errors are above machine precision they fall like
        // dt^(order + 1)
        while f * dt.powi(o) > 1e-16 {
            let mut x = [0., 1.];
            let mut t = 0.;
            stepper.initialize(&mut osc, &mut x, &mut t, START_STEP).unwrap();
            let (amplitude, phase) = sine_fit(&x, t);
            stepper.do_step(&mut osc, &mut x, &mut t, dt).unwrap();
            let error = (amplitude * (t + phase).sin() - x[0]).abs();
            assert!(
                error < f * dt.powi(o),
                "order {}: error {} at dt = {} exceeds {}",
                order,
                error,
                dt,
                f * dt.powi(o)
            );
            dt /= 2.;
        }
    }
}

#[test]
fn varying_steps_follow_trajectory() {
    let mut stepper = AdamsBashforth::new(5).unwrap();
    let mut x = [0., 1.];
    let mut t = 0.;
    stepper.initialize(&mut osc, &mut x, &mut t, 0.01).unwrap();
    let exact = trajectory(&x, t);
    for &dt in [0.01, 0.015, 0.005, 0.02, 0.01].iter().cycle().take(50) {
        stepper.do_step(&mut osc, &mut x, &mut t, dt).unwrap();
    }
    assert!(distance(&x, t, exact) < 1e-9);
    assert_eq!(stepper.history_len(), 5);
}

fn decay(_t: f64, x: &Array1<f64>, dxdt: &mut Array1<f64>) {
    dxdt.assign(&x.mapv(|x| -x));
}

#[test]
fn n_steps_on_arrays() {
    let mut stepper = AdamsBashforth::new(4).unwrap();
    let mut x = array![1., 2.];
    let mut observed = Vec::new();
    let steps = integrate_n_steps(&mut stepper, decay, &mut x, 0., 0.01, 97, |x: &Array1<f64>, t: f64| {
        observed.push((t, x[1]))
    })
    .unwrap();
    assert_eq!(steps, 97);
    assert_eq!(observed.len(), 99);
    let (t, x1) = observed[observed.len() - 1];
    assert!((t - 1.).abs() < 1e-13);
    assert!((x1 - 2. * (-1f64).exp()).abs() < 1e-8);
    assert!((x[0] - (-1f64).exp()).abs() < 1e-8);
}
