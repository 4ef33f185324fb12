//! Embedded explicit Runge–Kutta steppers.
//!
//! These are the base steppers driven by
//! [`ControlledStepper`](crate::ControlledStepper): one call advances the
//! state by a fixed step and estimates the error of a less accurate embedded
//! method. Methods implementing [`RKDenseOutput`] can also be driven by
//! [`DenseOutputStepper`](crate::DenseOutputStepper).

use lazy_static::lazy_static;
use ndarray::prelude::*;
use std::marker::PhantomData;

use crate::algebra::StateAlgebra;
use crate::System;

/// Result of one embedded step.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedStep<S> {
    /// Solution at `t + dt` computed with higher accuracy.
    pub x: S,
    /// Derivative at `t + dt`, i.e. `f(t + dt, x)`.
    pub dxdt: S,
    /// Error estimate of the less accurate method.
    pub x_err: S,
}

/// A fixed-step method that also estimates its local error.
pub trait ErrorStepper<S> {
    /// Order of the propagated solution.
    fn order(&self) -> usize;

    /// Order of the embedded error estimate, one less than [`order`].
    ///
    /// [`order`]: ErrorStepper::order
    fn error_order(&self) -> usize;

    /// Advances `x` at time `t` by `dt`.
    ///
    /// `dxdt` must be `f(t, x)`.
    fn step_with_error<F>(&mut self, system: &mut F, t: f64, x: &S, dxdt: &S, dt: f64) -> EmbeddedStep<S>
    where
        F: System<S>;
}

/// Interpolation inside the last step taken by a stepper.
pub trait DenseInterpolant<S> {
    /// State at `t_old + theta * dt`, where `x_old` and `dt` are the start
    /// state and size of the last step and `theta` lies in `[0, 1]`.
    fn interpolate(&self, x_old: &S, dt: f64, theta: f64) -> S;
}

/// Empirically select a good initial step.
///
/// The algorithm is described in (ref 1).
///
/// # Parameters
///
/// * system: Right-hand side of the system.
/// * t0: Initial value of the independent variable.
/// * x0: Initial value of the dependent variable.
/// * f0: Initial value of the derivative, i.e. the result of calling `system`
///   with `t0` and `x0`.
/// * error_order: Order of the error estimate.
/// * rtol: Desired relative tolerance.
/// * atol: Desired absolute tolerance.
///
/// # Returns
///
/// The suggested initial step.
///
/// # References
///
/// 1. E. Hairer, S. P. Norsett G. Wanner, "Solving Ordinary Differential
///    Equations I: Nonstiff Problems", Sec. II.4.
pub fn select_initial_step<S, F>(
    system: &mut F,
    t0: f64,
    x0: &S,
    f0: &S,
    error_order: usize,
    rtol: f64,
    atol: f64,
) -> f64
where
    S: StateAlgebra,
    F: System<S>,
{
    if x0.dim() == 0 {
        return f64::INFINITY;
    }

    let n = x0.dim() as f64;
    let scale = |x: f64| atol + rtol * x.abs();
    let d0 = (x0.fold3(x0, x0, 0., |acc, x, _, _| acc + (x / scale(x)).powi(2)) / n).sqrt();
    let d1 = (f0.fold3(x0, x0, 0., |acc, f, x, _| acc + (f / scale(x)).powi(2)) / n).sqrt();
    let h0 = if d0 < 1e-5 || d1 < 1e-5 {
        1e-6
    } else {
        0.01 * d0 / d1
    };

    let mut x1 = x0.clone();
    x1.add_scaled(h0, f0);
    let mut f1 = x0.zeros_like();
    system.rhs(t0 + h0, &x1, &mut f1);
    let d2 = (f1.fold3(f0, x0, 0., |acc, f1, f0, x| acc + ((f1 - f0) / scale(x)).powi(2)) / n)
        .sqrt()
        / h0;

    let h1 = if d1 <= 1e-15 && d2 <= 1e-15 {
        (h0 * 1e-3).max(1e-6)
    } else {
        (0.01 / d1.max(d2)).powf(1. / (error_order as f64 + 1.))
    };

    (100. * h0).min(h1)
}

/// Explicit Runge–Kutta stepper for the tableau `M`.
///
/// The stages of the most recent step are kept for dense output.
#[derive(Debug, Clone)]
pub struct RungeKutta<M, S>
where
    M: RKMethod,
{
    method: PhantomData<M>,
    /// Stages of the last step, length `M::NUM_STAGES + 1`. The last entry is
    /// the derivative at the end of the step.
    k: Vec<S>,
}

impl<M, S> RungeKutta<M, S>
where
    M: RKMethod,
    S: StateAlgebra,
{
    pub fn new() -> Self {
        RungeKutta {
            method: PhantomData,
            k: Vec::new(),
        }
    }

    /// (Re)allocates stage storage shaped like `x`.
    fn ensure_storage(&mut self, x: &S) {
        if self.k.len() != M::NUM_STAGES + 1 || self.k[0].dim() != x.dim() {
            self.k = vec![x.zeros_like(); M::NUM_STAGES + 1];
        }
    }
}

impl<M, S> Default for RungeKutta<M, S>
where
    M: RKMethod,
    S: StateAlgebra,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<M, S> ErrorStepper<S> for RungeKutta<M, S>
where
    M: RKMethod,
    S: StateAlgebra,
{
    fn order(&self) -> usize {
        M::ORDER
    }

    fn error_order(&self) -> usize {
        M::ERROR_ORDER
    }

    /// Perform a single Runge–Kutta step.
    ///
    /// This function computes a prediction of an explicit Runge–Kutta method and
    /// also estimates the error of a less accurate method.
    /// Notation for Butcher tableau is as in (ref 1).
    ///
    /// # References
    ///
    /// 1. E. Hairer, S. P. Norsett G. Wanner, "Solving Ordinary Differential
    ///    Equations I: Nonstiff Problems", Sec. II.4.
    fn step_with_error<F>(&mut self, system: &mut F, t: f64, x: &S, dxdt: &S, dt: f64) -> EmbeddedStep<S>
    where
        F: System<S>,
    {
        self.ensure_storage(x);
        self.k[0].clone_from(dxdt);
        for (s, (a, &c)) in M::a().iter().zip(M::c()).enumerate() {
            let mut stage = x.clone();
            for (j, &a_j) in a.iter().enumerate() {
                if a_j != 0. {
                    stage.add_scaled(dt * a_j, &self.k[j]);
                }
            }
            system.rhs(t + c * dt, &stage, &mut self.k[s + 1]);
        }

        let mut x_new = x.clone();
        for (k, &b) in self.k.iter().zip(M::b()) {
            if b != 0. {
                x_new.add_scaled(dt * b, k);
            }
        }
        let last = M::NUM_STAGES;
        system.rhs(t + dt, &x_new, &mut self.k[last]);

        let mut x_err = x.zeros_like();
        for (k, &e) in self.k.iter().zip(M::e()) {
            if e != 0. {
                x_err.add_scaled(dt * e, k);
            }
        }

        EmbeddedStep {
            x: x_new,
            dxdt: self.k[last].clone(),
            x_err,
        }
    }
}

impl<M, S> DenseInterpolant<S> for RungeKutta<M, S>
where
    M: RKDenseOutput,
    S: StateAlgebra,
{
    fn interpolate(&self, x_old: &S, dt: f64, theta: f64) -> S {
        let mut x = x_old.clone();
        for (row, k) in M::p().outer_iter().zip(&self.k) {
            let mut coeff = 0.;
            let mut power = 1.;
            for &p in row.iter() {
                power *= theta;
                coeff += p * power;
            }
            if coeff != 0. {
                x.add_scaled(dt * coeff, k);
            }
        }
        x
    }
}

pub trait RKMethod {
    /// Order of the method.
    const ORDER: usize;

    /// Order of the embedded error estimate.
    const ERROR_ORDER: usize;

    /// Number of stages in the method.
    const NUM_STAGES: usize;

    /// Coefficients for incrementing time for consecutive RK stages, length
    /// `NUM_STAGES - 1`.
    ///
    /// The value for the first stage is always zero, so it is not included.
    fn c() -> ArrayView1<'static, f64>;

    /// Coefficients for combining previous RK stages to compute the next
    /// stage, length `NUM_STAGES - 1`.
    ///
    /// For explicit methods the coefficients above the main diagonal are
    /// zeros, so `a` is stored as a list of arrays of increasing lengths. The
    /// first stage is always just `f`, thus no coefficients for it are
    /// required.
    fn a() -> &'static [ArrayView1<'static, f64>];

    /// Coefficients for combining RK stages for computing the final
    /// prediction, length `NUM_STAGES`.
    fn b() -> ArrayView1<'static, f64>;

    /// Coefficients for estimating the error of a less accurate method, length
    /// `NUM_STAGES + 1`.
    ///
    /// They are computed as the difference between `b`'s in an extended
    /// tableau.
    fn e() -> ArrayView1<'static, f64>;
}

/// A method with a continuous extension for dense output.
pub trait RKDenseOutput: RKMethod {
    /// Polynomial coefficients for dense output, shape
    /// `(NUM_STAGES + 1, n)` for an interpolant of degree `n`.
    fn p() -> ArrayView2<'static, f64>;
}

/// Explicit Runge–Kutta method of order 3(2).
///
/// The Bogacki-Shampine pair of formulas is used (ref 1). The error is
/// controlled assuming 2nd order accuracy, but steps are taken using a 3rd
/// order accurate formula (local extrapolation is done). A cubic Hermite
/// polynomial is used for the dense output.
///
/// # References
///
/// 1. P. Bogacki, L.F. Shampine, "A 3(2) Pair of Runge-Kutta Formulas",
///    Appl. Math. Lett. Vol. 2, No. 4. pp. 321-325, 1989.
#[derive(Debug, Clone, Copy)]
pub struct RK23;

impl RKMethod for RK23 {
    const ORDER: usize = 3;

    const ERROR_ORDER: usize = 2;

    const NUM_STAGES: usize = 3;

    fn c() -> ArrayView1<'static, f64> {
        aview1(&[1./2., 3./4.])
    }

    fn a() -> &'static [ArrayView1<'static, f64>] {
        lazy_static! {
            static ref A: [ArrayView1<'static, f64>; 3 - 1] = [
                aview1(&[1./2.]),
                aview1(&[0., 3./4.]),
            ];
        }
        &*A
    }

    fn b() -> ArrayView1<'static, f64> {
        aview1(&[2./9., 1./3., 4./9.])
    }

    fn e() -> ArrayView1<'static, f64> {
        aview1(&[5./72., -1./12., -1./9., 1./8.])
    }
}

impl RKDenseOutput for RK23 {
    fn p() -> ArrayView2<'static, f64> {
        aview2(&[
            [1., -4./3., 5./9.],
            [0., 1., -2./3.],
            [0., 4./3., -8./9.],
            [0., -1., 1.],
        ])
    }
}

/// Explicit Runge–Kutta method of order 5(4).
///
/// The Dormand-Prince pair of formulas is used (ref 1). The error is
/// controlled assuming 4th order accuracy, but steps are taken using a 5th
/// order accurate formula (local extrapolation is done). A quartic
/// interpolation polynomial is used for the dense output (ref 2).
///
/// # References
///
/// 1. J. R. Dormand, P. J. Prince, "A family of embedded Runge-Kutta
///    formulae", Journal of Computational and Applied Mathematics, Vol. 6, No.
///    1, pp. 19-26, 1980.
///
/// 2. L. W. Shampine, "Some Practical Runge-Kutta Formulas", Mathematics of
///    Computation,, Vol. 46, No. 173, pp. 135-150, 1986.
#[derive(Debug, Clone, Copy)]
pub struct RK45;

impl RKMethod for RK45 {
    const ORDER: usize = 5;

    const ERROR_ORDER: usize = 4;

    const NUM_STAGES: usize = 6;

    fn c() -> ArrayView1<'static, f64> {
        aview1(&[1./5., 3./10., 4./5., 8./9., 1.])
    }

    fn a() -> &'static [ArrayView1<'static, f64>] {
        lazy_static! {
            static ref A: [ArrayView1<'static, f64>; 6 - 1] = [
                aview1(&[1./5.]),
                aview1(&[3./40., 9./40.]),
                aview1(&[44./45., -56./15., 32./9.]),
                aview1(&[19372./6561., -25360./2187., 64448./6561., -212./729.]),
                aview1(&[9017./3168., -355./33., 46732./5247., 49./176., -5103./18656.]),
            ];
        }
        &*A
    }

    fn b() -> ArrayView1<'static, f64> {
        aview1(&[35./384., 0., 500./1113., 125./192., -2187./6784., 11./84.])
    }

    fn e() -> ArrayView1<'static, f64> {
        aview1(&[-71./57600., 0., 71./16695., -71./1920., 17253./339200., -22./525., 1./40.])
    }
}

impl RKDenseOutput for RK45 {
    fn p() -> ArrayView2<'static, f64> {
        // Corresponds to the optimum value of c_6 from (ref 2).
        aview2(&[
            [1., -8048581381./2820520608., 8663915743./2820520608., -12715105075./11282082432.],
            [0., 0., 0., 0.],
            [0., 131558114200./32700410799., -68118460800./10900136933.,
             87487479700./32700410799.],
            [0., -1754552775./470086768., 14199869525./1410260304., -10690763975./1880347072.],
            [0., 127303824393./49829197408., -318862633887./49829197408.,
             701980252875. / 199316789632.],
            [0., -282668133./205662961., 2019193451./616988883., -1453857185./822651844.],
            [0., 40617522./29380423., -110615467./29380423., 69997945./29380423.]
        ])
    }
}

/// Explicit Runge–Kutta method of order 5(4).
///
/// The Cash–Karp pair of formulas is used (ref 1). Like [`RK45`] the step is
/// taken with the 5th order formula and the error is estimated from the
/// embedded 4th order one. The last stage isn't reused as the first stage of
/// the next step, and there is no dense output.
///
/// # References
///
/// 1. J. R. Cash, A. H. Karp, "A variable order Runge-Kutta method for
///    initial value problems with rapidly varying right-hand sides", ACM
///    Transactions on Mathematical Software, Vol. 16, No. 3, pp. 201-222,
///    1990.
#[derive(Debug, Clone, Copy)]
pub struct CashKarp54;

impl RKMethod for CashKarp54 {
    const ORDER: usize = 5;

    const ERROR_ORDER: usize = 4;

    const NUM_STAGES: usize = 6;

    fn c() -> ArrayView1<'static, f64> {
        aview1(&[1./5., 3./10., 3./5., 1., 7./8.])
    }

    fn a() -> &'static [ArrayView1<'static, f64>] {
        lazy_static! {
            static ref A: [ArrayView1<'static, f64>; 6 - 1] = [
                aview1(&[1./5.]),
                aview1(&[3./40., 9./40.]),
                aview1(&[3./10., -9./10., 6./5.]),
                aview1(&[-11./54., 5./2., -70./27., 35./27.]),
                aview1(&[1631./55296., 175./512., 575./13824., 44275./110592., 253./4096.]),
            ];
        }
        &*A
    }

    fn b() -> ArrayView1<'static, f64> {
        aview1(&[37./378., 0., 250./621., 125./594., 0., 512./1771.])
    }

    fn e() -> ArrayView1<'static, f64> {
        aview1(&[
            37./378. - 2825./27648.,
            0.,
            250./621. - 18575./48384.,
            125./594. - 13525./55296.,
            -277./14336.,
            512./1771. - 1./4.,
            0.,
        ])
    }
}
