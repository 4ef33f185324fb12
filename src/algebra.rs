//! Arithmetic over state containers.
//!
//! Steppers are generic over the container holding the state, so the same
//! code drives fixed-size arrays, `Vec`s and `ndarray` vectors. Everything a
//! stepper needs is expressed by [`StateAlgebra`]: a zeroed copy, the AXPY
//! update `x += a * y` and a componentwise fold used to build norms.

use ndarray::prelude::*;
use ndarray::{FoldWhile, Zip};

/// Elementwise arithmetic and reductions over an `f64` state container.
///
/// All states passed together to one operation have the same length.
pub trait StateAlgebra: Clone {
    /// Number of components.
    fn dim(&self) -> usize;

    /// Returns a state of the same shape filled with zeros.
    fn zeros_like(&self) -> Self;

    /// Performs `self += alpha * rhs`.
    fn add_scaled(&mut self, alpha: f64, rhs: &Self);

    /// Folds over the components of `self`, `b` and `c` in lockstep.
    fn fold3<F>(&self, b: &Self, c: &Self, init: f64, f: F) -> f64
    where
        F: FnMut(f64, f64, f64, f64) -> f64;
}

impl StateAlgebra for Array1<f64> {
    fn dim(&self) -> usize {
        self.len()
    }

    fn zeros_like(&self) -> Self {
        Array1::zeros(self.len())
    }

    fn add_scaled(&mut self, alpha: f64, rhs: &Self) {
        debug_assert_eq!(self.len(), rhs.len());
        self.scaled_add(alpha, rhs);
    }

    fn fold3<F>(&self, b: &Self, c: &Self, init: f64, mut f: F) -> f64
    where
        F: FnMut(f64, f64, f64, f64) -> f64,
    {
        Zip::from(self)
            .and(b)
            .and(c)
            .fold_while(init, |acc, &a, &b, &c| FoldWhile::Continue(f(acc, a, b, c)))
            .into_inner()
    }
}

impl StateAlgebra for Vec<f64> {
    fn dim(&self) -> usize {
        self.len()
    }

    fn zeros_like(&self) -> Self {
        vec![0.; self.len()]
    }

    fn add_scaled(&mut self, alpha: f64, rhs: &Self) {
        debug_assert_eq!(self.len(), rhs.len());
        for (x, &y) in self.iter_mut().zip(rhs) {
            *x += alpha * y;
        }
    }

    fn fold3<F>(&self, b: &Self, c: &Self, init: f64, mut f: F) -> f64
    where
        F: FnMut(f64, f64, f64, f64) -> f64,
    {
        debug_assert!(self.len() == b.len() && self.len() == c.len());
        self.iter()
            .zip(b)
            .zip(c)
            .fold(init, |acc, ((&a, &b), &c)| f(acc, a, b, c))
    }
}

impl<const N: usize> StateAlgebra for [f64; N] {
    fn dim(&self) -> usize {
        N
    }

    fn zeros_like(&self) -> Self {
        [0.; N]
    }

    fn add_scaled(&mut self, alpha: f64, rhs: &Self) {
        for (x, &y) in self.iter_mut().zip(rhs.iter()) {
            *x += alpha * y;
        }
    }

    fn fold3<F>(&self, b: &Self, c: &Self, init: f64, mut f: F) -> f64
    where
        F: FnMut(f64, f64, f64, f64) -> f64,
    {
        self.iter()
            .zip(b.iter())
            .zip(c.iter())
            .fold(init, |acc, ((&a, &b), &c)| f(acc, a, b, c))
    }
}
