//! Secret polynomials for the key setup
//!
//! Each node samples f_i of degree t-1 and hands f_i(x_j) to every node j.
//! Node j's trapdoor share is the sum of all evaluations at its own x_j.

use alloc::vec::Vec;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::curve::GroupScalar;
use crate::error::ChameleonError;

/// Fixed-size coefficient vector [a_0, a_1, ..., a_{t-1}]
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Polynomial<S: GroupScalar> {
    coefficients: Vec<S>,
}

impl<S: GroupScalar> Polynomial<S> {
    /// Sample a random polynomial of degree `threshold - 1`
    pub fn random<R: rand_core::RngCore + rand_core::CryptoRng>(
        threshold: usize,
        rng: &mut R,
    ) -> Result<Self, ChameleonError> {
        if threshold == 0 {
            return Err(ChameleonError::InvalidThreshold {
                threshold,
                participants: 0,
            });
        }

        let coefficients = (0..threshold).map(|_| S::random(rng)).collect();
        Ok(Self { coefficients })
    }

    pub fn from_coefficients(coefficients: Vec<S>) -> Self {
        Self { coefficients }
    }

    /// Number of coefficients (the threshold t)
    #[inline]
    pub fn threshold(&self) -> usize {
        self.coefficients.len()
    }

    /// Evaluate at x using Horner's method
    pub fn evaluate(&self, x: &S) -> S {
        let mut result = S::zero();
        for coeff in self.coefficients.iter().rev() {
            result = result.mul(x).add(coeff);
        }
        result
    }
}

// Prevent Debug from leaking secrets
impl<S: GroupScalar> core::fmt::Debug for Polynomial<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Polynomial")
            .field("threshold", &self.coefficients.len())
            .field("coefficients", &"[REDACTED]")
            .finish()
    }
}

/// Summation combiner: Σ values
pub fn sum_scalars<'a, S: GroupScalar + 'a>(values: impl IntoIterator<Item = &'a S>) -> S {
    values.into_iter().fold(S::zero(), |acc, v| acc.add(v))
}
