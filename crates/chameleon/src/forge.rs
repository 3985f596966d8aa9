//! Joint collision forging
//!
//! Without any node holding the trapdoor, the set computes the forged
//! randomness in two rounds:
//!
//! 1. every node j publishes a nonce commitment `N_j = g·ν_j`
//! 2. from `N = Σ N_j` everyone derives `r' = digest + F(N)` and
//!    `e' = H(alpha || m' || r')`; node j publishes `σ_j = ν_j - e'·sk_j`
//!
//! Each σ_j is checkable against the sender's pk: `g·σ_j + pk_j·e' = N_j`.
//! Summing gives `s' = Σ σ_j` with `hk·e' + g·s' = N`, so `(r', s')`
//! opens the original digest to m'.

use zeroize::Zeroize;

use crate::curve::{GroupElement, GroupScalar};
use crate::hash::{ChameleonKey, Randomness};
use crate::params::GroupParameters;
use crate::polynomial::sum_scalars;

/// A node's secret session nonce and its public commitment
pub struct NonceShare<P: GroupElement> {
    secret: P::Scalar,
    commitment: P,
}

impl<P: GroupElement> NonceShare<P> {
    pub fn generate<R: rand_core::RngCore + rand_core::CryptoRng>(
        params: &GroupParameters<P>,
        rng: &mut R,
    ) -> Self {
        let secret = P::Scalar::random(rng);
        let commitment = params.exp(&secret);
        Self { secret, commitment }
    }

    /// N_j = g·ν_j
    #[inline]
    pub fn commitment(&self) -> &P {
        &self.commitment
    }

    /// σ = ν - e·sk. The nonce is consumed so it can never sign twice.
    pub(crate) fn respond(self, sk: &P::Scalar, challenge: &P::Scalar) -> P::Scalar {
        self.secret.sub(&challenge.mul(sk))
    }
}

impl<P: GroupElement> Drop for NonceShare<P> {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

impl<P: GroupElement> core::fmt::Debug for NonceShare<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NonceShare")
            .field("commitment", &self.commitment)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Values every node derives identically once all commitments are known
#[derive(Clone, Debug, PartialEq)]
pub struct ForgeContext<P: GroupElement> {
    /// Aggregated nonce commitment N
    pub commitment: P,
    /// r' = digest + F(N)
    pub r: P::Scalar,
    /// e' = H(alpha || m' || r')
    pub challenge: P::Scalar,
}

impl<P: GroupElement> ForgeContext<P> {
    pub fn new<'a>(
        key: &ChameleonKey<P>,
        digest: &P::Scalar,
        message: &[u8],
        commitments: impl IntoIterator<Item = &'a P>,
    ) -> Self
    where
        P: 'a,
    {
        let commitment = commitments
            .into_iter()
            .fold(P::identity(), |acc, c| acc.add(c));
        let r = key.forged_r(digest, &commitment);
        let challenge = key.challenge(message, &r);
        Self {
            commitment,
            r,
            challenge,
        }
    }

    /// (r', Σ σ_j)
    pub fn combine<'a>(&self, shares: impl IntoIterator<Item = &'a P::Scalar>) -> Randomness<P::Scalar>
    where
        P: 'a,
    {
        Randomness::new(self.r.clone(), sum_scalars(shares))
    }
}

/// g·σ + pk·e == N_j
pub fn verify_response_share<P: GroupElement>(
    params: &GroupParameters<P>,
    public_share: &P,
    commitment: &P,
    challenge: &P::Scalar,
    sigma: &P::Scalar,
) -> bool {
    params.exp(sigma).add(&public_share.mul_scalar(challenge)) == *commitment
}
