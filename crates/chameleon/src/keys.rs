//! Per-node key material produced by the distributed setup
//!
//! Setup proceeds in three steps, each driven by messages from the other
//! nodes:
//!
//! 1. identities: every node publishes `x = F(g·k)`
//! 2. shares: node j receives `f_i(x_j)` from every node i and sums them
//!    into `sk_j`, then publishes `pk_j = g·sk_j`
//! 3. group key: `hk = Σ pk_j`, `cid = Σ x_j`, `alpha = H(cid, hk)`,
//!    and the node publishes `alpha·k`
//!
//! The trapdoor `tk = Σ sk_j` exists only as this additive sharing.

use alloc::vec::Vec;
use zeroize::Zeroize;

use crate::curve::{GroupElement, GroupScalar};
use crate::error::ChameleonError;
use crate::forge::NonceShare;
use crate::hash::ChameleonKey;
use crate::params::GroupParameters;
use crate::polynomial::{sum_scalars, Polynomial};
use crate::{element_to_scalar, SchnorrProof};

/// Everything one node knows about the shared chameleon key
pub struct NodeKeys<P: GroupElement> {
    params: GroupParameters<P>,
    participants: usize,
    /// Private identity scalar
    k: P::Scalar,
    /// Public identity x = F(g·k)
    x: P::Scalar,
    polynomial: Polynomial<P::Scalar>,
    /// Running sum of f_i(x) over received contributions
    fn_x: P::Scalar,
    contributions: usize,
    sk: Option<P::Scalar>,
    pk: Option<P>,
    hk: Option<P>,
    cid: Option<P::Scalar>,
    alpha: Option<P>,
    alpha_exp_k: Option<P>,
}

impl<P: GroupElement> NodeKeys<P> {
    /// Sample identity and polynomial for a set of `participants` nodes.
    ///
    /// The node's own evaluation f(x) is accumulated immediately, so a
    /// single-node set finishes its share right away.
    pub fn generate<R: rand_core::RngCore + rand_core::CryptoRng>(
        params: GroupParameters<P>,
        threshold: usize,
        participants: usize,
        rng: &mut R,
    ) -> Result<Self, ChameleonError> {
        if threshold == 0 || threshold > participants {
            return Err(ChameleonError::InvalidThreshold {
                threshold,
                participants,
            });
        }

        let (k, x) = loop {
            let mut k = P::Scalar::random(rng);
            let x = element_to_scalar(&params.domain, &params.exp(&k));
            if !x.is_zero() {
                break (k, x);
            }
            k.zeroize();
        };

        let polynomial = Polynomial::random(threshold, rng)?;
        let own = polynomial.evaluate(&x);

        let mut keys = Self {
            params,
            participants,
            k,
            x,
            polynomial,
            fn_x: P::Scalar::zero(),
            contributions: 0,
            sk: None,
            pk: None,
            hk: None,
            cid: None,
            alpha: None,
            alpha_exp_k: None,
        };
        keys.accumulate(&own)?;
        Ok(keys)
    }

    #[inline]
    pub fn params(&self) -> &GroupParameters<P> {
        &self.params
    }

    /// Public identity x
    #[inline]
    pub fn x(&self) -> &P::Scalar {
        &self.x
    }

    #[inline]
    pub fn participants(&self) -> usize {
        self.participants
    }

    /// f(x_j): this node's contribution to node j's share
    pub fn evaluate_for(&self, peer_x: &P::Scalar) -> Result<P::Scalar, ChameleonError> {
        if peer_x.is_zero() {
            return Err(ChameleonError::ZeroIdentity);
        }
        Ok(self.polynomial.evaluate(peer_x))
    }

    /// Add one f_i(x) contribution. Returns `pk` once all `n` are in.
    pub fn accumulate(&mut self, value: &P::Scalar) -> Result<Option<P>, ChameleonError> {
        if self.sk.is_some() {
            return Err(ChameleonError::AlreadyComplete("secret share"));
        }

        self.fn_x = self.fn_x.add(value);
        self.contributions += 1;

        if self.contributions < self.participants {
            return Ok(None);
        }

        let sk = self.fn_x.clone();
        let pk = self.params.exp(&sk);
        self.sk = Some(sk);
        self.pk = Some(pk.clone());
        Ok(Some(pk))
    }

    /// Number of f_i(x) values summed so far (own included)
    #[inline]
    pub fn contributions(&self) -> usize {
        self.contributions
    }

    /// pk = g·sk, available once the share is complete
    #[inline]
    pub fn pk(&self) -> Option<&P> {
        self.pk.as_ref()
    }

    /// Derive hk, cid, alpha and alpha·k from every node's pk and x.
    ///
    /// Both slices must include this node's own values. Returns alpha·k.
    pub fn finalize_group(
        &mut self,
        public_keys: &[P],
        identities: &[P::Scalar],
    ) -> Result<P, ChameleonError> {
        if self.pk.is_none() {
            return Err(ChameleonError::Incomplete("public key share"));
        }
        if self.hk.is_some() {
            return Err(ChameleonError::AlreadyComplete("group key"));
        }
        if public_keys.len() != self.participants || identities.len() != self.participants {
            return Err(ChameleonError::Incomplete("participant set"));
        }

        let hk = public_keys
            .iter()
            .fold(P::identity(), |acc, pk| acc.add(pk));
        let cid = sum_scalars(identities.iter());
        let alpha = derive_alpha(&self.params, &cid, &hk);
        let alpha_exp_k = alpha.mul_scalar(&self.k);

        self.hk = Some(hk);
        self.cid = Some(cid);
        self.alpha = Some(alpha);
        self.alpha_exp_k = Some(alpha_exp_k.clone());
        Ok(alpha_exp_k)
    }

    #[inline]
    pub fn hk(&self) -> Option<&P> {
        self.hk.as_ref()
    }

    #[inline]
    pub fn cid(&self) -> Option<&P::Scalar> {
        self.cid.as_ref()
    }

    #[inline]
    pub fn alpha(&self) -> Option<&P> {
        self.alpha.as_ref()
    }

    #[inline]
    pub fn alpha_exp_k(&self) -> Option<&P> {
        self.alpha_exp_k.as_ref()
    }

    /// The node set's chameleon key (g, hk) bound to alpha
    pub fn chameleon_key(&self) -> Result<ChameleonKey<P>, ChameleonError> {
        match (&self.hk, &self.alpha) {
            (Some(hk), Some(alpha)) => {
                Ok(ChameleonKey::new(self.params.clone(), hk.clone()).bound_to(alpha.clone()))
            }
            _ => Err(ChameleonError::Incomplete("group key")),
        }
    }

    /// Prove knowledge of k under base alpha, authenticating a session message
    pub fn prove_identity<R: rand_core::RngCore + rand_core::CryptoRng>(
        &self,
        message: &[u8],
        rng: &mut R,
    ) -> Result<SchnorrProof<P>, ChameleonError> {
        let alpha = self.alpha.as_ref().ok_or(ChameleonError::Incomplete("alpha"))?;
        Ok(SchnorrProof::prove(&self.params.domain, alpha, &self.k, message, rng))
    }

    /// Check a peer's identity proof against its published alpha·k
    pub fn verify_identity(
        &self,
        proof: &SchnorrProof<P>,
        peer_alpha_exp_k: &P,
        message: &[u8],
    ) -> Result<(), ChameleonError> {
        let alpha = self.alpha.as_ref().ok_or(ChameleonError::Incomplete("alpha"))?;
        if proof.verify(&self.params.domain, alpha, peer_alpha_exp_k, message) {
            Ok(())
        } else {
            Err(ChameleonError::VerificationFailed)
        }
    }

    /// σ = ν - e·sk, consuming the session nonce
    pub fn response_share(
        &self,
        nonce: NonceShare<P>,
        challenge: &P::Scalar,
    ) -> Result<P::Scalar, ChameleonError> {
        let sk = self.sk.as_ref().ok_or(ChameleonError::Incomplete("secret share"))?;
        Ok(nonce.respond(sk, challenge))
    }
}

/// alpha = HashToGroup(cid || hk)
pub fn derive_alpha<P: GroupElement>(
    params: &GroupParameters<P>,
    cid: &P::Scalar,
    hk: &P,
) -> P {
    let mut input = Vec::with_capacity(params.domain.len() + 6 + 64);
    input.extend_from_slice(&params.domain);
    input.extend_from_slice(b"/alpha");
    input.extend_from_slice(&cid.to_bytes());
    input.extend_from_slice(&hk.compress());
    P::hash_to_element(&input)
}

impl<P: GroupElement> Drop for NodeKeys<P> {
    fn drop(&mut self) {
        self.k.zeroize();
        self.fn_x.zeroize();
        if let Some(sk) = self.sk.as_mut() {
            sk.zeroize();
        }
    }
}

// Prevent Debug from leaking secrets
impl<P: GroupElement> core::fmt::Debug for NodeKeys<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NodeKeys")
            .field("participants", &self.participants)
            .field("threshold", &self.polynomial.threshold())
            .field("x", &self.x)
            .field("contributions", &self.contributions)
            .field("pk", &self.pk)
            .field("hk", &self.hk)
            .field("alpha", &self.alpha)
            .finish()
    }
}
