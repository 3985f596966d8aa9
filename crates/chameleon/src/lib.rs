//! Distributed Schnorr chameleon hash
//!
//! A chameleon hash behaves like a collision-resistant hash for anyone who
//! does not know its trapdoor, while the trapdoor holder can find a second
//! preimage for any digest. Here the trapdoor is never materialized: it is
//! an additive sharing `tk = Σ sk_j` produced by a DKG among the node set,
//! and collisions are forged jointly with one nonce commitment and one
//! response share per node.
//!
//! # Construction
//!
//! With generator g, public key `Y = g·tk` and binding element `alpha`:
//!
//! ```text
//! e          = H(alpha || m || r)
//! Hash(m,r,s) = r - F(Y·e + g·s)
//! ```
//!
//! where `F` maps a group element to a scalar. Forging for `m'` picks a
//! nonce k, sets `r' = digest + F(g·k)` and `s' = k - e'·tk`, so that
//! `Y·e' + g·s' = g·k` and the digest is unchanged.
//!
//! # Example
//!
//! ```ignore
//! use chameleon::{ChameleonKey, GroupParameters};
//!
//! let key = ChameleonKey::new(params, group_public_key).bound_to(alpha);
//! let (digest, randomness) = key.commit(&mut rng, b"k=v1");
//!
//! // later, with the trapdoor (or jointly, see `forge`)
//! let forged = key.forge(&trapdoor, &digest, b"k=v2", &mut rng);
//! assert!(key.verify(b"k=v2", &forged, &digest));
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

use sha2::{Digest, Sha512};

pub mod curve;
mod error;
pub mod forge;
mod hash;
pub mod keys;
mod params;
pub mod polynomial;

pub use curve::{GroupElement, GroupScalar};
pub use error::ChameleonError;
pub use hash::{content_delta, content_hash, ChameleonKey, Randomness};
pub use keys::NodeKeys;
pub use params::{GroupParameters, DEFAULT_DOMAIN};
pub use polynomial::Polynomial;

#[cfg(feature = "ristretto255")]
pub use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar};

/// Hash a domain tag and length-prefixed parts to a scalar
pub fn hash_to_scalar<S: GroupScalar>(domain: &[u8], tag: &[u8], parts: &[&[u8]]) -> S {
    let mut hasher = Sha512::new();
    hasher.update((domain.len() as u64).to_le_bytes());
    hasher.update(domain);
    hasher.update((tag.len() as u64).to_le_bytes());
    hasher.update(tag);
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    let hash: [u8; 64] = hasher.finalize().into();
    S::from_bytes_wide(&hash)
}

/// F(P): map a group element to a scalar
pub fn element_to_scalar<P: GroupElement>(domain: &[u8], element: &P) -> P::Scalar {
    hash_to_scalar(domain, b"element", &[&element.compress()])
}

/// Schnorr proof of knowledge of `k` with `public = base·k`, bound to a message
#[derive(Clone, Debug, PartialEq)]
pub struct SchnorrProof<P: GroupElement> {
    /// Commitment u = base·r
    pub commitment: P,
    /// Response z = r + c·k
    pub response: P::Scalar,
}

impl<P: GroupElement> SchnorrProof<P> {
    /// Prove knowledge of `secret` under `base` for `message`
    pub fn prove<R: rand_core::RngCore + rand_core::CryptoRng>(
        domain: &[u8],
        base: &P,
        secret: &P::Scalar,
        message: &[u8],
        rng: &mut R,
    ) -> Self {
        let mut r = P::Scalar::random(rng);
        let commitment = base.mul_scalar(&r);
        let public = base.mul_scalar(secret);
        let challenge: P::Scalar = Self::challenge(domain, base, &public, &commitment, message);
        let response = r.add(&challenge.mul(secret));
        zeroize::Zeroize::zeroize(&mut r);

        Self {
            commitment,
            response,
        }
    }

    /// Check base·z == u + public·c
    pub fn verify(&self, domain: &[u8], base: &P, public: &P, message: &[u8]) -> bool {
        let challenge = Self::challenge(domain, base, public, &self.commitment, message);
        base.mul_scalar(&self.response) == self.commitment.add(&public.mul_scalar(&challenge))
    }

    fn challenge(domain: &[u8], base: &P, public: &P, commitment: &P, message: &[u8]) -> P::Scalar {
        hash_to_scalar(
            domain,
            b"schnorr",
            &[&base.compress(), &public.compress(), &commitment.compress(), message],
        )
    }

    /// Serialize for transmission
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut buf = [0u8; 64];
        buf[0..32].copy_from_slice(&self.commitment.compress());
        buf[32..64].copy_from_slice(&self.response.to_bytes());
        buf
    }

    /// Deserialize
    pub fn from_bytes(bytes: &[u8; 64]) -> Result<Self, ChameleonError> {
        let mut point_bytes = [0u8; 32];
        point_bytes.copy_from_slice(&bytes[0..32]);
        let commitment = P::decompress(&point_bytes).ok_or(ChameleonError::InvalidElement)?;

        let mut response_bytes = [0u8; 32];
        response_bytes.copy_from_slice(&bytes[32..64]);
        let response =
            P::Scalar::from_canonical_bytes(&response_bytes).ok_or(ChameleonError::InvalidScalar)?;

        Ok(Self {
            commitment,
            response,
        })
    }
}
