//! The chameleon hash primitive

use crate::curve::{GroupElement, GroupScalar};
use crate::error::ChameleonError;
use crate::params::GroupParameters;
use crate::{element_to_scalar, hash_to_scalar};

/// Randomness (r, s) that opens a digest to a particular message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Randomness<S: GroupScalar> {
    pub r: S,
    pub s: S,
}

impl<S: GroupScalar> Randomness<S> {
    pub fn new(r: S, s: S) -> Self {
        Self { r, s }
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        let mut buf = [0u8; 64];
        buf[0..32].copy_from_slice(&self.r.to_bytes());
        buf[32..64].copy_from_slice(&self.s.to_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8; 64]) -> Result<Self, ChameleonError> {
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[0..32]);
        s.copy_from_slice(&bytes[32..64]);
        Ok(Self {
            r: S::from_canonical_bytes(&r).ok_or(ChameleonError::InvalidScalar)?,
            s: S::from_canonical_bytes(&s).ok_or(ChameleonError::InvalidScalar)?,
        })
    }
}

/// Hash of transaction content, used for the content delta `ee`
pub fn content_hash<S: GroupScalar>(domain: &[u8], content: &[u8]) -> S {
    hash_to_scalar(domain, b"content", &[content])
}

/// ee = H(old) - H(new), the value a redaction mission is signed over
pub fn content_delta<S: GroupScalar>(domain: &[u8], old: &[u8], new: &[u8]) -> S {
    content_hash::<S>(domain, old).sub(&content_hash(domain, new))
}

/// Public chameleon key: generator, public key Y = g·tk, binding element
#[derive(Clone, Debug, PartialEq)]
pub struct ChameleonKey<P: GroupElement> {
    pub params: GroupParameters<P>,
    pub public_key: P,
    pub binding: P,
}

impl<P: GroupElement> ChameleonKey<P> {
    /// Unbound key (binding is the identity element)
    pub fn new(params: GroupParameters<P>, public_key: P) -> Self {
        Self {
            params,
            public_key,
            binding: P::identity(),
        }
    }

    /// Bind every challenge to `binding` (the node set's alpha)
    pub fn bound_to(mut self, binding: P) -> Self {
        self.binding = binding;
        self
    }

    /// e = H(binding || m || r)
    pub fn challenge(&self, message: &[u8], r: &P::Scalar) -> P::Scalar {
        hash_to_scalar(
            &self.params.domain,
            b"challenge",
            &[&self.binding.compress(), message, &r.to_bytes()],
        )
    }

    /// Hash(m, r, s) = r - F(Y·e + g·s)
    pub fn hash(&self, message: &[u8], randomness: &Randomness<P::Scalar>) -> P::Scalar {
        let e = self.challenge(message, &randomness.r);
        let point = self
            .public_key
            .mul_scalar(&e)
            .add(&self.params.exp(&randomness.s));
        randomness.r.sub(&element_to_scalar(&self.params.domain, &point))
    }

    /// Hash `message` under fresh randomness
    pub fn commit<R: rand_core::RngCore + rand_core::CryptoRng>(
        &self,
        rng: &mut R,
        message: &[u8],
    ) -> (P::Scalar, Randomness<P::Scalar>) {
        let randomness = Randomness::new(P::Scalar::random(rng), P::Scalar::random(rng));
        (self.hash(message, &randomness), randomness)
    }

    pub fn verify(
        &self,
        message: &[u8],
        randomness: &Randomness<P::Scalar>,
        digest: &P::Scalar,
    ) -> bool {
        self.hash(message, randomness) == *digest
    }

    /// r' = digest + F(nonce commitment)
    pub fn forged_r(&self, digest: &P::Scalar, nonce_commitment: &P) -> P::Scalar {
        digest.add(&element_to_scalar(&self.params.domain, nonce_commitment))
    }

    /// Single-holder forge: find (r', s') opening `digest` to `message`.
    ///
    /// The distributed protocol computes the same values without anyone
    /// holding `trapdoor`; see [`crate::forge`].
    pub fn forge<R: rand_core::RngCore + rand_core::CryptoRng>(
        &self,
        trapdoor: &P::Scalar,
        digest: &P::Scalar,
        message: &[u8],
        rng: &mut R,
    ) -> Randomness<P::Scalar> {
        let mut k = P::Scalar::random(rng);
        let r = self.forged_r(digest, &self.params.exp(&k));
        let e = self.challenge(message, &r);
        let s = k.sub(&e.mul(trapdoor));
        zeroize::Zeroize::zeroize(&mut k);
        Randomness::new(r, s)
    }
}

#[cfg(all(test, feature = "ristretto255"))]
mod tests {
    use super::*;
    use curve25519_dalek::ristretto::RistrettoPoint;
    use curve25519_dalek::scalar::Scalar;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn keypair(rng: &mut ChaCha20Rng) -> (Scalar, ChameleonKey<RistrettoPoint>) {
        let params = GroupParameters::<RistrettoPoint>::default();
        let tk = <Scalar as GroupScalar>::random(rng);
        let key = ChameleonKey::new(params.clone(), params.exp(&tk));
        (tk, key)
    }

    #[test]
    fn test_commit_verifies() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let (_, key) = keypair(&mut rng);
        let (digest, randomness) = key.commit(&mut rng, b"k=v1");

        assert!(key.verify(b"k=v1", &randomness, &digest));
        assert!(!key.verify(b"k=v2", &randomness, &digest));
    }

    #[test]
    fn test_forge_keeps_digest() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let (tk, key) = keypair(&mut rng);
        let (digest, _) = key.commit(&mut rng, b"name=alice");

        let forged = key.forge(&tk, &digest, b"name=[redacted]", &mut rng);
        assert!(key.verify(b"name=[redacted]", &forged, &digest));
    }

    #[test]
    fn test_forge_with_wrong_trapdoor_fails() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let (_, key) = keypair(&mut rng);
        let (digest, _) = key.commit(&mut rng, b"a=1");

        let wrong = <Scalar as GroupScalar>::random(&mut rng);
        let forged = key.forge(&wrong, &digest, b"a=2", &mut rng);
        assert!(!key.verify(b"a=2", &forged, &digest));
    }

    #[test]
    fn test_binding_changes_digest() {
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let (_, key) = keypair(&mut rng);
        let bound = key.clone().bound_to(RistrettoPoint::hash_to_element(b"alpha"));
        let (digest, randomness) = key.commit(&mut rng, b"x=y");

        assert!(!bound.verify(b"x=y", &randomness, &digest));
    }

    #[test]
    fn test_content_delta_is_antisymmetric() {
        let d1: Scalar = content_delta(b"d", b"old", b"new");
        let d2: Scalar = content_delta(b"d", b"new", b"old");
        assert_eq!(d1, -d2);
        assert_eq!(content_delta::<Scalar>(b"d", b"same", b"same"), Scalar::ZERO);
    }

    #[test]
    fn test_randomness_bytes_reject_non_canonical() {
        let mut bytes = [0u8; 64];
        bytes[31] = 0xff;
        assert_eq!(
            Randomness::<Scalar>::from_bytes(&bytes),
            Err(ChameleonError::InvalidScalar)
        );
    }

    proptest! {
        #[test]
        fn prop_forge_collides(seed in any::<u64>(), old in ".{0,64}", new in ".{0,64}") {
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            let (tk, key) = keypair(&mut rng);
            let (digest, _) = key.commit(&mut rng, old.as_bytes());
            let forged = key.forge(&tk, &digest, new.as_bytes(), &mut rng);
            prop_assert!(key.verify(new.as_bytes(), &forged, &digest));
        }
    }
}
