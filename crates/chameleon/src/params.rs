//! Group parameters shared by every node of a redaction set

use alloc::vec::Vec;

use crate::curve::GroupElement;

/// Default domain separation tag
pub const DEFAULT_DOMAIN: &[u8] = b"chameleon-redact-v1";

/// Immutable group configuration injected at construction.
///
/// The group order q (and the underlying field prime) are fixed by the
/// backend; what varies per deployment is the generator g and the domain
/// tag mixed into every hash.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupParameters<P: GroupElement> {
    pub generator: P,
    pub domain: Vec<u8>,
}

impl<P: GroupElement> GroupParameters<P> {
    pub fn new(generator: P, domain: &[u8]) -> Self {
        Self {
            generator,
            domain: domain.to_vec(),
        }
    }

    /// Derive a generator by hashing a seed into the group.
    ///
    /// Nobody knows its discrete log relative to the backend basepoint.
    pub fn from_seed(seed: &[u8], domain: &[u8]) -> Self {
        let mut input = Vec::with_capacity(domain.len() + seed.len() + 10);
        input.extend_from_slice(domain);
        input.extend_from_slice(b"/generator");
        input.extend_from_slice(seed);
        Self::new(P::hash_to_element(&input), domain)
    }

    /// g·s
    #[inline]
    pub fn exp(&self, s: &P::Scalar) -> P {
        self.generator.mul_scalar(s)
    }
}

impl<P: GroupElement> Default for GroupParameters<P> {
    fn default() -> Self {
        Self::new(P::base_generator(), DEFAULT_DOMAIN)
    }
}

#[cfg(all(test, feature = "ristretto255"))]
mod tests {
    use super::*;
    use curve25519_dalek::ristretto::RistrettoPoint;

    #[test]
    fn test_seeded_generator_differs_from_basepoint() {
        let seeded = GroupParameters::<RistrettoPoint>::from_seed(b"testnet", DEFAULT_DOMAIN);
        let default = GroupParameters::<RistrettoPoint>::default();
        assert_ne!(seeded.generator, default.generator);
        assert_eq!(
            seeded,
            GroupParameters::<RistrettoPoint>::from_seed(b"testnet", DEFAULT_DOMAIN)
        );
    }
}
