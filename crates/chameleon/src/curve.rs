//! Group abstraction for the chameleon hash
//!
//! The protocol only needs a cyclic group of prime order q with a generator
//! and a collision-resistant hash into the group. These traits describe that
//! surface so the hash and the DKG math stay independent of the backend:
//! - ristretto255 (default)

use core::fmt::Debug;
use zeroize::Zeroize;

/// Integers mod q
pub trait GroupScalar: Clone + Debug + Sized + PartialEq + Send + Sync + Zeroize {
    fn zero() -> Self;
    fn one() -> Self;
    fn from_u64(v: u64) -> Self;

    fn add(&self, other: &Self) -> Self;
    fn sub(&self, other: &Self) -> Self;
    fn mul(&self, other: &Self) -> Self;
    fn neg(&self) -> Self;

    fn is_zero(&self) -> bool {
        *self == Self::zero()
    }

    fn random<R: rand_core::RngCore + rand_core::CryptoRng>(rng: &mut R) -> Self;

    /// Reduce a 512-bit hash output mod q
    fn from_bytes_wide(bytes: &[u8; 64]) -> Self;

    /// Canonical little-endian encoding
    fn to_bytes(&self) -> [u8; 32];

    /// Inverse of `to_bytes`; None for values >= q
    fn from_canonical_bytes(bytes: &[u8; 32]) -> Option<Self>;
}

/// Element of the prime-order group, written additively
pub trait GroupElement: Clone + Debug + Sized + PartialEq + Send + Sync {
    type Scalar: GroupScalar;

    fn identity() -> Self;

    /// The backend's canonical generator, used by `GroupParameters::default`
    fn base_generator() -> Self;

    /// self·scalar
    fn mul_scalar(&self, scalar: &Self::Scalar) -> Self;

    fn add(&self, other: &Self) -> Self;

    /// Collision-resistant hash into the group
    fn hash_to_element(input: &[u8]) -> Self;

    fn compress(&self) -> [u8; 32];

    /// None for encodings that are not a valid group element
    fn decompress(bytes: &[u8; 32]) -> Option<Self>;

    fn is_identity(&self) -> bool {
        *self == Self::identity()
    }
}

// ristretto255 backend

#[cfg(feature = "ristretto255")]
pub mod ristretto {
    use super::*;
    use curve25519_dalek::{
        constants::RISTRETTO_BASEPOINT_POINT,
        ristretto::{CompressedRistretto, RistrettoPoint},
        scalar::Scalar,
        traits::Identity,
    };
    use sha2::Sha512;

    impl GroupScalar for Scalar {
        fn zero() -> Self {
            Scalar::ZERO
        }

        fn one() -> Self {
            Scalar::ONE
        }

        fn from_u64(v: u64) -> Self {
            Scalar::from(v)
        }

        fn add(&self, other: &Self) -> Self {
            self + other
        }

        fn sub(&self, other: &Self) -> Self {
            self - other
        }

        fn mul(&self, other: &Self) -> Self {
            self * other
        }

        fn neg(&self) -> Self {
            -self
        }

        fn random<R: rand_core::RngCore + rand_core::CryptoRng>(rng: &mut R) -> Self {
            Scalar::random(rng)
        }

        fn from_bytes_wide(bytes: &[u8; 64]) -> Self {
            Scalar::from_bytes_mod_order_wide(bytes)
        }

        fn to_bytes(&self) -> [u8; 32] {
            Scalar::to_bytes(self)
        }

        fn from_canonical_bytes(bytes: &[u8; 32]) -> Option<Self> {
            Scalar::from_canonical_bytes(*bytes).into_option()
        }
    }

    impl GroupElement for RistrettoPoint {
        type Scalar = Scalar;

        fn identity() -> Self {
            <RistrettoPoint as Identity>::identity()
        }

        fn base_generator() -> Self {
            RISTRETTO_BASEPOINT_POINT
        }

        fn mul_scalar(&self, scalar: &Self::Scalar) -> Self {
            self * scalar
        }

        fn add(&self, other: &Self) -> Self {
            self + other
        }

        fn hash_to_element(input: &[u8]) -> Self {
            RistrettoPoint::hash_from_bytes::<Sha512>(input)
        }

        fn compress(&self) -> [u8; 32] {
            RistrettoPoint::compress(self).to_bytes()
        }

        fn decompress(bytes: &[u8; 32]) -> Option<Self> {
            CompressedRistretto::from_slice(bytes).ok()?.decompress()
        }
    }
}

#[cfg(all(test, feature = "ristretto255"))]
mod tests {
    use super::*;
    use curve25519_dalek::ristretto::RistrettoPoint;
    use curve25519_dalek::scalar::Scalar;

    #[test]
    fn test_compress_roundtrip_and_rejects_garbage() {
        let mut rng = rand::thread_rng();
        let s = <Scalar as GroupScalar>::random(&mut rng);
        let p = RistrettoPoint::base_generator().mul_scalar(&s);

        assert_eq!(RistrettoPoint::decompress(&GroupElement::compress(&p)), Some(p));
        assert!(RistrettoPoint::decompress(&[0xff; 32]).is_none());
    }

    #[test]
    fn test_hash_to_element_is_deterministic() {
        let a = RistrettoPoint::hash_to_element(b"alpha");
        let b = RistrettoPoint::hash_to_element(b"alpha");
        let c = RistrettoPoint::hash_to_element(b"beta");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.is_identity());
    }

    #[test]
    fn test_non_canonical_scalar_rejected() {
        assert!(<Scalar as GroupScalar>::from_canonical_bytes(&[0xff; 32]).is_none());
        let one = <Scalar as GroupScalar>::one();
        assert_eq!(<Scalar as GroupScalar>::from_canonical_bytes(&GroupScalar::to_bytes(&one)), Some(one));
    }
}
