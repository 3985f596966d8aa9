//! Chameleon error types

use core::fmt;

/// Errors that can occur during chameleon hash and key-setup operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChameleonError {
    /// Threshold must satisfy 1 <= t <= n
    InvalidThreshold { threshold: usize, participants: usize },

    /// Group element bytes are not a canonical encoding
    InvalidElement,

    /// Scalar bytes are not canonical
    InvalidScalar,

    /// Identity scalar x = 0 would reveal the constant term of a polynomial
    ZeroIdentity,

    /// Key material requested before the corresponding setup step completed
    Incomplete(&'static str),

    /// Setup step fed more input after it already completed
    AlreadyComplete(&'static str),

    /// Schnorr proof or response share did not verify
    VerificationFailed,

    /// Recomputed chameleon digest does not match the recorded one
    DigestMismatch,
}

impl fmt::Display for ChameleonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidThreshold { threshold, participants } => write!(
                f,
                "invalid threshold {} for {} participants",
                threshold, participants
            ),
            Self::InvalidElement => write!(f, "invalid group element encoding"),
            Self::InvalidScalar => write!(f, "invalid scalar encoding"),
            Self::ZeroIdentity => write!(f, "identity scalar must be non-zero"),
            Self::Incomplete(what) => write!(f, "key material not ready: {}", what),
            Self::AlreadyComplete(what) => write!(f, "{} already complete", what),
            Self::VerificationFailed => write!(f, "verification failed"),
            Self::DigestMismatch => write!(f, "chameleon digest mismatch"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ChameleonError {}
