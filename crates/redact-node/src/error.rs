//! error types for the redaction node

use chameleon::ChameleonError;
use thiserror::Error;

use crate::types::PeerId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// malformed wire bytes; the connection is dropped
    #[error("decode error: {0}")]
    Decode(String),

    /// claimed identity does not match the authenticated peer
    #[error("identity error from {peer}: {reason}")]
    Identity { peer: PeerId, reason: String },

    /// a second mission proposed while one is active
    #[error("conflicting mission: active {active}, proposed {proposed}")]
    Conflict { active: String, proposed: String },

    #[error("duplicate {what} from {peer}")]
    Duplicate { peer: PeerId, what: &'static str },

    #[error("a redaction mission is already in flight")]
    MissionInFlight,

    /// well-formed but invalid contribution (bad share, diverged key)
    #[error("rejected {what} from {peer}")]
    Rejected { peer: PeerId, what: String },

    #[error("setup not ready: {0}")]
    NotReady(&'static str),

    #[error("block store error: {0}")]
    Store(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] ChameleonError),
}

impl Error {
    /// decode failures end the connection; everything else only drops the message
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Decode(_))
    }

    pub(crate) fn identity(peer: &PeerId, reason: impl Into<String>) -> Self {
        Error::Identity {
            peer: peer.clone(),
            reason: reason.into(),
        }
    }

    pub(crate) fn rejected(peer: &PeerId, what: impl Into<String>) -> Self {
        Error::Rejected {
            peer: peer.clone(),
            what: what.into(),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Decode(e.to_string())
    }
}
