//! Wire messages
//!
//! Frames are bincode-encoded; the transport delimits them. Group elements
//! and scalars travel as 32-byte canonical encodings and are validated on
//! decode, so a `Message` always holds well-formed crypto values.

use chameleon::{GroupElement, GroupScalar, SchnorrProof};
use serde::{Deserialize, Serialize};

use crate::types::{Height, MissionName, PeerId, Task, TxIndex};
use crate::{Element, Error, Result, Scalar};

/// A node's contribution to a mission: nonce commitment plus identity proof
#[derive(Debug, Clone, PartialEq)]
pub struct PartialSignature {
    /// N_j = g·ν_j
    pub nonce: Element,
    /// Proof of knowledge of k under alpha, bound to the mission
    pub proof: SchnorrProof<Element>,
}

/// Body of `LeaderSchnorrSig` / `ReplicaSchnorrSig`
#[derive(Debug, Clone, PartialEq)]
pub struct SchnorrSig {
    pub block_height: Height,
    pub tx_index: TxIndex,
    pub new_tx: Vec<u8>,
    pub partial: PartialSignature,
}

impl SchnorrSig {
    pub fn task(&self) -> Result<Task> {
        Task::from_new_tx(self.block_height, self.tx_index, &self.new_tx)
    }

    pub fn mission_name(&self) -> MissionName {
        MissionName::derive(self.block_height, self.tx_index, &self.new_tx)
    }
}

/// A node's response share for the combined forge
#[derive(Debug, Clone, PartialEq)]
pub struct RandomVerification {
    pub redact_name: MissionName,
    /// σ_j = ν_j - e'·sk_j
    pub sigma: Scalar,
    /// r' = digest + F(Σ N_j)
    pub r2: Scalar,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    IdentityX { x: Scalar, id: PeerId },
    FnX { from: PeerId, data: Scalar },
    PublicKeySeg { from: PeerId, public_key: Element },
    AlphaExpKAndHK { alpha_exp_k: Element, hk: Element },
    LeaderSchnorrSig(SchnorrSig),
    ReplicaSchnorrSig(SchnorrSig),
    RandomVerification(RandomVerification),
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::IdentityX { .. } => "IdentityX",
            Message::FnX { .. } => "FnX",
            Message::PublicKeySeg { .. } => "PublicKeySeg",
            Message::AlphaExpKAndHK { .. } => "AlphaExpKAndHK",
            Message::LeaderSchnorrSig(_) => "LeaderSchnorrSig",
            Message::ReplicaSchnorrSig(_) => "ReplicaSchnorrSig",
            Message::RandomVerification(_) => "RandomVerification",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let frame = Frame::from(self);
        bincode::serialize(&frame).map_err(|e| Error::Transport(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let frame: Frame = bincode::deserialize(bytes)?;
        frame.try_into()
    }
}

// ============================================================================
// Raw frame layout
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SigFrame {
    block_height: i64,
    tx_index: i32,
    new_tx: Vec<u8>,
    nonce: [u8; 32],
    proof_commitment: [u8; 32],
    proof_response: [u8; 32],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Frame {
    IdentityX {
        x: [u8; 32],
        id: String,
    },
    FnX {
        from: String,
        data: [u8; 32],
    },
    PublicKeySeg {
        from: String,
        public_key: [u8; 32],
    },
    AlphaExpKAndHK {
        alpha_exp_k: [u8; 32],
        hk: [u8; 32],
    },
    LeaderSchnorrSig(SigFrame),
    ReplicaSchnorrSig(SigFrame),
    RandomVerification {
        redact_name: String,
        g_sigma_exp_sk: [u8; 32],
        r2: [u8; 32],
    },
}

fn element(bytes: &[u8; 32]) -> Result<Element> {
    Element::decompress(bytes).ok_or_else(|| Error::Decode("invalid group element".into()))
}

fn scalar(bytes: &[u8; 32]) -> Result<Scalar> {
    <Scalar as GroupScalar>::from_canonical_bytes(bytes)
        .ok_or_else(|| Error::Decode("invalid scalar".into()))
}

impl From<&SchnorrSig> for SigFrame {
    fn from(sig: &SchnorrSig) -> Self {
        Self {
            block_height: sig.block_height,
            tx_index: sig.tx_index,
            new_tx: sig.new_tx.clone(),
            nonce: GroupElement::compress(&sig.partial.nonce),
            proof_commitment: GroupElement::compress(&sig.partial.proof.commitment),
            proof_response: GroupScalar::to_bytes(&sig.partial.proof.response),
        }
    }
}

impl TryFrom<SigFrame> for SchnorrSig {
    type Error = Error;

    fn try_from(frame: SigFrame) -> Result<Self> {
        let sig = Self {
            block_height: frame.block_height,
            tx_index: frame.tx_index,
            new_tx: frame.new_tx,
            partial: PartialSignature {
                nonce: element(&frame.nonce)?,
                proof: SchnorrProof {
                    commitment: element(&frame.proof_commitment)?,
                    response: scalar(&frame.proof_response)?,
                },
            },
        };
        // reject anything that is not key=value up front
        sig.task()?;
        Ok(sig)
    }
}

impl From<&Message> for Frame {
    fn from(msg: &Message) -> Self {
        match msg {
            Message::IdentityX { x, id } => Frame::IdentityX {
                x: GroupScalar::to_bytes(x),
                id: id.clone(),
            },
            Message::FnX { from, data } => Frame::FnX {
                from: from.clone(),
                data: GroupScalar::to_bytes(data),
            },
            Message::PublicKeySeg { from, public_key } => Frame::PublicKeySeg {
                from: from.clone(),
                public_key: GroupElement::compress(public_key),
            },
            Message::AlphaExpKAndHK { alpha_exp_k, hk } => Frame::AlphaExpKAndHK {
                alpha_exp_k: GroupElement::compress(alpha_exp_k),
                hk: GroupElement::compress(hk),
            },
            Message::LeaderSchnorrSig(sig) => Frame::LeaderSchnorrSig(sig.into()),
            Message::ReplicaSchnorrSig(sig) => Frame::ReplicaSchnorrSig(sig.into()),
            Message::RandomVerification(rv) => Frame::RandomVerification {
                redact_name: rv.redact_name.to_string(),
                g_sigma_exp_sk: GroupScalar::to_bytes(&rv.sigma),
                r2: GroupScalar::to_bytes(&rv.r2),
            },
        }
    }
}

impl TryFrom<Frame> for Message {
    type Error = Error;

    fn try_from(frame: Frame) -> Result<Self> {
        Ok(match frame {
            Frame::IdentityX { x, id } => Message::IdentityX { x: scalar(&x)?, id },
            Frame::FnX { from, data } => Message::FnX {
                from,
                data: scalar(&data)?,
            },
            Frame::PublicKeySeg { from, public_key } => Message::PublicKeySeg {
                from,
                public_key: element(&public_key)?,
            },
            Frame::AlphaExpKAndHK { alpha_exp_k, hk } => Message::AlphaExpKAndHK {
                alpha_exp_k: element(&alpha_exp_k)?,
                hk: element(&hk)?,
            },
            Frame::LeaderSchnorrSig(sig) => Message::LeaderSchnorrSig(sig.try_into()?),
            Frame::ReplicaSchnorrSig(sig) => Message::ReplicaSchnorrSig(sig.try_into()?),
            Frame::RandomVerification {
                redact_name,
                g_sigma_exp_sk,
                r2,
            } => Message::RandomVerification(RandomVerification {
                redact_name: redact_name.into(),
                sigma: scalar(&g_sigma_exp_sk)?,
                r2: scalar(&r2)?,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chameleon::GroupParameters;

    fn sample_sig() -> SchnorrSig {
        let mut rng = rand::thread_rng();
        let params = GroupParameters::<Element>::default();
        let secret = <Scalar as GroupScalar>::random(&mut rng);
        SchnorrSig {
            block_height: 10,
            tx_index: 2,
            new_tx: b"k=v2".to_vec(),
            partial: PartialSignature {
                nonce: params.exp(&secret),
                proof: SchnorrProof::prove(&params.domain, &params.generator, &secret, b"m", &mut rng),
            },
        }
    }

    #[test]
    fn test_leader_sig_survives_encoding() {
        let msg = Message::LeaderSchnorrSig(sample_sig());
        let decoded = Message::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.kind(), "LeaderSchnorrSig");
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let err = Message::decode(&[0xde, 0xad, 0xbe, 0xef]).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_invalid_element_is_decode_error() {
        let frame = Frame::PublicKeySeg {
            from: "a".into(),
            public_key: [0xff; 32],
        };
        let bytes = bincode::serialize(&frame).unwrap();
        assert!(matches!(Message::decode(&bytes), Err(Error::Decode(_))));
    }

    proptest::proptest! {
        #[test]
        fn prop_decode_never_panics(bytes in proptest::collection::vec(proptest::num::u8::ANY, 0..256)) {
            if let Err(e) = Message::decode(&bytes) {
                proptest::prop_assert!(e.is_fatal());
            }
        }
    }

    #[test]
    fn test_non_key_value_tx_is_decode_error() {
        let mut sig = sample_sig();
        sig.new_tx = b"no separator".to_vec();
        let bytes = Message::ReplicaSchnorrSig(sig).encode().unwrap();
        assert!(matches!(Message::decode(&bytes), Err(Error::Decode(_))));
    }
}
