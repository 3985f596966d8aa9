//! Participant registry
//!
//! Per-peer crypto material gathered during setup. Every field is
//! write-once: a repeated identical value is accepted as a no-op, a
//! different value is an error. Peers are referenced by id only; the
//! transport owns the connections.

use std::collections::BTreeMap;

use crate::types::PeerId;
use crate::{Element, Error, Result, Scalar};

/// What we know about one remote node
#[derive(Debug, Clone, Default)]
pub struct Participant {
    /// Public identity x
    pub x: Option<Scalar>,
    /// f_peer(x_self): the peer's polynomial evaluated at our identity
    pub fn_x: Option<Scalar>,
    /// pk_peer = g·sk_peer
    pub pk: Option<Element>,
    /// alpha·k_peer, used to verify the peer's session proofs
    pub alpha_exp_k: Option<Element>,
    /// Whether the transport currently reports the peer as connected
    pub connected: bool,
}

/// Store `value` in `slot` unless it already holds something.
///
/// Ok(true) on first write, Ok(false) on an identical repeat.
fn write_once<T: PartialEq>(
    slot: &mut Option<T>,
    value: T,
    peer: &PeerId,
    what: &'static str,
) -> Result<bool> {
    match slot {
        None => {
            *slot = Some(value);
            Ok(true)
        }
        Some(existing) if *existing == value => Ok(false),
        Some(_) => Err(Error::Duplicate {
            peer: peer.clone(),
            what,
        }),
    }
}

/// Expected remote participants, keyed by peer id
#[derive(Debug, Clone, Default)]
pub struct ParticipantSet {
    participants: BTreeMap<PeerId, Participant>,
}

impl ParticipantSet {
    pub fn new(peers: &[PeerId]) -> Self {
        Self {
            participants: peers
                .iter()
                .map(|p| (p.clone(), Participant::default()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.participants.contains_key(peer)
    }

    pub fn get(&self, peer: &PeerId) -> Option<&Participant> {
        self.participants.get(peer)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PeerId, &Participant)> {
        self.participants.iter()
    }

    fn entry(&mut self, peer: &PeerId) -> Result<&mut Participant> {
        self.participants
            .get_mut(peer)
            .ok_or_else(|| Error::identity(peer, "not a member of the redaction set"))
    }

    pub fn set_connected(&mut self, peer: &PeerId, connected: bool) -> Result<()> {
        self.entry(peer)?.connected = connected;
        Ok(())
    }

    pub fn record_x(&mut self, peer: &PeerId, x: Scalar) -> Result<bool> {
        write_once(&mut self.entry(peer)?.x, x, peer, "identity")
    }

    pub fn record_fn_x(&mut self, peer: &PeerId, value: Scalar) -> Result<bool> {
        write_once(&mut self.entry(peer)?.fn_x, value, peer, "share evaluation")
    }

    pub fn record_pk(&mut self, peer: &PeerId, pk: Element) -> Result<bool> {
        write_once(&mut self.entry(peer)?.pk, pk, peer, "public key share")
    }

    pub fn record_alpha_exp_k(&mut self, peer: &PeerId, value: Element) -> Result<bool> {
        write_once(&mut self.entry(peer)?.alpha_exp_k, value, peer, "alpha^k")
    }

    pub fn has_all_identities(&self) -> bool {
        self.participants.values().all(|p| p.x.is_some())
    }

    pub fn has_all_shares(&self) -> bool {
        self.participants.values().all(|p| p.fn_x.is_some())
    }

    pub fn has_all_public_keys(&self) -> bool {
        self.participants.values().all(|p| p.pk.is_some())
    }

    pub fn has_all_alpha_exp_k(&self) -> bool {
        self.participants.values().all(|p| p.alpha_exp_k.is_some())
    }

    /// Every remote x, in peer-id order; None until all are known
    pub fn identities(&self) -> Option<Vec<Scalar>> {
        self.participants.values().map(|p| p.x).collect()
    }

    /// Every remote pk, in peer-id order; None until all are known
    pub fn public_keys(&self) -> Option<Vec<Element>> {
        self.participants.values().map(|p| p.pk).collect()
    }

    /// Peers the transport currently reports as connected
    pub fn connected(&self) -> Vec<PeerId> {
        self.participants
            .iter()
            .filter(|(_, p)| p.connected)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn pk(&self, peer: &PeerId) -> Option<&Element> {
        self.participants.get(peer).and_then(|p| p.pk.as_ref())
    }

    pub fn alpha_exp_k(&self, peer: &PeerId) -> Option<&Element> {
        self.participants.get(peer).and_then(|p| p.alpha_exp_k.as_ref())
    }
}
