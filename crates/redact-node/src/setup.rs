//! Distributed key setup
//!
//! Drives `NodeKeys` from the messages of the other participants:
//!
//! ```text
//! Init ── all IdentityX ──> HaveIdentities ── all FnX ──> HaveShares
//!      ── all PublicKeySeg ──> HavePublicKeys ── all AlphaExpKAndHK ──> Ready
//! ```
//!
//! Handlers never touch the transport; they return the messages to emit.

use chameleon::{ChameleonKey, NodeKeys};
use rand::{CryptoRng, RngCore};
use tracing::{debug, info};

use crate::config::NodeConfig;
use crate::registry::ParticipantSet;
use crate::types::PeerId;
use crate::wire::Message;
use crate::{Element, Error, Result, Scalar};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SetupPhase {
    Init,
    HaveIdentities,
    HaveShares,
    HavePublicKeys,
    Ready,
}

/// A message produced by a handler
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Send(PeerId, Message),
    Broadcast(Message),
}

/// Result of handling an `AlphaExpKAndHK`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlphaOutcome {
    Recorded,
    /// Our own hk is not known yet; retry later
    Parked,
}

pub struct Setup {
    node_id: PeerId,
    keys: NodeKeys<Element>,
    registry: ParticipantSet,
    phase: SetupPhase,
    pk_sent: bool,
}

impl Setup {
    pub fn new<R: RngCore + CryptoRng>(config: &NodeConfig, rng: &mut R) -> Result<Self> {
        let keys = NodeKeys::generate(
            config.group.clone(),
            config.threshold,
            config.participants(),
            rng,
        )?;
        Ok(Self {
            node_id: config.node_id.clone(),
            keys,
            registry: ParticipantSet::new(&config.peers),
            phase: SetupPhase::Init,
            pk_sent: false,
        })
    }

    pub fn node_id(&self) -> &PeerId {
        &self.node_id
    }

    pub fn keys(&self) -> &NodeKeys<Element> {
        &self.keys
    }

    pub fn registry(&self) -> &ParticipantSet {
        &self.registry
    }

    pub fn phase(&self) -> SetupPhase {
        self.phase
    }

    pub fn is_ready(&self) -> bool {
        self.phase == SetupPhase::Ready
    }

    /// n, including ourselves
    pub fn participants(&self) -> usize {
        self.keys.participants()
    }

    /// The set's chameleon key, once hk and alpha are derived
    pub fn chameleon_key(&self) -> Result<ChameleonKey<Element>> {
        Ok(self.keys.chameleon_key()?)
    }

    /// Our `IdentityX`, sent to every peer on connection
    pub fn identity_message(&self) -> Message {
        Message::IdentityX {
            x: *self.keys.x(),
            id: self.node_id.clone(),
        }
    }

    pub fn peer_connected(&mut self, peer: &PeerId) -> Result<()> {
        self.registry.set_connected(peer, true)
    }

    pub fn peer_disconnected(&mut self, peer: &PeerId) -> Result<()> {
        self.registry.set_connected(peer, false)
    }

    /// Emit whatever the current key material allows. Idempotent.
    pub fn advance(&mut self) -> Result<Vec<Outbound>> {
        let mut out = Vec::new();

        if !self.pk_sent {
            if let Some(pk) = self.keys.pk() {
                self.pk_sent = true;
                out.push(Outbound::Broadcast(Message::PublicKeySeg {
                    from: self.node_id.clone(),
                    public_key: *pk,
                }));
            }
        }

        if self.keys.hk().is_none() && self.keys.pk().is_some() {
            if let (Some(mut pks), Some(mut xs)) =
                (self.registry.public_keys(), self.registry.identities())
            {
                pks.push(*self.keys.pk().ok_or(Error::NotReady("public key share"))?);
                xs.push(*self.keys.x());
                let alpha_exp_k = self.keys.finalize_group(&pks, &xs)?;
                let hk = *self.keys.hk().ok_or(Error::NotReady("group key"))?;
                info!(hk = %hex::encode(chameleon::GroupElement::compress(&hk)), "derived group key");
                out.push(Outbound::Broadcast(Message::AlphaExpKAndHK { alpha_exp_k, hk }));
            }
        }

        self.refresh_phase();
        Ok(out)
    }

    pub fn on_identity(&mut self, peer: &PeerId, x: Scalar, id: &str) -> Result<Vec<Outbound>> {
        if id != peer.as_str() {
            return Err(Error::identity(peer, format!("claims to be {}", id)));
        }

        let mut out = Vec::new();
        // evaluate first so a zero identity leaves the registry untouched
        let value = self.keys.evaluate_for(&x)?;
        if self.registry.record_x(peer, x)? {
            debug!(%peer, "recorded identity");
            out.push(Outbound::Send(
                peer.clone(),
                Message::FnX {
                    from: self.node_id.clone(),
                    data: value,
                },
            ));
        }

        out.extend(self.advance()?);
        Ok(out)
    }

    pub fn on_fn_x(&mut self, peer: &PeerId, from: &str, data: Scalar) -> Result<Vec<Outbound>> {
        if from != peer.as_str() {
            return Err(Error::identity(peer, format!("share claims to be from {}", from)));
        }

        if self.registry.record_fn_x(peer, data)? {
            self.keys.accumulate(&data)?;
            debug!(
                %peer,
                contributions = self.keys.contributions(),
                participants = self.participants(),
                "accumulated share evaluation"
            );
        }

        self.advance()
    }

    pub fn on_public_key(
        &mut self,
        peer: &PeerId,
        from: &str,
        public_key: Element,
    ) -> Result<Vec<Outbound>> {
        if from != peer.as_str() {
            return Err(Error::identity(peer, format!("key claims to be from {}", from)));
        }

        if self.registry.record_pk(peer, public_key)? {
            debug!(%peer, "recorded public key share");
        }

        self.advance()
    }

    pub fn on_alpha(
        &mut self,
        peer: &PeerId,
        alpha_exp_k: Element,
        hk: Element,
    ) -> Result<AlphaOutcome> {
        if !self.registry.contains(peer) {
            return Err(Error::identity(peer, "not a member of the redaction set"));
        }

        let local = match self.keys.hk() {
            Some(local) => local,
            None => return Ok(AlphaOutcome::Parked),
        };
        if *local != hk {
            return Err(Error::rejected(peer, "diverging group key"));
        }

        if self.registry.record_alpha_exp_k(peer, alpha_exp_k)? {
            debug!(%peer, "recorded alpha^k");
        }
        self.refresh_phase();
        Ok(AlphaOutcome::Recorded)
    }

    fn refresh_phase(&mut self) {
        let phase = if self.keys.hk().is_some() && self.registry.has_all_alpha_exp_k() {
            SetupPhase::Ready
        } else if self.keys.hk().is_some() {
            SetupPhase::HavePublicKeys
        } else if self.keys.pk().is_some() {
            SetupPhase::HaveShares
        } else if self.registry.has_all_identities() {
            SetupPhase::HaveIdentities
        } else {
            SetupPhase::Init
        };

        if phase != self.phase {
            info!(node = %self.node_id, from = ?self.phase, to = ?phase, "setup phase");
            self.phase = phase;
        }
    }
}

impl std::fmt::Debug for Setup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Setup")
            .field("node_id", &self.node_id)
            .field("phase", &self.phase)
            .field("keys", &self.keys)
            .finish()
    }
}
