//! Redaction session state machine
//!
//! One mission at a time, cluster-wide:
//!
//! ```text
//! Idle ─ begin / LeaderSchnorrSig ─> MissionAnnounced
//!      ─ n partials ─> CollectingVerifications (own σ forwarded)
//!      ─ n valid σ  ─> Applying ─ reset ─> Idle
//! ```
//!
//! Every node records its own partial and its own response share, so both
//! counts reach n exactly when every participant has contributed. A mission
//! missing even one participant never completes.

use std::collections::BTreeMap;

use chameleon::forge::{verify_response_share, ForgeContext, NonceShare};
use chameleon::{content_delta, GroupElement, GroupScalar, Randomness};
use rand::{CryptoRng, RngCore};
use tracing::{debug, info};

use crate::setup::Setup;
use crate::store::{BlockStore, TxSlot};
use crate::types::{MissionName, PeerId, Task};
use crate::wire::{Message, PartialSignature, RandomVerification, SchnorrSig};
use crate::{Element, Error, Result, Scalar};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    MissionAnnounced,
    CollectingVerifications,
}

/// The in-flight mission
#[derive(Debug)]
pub struct Mission {
    pub name: MissionName,
    pub task: Task,
    pub leader: PeerId,
    /// Slot content and digest before the rewrite
    pub slot: TxSlot,
    /// ee = H(old) - H(new)
    pub ee: Scalar,
    nonce: Option<NonceShare<Element>>,
    forge: Option<ForgeContext<Element>>,
}

/// A mission whose forged randomness verified against the slot digest
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub name: MissionName,
    pub task: Task,
    pub randomness: Randomness<Scalar>,
}

/// Side effects of a handler, for the reactor to carry out
#[derive(Debug, Default)]
pub struct Progress {
    /// Our Leader/ReplicaSchnorrSig
    pub announce: Option<Message>,
    /// Our response share, for the forwarder
    pub verification: Option<RandomVerification>,
    pub completion: Option<Completion>,
}

#[derive(Debug)]
pub enum Handled {
    /// The message refers to state we do not have yet; retry later
    Parked,
    Progress(Progress),
}

/// Bytes the identity proof of a partial signs over
fn proof_message(name: &MissionName, ee: &Scalar, nonce: &Element) -> Vec<u8> {
    let mut msg = Vec::with_capacity(name.as_str().len() + 64);
    msg.extend_from_slice(name.as_str().as_bytes());
    msg.extend_from_slice(&GroupScalar::to_bytes(ee));
    msg.extend_from_slice(&GroupElement::compress(nonce));
    msg
}

#[derive(Debug, Default)]
pub struct RedactSession {
    mission: Option<Mission>,
    leader_redact: BTreeMap<PeerId, PartialSignature>,
    replica_redacts: BTreeMap<PeerId, PartialSignature>,
    random_verifications: BTreeMap<PeerId, Scalar>,
    /// A submitted task is queued but not yet announced
    task_pending: bool,
}

impl RedactSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        match &self.mission {
            None => SessionState::Idle,
            Some(m) if m.forge.is_none() => SessionState::MissionAnnounced,
            Some(_) => SessionState::CollectingVerifications,
        }
    }

    pub fn mission(&self) -> Option<&Mission> {
        self.mission.as_ref()
    }

    pub fn mission_name(&self) -> Option<&MissionName> {
        self.mission.as_ref().map(|m| &m.name)
    }

    /// No mission active and none queued
    pub fn is_available(&self) -> bool {
        self.mission.is_none() && !self.task_pending
    }

    pub fn leader_count(&self) -> usize {
        self.leader_redact.len()
    }

    pub fn replica_count(&self) -> usize {
        self.replica_redacts.len()
    }

    pub fn verification_count(&self) -> usize {
        self.random_verifications.len()
    }

    /// Admission gate for a locally submitted task
    pub fn reserve(&mut self) -> Result<()> {
        if !self.is_available() {
            return Err(Error::MissionInFlight);
        }
        self.task_pending = true;
        Ok(())
    }

    /// Give a reservation back without announcing anything
    pub fn release(&mut self) {
        self.task_pending = false;
    }

    /// Start a mission as its leader
    pub fn begin<R: RngCore + CryptoRng>(
        &mut self,
        task: Task,
        setup: &Setup,
        store: &dyn BlockStore,
        rng: &mut R,
    ) -> Result<Progress> {
        if let Some(active) = &self.mission {
            return Err(Error::Conflict {
                active: active.name.to_string(),
                proposed: task.mission_name().to_string(),
            });
        }
        if !setup.is_ready() {
            return Err(Error::NotReady("setup"));
        }

        let me = setup.node_id().clone();
        let new_tx = task.new_tx();
        let (mission, partial) = self.open(task, me.clone(), setup, store, rng)?;
        let sig = SchnorrSig {
            block_height: mission.task.block_height,
            tx_index: mission.task.tx_index,
            new_tx,
            partial: partial.clone(),
        };
        info!(mission = %mission.name, "announcing redaction as leader");

        self.leader_redact.insert(me, partial);
        self.mission = Some(mission);
        self.task_pending = false;

        let mut progress = self.try_combine(setup)?;
        progress.announce = Some(Message::LeaderSchnorrSig(sig));
        Ok(progress)
    }

    /// A leader announced a mission
    pub fn on_leader<R: RngCore + CryptoRng>(
        &mut self,
        peer: &PeerId,
        sig: SchnorrSig,
        setup: &Setup,
        store: &dyn BlockStore,
        rng: &mut R,
    ) -> Result<Handled> {
        let name = sig.mission_name();
        if let Some(active) = &self.mission {
            if active.name == name {
                return Err(Error::Duplicate {
                    peer: peer.clone(),
                    what: "leader announcement",
                });
            }
            return Err(Error::Conflict {
                active: active.name.to_string(),
                proposed: name.to_string(),
            });
        }
        if !setup.is_ready() {
            return Ok(Handled::Parked);
        }

        let task = sig.task()?;
        let slot = store.tx_slot(task.block_height, task.tx_index)?;
        let ee = content_delta(&setup.keys().params().domain, &slot.tx, &sig.new_tx);
        self.check_partial(peer, &name, &ee, &sig.partial, setup)?;

        let me = setup.node_id().clone();
        let (mission, partial) = self.open(task, peer.clone(), setup, store, rng)?;
        let reply = SchnorrSig {
            partial: partial.clone(),
            ..sig.clone()
        };
        info!(mission = %mission.name, leader = %peer, "joined redaction mission");

        self.leader_redact.insert(peer.clone(), sig.partial);
        self.replica_redacts.insert(me, partial);
        self.mission = Some(mission);

        let mut progress = self.try_combine(setup)?;
        progress.announce = Some(Message::ReplicaSchnorrSig(reply));
        Ok(Handled::Progress(progress))
    }

    /// Another replica's partial
    pub fn on_replica(&mut self, peer: &PeerId, sig: SchnorrSig, setup: &Setup) -> Result<Handled> {
        let name = sig.mission_name();
        let ee = match &self.mission {
            None => return Ok(Handled::Parked),
            Some(active) if active.name != name => {
                return Err(Error::Conflict {
                    active: active.name.to_string(),
                    proposed: name.to_string(),
                })
            }
            Some(active) => active.ee,
        };

        if self.leader_redact.contains_key(peer) || self.replica_redacts.contains_key(peer) {
            return Err(Error::Duplicate {
                peer: peer.clone(),
                what: "replica signature",
            });
        }
        self.check_partial(peer, &name, &ee, &sig.partial, setup)?;

        self.replica_redacts.insert(peer.clone(), sig.partial);
        debug!(
            %peer,
            mission = %name,
            partials = self.leader_redact.len() + self.replica_redacts.len(),
            "recorded replica signature"
        );
        Ok(Handled::Progress(self.try_combine(setup)?))
    }

    /// Another node's response share
    pub fn on_random(
        &mut self,
        peer: &PeerId,
        rv: RandomVerification,
        setup: &Setup,
    ) -> Result<Handled> {
        let mission = match &self.mission {
            None => return Ok(Handled::Parked),
            Some(m) => m,
        };
        if mission.name != rv.redact_name {
            return Err(Error::Conflict {
                active: mission.name.to_string(),
                proposed: rv.redact_name.to_string(),
            });
        }
        let forge = match &mission.forge {
            None => return Ok(Handled::Parked),
            Some(f) => f,
        };

        if self.random_verifications.contains_key(peer) {
            return Err(Error::Duplicate {
                peer: peer.clone(),
                what: "random verification",
            });
        }
        if rv.r2 != forge.r {
            return Err(Error::rejected(peer, "forged r does not match"));
        }

        let commitment = self
            .partial_of(peer)
            .map(|p| p.nonce)
            .ok_or_else(|| Error::rejected(peer, "no partial signature on record"))?;
        let pk = setup
            .registry()
            .pk(peer)
            .ok_or_else(|| Error::identity(peer, "no public key share on record"))?;
        if !verify_response_share(setup.keys().params(), pk, &commitment, &forge.challenge, &rv.sigma)
        {
            return Err(Error::rejected(peer, "response share"));
        }

        self.random_verifications.insert(peer.clone(), rv.sigma);
        let completion = match self.try_complete(setup) {
            Ok(completion) => completion,
            Err(e) => {
                self.random_verifications.remove(peer);
                return Err(e);
            }
        };
        debug!(
            %peer,
            mission = %rv.redact_name,
            verifications = self.random_verifications.len(),
            "recorded random verification"
        );

        Ok(Handled::Progress(Progress {
            completion,
            ..Progress::default()
        }))
    }

    /// Clear everything about the current mission and re-arm admission.
    ///
    /// A queued local task stays reserved.
    pub fn reset(&mut self) {
        self.mission = None;
        self.leader_redact.clear();
        self.replica_redacts.clear();
        self.random_verifications.clear();
    }

    /// Build the local mission record and our own partial
    fn open<R: RngCore + CryptoRng>(
        &self,
        task: Task,
        leader: PeerId,
        setup: &Setup,
        store: &dyn BlockStore,
        rng: &mut R,
    ) -> Result<(Mission, PartialSignature)> {
        let keys = setup.keys();
        let name = task.mission_name();
        let slot = store.tx_slot(task.block_height, task.tx_index)?;
        let ee = content_delta(&keys.params().domain, &slot.tx, &task.new_tx());

        let nonce = NonceShare::generate(keys.params(), rng);
        let commitment = *nonce.commitment();
        let proof = keys.prove_identity(&proof_message(&name, &ee, &commitment), rng)?;

        let mission = Mission {
            name,
            task,
            leader,
            slot,
            ee,
            nonce: Some(nonce),
            forge: None,
        };
        let partial = PartialSignature {
            nonce: commitment,
            proof,
        };
        Ok((mission, partial))
    }

    fn check_partial(
        &self,
        peer: &PeerId,
        name: &MissionName,
        ee: &Scalar,
        partial: &PartialSignature,
        setup: &Setup,
    ) -> Result<()> {
        let alpha_exp_k = setup
            .registry()
            .alpha_exp_k(peer)
            .ok_or_else(|| Error::identity(peer, "no alpha^k on record"))?;
        setup
            .keys()
            .verify_identity(&partial.proof, alpha_exp_k, &proof_message(name, ee, &partial.nonce))
            .map_err(|_| Error::identity(peer, "session proof does not verify"))
    }

    fn partial_of(&self, peer: &PeerId) -> Option<&PartialSignature> {
        self.leader_redact
            .get(peer)
            .or_else(|| self.replica_redacts.get(peer))
    }

    /// With every partial in, derive the forge context and our σ
    fn try_combine(&mut self, setup: &Setup) -> Result<Progress> {
        let n = setup.participants();
        if self.leader_redact.len() + self.replica_redacts.len() < n {
            return Ok(Progress::default());
        }

        let mission = match self.mission.as_mut() {
            Some(m) if m.forge.is_none() => m,
            _ => return Ok(Progress::default()),
        };
        let nonce = mission
            .nonce
            .take()
            .ok_or(Error::NotReady("session nonce"))?;

        let key = setup.chameleon_key()?;
        let new_tx = mission.task.new_tx();
        let forge = ForgeContext::new(
            &key,
            &mission.slot.digest,
            &new_tx,
            self.leader_redact
                .values()
                .chain(self.replica_redacts.values())
                .map(|p| &p.nonce),
        );
        let sigma = setup.keys().response_share(nonce, &forge.challenge)?;
        let verification = RandomVerification {
            redact_name: mission.name.clone(),
            sigma,
            r2: forge.r,
        };
        mission.forge = Some(forge);
        info!(mission = %mission.name, "all partials in, forwarding response share");

        self.random_verifications
            .insert(setup.node_id().clone(), sigma);
        let completion = self.try_complete(setup)?;
        Ok(Progress {
            announce: None,
            verification: Some(verification),
            completion,
        })
    }

    /// With every response share in, combine and check against the digest
    fn try_complete(&self, setup: &Setup) -> Result<Option<Completion>> {
        if self.random_verifications.len() < setup.participants() {
            return Ok(None);
        }
        let mission = match &self.mission {
            Some(m) => m,
            None => return Ok(None),
        };
        let forge = mission.forge.as_ref().ok_or(Error::NotReady("forge context"))?;

        let randomness = forge.combine(self.random_verifications.values());
        let key = setup.chameleon_key()?;
        if !key.verify(&mission.task.new_tx(), &randomness, &mission.slot.digest) {
            return Err(chameleon::ChameleonError::DigestMismatch.into());
        }

        Ok(Some(Completion {
            name: mission.name.clone(),
            task: mission.task.clone(),
            randomness,
        }))
    }
}
