//! Protocol dispatcher
//!
//! Decodes inbound frames, routes them to setup or the redaction session,
//! and sends whatever they produce through the transport. All key material
//! and session state sit behind one async mutex.
//!
//! Background workers:
//! - task consumer: announces queued redaction tasks, one mission at a time
//! - forwarder: broadcasts our response share once it is combined
//! - two drainers: retry signatures and verifications that arrived before
//!   the mission (or setup) they refer to
//! - alpha retry: spawned while an AlphaExpKAndHK waits for our group key

use std::collections::BTreeMap;
use std::sync::Arc;

use chameleon::ChameleonKey;
use rand::rngs::OsRng;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::NodeConfig;
use crate::session::{Handled, Progress, RedactSession, SessionState};
use crate::setup::{AlphaOutcome, Outbound, Setup, SetupPhase};
use crate::store::BlockStore;
use crate::transport::{NetworkEvent, Transport};
use crate::types::{MissionName, PeerId, Task};
use crate::wire::{Message, RandomVerification, SchnorrSig};
use crate::{Element, Error, Result, Scalar};

struct State {
    setup: Setup,
    session: RedactSession,
    /// AlphaExpKAndHK received before our own hk, latest per peer
    parked_alpha: BTreeMap<PeerId, (Element, Element)>,
}

/// A session message waiting for state that does not exist yet
#[derive(Debug, Clone)]
enum Deferred {
    Leader(PeerId, SchnorrSig),
    Replica(PeerId, SchnorrSig),
    Random(PeerId, RandomVerification),
}

struct Shared {
    config: NodeConfig,
    state: Mutex<State>,
    transport: Arc<dyn Transport>,
    store: Arc<dyn BlockStore>,
    tasks: mpsc::Sender<Task>,
    /// Parked Leader/ReplicaSchnorrSig
    signatures: mpsc::Sender<Deferred>,
    /// Parked RandomVerification
    randoms: mpsc::Sender<Deferred>,
    verifications: mpsc::UnboundedSender<RandomVerification>,
}

/// Point-in-time view of a node, for monitoring and tests
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub phase: SetupPhase,
    /// Peers the transport reports as connected
    pub connected: Vec<PeerId>,
    /// AlphaExpKAndHK frames waiting for our group key
    pub parked_alpha: usize,
    pub hk: Option<Element>,
    pub cid: Option<Scalar>,
    pub alpha: Option<Element>,
    pub session: SessionState,
    pub mission: Option<MissionName>,
    pub leader: Option<PeerId>,
    pub leader_redacts: usize,
    pub replica_redacts: usize,
    pub random_verifications: usize,
}

#[derive(Clone)]
pub struct Reactor {
    shared: Arc<Shared>,
}

impl Reactor {
    /// Create the node's redaction subsystem and start its workers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        config: NodeConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn BlockStore>,
    ) -> Result<Self> {
        config.validate()?;
        let mut setup = Setup::new(&config, &mut OsRng)?;
        let initial = setup.advance()?;

        // admission keeps at most one task queued
        let (tasks, task_rx) = mpsc::channel(1);
        let (signatures, signature_rx) = mpsc::channel(config.reorder_capacity);
        let (randoms, random_rx) = mpsc::channel(config.reorder_capacity);
        let (verifications, verification_rx) = mpsc::unbounded_channel();

        info!(
            node = %config.node_id,
            participants = config.participants(),
            threshold = config.threshold,
            "starting redaction reactor"
        );

        let reactor = Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(State {
                    setup,
                    session: RedactSession::new(),
                    parked_alpha: BTreeMap::new(),
                }),
                transport,
                store,
                tasks,
                signatures,
                randoms,
                verifications,
            }),
        };

        reactor.emit(initial);
        tokio::spawn(reactor.clone().run_tasks(task_rx));
        tokio::spawn(reactor.clone().run_forwarder(verification_rx));
        tokio::spawn(reactor.clone().run_drainer(signature_rx));
        tokio::spawn(reactor.clone().run_drainer(random_rx));
        Ok(reactor)
    }

    pub fn node_id(&self) -> &PeerId {
        &self.shared.config.node_id
    }

    /// Feed a transport's event stream into the reactor
    pub fn serve(&self, mut events: mpsc::UnboundedReceiver<NetworkEvent>) -> JoinHandle<()> {
        let reactor = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    NetworkEvent::PeerConnected(peer) => reactor.on_peer_connected(&peer).await,
                    NetworkEvent::PeerDisconnected(peer) => {
                        reactor.on_peer_disconnected(&peer).await
                    }
                    NetworkEvent::Frame(peer, frame) => {
                        // errors are logged inside
                        let _ = reactor.receive(&peer, &frame).await;
                    }
                }
            }
            debug!(node = %reactor.node_id(), "inbox closed");
        })
    }

    pub async fn on_peer_connected(&self, peer: &PeerId) {
        let identity = {
            let mut state = self.shared.state.lock().await;
            if let Err(e) = state.setup.peer_connected(peer) {
                warn!(node = %self.node_id(), %peer, error = %e, "ignoring unknown peer");
                return;
            }
            state.setup.identity_message()
        };
        debug!(node = %self.node_id(), %peer, "peer connected");
        self.emit(vec![Outbound::Send(peer.clone(), identity)]);
    }

    pub async fn on_peer_disconnected(&self, peer: &PeerId) {
        let mut state = self.shared.state.lock().await;
        if state.setup.peer_disconnected(peer).is_ok() {
            info!(node = %self.node_id(), %peer, "peer disconnected");
        }
    }

    /// Handle one inbound frame.
    ///
    /// Decode failures disconnect the peer; any other error drops the
    /// message and leaves state untouched. The error is returned either way.
    pub async fn receive(&self, peer: &PeerId, frame: &[u8]) -> Result<()> {
        let result = match Message::decode(frame) {
            Ok(msg) => {
                debug!(node = %self.node_id(), %peer, kind = msg.kind(), "received");
                self.dispatch(peer, msg).await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            if e.is_fatal() {
                warn!(node = %self.node_id(), %peer, error = %e, "dropping connection");
                self.shared.transport.disconnect(peer, &e.to_string());
            } else {
                warn!(node = %self.node_id(), %peer, error = %e, "dropped message");
            }
        }
        result
    }

    /// Queue a redaction. Fails while another mission is queued or active.
    pub async fn submit_redact_task(&self, task: Task) -> Result<()> {
        let mut state = self.shared.state.lock().await;
        state.session.reserve()?;
        if self.shared.tasks.try_send(task).is_err() {
            state.session.release();
            return Err(Error::Transport("task consumer stopped".into()));
        }
        Ok(())
    }

    pub async fn status(&self) -> Status {
        let state = self.shared.state.lock().await;
        let keys = state.setup.keys();
        Status {
            phase: state.setup.phase(),
            connected: state.setup.registry().connected(),
            parked_alpha: state.parked_alpha.len(),
            hk: keys.hk().copied(),
            cid: keys.cid().copied(),
            alpha: keys.alpha().copied(),
            session: state.session.state(),
            mission: state.session.mission_name().cloned(),
            leader: state.session.mission().map(|m| m.leader.clone()),
            leader_redacts: state.session.leader_count(),
            replica_redacts: state.session.replica_count(),
            random_verifications: state.session.verification_count(),
        }
    }

    /// The set's chameleon key; fails until setup has derived it
    pub async fn chameleon_key(&self) -> Result<ChameleonKey<Element>> {
        self.shared.state.lock().await.setup.chameleon_key()
    }

    async fn dispatch(&self, peer: &PeerId, msg: Message) -> Result<()> {
        match msg {
            Message::IdentityX { x, id } => {
                let out = self.shared.state.lock().await.setup.on_identity(peer, x, &id)?;
                self.emit(out);
            }
            Message::FnX { from, data } => {
                let out = self.shared.state.lock().await.setup.on_fn_x(peer, &from, data)?;
                self.emit(out);
            }
            Message::PublicKeySeg { from, public_key } => {
                let out = self
                    .shared
                    .state
                    .lock()
                    .await
                    .setup
                    .on_public_key(peer, &from, public_key)?;
                self.emit(out);
            }
            Message::AlphaExpKAndHK { alpha_exp_k, hk } => {
                let mut state = self.shared.state.lock().await;
                if state.setup.on_alpha(peer, alpha_exp_k, hk)? == AlphaOutcome::Parked {
                    debug!(node = %self.node_id(), %peer, "alpha^k before group key, parking");
                    // one retry task serves every parked frame
                    if state.parked_alpha.is_empty() {
                        self.retry_parked_alpha();
                    }
                    state.parked_alpha.insert(peer.clone(), (alpha_exp_k, hk));
                }
            }
            Message::LeaderSchnorrSig(sig) => {
                self.defer_if_parked(Deferred::Leader(peer.clone(), sig)).await?;
            }
            Message::ReplicaSchnorrSig(sig) => {
                self.defer_if_parked(Deferred::Replica(peer.clone(), sig)).await?;
            }
            Message::RandomVerification(rv) => {
                self.defer_if_parked(Deferred::Random(peer.clone(), rv)).await?;
            }
        }
        Ok(())
    }

    /// Handle now, or park in the matching reorder buffer. Blocks while the
    /// buffer is full.
    async fn defer_if_parked(&self, item: Deferred) -> Result<()> {
        if let Some(parked) = self.handle(item).await? {
            let buffer = match parked {
                Deferred::Random(..) => &self.shared.randoms,
                _ => &self.shared.signatures,
            };
            buffer
                .send(parked)
                .await
                .map_err(|_| Error::Transport("reorder buffer closed".into()))?;
        }
        Ok(())
    }

    /// Run a session handler; gives the item back if it has to wait
    async fn handle(&self, item: Deferred) -> Result<Option<Deferred>> {
        let mut guard = self.shared.state.lock().await;
        let State { setup, session, .. } = &mut *guard;
        let store = self.shared.store.as_ref();

        let handled = match &item {
            Deferred::Leader(peer, sig) => {
                session.on_leader(peer, sig.clone(), setup, store, &mut OsRng)?
            }
            Deferred::Replica(peer, sig) => session.on_replica(peer, sig.clone(), setup)?,
            Deferred::Random(peer, rv) => session.on_random(peer, rv.clone(), setup)?,
        };

        match handled {
            Handled::Parked => Ok(Some(item)),
            Handled::Progress(progress) => {
                self.apply(session, progress)?;
                Ok(None)
            }
        }
    }

    /// Carry out a handler's side effects. Runs under the state lock.
    fn apply(&self, session: &mut RedactSession, progress: Progress) -> Result<()> {
        if let Some(msg) = progress.announce {
            self.emit(vec![Outbound::Broadcast(msg)]);
        }

        if let Some(verification) = progress.verification {
            self.shared
                .verifications
                .send(verification)
                .map_err(|_| Error::Transport("verification forwarder stopped".into()))?;
        }

        if let Some(done) = progress.completion {
            let task = &done.task;
            let rewritten = self.shared.store.rewrite_tx_at(
                task.block_height,
                task.tx_index,
                &task.new_tx(),
                &done.randomness,
            );
            session.reset();
            match &rewritten {
                Ok(()) => info!(
                    node = %self.node_id(),
                    mission = %done.name,
                    height = task.block_height,
                    index = task.tx_index,
                    "redaction applied"
                ),
                Err(e) => error!(node = %self.node_id(), mission = %done.name, error = %e, "rewrite failed"),
            }
            rewritten?;
        }
        Ok(())
    }

    fn emit(&self, out: Vec<Outbound>) {
        for item in out {
            let (target, msg) = match item {
                Outbound::Send(peer, msg) => (Some(peer), msg),
                Outbound::Broadcast(msg) => (None, msg),
            };
            let frame = match msg.encode() {
                Ok(frame) => frame,
                Err(e) => {
                    error!(kind = msg.kind(), error = %e, "failed to encode");
                    continue;
                }
            };
            let sent = match &target {
                Some(peer) => self.shared.transport.send(peer, frame),
                None => self.shared.transport.broadcast(frame),
            };
            if let Err(e) = sent {
                warn!(node = %self.node_id(), kind = msg.kind(), error = %e, "send failed");
            }
        }
    }

    /// Retry parked AlphaExpKAndHK every poll interval until none is left
    fn retry_parked_alpha(&self) {
        let reactor = self.clone();
        tokio::spawn(async move {
            loop {
                sleep(reactor.shared.config.poll_interval).await;
                let mut guard = reactor.shared.state.lock().await;
                let State {
                    setup,
                    parked_alpha,
                    ..
                } = &mut *guard;

                for (peer, (alpha_exp_k, hk)) in std::mem::take(parked_alpha) {
                    match setup.on_alpha(&peer, alpha_exp_k, hk) {
                        Ok(AlphaOutcome::Parked) => {
                            parked_alpha.insert(peer, (alpha_exp_k, hk));
                        }
                        Ok(AlphaOutcome::Recorded) => {
                            debug!(node = %reactor.node_id(), %peer, "recorded parked alpha^k");
                        }
                        Err(e) => {
                            warn!(node = %reactor.node_id(), %peer, error = %e, "dropped parked alpha^k")
                        }
                    }
                }
                if parked_alpha.is_empty() {
                    return;
                }
            }
        });
    }

    async fn run_tasks(self, mut tasks: mpsc::Receiver<Task>) {
        let poll = self.shared.config.poll_interval;
        loop {
            // never pull a task while a mission is active
            while self.shared.state.lock().await.session.mission().is_some() {
                sleep(poll).await;
            }
            let task = match tasks.recv().await {
                Some(task) => task,
                None => return,
            };
            while !self.shared.state.lock().await.setup.is_ready() {
                sleep(poll).await;
            }

            let mut guard = self.shared.state.lock().await;
            let State { setup, session, .. } = &mut *guard;
            let result = match session.begin(task, setup, self.shared.store.as_ref(), &mut OsRng) {
                Ok(progress) => self.apply(session, progress),
                Err(e) => {
                    session.release();
                    Err(e)
                }
            };
            drop(guard);

            if let Err(e) = result {
                warn!(node = %self.node_id(), error = %e, "redaction task dropped");
            }
        }
    }

    async fn run_forwarder(self, mut verifications: mpsc::UnboundedReceiver<RandomVerification>) {
        while let Some(verification) = verifications.recv().await {
            debug!(node = %self.node_id(), mission = %verification.redact_name, "forwarding response share");
            self.emit(vec![Outbound::Broadcast(Message::RandomVerification(verification))]);
        }
    }

    /// Retry parked messages every poll interval. Holds at most
    /// `reorder_capacity` of them, so a full buffer pushes back on senders.
    async fn run_drainer(self, mut parked: mpsc::Receiver<Deferred>) {
        let capacity = self.shared.config.reorder_capacity;
        let poll = self.shared.config.poll_interval;
        let mut pending: Vec<Deferred> = Vec::new();

        loop {
            if pending.is_empty() {
                match parked.recv().await {
                    Some(item) => pending.push(item),
                    None => return,
                }
            }
            while pending.len() < capacity {
                match parked.try_recv() {
                    Ok(item) => pending.push(item),
                    Err(_) => break,
                }
            }

            let mut still = Vec::with_capacity(pending.len());
            for item in pending.drain(..) {
                match self.handle(item).await {
                    Ok(Some(item)) => still.push(item),
                    Ok(None) => {}
                    Err(e) => warn!(node = %self.node_id(), error = %e, "dropped parked message"),
                }
            }
            pending = still;

            if !pending.is_empty() {
                sleep(poll).await;
            }
        }
    }
}
