//! Transport collaborator
//!
//! The real node runs the redaction protocol over its p2p layer; this crate
//! only needs unicast, broadcast to connected peers, and a way to drop a
//! misbehaving connection. `MemoryNetwork` is an in-process mesh used by
//! tests and the demo binary.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

use crate::types::PeerId;
use crate::{Error, Result};

pub trait Transport: Send + Sync {
    fn send(&self, peer: &PeerId, frame: Vec<u8>) -> Result<()>;

    /// Send to every connected peer
    fn broadcast(&self, frame: Vec<u8>) -> Result<()>;

    /// Tear down the connection to `peer`
    fn disconnect(&self, peer: &PeerId, reason: &str);
}

/// What a node's inbox receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    PeerConnected(PeerId),
    PeerDisconnected(PeerId),
    Frame(PeerId, Vec<u8>),
}

/// A frame as delivered, kept for inspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub from: PeerId,
    pub to: PeerId,
    pub frame: Vec<u8>,
}

#[derive(Default)]
struct Mesh {
    inboxes: HashMap<PeerId, mpsc::UnboundedSender<NetworkEvent>>,
    /// Undirected links, stored with the smaller id first
    links: BTreeSet<(PeerId, PeerId)>,
    /// Nodes whose outgoing frames are silently lost
    muted: BTreeSet<PeerId>,
    delivered: Vec<Delivery>,
}

fn link(a: &PeerId, b: &PeerId) -> (PeerId, PeerId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

impl Mesh {
    fn notify(&self, node: &PeerId, event: NetworkEvent) {
        if let Some(inbox) = self.inboxes.get(node) {
            // a closed inbox means the node has shut down
            let _ = inbox.send(event);
        }
    }

    fn deliver(&mut self, from: &PeerId, to: &PeerId, frame: Vec<u8>) -> Result<()> {
        if !self.links.contains(&link(from, to)) {
            return Err(Error::Transport(format!("{} is not connected to {}", from, to)));
        }
        if self.muted.contains(from) {
            debug!(%from, %to, "frame lost");
            return Ok(());
        }
        self.delivered.push(Delivery {
            from: from.clone(),
            to: to.clone(),
            frame: frame.clone(),
        });
        self.notify(to, NetworkEvent::Frame(from.clone(), frame));
        Ok(())
    }

    fn unlink(&mut self, a: &PeerId, b: &PeerId) {
        if self.links.remove(&link(a, b)) {
            self.notify(a, NetworkEvent::PeerDisconnected(b.clone()));
            self.notify(b, NetworkEvent::PeerDisconnected(a.clone()));
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryNetwork {
    mesh: Arc<Mutex<Mesh>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn mesh(&self) -> Result<std::sync::MutexGuard<'_, Mesh>> {
        self.mesh.lock().map_err(|e| Error::Transport(e.to_string()))
    }

    /// Register a node, returning its transport handle and inbox
    pub fn attach(
        &self,
        id: impl Into<PeerId>,
    ) -> Result<(MemoryTransport, mpsc::UnboundedReceiver<NetworkEvent>)> {
        let id = id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut mesh = self.mesh()?;
        if mesh.inboxes.contains_key(&id) {
            return Err(Error::Transport(format!("{} already attached", id)));
        }
        mesh.inboxes.insert(id.clone(), tx);
        Ok((
            MemoryTransport {
                id,
                network: self.clone(),
            },
            rx,
        ))
    }

    pub fn connect(&self, a: &PeerId, b: &PeerId) -> Result<()> {
        let mut mesh = self.mesh()?;
        for node in [a, b] {
            if !mesh.inboxes.contains_key(node) {
                return Err(Error::Transport(format!("{} is not attached", node)));
            }
        }
        if a == b || !mesh.links.insert(link(a, b)) {
            return Ok(());
        }
        mesh.notify(a, NetworkEvent::PeerConnected(b.clone()));
        mesh.notify(b, NetworkEvent::PeerConnected(a.clone()));
        Ok(())
    }

    /// Full mesh between every attached node
    pub fn connect_all(&self) -> Result<()> {
        let nodes: Vec<PeerId> = self.mesh()?.inboxes.keys().cloned().collect();
        for (i, a) in nodes.iter().enumerate() {
            for b in &nodes[i + 1..] {
                self.connect(a, b)?;
            }
        }
        Ok(())
    }

    /// Drop every frame `node` sends from now on
    pub fn mute(&self, node: &PeerId) -> Result<()> {
        self.mesh()?.muted.insert(node.clone());
        Ok(())
    }

    /// Every frame delivered so far
    pub fn delivered(&self) -> Result<Vec<Delivery>> {
        Ok(self.mesh()?.delivered.clone())
    }

    pub fn is_connected(&self, a: &PeerId, b: &PeerId) -> bool {
        self.mesh()
            .map(|mesh| mesh.links.contains(&link(a, b)))
            .unwrap_or(false)
    }
}

/// One node's handle onto a `MemoryNetwork`
#[derive(Clone)]
pub struct MemoryTransport {
    id: PeerId,
    network: MemoryNetwork,
}

impl Transport for MemoryTransport {
    fn send(&self, peer: &PeerId, frame: Vec<u8>) -> Result<()> {
        self.network.mesh()?.deliver(&self.id, peer, frame)
    }

    fn broadcast(&self, frame: Vec<u8>) -> Result<()> {
        let mut mesh = self.network.mesh()?;
        let peers: Vec<PeerId> = mesh
            .links
            .iter()
            .filter_map(|(a, b)| {
                if *a == self.id {
                    Some(b.clone())
                } else if *b == self.id {
                    Some(a.clone())
                } else {
                    None
                }
            })
            .collect();
        for peer in peers {
            mesh.deliver(&self.id, &peer, frame.clone())?;
        }
        Ok(())
    }

    fn disconnect(&self, peer: &PeerId, reason: &str) {
        debug!(node = %self.id, %peer, reason, "disconnecting");
        if let Ok(mut mesh) = self.network.mesh() {
            mesh.unlink(&self.id, peer);
        }
    }
}
