//! In-process cluster harness shared by the integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use redact_node::{
    commit_block, MemoryBlockStore, MemoryNetwork, NodeConfig, PeerId, Reactor, SessionState,
    SetupPhase, Status,
};

pub const TIMEOUT: Duration = Duration::from_secs(20);

pub struct Cluster {
    pub ids: Vec<PeerId>,
    pub network: MemoryNetwork,
    pub reactors: Vec<Reactor>,
    pub stores: Vec<MemoryBlockStore>,
}

impl Cluster {
    /// Spawn `n` nodes on a fresh in-memory mesh and connect them all
    pub async fn start(n: usize, t: usize) -> Self {
        let ids: Vec<PeerId> = (0..n).map(|i| format!("node-{}", i)).collect();
        let network = MemoryNetwork::new();

        let mut reactors = Vec::new();
        let mut stores = Vec::new();
        for mut config in NodeConfig::cluster(&ids, t) {
            config.poll_interval = Duration::from_millis(10);
            let (transport, inbox) = network.attach(config.node_id.clone()).unwrap();
            let store = MemoryBlockStore::new();
            let reactor =
                Reactor::spawn(config, Arc::new(transport), Arc::new(store.clone())).unwrap();
            reactor.serve(inbox);
            reactors.push(reactor);
            stores.push(store);
        }
        network.connect_all().unwrap();

        Self {
            ids,
            network,
            reactors,
            stores,
        }
    }

    pub async fn start_ready(n: usize, t: usize) -> Self {
        let cluster = Self::start(n, t).await;
        cluster.wait_ready().await;
        cluster
    }

    pub async fn statuses(&self) -> Vec<Status> {
        let mut out = Vec::new();
        for reactor in &self.reactors {
            out.push(reactor.status().await);
        }
        out
    }

    pub async fn wait_ready(&self) {
        self.wait_until("setup", |s| {
            s.iter().all(|s| s.phase == SetupPhase::Ready)
        })
        .await;
    }

    pub async fn wait_idle(&self) {
        self.wait_until("idle", |s| s.iter().all(|s| s.session == SessionState::Idle))
            .await;
    }

    /// Poll every node's status until `done` holds; panics after TIMEOUT
    pub async fn wait_until(&self, what: &str, done: impl Fn(&[Status]) -> bool) {
        let poll = async {
            loop {
                if done(&self.statuses().await) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        if tokio::time::timeout(TIMEOUT, poll).await.is_err() {
            panic!("timed out waiting for {}: {:#?}", what, self.statuses().await);
        }
    }

    /// Wait until every store has applied `count` rewrites
    pub async fn wait_rewrites(&self, count: usize) {
        let poll = async {
            loop {
                if self
                    .stores
                    .iter()
                    .all(|s| s.rewrites().unwrap().len() >= count)
                {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(TIMEOUT, poll)
            .await
            .expect("rewrites were not applied in time");
    }

    /// Commit the same block of `key=value` transactions into every store
    pub async fn commit_block(&self, height: i64, txs: &[&str], seed: u64) {
        let key = self.reactors[0].chameleon_key().await.unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let slots = commit_block(&key, txs, &mut rng);
        for store in &self.stores {
            store.insert_block(height, slots.clone()).unwrap();
        }
    }
}
