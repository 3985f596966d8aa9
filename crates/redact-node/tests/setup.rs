mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Cluster, TIMEOUT};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use redact_node::setup::{Outbound, Setup};
use redact_node::wire::Message;
use redact_node::{
    MemoryBlockStore, MemoryNetwork, NetworkEvent, NodeConfig, PeerId, Reactor, SetupPhase,
};
use tokio::sync::mpsc;

async fn assert_converges(n: usize, t: usize) {
    let cluster = Cluster::start_ready(n, t).await;
    let statuses = cluster.statuses().await;

    let first = &statuses[0];
    assert!(first.hk.is_some());
    assert!(first.cid.is_some());
    assert!(first.alpha.is_some());
    for status in &statuses {
        assert_eq!(status.phase, SetupPhase::Ready);
        assert_eq!(status.hk, first.hk);
        assert_eq!(status.cid, first.cid);
        assert_eq!(status.alpha, first.alpha);
    }
}

#[tokio::test]
async fn test_single_node_setup() {
    assert_converges(1, 1).await;
}

#[tokio::test]
async fn test_two_node_setup() {
    assert_converges(2, 1).await;
}

#[tokio::test]
async fn test_four_node_threshold_three_setup() {
    assert_converges(4, 3).await;
}

#[tokio::test]
async fn test_full_threshold_setup() {
    assert_converges(5, 5).await;
}

#[tokio::test]
async fn test_chameleon_key_matches_status() {
    let cluster = Cluster::start_ready(3, 2).await;
    let key = cluster.reactors[1].chameleon_key().await.unwrap();
    let status = cluster.reactors[2].status().await;
    assert_eq!(Some(key.public_key), status.hk);
    assert_eq!(Some(key.binding), status.alpha);
}

#[tokio::test]
async fn test_setup_stalls_without_every_peer() {
    // node-2 never gets connected, so nobody can finish its share
    let ids: Vec<String> = (0..3).map(|i| format!("node-{}", i)).collect();
    let network = redact_node::MemoryNetwork::new();
    let mut reactors = Vec::new();
    for config in redact_node::NodeConfig::cluster(&ids, 2) {
        let (transport, inbox) = network.attach(config.node_id.clone()).unwrap();
        let reactor = redact_node::Reactor::spawn(
            config,
            std::sync::Arc::new(transport),
            std::sync::Arc::new(redact_node::MemoryBlockStore::new()),
        )
        .unwrap();
        reactor.serve(inbox);
        reactors.push(reactor);
    }
    network.connect(&ids[0], &ids[1]).unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    for reactor in &reactors {
        let status = reactor.status().await;
        assert!(status.phase < SetupPhase::HaveShares);
        assert!(status.hk.is_none());
    }
}

/// Decode every frame waiting in a hand-driven node's inbox
fn drain(inbox: &mut mpsc::UnboundedReceiver<NetworkEvent>) -> Vec<Message> {
    let mut out = Vec::new();
    while let Ok(event) = inbox.try_recv() {
        if let NetworkEvent::Frame(_, frame) = event {
            out.push(Message::decode(&frame).unwrap());
        }
    }
    out
}

/// Feed one message from `from` into a bare `Setup`
fn feed(setup: &mut Setup, from: &PeerId, msg: Message) -> Vec<Outbound> {
    match msg {
        Message::IdentityX { x, id } => setup.on_identity(from, x, &id).unwrap(),
        Message::FnX { from: claimed, data } => setup.on_fn_x(from, &claimed, data).unwrap(),
        Message::PublicKeySeg { from: claimed, public_key } => {
            setup.on_public_key(from, &claimed, public_key).unwrap()
        }
        other => panic!("unexpected {}", other.kind()),
    }
}

fn frame(out: &Outbound) -> Vec<u8> {
    match out {
        Outbound::Send(_, msg) | Outbound::Broadcast(msg) => msg.encode().unwrap(),
    }
}

#[tokio::test]
async fn test_early_alpha_is_parked_then_recorded() {
    let ids: Vec<PeerId> = vec!["node-0".into(), "node-1".into()];
    let configs = NodeConfig::cluster(&ids, 1);
    let network = MemoryNetwork::new();

    let mut config = configs[0].clone();
    config.poll_interval = Duration::from_millis(10);
    let (transport, _reactor_inbox) = network.attach(ids[0].clone()).unwrap();
    let reactor =
        Reactor::spawn(config, Arc::new(transport), Arc::new(MemoryBlockStore::new())).unwrap();

    // node-1 is driven by hand so the reactor sees its alpha^k first
    let mut rng = ChaCha20Rng::seed_from_u64(7);
    let mut peer = Setup::new(&configs[1], &mut rng).unwrap();
    let (_peer_transport, mut peer_inbox) = network.attach(ids[1].clone()).unwrap();
    network.connect_all().unwrap();
    reactor.on_peer_connected(&ids[1]).await;

    let mut from_peer = Vec::new();
    for msg in drain(&mut peer_inbox) {
        from_peer.extend(feed(&mut peer, &ids[0], msg));
    }
    reactor.receive(&ids[1], &peer.identity_message().encode().unwrap()).await.unwrap();

    // peer completes its share and key before the reactor has the peer's key
    for msg in drain(&mut peer_inbox) {
        from_peer.extend(feed(&mut peer, &ids[0], msg));
    }
    let share: Vec<&Outbound> = from_peer
        .iter()
        .filter(|o| matches!(o, Outbound::Send(_, Message::FnX { .. })))
        .collect();
    assert_eq!(share.len(), 1);
    reactor.receive(&ids[1], &frame(share[0])).await.unwrap();

    let mut late = Vec::new();
    for msg in drain(&mut peer_inbox) {
        late.extend(feed(&mut peer, &ids[0], msg));
    }
    let alpha: Vec<&Outbound> = late
        .iter()
        .filter(|o| matches!(o, Outbound::Broadcast(Message::AlphaExpKAndHK { .. })))
        .collect();
    assert_eq!(alpha.len(), 1);

    // delivered twice before our hk exists: parked once
    reactor.receive(&ids[1], &frame(alpha[0])).await.unwrap();
    reactor.receive(&ids[1], &frame(alpha[0])).await.unwrap();
    let status = reactor.status().await;
    assert_eq!(status.parked_alpha, 1);
    assert!(status.hk.is_none());
    assert_eq!(status.phase, SetupPhase::HaveShares);
    assert_eq!(status.connected, vec![ids[1].clone()]);

    let key = from_peer
        .iter()
        .find(|o| matches!(o, Outbound::Broadcast(Message::PublicKeySeg { .. })))
        .unwrap();
    reactor.receive(&ids[1], &frame(key)).await.unwrap();

    let ready = async {
        loop {
            let status = reactor.status().await;
            if status.phase == SetupPhase::Ready {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    let status = tokio::time::timeout(TIMEOUT, ready)
        .await
        .expect("parked alpha^k was never recorded");
    assert_eq!(status.parked_alpha, 0);
    assert_eq!(status.hk, peer.keys().hk().copied());
}
