mod common;

use std::collections::BTreeSet;
use std::time::Duration;

use common::Cluster;
use redact_node::store::Rewrite;
use redact_node::wire::Message;
use redact_node::{BlockStore, Error, SessionState, Task};

const BLOCK: [&str; 4] = ["a=1", "b=2", "k=v1", "z=9"];

/// Distinct senders of every delivered frame of the given kind
fn senders(cluster: &Cluster, kind: &str) -> BTreeSet<String> {
    cluster
        .network
        .delivered()
        .unwrap()
        .into_iter()
        .filter(|d| Message::decode(&d.frame).unwrap().kind() == kind)
        .map(|d| d.from)
        .collect()
}

#[tokio::test]
async fn test_four_node_redaction_scenario() {
    let cluster = Cluster::start_ready(4, 3).await;
    cluster.commit_block(10, &BLOCK, 1).await;
    let key = cluster.reactors[0].chameleon_key().await.unwrap();
    let original = cluster.stores[0].tx_slot(10, 2).unwrap();

    cluster.reactors[0]
        .submit_redact_task(Task::new(10, 2, "k", "v2"))
        .await
        .unwrap();
    cluster.wait_rewrites(1).await;
    cluster.wait_idle().await;

    // leader announced once; three replicas answered; every node forwarded a share
    assert_eq!(
        senders(&cluster, "LeaderSchnorrSig"),
        BTreeSet::from(["node-0".to_string()])
    );
    assert_eq!(senders(&cluster, "ReplicaSchnorrSig").len(), 3);
    assert_eq!(senders(&cluster, "RandomVerification").len(), 4);

    // nothing else trickles in afterwards
    tokio::time::sleep(Duration::from_millis(100)).await;
    let expected = vec![Rewrite {
        block_height: 10,
        tx_index: 2,
        tx: b"k=v2".to_vec(),
    }];
    for store in &cluster.stores {
        assert_eq!(store.rewrites().unwrap(), expected);

        let slot = store.tx_slot(10, 2).unwrap();
        assert_eq!(slot.tx, b"k=v2".to_vec());
        assert_eq!(slot.digest, original.digest);
        assert!(key.verify(b"k=v2", &slot.randomness, &original.digest));
        assert!(store.verify_slot(&key, 10, 2).unwrap());

        // untouched neighbours still verify
        assert!(store.verify_slot(&key, 10, 1).unwrap());
    }

    for status in cluster.statuses().await {
        assert_eq!(status.session, SessionState::Idle);
        assert!(status.mission.is_none());
        assert_eq!(status.leader_redacts, 0);
        assert_eq!(status.replica_redacts, 0);
        assert_eq!(status.random_verifications, 0);
    }
}

#[tokio::test]
async fn test_single_flight_admission() {
    let cluster = Cluster::start_ready(3, 2).await;
    cluster.commit_block(10, &BLOCK, 2).await;
    let leader = &cluster.reactors[0];
    let a = Task::new(10, 2, "k", "v2");
    let b = Task::new(10, 0, "a", "redacted");

    leader.submit_redact_task(a.clone()).await.unwrap();
    assert!(matches!(
        leader.submit_redact_task(b.clone()).await,
        Err(Error::MissionInFlight)
    ));

    cluster.wait_rewrites(1).await;
    cluster.wait_idle().await;

    leader.submit_redact_task(a).await.unwrap();
    cluster.wait_rewrites(2).await;
    cluster.wait_idle().await;
    assert!(leader.submit_redact_task(b).await.is_ok());
}

#[tokio::test]
async fn test_duplicate_replica_signature_rejected() {
    let cluster = Cluster::start_ready(4, 3).await;
    cluster.commit_block(10, &BLOCK, 3).await;
    // keep the mission open by silencing one participant
    cluster.network.mute(&cluster.ids[3]).unwrap();

    cluster.reactors[0]
        .submit_redact_task(Task::new(10, 2, "k", "v2"))
        .await
        .unwrap();
    cluster
        .wait_until("replica signatures at the leader", |s| s[0].replica_redacts == 2)
        .await;

    let replay = cluster
        .network
        .delivered()
        .unwrap()
        .into_iter()
        .find(|d| {
            d.from == "node-1"
                && d.to == "node-0"
                && Message::decode(&d.frame).unwrap().kind() == "ReplicaSchnorrSig"
        })
        .expect("node-1 answered the leader");

    let err = cluster.reactors[0]
        .receive(&replay.from, &replay.frame)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Duplicate { .. }));
    assert!(!err.is_fatal());

    let status = cluster.reactors[0].status().await;
    assert_eq!(status.replica_redacts, 2);
    assert_eq!(status.leader_redacts, 1);
    assert!(cluster.network.is_connected(&cluster.ids[0], &cluster.ids[1]));
}

#[tokio::test]
async fn test_missing_participant_stalls_forever() {
    let cluster = Cluster::start_ready(4, 3).await;
    cluster.commit_block(10, &BLOCK, 4).await;
    cluster.network.mute(&cluster.ids[3]).unwrap();

    cluster.reactors[0]
        .submit_redact_task(Task::new(10, 2, "k", "v2"))
        .await
        .unwrap();

    // node-3 hears everyone and forges its share; nobody hears node-3
    cluster
        .wait_until("mission everywhere", |s| {
            s[..3].iter().all(|s| s.leader_redacts + s.replica_redacts == 3)
                && s[3].session == SessionState::CollectingVerifications
        })
        .await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    for store in &cluster.stores {
        assert!(store.rewrites().unwrap().is_empty());
        assert_eq!(store.tx_slot(10, 2).unwrap().tx, b"k=v1".to_vec());
    }
    for (i, status) in cluster.statuses().await.into_iter().enumerate() {
        assert!(status.mission.is_some(), "node-{} reset", i);
        if i < 3 {
            assert_eq!(status.session, SessionState::MissionAnnounced);
            assert_eq!(status.random_verifications, 0);
        } else {
            assert_eq!(status.random_verifications, 1);
        }
    }

    // and admission stays closed
    assert!(matches!(
        cluster.reactors[0]
            .submit_redact_task(Task::new(10, 0, "a", "x"))
            .await,
        Err(Error::MissionInFlight)
    ));
}

#[tokio::test]
async fn test_garbage_frame_drops_connection() {
    let cluster = Cluster::start_ready(2, 1).await;
    let err = cluster.reactors[0]
        .receive(&cluster.ids[1], &[0xff, 0xff, 0xff])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Decode(_)));
    assert!(!cluster.network.is_connected(&cluster.ids[0], &cluster.ids[1]));
}

#[tokio::test]
async fn test_unknown_slot_does_not_open_mission() {
    let cluster = Cluster::start_ready(2, 2).await;
    cluster.reactors[0]
        .submit_redact_task(Task::new(99, 0, "k", "v"))
        .await
        .unwrap();

    // the consumer fails to read the slot and gives the reservation back
    let mut accepted = false;
    for _ in 0..100 {
        if cluster.reactors[0]
            .submit_redact_task(Task::new(99, 0, "k", "v"))
            .await
            .is_ok()
        {
            accepted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(accepted);
    assert_eq!(cluster.statuses().await[1].session, SessionState::Idle);
}
