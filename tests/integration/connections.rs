use crate::*;

use nearby_services::{ConnectionStatus, Notice};

// ══════════════════════════════════════════════════════════════════════════════
//  Connections
// ══════════════════════════════════════════════════════════════════════════════

async fn found(medium: &Arc<LoopbackMedium>, models: &[&str]) -> (Vec<TestNode>, TestNode) {
    let mut publishers = Vec::new();
    for model in models {
        let node = spawn_node(medium, model, 50);
        node.node.publish().await.unwrap();
        publishers.push(node);
    }
    let me = spawn_node(medium, "Local", 100);
    me.node.subscribe().await.unwrap();
    let expected = models.len();
    wait_for_condition(|| me.node.peers().len() == expected).await.unwrap();
    (publishers, me)
}

/// Connect → Available → publisher leaves → Lost; cancel afterwards is a no-op.
#[tokio::test]
async fn test_connection_lifecycle_available_then_lost() {
    let medium = LoopbackMedium::new();
    let (publishers, me) = found(&medium, &["Pixel 7"]).await;
    let mut notices = me.node.notices();

    let id = me.node.connect("Pixel 7").unwrap();
    let notice = wait_for_notice(&mut notices, |n| matches!(n, Notice::ConnectionAvailable { .. }))
        .await
        .unwrap();
    assert_eq!(notice.to_string(), "Connected to Pixel 7");

    let attempt = me.node.connections().attempt(id).unwrap();
    assert_eq!(attempt.network.unwrap().peer_addr, publishers[0].radio.addr());

    publishers[0].node.teardown();
    wait_for_notice(&mut notices, |n| matches!(n, Notice::ConnectionLost { .. }))
        .await
        .unwrap();

    assert_eq!(
        me.node.connections().attempt(id).unwrap().history,
        [
            ConnectionStatus::Pending,
            ConnectionStatus::Available,
            ConnectionStatus::Lost
        ]
    );
    assert!(!me.node.cancel(id).unwrap());
}

/// Loss on one peer's network is reported against that peer's attempt only.
#[tokio::test]
async fn test_attempts_for_different_peers_are_independent() {
    let medium = LoopbackMedium::new();
    let (publishers, me) = found(&medium, &["Pixel 7", "SM-S911B"]).await;
    let mut notices = me.node.notices();

    let pixel = me.node.connect("Pixel 7").unwrap();
    let galaxy = me.node.connect("SM-S911B").unwrap();
    let connections = me.node.connections().clone();
    wait_for_condition(|| {
        connections.status(pixel) == Some(ConnectionStatus::Available)
            && connections.status(galaxy) == Some(ConnectionStatus::Available)
    })
    .await
    .unwrap();

    publishers[1].node.teardown();
    let lost = wait_for_notice(&mut notices, |n| matches!(n, Notice::ConnectionLost { .. }))
        .await
        .unwrap();

    assert_eq!(
        lost,
        Notice::ConnectionLost {
            attempt: galaxy,
            peer: "SM-S911B".into()
        }
    );
    assert_eq!(connections.status(pixel), Some(ConnectionStatus::Available));
    assert_eq!(connections.status(galaxy), Some(ConnectionStatus::Lost));
}

/// Selecting the same peer twice supersedes the first attempt; the first
/// attempt's loss is still surfaced under its own id.
#[tokio::test]
async fn test_reselect_supersedes_but_keeps_old_attempt_alive() {
    let medium = LoopbackMedium::new();
    let (_publishers, me) = found(&medium, &["Pixel 7"]).await;
    let connections = me.node.connections().clone();
    let mut notices = me.node.notices();

    let first = me.node.connect("Pixel 7").unwrap();
    let second = me.node.connect("Pixel 7").unwrap();
    assert_eq!(connections.current_for("Pixel 7"), Some(second));
    wait_for_condition(|| connections.status(first) == Some(ConnectionStatus::Available))
        .await
        .unwrap();

    assert!(me.node.cancel(first).unwrap());
    let lost = wait_for_notice(&mut notices, |n| matches!(n, Notice::ConnectionLost { .. }))
        .await
        .unwrap();
    assert_eq!(
        lost,
        Notice::ConnectionLost {
            attempt: first,
            peer: "Pixel 7".into()
        }
    );
    assert_eq!(connections.status(second), Some(ConnectionStatus::Available));
}

/// A peer that stopped publishing after it was listed cannot be reached.
#[tokio::test]
async fn test_vanished_peer_is_unavailable() {
    let medium = LoopbackMedium::new();
    let (publishers, me) = found(&medium, &["Pixel 7"]).await;
    publishers[0].node.teardown();
    let mut notices = me.node.notices();

    let id = me.node.connect("Pixel 7").unwrap();
    let notice = wait_for_notice(&mut notices, |n| {
        matches!(n, Notice::ConnectionUnavailable { .. })
    })
    .await
    .unwrap();

    assert_eq!(notice.to_string(), "Unable to connect to Pixel 7");
    assert_eq!(
        me.node.connections().attempt(id).unwrap().history,
        [ConnectionStatus::Pending, ConnectionStatus::Unavailable]
    );
    assert_eq!(medium.network_count(), 0);
}

/// Unavailable can be applied on the pump's worker before `connect` has the
/// request id in hand; every such request must still be released.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unavailable_attempts_release_their_networks() {
    let medium = LoopbackMedium::new();
    let (publishers, me) = found(&medium, &["Pixel 7"]).await;
    publishers[0].node.teardown();
    let connections = me.node.connections().clone();

    let ids: Vec<_> = (0..50).map(|_| me.node.connect("Pixel 7").unwrap()).collect();
    wait_for_condition(|| {
        ids.iter()
            .all(|id| connections.status(*id) == Some(ConnectionStatus::Unavailable))
    })
    .await
    .unwrap();

    wait_for_condition(|| medium.network_count() == 0).await.unwrap();
}
