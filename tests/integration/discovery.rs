use crate::*;

use nearby_services::{DiscoveryState, SessionRole};

// ══════════════════════════════════════════════════════════════════════════════
//  Discovery
// ══════════════════════════════════════════════════════════════════════════════

/// A subscriber finds every publisher on the medium, in the order they
/// appeared, with the advertised details.
#[tokio::test]
async fn test_subscriber_lists_publishers_in_discovery_order() {
    let medium = LoopbackMedium::new();
    let pixel = spawn_node(&medium, "Pixel 7", 87);
    let galaxy = spawn_node(&medium, "SM-S911B", 42);
    let me = spawn_node(&medium, "Local", 100);

    pixel.node.publish().await.unwrap();
    me.node.subscribe().await.unwrap();
    wait_for_condition(|| peer_names(&me.node) == ["Pixel 7"]).await.unwrap();

    galaxy.node.publish().await.unwrap();
    wait_for_condition(|| me.node.peers().len() == 2).await.unwrap();

    let peers = me.node.peers();
    assert_eq!(peer_names(&me.node), ["Pixel 7", "SM-S911B"]);
    assert_eq!(peers[0].details, "OS: 14, Battery: 87%");
    assert_eq!(peers[1].details, "OS: 14, Battery: 42%");
    assert_eq!(me.renderer.last(), ["Pixel 7", "SM-S911B"]);
}

/// Two devices advertising the same model show up once: the first wins.
#[tokio::test]
async fn test_duplicate_names_are_listed_once() {
    let medium = LoopbackMedium::new();
    let first = spawn_node(&medium, "Pixel 7", 87);
    let second = spawn_node(&medium, "Pixel 7", 12);
    let me = spawn_node(&medium, "Local", 100);

    first.node.publish().await.unwrap();
    second.node.publish().await.unwrap();
    me.node.subscribe().await.unwrap();

    wait_for_condition(|| !me.node.peers().is_empty()).await.unwrap();
    // Let the second advertisement land too.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let peers = me.node.peers();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].details, "OS: 14, Battery: 87%");
    assert_eq!(me.renderer.frames().len(), 1);
}

/// A publisher never sees anything itself, and publishers of another service
/// are invisible.
#[tokio::test]
async fn test_publishers_do_not_discover() {
    let medium = LoopbackMedium::new();
    let a = spawn_node(&medium, "Pixel 7", 87);
    let b = spawn_node(&medium, "SM-S911B", 42);

    a.node.publish().await.unwrap();
    b.node.publish().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(a.node.peers().is_empty());
    assert!(b.node.peers().is_empty());
    assert_eq!(a.node.current().unwrap().role(), Some(SessionRole::Publish));
}

/// Teardown closes the session, clears the list, and the renderer is told.
#[tokio::test]
async fn test_teardown_clears_and_renders_empty_list() {
    let medium = LoopbackMedium::new();
    let pixel = spawn_node(&medium, "Pixel 7", 87);
    let me = spawn_node(&medium, "Local", 100);

    pixel.node.publish().await.unwrap();
    me.node.subscribe().await.unwrap();
    wait_for_condition(|| !me.node.peers().is_empty()).await.unwrap();

    me.node.teardown();
    assert_eq!(me.node.state(), DiscoveryState::Closed);
    assert!(me.node.peers().is_empty());
    assert_eq!(me.renderer.last(), Vec::<String>::new());

    // A fresh search finds the publisher again.
    me.node.subscribe().await.unwrap();
    wait_for_condition(|| peer_names(&me.node) == ["Pixel 7"]).await.unwrap();
}

/// Teardown right after the search starts races the discoveries still being
/// applied on another worker; whatever was shown, the list ends empty.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_teardown_racing_discovery_leaves_empty_list() {
    for round in 0..20 {
        let medium = LoopbackMedium::new();
        let publishers: Vec<_> = (0..8)
            .map(|i| spawn_node(&medium, &format!("Device {i}"), 50))
            .collect();
        for p in &publishers {
            p.node.publish().await.unwrap();
        }
        let me = spawn_node(&medium, "Local", 100);

        me.node.subscribe().await.unwrap();
        me.node.teardown();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(me.node.peers().is_empty());
        let frames = me.renderer.frames();
        if let Some(last) = frames.last() {
            assert!(last.is_empty(), "round {round}: stale frame {last:?}");
        }
    }
}

/// Switching from search to publish closes the subscribe session first.
#[tokio::test]
async fn test_switching_role_replaces_session() {
    let medium = LoopbackMedium::new();
    let me = spawn_node(&medium, "Local", 100);

    let search = me.node.subscribe().await.unwrap();
    let publish = me.node.publish().await.unwrap();

    assert_eq!(search.state(), DiscoveryState::Closed);
    assert_eq!(publish.state(), DiscoveryState::Active);
    assert_eq!(medium.session_count(), 1);
}
