use crate::*;

use nearby_services::{
    AttachError, DiscoveryState, NodeError, Notice, PublishError, SessionFailure,
    SubscribeError,
};
use nearby_core::permission::Permission;

// ══════════════════════════════════════════════════════════════════════════════
//  Session failures
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_radio_off_fails_attach() {
    let medium = LoopbackMedium::new();
    let me = spawn_node(&medium, "Local", 100);
    me.radio.power_off();

    let err = me.node.subscribe().await.err().unwrap();
    assert!(matches!(err, NodeError::Attach(AttachError::Unavailable)));
    assert_eq!(me.node.state(), DiscoveryState::Failed);

    me.radio.power_on();
    me.node.subscribe().await.unwrap();
    assert_eq!(me.node.state(), DiscoveryState::Active);
}

#[tokio::test]
async fn test_denied_attach_fails_session() {
    let medium = LoopbackMedium::new();
    let me = spawn_node(&medium, "Local", 100);
    me.radio.set_deny_attach(true);
    let mut notices = me.node.notices();

    let err = me.node.publish().await.err().unwrap();
    assert!(matches!(
        err,
        NodeError::SessionFailed(SessionFailure::Attach(AttachError::Denied(_)))
    ));
    wait_for_notice(&mut notices, |n| matches!(n, Notice::SessionFailed { .. }))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rejected_config_fails_synchronously() {
    let medium = LoopbackMedium::new();
    let me = spawn_node(&medium, "Local", 100);
    me.radio.set_reject_configs(true);

    let err = me.node.publish().await.err().unwrap();
    assert!(matches!(err, NodeError::Publish(PublishError::ConfigRejected(_))));
    assert_eq!(me.node.state(), DiscoveryState::Failed);
    // Nothing was left open on the medium.
    assert_eq!(medium.session_count(), 0);
}

#[tokio::test]
async fn test_session_config_failure_is_reported() {
    let medium = LoopbackMedium::new();
    let me = spawn_node(&medium, "Local", 100);
    me.radio.set_fail_configs(true);

    let err = me.node.subscribe().await.err().unwrap();
    assert!(matches!(
        err,
        NodeError::SessionFailed(SessionFailure::Subscribe(SubscribeError::SessionConfigFailed(_)))
    ));
    let failed = me.node.current().unwrap();
    assert_eq!(failed.state(), DiscoveryState::Failed);
    assert!(failed.attach().is_err());
}

/// The service ending an active session moves it to Failed and empties the list.
#[tokio::test]
async fn test_service_termination_fails_active_session() {
    let medium = LoopbackMedium::new();
    let pixel = spawn_node(&medium, "Pixel 7", 87);
    let me = spawn_node(&medium, "Local", 100);
    pixel.node.publish().await.unwrap();
    me.node.subscribe().await.unwrap();
    wait_for_condition(|| !me.node.peers().is_empty()).await.unwrap();
    let mut notices = me.node.notices();

    me.radio.power_off();
    let notice = wait_for_notice(&mut notices, |n| matches!(n, Notice::SessionFailed { .. }))
        .await
        .unwrap();

    assert_eq!(
        notice,
        Notice::SessionFailed {
            failure: SessionFailure::Terminated
        }
    );
    assert_eq!(me.node.state(), DiscoveryState::Failed);
    assert!(me.node.peers().is_empty());
    assert_eq!(me.renderer.last(), Vec::<String>::new());
}

#[tokio::test]
async fn test_missing_permissions_refuse_discovery() {
    let medium = LoopbackMedium::new();
    let radio = medium.device("Local");
    let node = DiscoveryNode::new(
        NodeCollaborators {
            service: radio.clone(),
            negotiator: radio,
            permissions: Arc::new(StaticPermissionGate::new([Permission::Internet])),
            device: Arc::new(StaticDeviceInfo::new("Local", "14", 100)),
            renderer: Arc::new(CapturingRenderer::default()),
        },
        SERVICE,
    );

    let err = node.publish().await.err().unwrap();
    match err {
        NodeError::PermissionsDenied(denied) => assert_eq!(denied.len(), 5),
        other => panic!("expected PermissionsDenied, got {other}"),
    }
    assert_eq!(medium.session_count(), 0);
}
