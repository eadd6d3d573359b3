use crate::*;

use serde_json::Value;

// ══════════════════════════════════════════════════════════════════════════════
//  HTTP API
// ══════════════════════════════════════════════════════════════════════════════

/// Serve a node's API on an ephemeral port. Returns the `/api` base URL.
async fn serve_api(node: Arc<DiscoveryNode>) -> Result<(String, broadcast::Receiver<()>)> {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let state = nearby_api::ApiState { node, shutdown_tx };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, nearby_api::router(state)).await.ok();
    });
    Ok((format!("http://{}/api", addr), shutdown_rx))
}

async fn get(url: &str) -> Value {
    reqwest::get(url).await.unwrap().json().await.unwrap()
}

async fn post(url: &str) -> (u16, String) {
    let resp = reqwest::Client::new().post(url).send().await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.text().await.unwrap())
}

#[tokio::test]
async fn test_api_search_list_connect_cancel() {
    let medium = LoopbackMedium::new();
    let pixel = spawn_node(&medium, "Pixel 7", 87);
    pixel.node.publish().await.unwrap();
    let me = spawn_node(&medium, "Local", 100);
    let (base, _shutdown) = serve_api(me.node.clone()).await.unwrap();

    let status = get(&format!("{base}/status")).await;
    assert_eq!(status["state"], "detached");

    let (code, body) = post(&format!("{base}/subscribe")).await;
    assert_eq!(code, 200, "{body}");
    let session: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(session["role"], "subscribe");
    assert_eq!(session["state"], "active");

    wait_for_condition(|| !me.node.peers().is_empty()).await.unwrap();
    let peers = get(&format!("{base}/peers")).await;
    assert_eq!(peers["peers"][0]["name"], "Pixel 7");
    assert_eq!(peers["peers"][0]["details"], "OS: 14, Battery: 87%");

    let (code, body) = post(&format!("{base}/peers/Pixel%207/connect")).await;
    assert_eq!(code, 200, "{body}");
    let connect: Value = serde_json::from_str(&body).unwrap();
    let id = connect["attempt"].as_u64().unwrap();

    let connections = me.node.connections().clone();
    wait_for_condition(|| {
        connections.status(nearby_services::AttemptId::from_raw(id))
            == Some(nearby_services::ConnectionStatus::Available)
    })
    .await
    .unwrap();

    let (code, body) = post(&format!("{base}/connections/{id}/cancel")).await;
    assert_eq!(code, 200, "{body}");
    assert!(body.contains("\"cancelled\":true"));

    wait_for_condition(|| {
        connections.status(nearby_services::AttemptId::from_raw(id))
            == Some(nearby_services::ConnectionStatus::Lost)
    })
    .await
    .unwrap();
    let listed = get(&format!("{base}/connections")).await;
    assert_eq!(
        listed["connections"][0]["history"],
        serde_json::json!(["pending", "available", "lost"])
    );
}

#[tokio::test]
async fn test_api_errors_carry_status_codes() {
    let medium = LoopbackMedium::new();
    let me = spawn_node(&medium, "Local", 100);
    let (base, _shutdown) = serve_api(me.node.clone()).await.unwrap();

    let (code, _) = post(&format!("{base}/peers/nobody/connect")).await;
    assert_eq!(code, 409);

    me.node.subscribe().await.unwrap();
    let (code, body) = post(&format!("{base}/peers/nobody/connect")).await;
    assert_eq!(code, 404);
    assert!(body.contains("nobody"));

    let (code, _) = post(&format!("{base}/connections/42/cancel")).await;
    assert_eq!(code, 404);

    me.radio.power_off();
    me.node.teardown();
    let (code, _) = post(&format!("{base}/publish")).await;
    assert_eq!(code, 503);
}

#[tokio::test]
async fn test_api_shutdown_signals_daemon() {
    let medium = LoopbackMedium::new();
    let me = spawn_node(&medium, "Local", 100);
    let (base, mut shutdown) = serve_api(me.node.clone()).await.unwrap();

    let (code, _) = post(&format!("{base}/daemon/shutdown")).await;
    assert_eq!(code, 200);
    tokio::time::timeout(WAIT, shutdown.recv()).await.unwrap().unwrap();
}
