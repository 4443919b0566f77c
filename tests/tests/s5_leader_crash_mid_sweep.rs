//! S5 — leader loses its lock between teardown and configure; the sweep
//! must abort before issuing any `/control/on` calls and must not commit.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pod_agent::driver::Driver;
use shared::api::ClusterSnapshot;
use shared::paths;
use tokio::sync::mpsc;

#[tokio::test]
async fn lock_loss_after_teardown_aborts_before_configure() {
    let (client, _memory) = common::shared_store();
    let cluster = "marathon.demo".to_string();

    let peer = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/control/check"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .mount(&peer)
        .await;
    Mock::given(method("POST"))
        .and(path("/control/off"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"state": "stopped"})))
        .mount(&peer)
        .await;
    Mock::given(method("POST"))
        .and(path("/control/on"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"state": "running"})))
        .mount(&peer)
        .await;

    let member = common::descriptor(&cluster, peer.address().port());
    let snapshot = ClusterSnapshot {
        members: vec![member],
        dependencies: Default::default(),
    };

    let driver = Arc::new(Driver::new(client.clone(), cluster.clone(), Duration::from_millis(10), false));
    let (sweep_tx, sweep_rx) = mpsc::channel(1);

    // True the first time (checked in `run` before the sweep starts), false
    // on every call after (checked in `sweep` right after teardown).
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_for_closure = calls.clone();
    let is_leader: Arc<dyn Fn() -> bool + Send + Sync> = Arc::new(move || {
        calls_for_closure.fetch_add(1, Ordering::SeqCst) == 0
    });

    sweep_tx.send(snapshot).await.unwrap();
    drop(sweep_tx);
    driver.run(sweep_rx, is_leader).await;

    // Give any wrongly-issued /control/on request time to land before we
    // inspect the mock server's received requests.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let requests = peer.received_requests().await.unwrap();
    assert!(requests.iter().any(|r| r.url.path() == "/control/check"));
    assert!(requests.iter().any(|r| r.url.path() == "/control/off"));
    assert!(
        requests.iter().all(|r| r.url.path() != "/control/on"),
        "configure must not run once the lock is lost"
    );

    assert!(client.get(&paths::hash_node(&cluster)).await.unwrap().is_none());
}
