mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use rabbitdesk_client::credential::{MemoryCredentialStore, StoredCredentials};
use rabbitdesk_client::probe::TIMEOUT_ERROR;
use rabbitdesk_client::{ClientError, ClientSession, Method, NO_PARAMS, ResourceKind};
use rabbitdesk_config::ClientConfig;
use rabbitdesk_core::ManualClock;

use common::{CountingRefresher, NOW, RoutingTransport, SlowProber, token_expiring_in};

fn logged_in_store() -> Arc<MemoryCredentialStore> {
    Arc::new(MemoryCredentialStore::with_credentials(
        StoredCredentials::new("http://console.test", token_expiring_in(NOW, 3600, "admin"))
            .with_refresh_token("refresh-1"),
    ))
}

fn session_with_prober(prober: Arc<SlowProber>, transport: Arc<RoutingTransport>) -> ClientSession {
    ClientSession::builder(ClientConfig::default())
        .transport(transport)
        .refresher(CountingRefresher::issuing("unused".to_string()))
        .store(logged_in_store())
        .prober(prober)
        .clock(Arc::new(ManualClock::new(NOW)))
        .build()
}

#[tokio::test(start_paused = true)]
async fn concurrent_checks_for_one_cluster_make_one_probe_call() {
    let prober = SlowProber::new(Duration::from_millis(300));
    let session = session_with_prober(prober.clone(), RoutingTransport::new());

    let probe = session.probe();
    let (a, b) = tokio::join!(probe.check("cluster-1"), probe.check("cluster-1"));

    assert_eq!(prober.calls(), 1);
    assert_eq!(a, b);
    assert!(a.is_available);
}

#[tokio::test(start_paused = true)]
async fn slow_probe_resolves_unavailable_with_timeout_error() {
    let prober = SlowProber::new(Duration::from_secs(120));
    let session = session_with_prober(prober.clone(), RoutingTransport::new());

    let status = session.probe().check("cluster-1").await;

    assert!(!status.is_available);
    assert_eq!(status.error.as_deref(), Some(TIMEOUT_ERROR));
    assert!(status.response_time_ms.is_none());
    assert_eq!(session.probe().get_cached("cluster-1"), Some(status));
}

#[tokio::test(start_paused = true)]
async fn loader_serves_repeat_loads_from_cache() {
    let transport = RoutingTransport::new();
    transport.respond("/api/targets/c1/queues", 200, json!([{"name": "orders"}]));
    let prober = SlowProber::new(Duration::from_millis(5));
    let session = session_with_prober(prober.clone(), transport.clone());

    let params = vec![("vhost".to_string(), "/".to_string())];
    let first = session
        .loader()
        .load("c1", ResourceKind::Queues, &params)
        .await
        .unwrap();
    let second = session
        .loader()
        .load("c1", ResourceKind::Queues, &params)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(transport.calls_to("/api/targets/c1/queues"), 1);
    assert_eq!(prober.calls(), 1);
    assert_eq!(
        session.cache().get("c1", "queues", [("vhost", "/")]),
        Some(json!([{"name": "orders"}]))
    );
}

#[tokio::test(start_paused = true)]
async fn loader_fast_fails_on_unavailable_target() {
    let transport = RoutingTransport::new();
    transport.respond("/api/targets/c1/queues", 200, json!([]));
    let prober = SlowProber::new(Duration::from_millis(5));
    *prober.down.lock().unwrap() = Some("connection refused".to_string());
    let session = session_with_prober(prober.clone(), transport.clone());

    let err = session
        .loader()
        .load("c1", ResourceKind::Queues, &[])
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Unavailable { ref target, .. } if target == "c1"));
    assert!(err.is_retryable());
    assert_eq!(transport.calls_to("/api/targets/c1/queues"), 0);
}

#[tokio::test(start_paused = true)]
async fn writes_invalidate_affected_listings_only() {
    let transport = RoutingTransport::new();
    transport.respond("/api/targets/c1/queues", 200, json!([]));
    transport.respond("/api/targets/c1/bindings", 200, json!([]));
    transport.respond("/api/targets/c1/connections", 200, json!([]));
    transport.respond("/api/targets/c2/queues", 200, json!([]));
    transport.script(Method::Put, "/api/targets/c1/queues/orders", 201, json!(null));
    transport.script(Method::Delete, "/api/targets/c1/queues/orders", 204, json!(null));
    let session = session_with_prober(SlowProber::new(Duration::from_millis(1)), transport.clone());
    let loader = session.loader();

    for (target, kind) in [
        ("c1", ResourceKind::Queues),
        ("c1", ResourceKind::Bindings),
        ("c1", ResourceKind::Connections),
        ("c2", ResourceKind::Queues),
    ] {
        loader.load(target, kind, &[]).await.unwrap();
    }
    assert_eq!(session.cache().len(), 4);

    loader
        .create("c1", ResourceKind::Queues, "orders", json!({"durable": true}))
        .await
        .unwrap();

    assert!(session.cache().get("c1", "queues", NO_PARAMS).is_none());
    assert!(session.cache().get("c1", "bindings", NO_PARAMS).is_none());
    assert!(session.cache().get("c1", "connections", NO_PARAMS).is_some());
    assert!(session.cache().get("c2", "queues", NO_PARAMS).is_some());

    loader.load("c1", ResourceKind::Queues, &[]).await.unwrap();
    assert_eq!(transport.calls_to("/api/targets/c1/queues"), 2);

    loader
        .delete("c1", ResourceKind::Queues, "orders")
        .await
        .unwrap();
    assert!(session.cache().get("c1", "queues", NO_PARAMS).is_none());
}

#[tokio::test(start_paused = true)]
async fn failed_write_keeps_cache() {
    let transport = RoutingTransport::new();
    transport.respond("/api/targets/c1/queues", 200, json!([]));
    transport.script(
        Method::Delete,
        "/api/targets/c1/queues/orders",
        404,
        json!({"error": "Object Not Found"}),
    );
    let session = session_with_prober(SlowProber::new(Duration::from_millis(1)), transport.clone());

    session
        .loader()
        .load("c1", ResourceKind::Queues, &[])
        .await
        .unwrap();
    let err = session
        .loader()
        .delete("c1", ResourceKind::Queues, "orders")
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), Some(404));
    assert!(session.cache().get("c1", "queues", NO_PARAMS).is_some());
}

#[tokio::test(start_paused = true)]
async fn logout_tears_down_session_state() {
    let transport = RoutingTransport::new();
    transport.respond("/api/targets/c1/overview", 200, json!({"node": "rabbit@a"}));
    let prober = SlowProber::new(Duration::from_millis(1));
    let session = session_with_prober(prober.clone(), transport);

    session.start();
    session
        .loader()
        .load("c1", ResourceKind::Overview, &[])
        .await
        .unwrap();
    assert!(session.monitor().is_monitoring());
    assert!(session.probe().get_cached("c1").is_some());
    assert!(!session.cache().is_empty());

    assert!(session.logout().unwrap());

    assert!(!session.monitor().is_monitoring());
    assert!(session.monitor().access_token().is_none());
    assert!(session.cache().is_empty());
    assert!(session.probe().get_cached("c1").is_none());
}

#[tokio::test(start_paused = true)]
async fn load_in_flight_at_logout_does_not_repopulate_cache() {
    let transport = RoutingTransport::new();
    transport.respond("/api/targets/c1/queues", 200, json!([{"name": "secret-queue"}]));
    transport.set_latency(Duration::from_secs(1));
    let session = Arc::new(session_with_prober(
        SlowProber::new(Duration::from_millis(1)),
        transport.clone(),
    ));

    let loading = tokio::spawn({
        let session = session.clone();
        async move { session.loader().load("c1", ResourceKind::Queues, &[]).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.calls_to("/api/targets/c1/queues"), 1);

    session.logout().unwrap();
    let fetched = loading.await.unwrap().unwrap();

    assert_eq!(fetched, json!([{"name": "secret-queue"}]));
    assert!(session.cache().get("c1", "queues", NO_PARAMS).is_none());
    assert!(session.cache().is_empty());
}

#[tokio::test(start_paused = true)]
async fn credential_expiry_clears_cached_data_and_availability() {
    let transport = RoutingTransport::new();
    transport.respond("/api/targets/c1/queues", 200, json!([{"name": "orders"}]));
    let clock = Arc::new(ManualClock::new(NOW));
    let session = ClientSession::builder(ClientConfig::default())
        .transport(transport)
        .refresher(CountingRefresher::issuing("unused".to_string()))
        .store(logged_in_store())
        .prober(SlowProber::new(Duration::from_millis(1)))
        .clock(clock.clone())
        .build();

    session
        .loader()
        .load("c1", ResourceKind::Queues, &[])
        .await
        .unwrap();
    assert!(!session.cache().is_empty());
    assert!(session.probe().get_cached("c1").is_some());

    clock.advance(time::Duration::hours(2));
    let status = session.monitor().tick();

    assert!(!status.is_valid);
    assert!(session.monitor().access_token().is_none());
    assert!(session.cache().is_empty());
    assert!(session.probe().get_cached("c1").is_none());
}

#[tokio::test(start_paused = true)]
async fn login_restarts_monitoring_with_new_credentials() {
    let session = session_with_prober(SlowProber::new(Duration::from_millis(1)), RoutingTransport::new());
    session.logout().unwrap();

    let credentials =
        StoredCredentials::new("http://console.test", token_expiring_in(NOW, 7200, "ops"));
    session.login(&credentials).unwrap();

    assert!(session.monitor().is_monitoring());
    assert_eq!(session.monitor().access_token(), Some(credentials.access_token));
    assert!(session.monitor().status().is_valid);
}
