mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use rabbitdesk_client::credential::{
    CredentialStore, ExpiryNotice, MemoryCredentialStore, StoredCredentials,
};
use rabbitdesk_client::{ApiRequest, ClientError, ClientSession, Method, NO_PARAMS};
use rabbitdesk_config::ClientConfig;
use rabbitdesk_core::{ExpiryReason, ManualClock};

use common::{CountingRefresher, NOW, RoutingTransport, token_expiring_in};

const QUEUES: &str = "/api/targets/c1/queues";

struct Fixture {
    session: ClientSession,
    transport: Arc<RoutingTransport>,
    refresher: Arc<CountingRefresher>,
    store: Arc<MemoryCredentialStore>,
    notices: Arc<Mutex<Vec<ExpiryNotice>>>,
}

fn fixture(refresh_token: Option<&str>, refresher: Arc<CountingRefresher>) -> Fixture {
    let mut credentials =
        StoredCredentials::new("http://console.test", token_expiring_in(NOW, 3600, "old"));
    credentials.refresh_token = refresh_token.map(str::to_string);
    let store = Arc::new(MemoryCredentialStore::with_credentials(credentials));
    let transport = RoutingTransport::new();
    let notices: Arc<Mutex<Vec<ExpiryNotice>>> = Arc::default();
    let seen = notices.clone();

    let mut config = ClientConfig::default();
    config.probe.fast_fail = false;

    let session = ClientSession::builder(config)
        .transport(transport.clone())
        .refresher(refresher.clone())
        .store(store.clone())
        .clock(Arc::new(ManualClock::new(NOW)))
        .expiry_handler(Arc::new(move |notice: &ExpiryNotice| {
            seen.lock().unwrap().push(notice.clone())
        }))
        .build();

    Fixture {
        session,
        transport,
        refresher,
        store,
        notices,
    }
}

#[tokio::test]
async fn unauthorized_then_refresh_then_success_resolves_as_success() {
    let new_token = token_expiring_in(NOW, 3600, "new");
    let f = fixture(Some("refresh-1"), CountingRefresher::issuing(new_token.clone()));
    f.transport.script(Method::Get, QUEUES, 401, json!({"error": "token expired"}));
    f.transport.script(Method::Get, QUEUES, 200, json!([{"name": "orders"}]));

    let resp = f
        .session
        .gateway()
        .execute(ApiRequest::get(QUEUES))
        .await
        .unwrap();

    assert_eq!(resp.body, json!([{"name": "orders"}]));
    assert_eq!(f.refresher.calls(), 1);

    let calls = f.transport.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(
        calls[0].bearer.as_deref(),
        Some(token_expiring_in(NOW, 3600, "old").as_str())
    );
    assert_eq!(calls[1].bearer.as_deref(), Some(new_token.as_str()));
    assert_eq!(f.store.load().unwrap().unwrap().access_token, new_token);
}

#[tokio::test]
async fn second_unauthorized_after_refresh_is_terminal() {
    let f = fixture(
        Some("refresh-1"),
        CountingRefresher::issuing(token_expiring_in(NOW, 3600, "new")),
    );
    f.transport.script(Method::Get, QUEUES, 401, json!({"error": "expired"}));
    f.transport.script(Method::Get, QUEUES, 401, json!({"error": "still no"}));
    f.transport.script(Method::Get, QUEUES, 200, json!([]));

    let err = f
        .session
        .gateway()
        .execute(ApiRequest::get(QUEUES))
        .await
        .unwrap_err();

    assert_eq!(err, ClientError::authorization_denied(401, "still no"));
    assert_eq!(f.transport.calls_to(QUEUES), 2);
    assert_eq!(f.refresher.calls(), 1);
    // Refresh succeeded, so the session survives
    assert!(f.notices.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unauthorized_without_refresh_token_redirects_to_login() {
    let f = fixture(None, CountingRefresher::issuing("unused".to_string()));
    f.transport.script(Method::Get, QUEUES, 401, json!({"error": "expired"}));
    f.session.monitor().set_return_location(Some("/targets/c1/queues".to_string()));
    f.session.cache().set("c1", "exchanges", json!([]), NO_PARAMS, None);

    let err = f
        .session
        .gateway()
        .execute(ApiRequest::get(QUEUES))
        .await
        .unwrap_err();

    assert!(err.is_auth_failure());
    assert_eq!(err.status_code(), Some(401));
    assert_eq!(f.refresher.calls(), 0);
    assert_eq!(f.transport.calls_to(QUEUES), 1);

    assert!(f.store.load().unwrap().is_none());
    assert!(f.session.cache().is_empty());
    let notices = f.notices.lock().unwrap();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].reason, ExpiryReason::NoRefreshCredential);
    assert_eq!(notices[0].return_to.as_deref(), Some("/targets/c1/queues"));
}

#[tokio::test]
async fn failed_refresh_surfaces_authorization_failure() {
    let f = fixture(Some("refresh-1"), CountingRefresher::failing());
    f.transport.script(Method::Get, QUEUES, 401, json!({"error": "expired"}));

    let err = f
        .session
        .gateway()
        .execute(ApiRequest::get(QUEUES))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), Some(401));
    assert_eq!(f.refresher.calls(), 1);
    assert!(f.store.load().unwrap().is_none());
    assert!(matches!(
        f.notices.lock().unwrap()[0].reason,
        ExpiryReason::RefreshFailed { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn concurrent_unauthorized_requests_share_one_refresh() {
    let new_token = token_expiring_in(NOW, 3600, "new");
    let f = fixture(
        Some("refresh-1"),
        CountingRefresher::slow(new_token.clone(), Duration::from_millis(200)),
    );
    let exchanges_path = "/api/targets/c1/exchanges";
    f.transport.script(Method::Get, QUEUES, 401, json!({}));
    f.transport.script(Method::Get, QUEUES, 200, json!(["q"]));
    f.transport.script(Method::Get, exchanges_path, 401, json!({}));
    f.transport.script(Method::Get, exchanges_path, 200, json!(["x"]));

    let gateway = f.session.gateway();
    let (queues, exchanges) = tokio::join!(
        gateway.execute(ApiRequest::get(QUEUES)),
        gateway.execute(ApiRequest::get(exchanges_path)),
    );

    assert_eq!(queues.unwrap().body, json!(["q"]));
    assert_eq!(exchanges.unwrap().body, json!(["x"]));
    assert_eq!(f.refresher.calls(), 1);
    assert!(
        f.transport
            .calls()
            .iter()
            .skip(2)
            .all(|call| call.bearer.as_deref() == Some(new_token.as_str()))
    );
}

#[tokio::test]
async fn other_failures_pass_through_without_retry() {
    let f = fixture(
        Some("refresh-1"),
        CountingRefresher::issuing(token_expiring_in(NOW, 3600, "new")),
    );
    f.transport.script(Method::Get, QUEUES, 503, json!({"error": "node down"}));
    f.transport.script(Method::Get, QUEUES, 403, json!({"error": "not allowed"}));
    f.transport.script(Method::Get, QUEUES, 404, json!({"error": "no such vhost"}));

    let server = f.session.gateway().execute(ApiRequest::get(QUEUES)).await.unwrap_err();
    assert_eq!(
        server,
        ClientError::Server {
            status: 503,
            message: "node down".to_string()
        }
    );
    assert!(server.is_retryable());

    let forbidden = f.session.gateway().execute(ApiRequest::get(QUEUES)).await.unwrap_err();
    assert_eq!(forbidden.status_code(), Some(403));
    assert!(forbidden.is_auth_failure());

    let missing = f.session.gateway().execute(ApiRequest::get(QUEUES)).await.unwrap_err();
    assert_eq!(missing.status_code(), Some(404));
    assert!(!missing.is_retryable());

    assert_eq!(f.transport.calls_to(QUEUES), 3);
    assert_eq!(f.refresher.calls(), 0);
}
