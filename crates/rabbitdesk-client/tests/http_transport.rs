mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use time::OffsetDateTime;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rabbitdesk_client::credential::{
    CredentialStore, MemoryCredentialStore, OAuthTokenRefresher, RefreshError, StoredCredentials,
    TokenRefresher,
};
use rabbitdesk_client::{
    ApiRequest, ClientSession, ReqwestTransport, ResourceKind, Transport, TransportError,
};
use rabbitdesk_config::ClientConfig;

use common::token_expiring_in;

fn transport(server: &MockServer) -> ReqwestTransport {
    ReqwestTransport::new(&server.uri(), Duration::from_secs(5))
}

#[tokio::test]
async fn transport_attaches_bearer_and_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/targets/c1/queues"))
        .and(header("authorization", "Bearer tok-1"))
        .and(query_param("vhost", "/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"name": "orders"}])))
        .expect(1)
        .mount(&server)
        .await;

    let resp = transport(&server)
        .send(
            &ApiRequest::get("/api/targets/c1/queues").with_query([("vhost", "/")]),
            Some("tok-1"),
        )
        .await
        .unwrap();

    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, json!([{"name": "orders"}]));
}

#[tokio::test]
async fn transport_returns_non_success_statuses_as_responses() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/targets/c1/queues/orders"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/targets/c1/overview"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    let t = transport(&server);
    let unauthorized = t
        .send(&ApiRequest::delete("/api/targets/c1/queues/orders"), None)
        .await
        .unwrap();
    assert_eq!(unauthorized.status, 401);
    assert_eq!(unauthorized.body, Value::Null);

    let bad_gateway = t
        .send(&ApiRequest::get("/api/targets/c1/overview"), None)
        .await
        .unwrap();
    assert_eq!(bad_gateway.status, 502);
    assert_eq!(bad_gateway.body, json!("Bad Gateway"));
}

#[tokio::test]
async fn transport_sends_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/targets/c1/queues/orders"))
        .and(body_string_contains("\"durable\":true"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let resp = transport(&server)
        .send(
            &ApiRequest::put("/api/targets/c1/queues/orders", json!({"durable": true})),
            Some("tok"),
        )
        .await
        .unwrap();
    assert_eq!(resp.status, 201);
}

#[tokio::test]
async fn transport_reports_unreachable_server() {
    // Bind then release a port so nothing is listening on it
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let err = ReqwestTransport::new(&format!("http://127.0.0.1:{port}"), Duration::from_secs(2))
        .send(&ApiRequest::get("/api/targets"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Connect(_)));
}

#[tokio::test]
async fn transport_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let err = ReqwestTransport::new(&server.uri(), Duration::from_millis(100))
        .send(&ApiRequest::get("/api/targets"), None)
        .await
        .unwrap_err();
    assert_eq!(err, TransportError::Timeout);
}

#[tokio::test]
async fn refresher_posts_refresh_grant() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=r-1"))
        .and(body_string_contains("client_id=console"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "new-access",
            "refresh_token": "r-2",
            "expires_in": 900
        })))
        .expect(1)
        .mount(&server)
        .await;

    let refresher = OAuthTokenRefresher::new(&server.uri(), "/auth/token", Duration::from_secs(5))
        .with_client_id("console");
    let resp = refresher.refresh("r-1").await.unwrap();

    assert_eq!(resp.access_token, "new-access");
    assert_eq!(resp.refresh_token.as_deref(), Some("r-2"));
    assert_eq!(resp.expires_in, Some(900));
}

#[tokio::test]
async fn refresher_reports_rejection_and_garbage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .and(body_string_contains("refresh_token=revoked"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .and(body_string_contains("refresh_token=weird"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let refresher = OAuthTokenRefresher::new(&server.uri(), "/auth/token", Duration::from_secs(5));

    assert_eq!(
        refresher.refresh("revoked").await.unwrap_err(),
        RefreshError::Rejected {
            status: 400,
            message: "invalid_grant".to_string()
        }
    );
    assert!(matches!(
        refresher.refresh("weird").await.unwrap_err(),
        RefreshError::InvalidResponse(_)
    ));
}

#[tokio::test]
async fn password_grant_encodes_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("username=ops"))
        .and(body_string_contains("password=p%40ss+w0rd"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "a"})))
        .expect(1)
        .mount(&server)
        .await;

    let refresher = OAuthTokenRefresher::new(&server.uri(), "auth/token", Duration::from_secs(5));
    let resp = refresher.password_grant("ops", "p@ss w0rd").await.unwrap();
    assert_eq!(resp.access_token, "a");
    assert!(resp.refresh_token.is_none());
}

#[tokio::test]
async fn session_refreshes_over_http_and_retries_once() {
    let server = MockServer::start().await;
    let now = OffsetDateTime::now_utc();
    let old = token_expiring_in(now, 3600, "admin");
    let new = token_expiring_in(now, 7200, "admin");

    Mock::given(method("GET"))
        .and(path("/api/targets/c1/queues"))
        .and(header("authorization", format!("Bearer {old}").as_str()))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "revoked"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/targets/c1/queues"))
        .and(header("authorization", format!("Bearer {new}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"name": "orders"}])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .and(body_string_contains("refresh_token=r-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": new})))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = ClientConfig::default();
    config.api.base_url = server.uri();
    config.probe.fast_fail = false;
    let store = Arc::new(MemoryCredentialStore::with_credentials(
        StoredCredentials::new(server.uri(), old).with_refresh_token("r-1"),
    ));
    let session = ClientSession::builder(config).store(store.clone()).build();

    let queues = session
        .loader()
        .load("c1", ResourceKind::Queues, &[])
        .await
        .unwrap();
    assert_eq!(queues, json!([{"name": "orders"}]));

    let stored = store.load().unwrap().unwrap();
    assert_eq!(stored.access_token, new);
    // Server sent no new refresh token; the old one is kept
    assert_eq!(stored.refresh_token.as_deref(), Some("r-1"));

    // Cached: no further HTTP traffic
    session
        .loader()
        .load("c1", ResourceKind::Queues, &[])
        .await
        .unwrap();
}
