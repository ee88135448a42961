//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{EncodingKey, Header};
use serde_json::{Value, json};
use time::OffsetDateTime;
use time::macros::datetime;

use rabbitdesk_client::credential::{RefreshError, TokenRefresher, TokenResponse};
use rabbitdesk_client::{
    ApiRequest, ApiResponse, ClientError, Method, TargetProber, Transport, TransportError,
};

/// Wall-clock instant the ManualClock-based tests run at.
pub const NOW: OffsetDateTime = datetime!(2026-05-04 10:00:00 UTC);

/// Mints an HS256 token whose `exp` is `seconds` after `base`.
pub fn token_expiring_in(base: OffsetDateTime, seconds: i64, subject: &str) -> String {
    let claims = json!({
        "sub": subject,
        "preferred_username": subject,
        "exp": base.unix_timestamp() + seconds,
    });
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"rabbitdesk-test-secret"),
    )
    .unwrap()
}

/// Token endpoint fake that hands out a fixed token after `delay`.
pub struct CountingRefresher {
    pub calls: AtomicUsize,
    pub delay: Duration,
    pub token: String,
    pub fail: bool,
}

impl CountingRefresher {
    pub fn issuing(token: String) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            token,
            fail: false,
        })
    }

    pub fn slow(token: String, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            token,
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            token: String::new(),
            fail: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenRefresher for CountingRefresher {
    async fn refresh(&self, _refresh_token: &str) -> Result<TokenResponse, RefreshError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(RefreshError::Network("connection reset".to_string()));
        }
        Ok(TokenResponse {
            access_token: self.token.clone(),
            refresh_token: Some("refresh-2".to_string()),
            expires_in: Some(3600),
        })
    }
}

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub bearer: Option<String>,
}

/// Transport fake answering per `(method, path)` from queued scripts, falling
/// back to a per-path default.
#[derive(Default)]
pub struct RoutingTransport {
    scripted: Mutex<HashMap<(Method, String), VecDeque<ApiResponse>>>,
    defaults: Mutex<HashMap<String, ApiResponse>>,
    calls: Mutex<Vec<Call>>,
    latency: Mutex<Duration>,
}

impl RoutingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues one response for the next `(method, path)` call.
    pub fn script(&self, method: Method, path: &str, status: u16, body: Value) {
        self.scripted
            .lock()
            .unwrap()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(ApiResponse::new(status, body));
    }

    /// Response for any call to `path` without a queued script.
    pub fn respond(&self, path: &str, status: u16, body: Value) {
        self.defaults
            .lock()
            .unwrap()
            .insert(path.to_string(), ApiResponse::new(status, body));
    }

    /// Delays every subsequent response by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.path == path)
            .count()
    }
}

#[async_trait]
impl Transport for RoutingTransport {
    async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, TransportError> {
        self.calls.lock().unwrap().push(Call {
            method: request.method,
            path: request.path.clone(),
            bearer: bearer.map(str::to_string),
        });
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(&(request.method, request.path.clone()))
            .and_then(VecDeque::pop_front);
        if let Some(response) = scripted {
            return Ok(response);
        }
        match self.defaults.lock().unwrap().get(&request.path) {
            Some(response) => Ok(response.clone()),
            None => Err(TransportError::Connect(format!(
                "no route for {} {}",
                request.method, request.path
            ))),
        }
    }
}

/// Prober fake with a fixed latency and a switchable outcome.
pub struct SlowProber {
    pub calls: AtomicUsize,
    pub delay: Duration,
    pub down: Mutex<Option<String>>,
}

impl SlowProber {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            down: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TargetProber for SlowProber {
    async fn probe(&self, target: &str) -> Result<(), ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        match self.down.lock().unwrap().clone() {
            Some(reason) => Err(ClientError::unavailable(target, reason)),
            None => Ok(()),
        }
    }
}
