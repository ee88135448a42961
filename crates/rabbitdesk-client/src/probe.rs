//! Per-target availability probe.
//!
//! `check` answers "is this target reachable right now?" with a short-lived
//! cached [`TargetStatus`]. Concurrent checks for the same target share one
//! probe call. A probe that exceeds the configured timeout resolves as
//! unavailable with error `"timeout"`; errors are recorded in the status,
//! never returned.
//!
//! ```text
//! no-data ──check──► checking ──► available | unavailable ──(ttl)──► no-data
//!                      ▲   │
//!  concurrent check ───┘   └── shared by every caller for that target
//! ```
//!
//! `invalidate` bumps the target's generation; a probe that completes for an
//! older generation still answers its own callers but is not cached.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared, join_all};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::time::Instant;

use rabbitdesk_config::ProbeConfig;
use rabbitdesk_core::{ClientError, ClientEvent, EventBroadcaster};

use crate::gateway::RequestGateway;
use crate::transport::ApiRequest;

/// Error string recorded when a probe exceeds its deadline.
pub const TIMEOUT_ERROR: &str = "timeout";

/// Outcome of the most recent probe of a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetStatus {
    pub target_id: String,
    pub is_available: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub last_checked: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
}

impl TargetStatus {
    fn available(target_id: String, response_time_ms: u64) -> Self {
        Self {
            target_id,
            is_available: true,
            last_checked: OffsetDateTime::now_utc(),
            error: None,
            response_time_ms: Some(response_time_ms),
        }
    }

    fn unavailable(target_id: String, error: impl Into<String>) -> Self {
        Self {
            target_id,
            is_available: false,
            last_checked: OffsetDateTime::now_utc(),
            error: Some(error.into()),
            response_time_ms: None,
        }
    }

    /// The status as a caller-facing error, for fast-failing loaders.
    pub fn to_error(&self) -> Option<ClientError> {
        (!self.is_available).then(|| {
            ClientError::unavailable(
                self.target_id.clone(),
                self.error.clone().unwrap_or_default(),
            )
        })
    }
}

/// Lightweight connectivity and authorization test against a target.
#[async_trait]
pub trait TargetProber: Send + Sync {
    async fn probe(&self, target: &str) -> Result<(), ClientError>;
}

/// Probes a target by fetching its overview through the gateway.
#[derive(Debug, Clone)]
pub struct GatewayProber {
    gateway: RequestGateway,
}

impl GatewayProber {
    pub fn new(gateway: RequestGateway) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl TargetProber for GatewayProber {
    async fn probe(&self, target: &str) -> Result<(), ClientError> {
        let path = format!("/api/targets/{}/overview", crate::loader::encode_segment(target));
        self.gateway.execute(ApiRequest::get(path)).await.map(|_| ())
    }
}

type ProbeFuture = Shared<BoxFuture<'static, TargetStatus>>;

struct InFlight {
    generation: u64,
    future: ProbeFuture,
}

struct Cached {
    status: TargetStatus,
    checked_at: Instant,
}

#[derive(Default)]
struct ProbeState {
    statuses: HashMap<String, Cached>,
    in_flight: HashMap<String, InFlight>,
    generations: HashMap<String, u64>,
    /// Last recorded availability, for transition events.
    availability: HashMap<String, bool>,
}

struct ProbeInner {
    prober: Arc<dyn TargetProber>,
    ttl: Duration,
    timeout: Duration,
    events: EventBroadcaster,
    state: Mutex<ProbeState>,
}

/// Deduplicating, caching availability checker.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct AvailabilityProbe {
    inner: Arc<ProbeInner>,
}

impl AvailabilityProbe {
    pub fn new(prober: Arc<dyn TargetProber>, config: &ProbeConfig, events: EventBroadcaster) -> Self {
        Self {
            inner: Arc::new(ProbeInner {
                prober,
                ttl: config.ttl,
                timeout: config.timeout,
                events,
                state: Mutex::new(ProbeState::default()),
            }),
        }
    }

    /// Returns the target's status, probing only if no fresh status is
    /// cached and no probe is already running.
    pub async fn check(&self, target: &str) -> TargetStatus {
        let future = {
            let mut state = self.inner.lock();
            if let Some(status) = state.fresh(target, self.inner.ttl) {
                tracing::trace!(target_id = target, "Using cached availability");
                return status;
            }
            if let Some(in_flight) = state.in_flight.get(target) {
                tracing::debug!(target_id = target, "Joining in-flight availability probe");
                in_flight.future.clone()
            } else {
                let generation = *state.generations.entry(target.to_string()).or_default();
                let future = ProbeInner::run(self.inner.clone(), target.to_string(), generation)
                    .boxed()
                    .shared();
                state.in_flight.insert(
                    target.to_string(),
                    InFlight {
                        generation,
                        future: future.clone(),
                    },
                );
                // Driven by the runtime so the marker is released even if
                // every caller goes away.
                tokio::spawn(future.clone());
                future
            }
        };
        future.await
    }

    /// Checks several targets concurrently.
    pub async fn check_all<I, S>(&self, targets: I) -> Vec<TargetStatus>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let targets: Vec<S> = targets.into_iter().collect();
        join_all(targets.iter().map(|t| self.check(t.as_ref()))).await
    }

    /// The cached status if still within its TTL. Never probes.
    pub fn get_cached(&self, target: &str) -> Option<TargetStatus> {
        self.inner.lock().fresh(target, self.inner.ttl)
    }

    /// Drops cached status for `target`, or for every target.
    ///
    /// Probes already running are detached: their callers still get an
    /// answer, but it is not cached.
    pub fn invalidate(&self, target: Option<&str>) {
        let mut state = self.inner.lock();
        match target {
            Some(target) => {
                *state.generations.entry(target.to_string()).or_default() += 1;
                state.statuses.remove(target);
                state.in_flight.remove(target);
                tracing::debug!(target_id = target, "Invalidated availability");
            }
            None => {
                for generation in state.generations.values_mut() {
                    *generation += 1;
                }
                state.statuses.clear();
                state.in_flight.clear();
                tracing::debug!("Invalidated all availability");
            }
        }
    }

    pub fn is_checking(&self, target: &str) -> bool {
        self.inner.lock().in_flight.contains_key(target)
    }

    pub(crate) fn downgrade(&self) -> WeakAvailabilityProbe {
        WeakAvailabilityProbe(Arc::downgrade(&self.inner))
    }
}

/// Non-owning handle, for callbacks the probe itself may reach.
#[derive(Clone)]
pub(crate) struct WeakAvailabilityProbe(Weak<ProbeInner>);

impl WeakAvailabilityProbe {
    pub(crate) fn upgrade(&self) -> Option<AvailabilityProbe> {
        self.0.upgrade().map(|inner| AvailabilityProbe { inner })
    }
}

impl std::fmt::Debug for AvailabilityProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvailabilityProbe")
            .field("ttl", &self.inner.ttl)
            .field("timeout", &self.inner.timeout)
            .finish_non_exhaustive()
    }
}

impl ProbeState {
    fn fresh(&self, target: &str, ttl: Duration) -> Option<TargetStatus> {
        self.statuses
            .get(target)
            .filter(|cached| cached.checked_at.elapsed() < ttl)
            .map(|cached| cached.status.clone())
    }
}

impl ProbeInner {
    fn lock(&self) -> MutexGuard<'_, ProbeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn run(self: Arc<Self>, target: String, generation: u64) -> TargetStatus {
        let started = Instant::now();
        let probe = AssertUnwindSafe(self.prober.probe(&target)).catch_unwind();
        let outcome = tokio::time::timeout(self.timeout, probe).await;
        let status = match outcome {
            Ok(Ok(Ok(()))) => {
                let elapsed = started.elapsed().as_millis();
                TargetStatus::available(target, u64::try_from(elapsed).unwrap_or(u64::MAX))
            }
            Ok(Ok(Err(e))) => TargetStatus::unavailable(target, e.to_string()),
            Ok(Err(_)) => {
                tracing::error!(target_id = %target, "Availability probe panicked");
                TargetStatus::unavailable(target, "probe panicked")
            }
            Err(_) => TargetStatus::unavailable(target, TIMEOUT_ERROR),
        };
        self.record(generation, &status);
        status
    }

    fn record(&self, generation: u64, status: &TargetStatus) {
        let target = status.target_id.as_str();
        let mut state = self.lock();

        if state
            .in_flight
            .get(target)
            .is_some_and(|in_flight| in_flight.generation == generation)
        {
            state.in_flight.remove(target);
        }

        let current = state.generations.get(target).copied().unwrap_or_default();
        if current != generation {
            tracing::debug!(target_id = target, generation, current, "Discarding superseded probe result");
            return;
        }

        state.statuses.insert(
            target.to_string(),
            Cached {
                status: status.clone(),
                checked_at: Instant::now(),
            },
        );
        let previous = state
            .availability
            .insert(target.to_string(), status.is_available);
        drop(state);

        match (previous, status.is_available) {
            (Some(false), true) => {
                tracing::info!(target_id = target, "Target recovered");
                self.events.send(ClientEvent::TargetRecovered {
                    target: target.to_string(),
                    response_time_ms: status.response_time_ms,
                });
            }
            (None | Some(true), false) => {
                let error = status.error.clone().unwrap_or_default();
                tracing::warn!(target_id = target, error = %error, "Target unavailable");
                self.events.send(ClientEvent::TargetUnavailable {
                    target: target.to_string(),
                    error,
                });
            }
            _ => {}
        }
    }
}
