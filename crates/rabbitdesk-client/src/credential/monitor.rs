//! Credential lifecycle monitor.
//!
//! The monitor owns the knowledge of how long the current access credential
//! has left. On every poll tick it:
//!
//! 1. derives a [`CredentialStatus`] from the stored token and the clock,
//! 2. notifies every status listener,
//! 3. ends the session if the credential is invalid,
//! 4. starts a refresh if the credential is about to expire,
//! 5. emits a single warning per threshold crossing.
//!
//! While a refresh is in flight, ticks stop after step 2.
//!
//! ## Single-flight refresh
//!
//! At most one refresh runs at a time. The refresh future is spawned onto the
//! runtime once and shared; [`CredentialMonitor::force_refresh`] callers and
//! poll ticks that arrive meanwhile await the same outcome.
//!
//! ## Generations
//!
//! Every credential replacement (refresh, login, logout, expiry) bumps a
//! generation counter. A refresh that completes after its generation was
//! superseded is discarded instead of overwriting the newer credential.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use rabbitdesk_config::CredentialConfig;
use rabbitdesk_core::{
    ClientError, ClientEvent, EventBroadcaster, ExpiryReason, ListenerHandle, ListenerRegistry,
    SharedClock, SystemClock,
};

use super::expiry::{ExpiryHandler, ExpiryNotice, LogExpiryHandler};
use super::refresh::{RefreshError, TokenRefresher, TokenResponse};
use super::status::{CredentialStatus, Thresholds};
use super::store::{CredentialStore, StoreError, StoredCredentials};
use super::token::decode_expiry;

type RefreshFuture = Shared<BoxFuture<'static, Result<String, ClientError>>>;

/// Builder for [`CredentialMonitor`].
pub struct CredentialMonitorBuilder {
    store: Arc<dyn CredentialStore>,
    thresholds: Thresholds,
    poll_interval: Duration,
    refresher: Option<Arc<dyn TokenRefresher>>,
    expiry_handler: Arc<dyn ExpiryHandler>,
    clock: SharedClock,
    events: EventBroadcaster,
}

impl CredentialMonitorBuilder {
    /// Applies thresholds and poll interval from configuration.
    #[must_use]
    pub fn config(mut self, config: &CredentialConfig) -> Self {
        self.thresholds = Thresholds::from(config);
        self.poll_interval = config.poll_interval;
        self
    }

    #[must_use]
    pub fn thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Without a refresher, credentials are never renewed and the session
    /// ends when the access token expires.
    #[must_use]
    pub fn refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    #[must_use]
    pub fn expiry_handler(mut self, handler: Arc<dyn ExpiryHandler>) -> Self {
        self.expiry_handler = handler;
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Publishes credential events on `events` instead of a private bus.
    #[must_use]
    pub fn events(mut self, events: EventBroadcaster) -> Self {
        self.events = events;
        self
    }

    pub fn build(self) -> CredentialMonitor {
        CredentialMonitor {
            inner: Arc::new(MonitorInner {
                store: self.store,
                thresholds: self.thresholds,
                poll_interval: self.poll_interval,
                refresher: self.refresher,
                expiry_handler: self.expiry_handler,
                clock: self.clock,
                events: self.events,
                listeners: ListenerRegistry::new(),
                state: Mutex::new(MonitorState::default()),
            }),
        }
    }
}

/// Watches the stored credential and keeps it alive.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CredentialMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    store: Arc<dyn CredentialStore>,
    thresholds: Thresholds,
    poll_interval: Duration,
    refresher: Option<Arc<dyn TokenRefresher>>,
    expiry_handler: Arc<dyn ExpiryHandler>,
    clock: SharedClock,
    events: EventBroadcaster,
    listeners: ListenerRegistry<CredentialStatus>,
    state: Mutex<MonitorState>,
}

#[derive(Default)]
struct MonitorState {
    generation: u64,
    warning_shown: bool,
    refresh: Option<RefreshFuture>,
    return_to: Option<String>,
    poller: Option<JoinHandle<()>>,
}

impl CredentialMonitor {
    /// Starts building a monitor over `store`.
    pub fn builder(store: Arc<dyn CredentialStore>) -> CredentialMonitorBuilder {
        let config = CredentialConfig::default();
        CredentialMonitorBuilder {
            store,
            thresholds: Thresholds::from(&config),
            poll_interval: config.poll_interval,
            refresher: None,
            expiry_handler: Arc::new(LogExpiryHandler),
            clock: SystemClock::shared(),
            events: EventBroadcaster::new(),
        }
    }

    /// Current credential status. Reads the store, never the network.
    pub fn status(&self) -> CredentialStatus {
        self.inner.status()
    }

    /// Runs one poll step and returns the status it observed.
    ///
    /// Must be called within a Tokio runtime: a refresh, if one is started,
    /// is spawned onto it.
    pub fn tick(&self) -> CredentialStatus {
        let status = self.inner.status();
        self.inner.listeners.notify(&status);

        if self.is_refreshing() {
            tracing::trace!("Refresh in flight, skipping transitions");
            return status;
        }

        if !status.is_valid {
            self.inner.expire(ExpiryReason::Expired);
            return status;
        }

        if status.needs_refresh && self.inner.begin_refresh().is_some() {
            return status;
        }

        let warning = {
            let mut state = self.inner.lock();
            if status.needs_warning && !state.warning_shown {
                state.warning_shown = true;
                true
            } else {
                if !status.needs_warning {
                    state.warning_shown = false;
                }
                false
            }
        };

        if warning {
            if let (Some(remaining_minutes), Some(expires_at)) =
                (status.remaining_minutes, status.expires_at)
            {
                tracing::info!(remaining_minutes, "Credential expires soon");
                self.inner.events.send(ClientEvent::CredentialWarning {
                    remaining_minutes,
                    expires_at,
                });
            }
        }

        status
    }

    /// Starts the periodic poll. The first tick runs immediately.
    ///
    /// Calling this while already monitoring replaces the previous timer.
    pub fn start_monitoring(&self) {
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.poll_interval;

        let mut state = self.inner.lock();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                CredentialMonitor { inner }.tick();
            }
        });
        if let Some(previous) = state.poller.replace(handle) {
            previous.abort();
        }
        drop(state);

        tracing::info!(interval = ?period, "Credential monitoring started");
    }

    /// Stops the periodic poll. An in-flight refresh still completes.
    pub fn stop_monitoring(&self) {
        if let Some(poller) = self.inner.lock().poller.take() {
            poller.abort();
            tracing::info!("Credential monitoring stopped");
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.inner
            .lock()
            .poller
            .as_ref()
            .is_some_and(|poller| !poller.is_finished())
    }

    /// Refreshes now, or joins the refresh already in flight.
    ///
    /// Returns the new access token. If there is no refresh path, or the
    /// refresh fails, the session is ended (store cleared, expiry handler
    /// invoked) and an error is returned.
    pub async fn force_refresh(&self) -> Result<String, ClientError> {
        match self.inner.begin_refresh() {
            Some(refresh) => refresh.await,
            None => {
                self.inner.expire(ExpiryReason::NoRefreshCredential);
                Err(ClientError::CredentialExpired)
            }
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.lock().refresh.is_some()
    }

    /// Returns `true` if a refresher is configured and the stored
    /// credentials include a refresh token.
    pub fn has_refresh_path(&self) -> bool {
        self.inner.refresher.is_some()
            && self
                .inner
                .load()
                .is_some_and(|credentials| credentials.refresh_token.is_some())
    }

    /// The current access token, if any.
    pub fn access_token(&self) -> Option<String> {
        self.inner.load().map(|credentials| credentials.access_token)
    }

    /// Stores credentials obtained by logging in. Any refresh still in flight
    /// for the previous credentials is discarded when it completes.
    pub fn set_credentials(&self, credentials: &StoredCredentials) -> Result<(), StoreError> {
        {
            let mut state = self.inner.lock();
            state.generation += 1;
            state.warning_shown = false;
        }
        self.inner.store.save(credentials)
    }

    /// Drops the stored credentials without invoking the expiry handler.
    pub fn clear(&self) -> Result<bool, StoreError> {
        {
            let mut state = self.inner.lock();
            state.generation += 1;
            state.warning_shown = false;
        }
        self.inner.store.clear()
    }

    /// Records where the user is, so an expiry can send them back after
    /// re-authentication.
    pub fn set_return_location(&self, location: Option<String>) {
        self.inner.lock().return_to = location;
    }

    /// Registers a status listener, called on every tick.
    pub fn add_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&CredentialStatus) + Send + Sync + 'static,
    {
        self.inner.listeners.add(listener)
    }

    /// Subscribes to credential events.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    /// The bus credential events are published on.
    pub fn events(&self) -> &EventBroadcaster {
        &self.inner.events
    }
}

impl std::fmt::Debug for CredentialMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialMonitor")
            .field("thresholds", &self.inner.thresholds)
            .field("poll_interval", &self.inner.poll_interval)
            .field("has_refresher", &self.inner.refresher.is_some())
            .finish_non_exhaustive()
    }
}

impl MonitorInner {
    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn load(&self) -> Option<StoredCredentials> {
        match self.store.load() {
            Ok(credentials) => credentials,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stored credentials");
                None
            }
        }
    }

    fn status(&self) -> CredentialStatus {
        let credentials = self.load();
        CredentialStatus::evaluate(
            credentials.as_ref().map(|c| c.access_token.as_str()),
            self.clock.now(),
            self.thresholds,
        )
    }

    /// Returns the in-flight refresh, starting one if there is a refresh
    /// path. `None` means no refresh is possible.
    fn begin_refresh(self: &Arc<Self>) -> Option<RefreshFuture> {
        let mut state = self.lock();
        if let Some(refresh) = &state.refresh {
            tracing::debug!("Joining in-flight credential refresh");
            return Some(refresh.clone());
        }

        let refresher = self.refresher.clone()?;
        let credentials = self.load()?;
        let refresh_token = credentials.refresh_token.clone()?;
        let generation = state.generation;

        let inner = Arc::clone(self);
        let refresh = async move {
            let outcome = refresher.refresh(&refresh_token).await;
            inner.finish_refresh(generation, credentials, outcome)
        }
        .boxed()
        .shared();

        state.refresh = Some(refresh.clone());
        drop(state);

        tracing::debug!(generation, "Starting credential refresh");
        // Driven by the runtime so a cancelled caller cannot strand it.
        tokio::spawn(refresh.clone());
        Some(refresh)
    }

    fn finish_refresh(
        &self,
        generation: u64,
        previous: StoredCredentials,
        outcome: Result<TokenResponse, RefreshError>,
    ) -> Result<String, ClientError> {
        let mut state = self.lock();
        state.refresh = None;

        if state.generation != generation {
            drop(state);
            tracing::debug!(generation, "Discarding superseded refresh result");
            return self
                .load()
                .map(|credentials| credentials.access_token)
                .ok_or(ClientError::CredentialExpired);
        }

        match outcome {
            Ok(response) => {
                state.generation += 1;
                state.warning_shown = false;
                drop(state);

                let access_token = response.access_token;
                let updated = StoredCredentials {
                    server: previous.server,
                    access_token: access_token.clone(),
                    refresh_token: response.refresh_token.or(previous.refresh_token),
                };
                if let Err(e) = self.store.save(&updated) {
                    tracing::warn!(error = %e, "Failed to persist refreshed credentials");
                }

                let expires_at = decode_expiry(&access_token);
                tracing::info!(expires_at = ?expires_at, "Credential refreshed");
                self.events
                    .send(ClientEvent::CredentialRefreshed { expires_at });
                Ok(access_token)
            }
            Err(e) => {
                drop(state);
                tracing::warn!(error = %e, "Credential refresh failed");
                let message = e.to_string();
                self.expire(ExpiryReason::RefreshFailed {
                    message: message.clone(),
                });
                Err(ClientError::refresh_failed(message))
            }
        }
    }

    /// Ends the session: clears the store, stops polling, publishes the
    /// expiry and invokes the handler.
    fn expire(&self, reason: ExpiryReason) {
        let (return_to, poller) = {
            let mut state = self.lock();
            state.generation += 1;
            state.warning_shown = false;
            (state.return_to.clone(), state.poller.take())
        };

        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "Failed to clear stored credentials");
        }
        if let Some(poller) = poller {
            poller.abort();
        }

        tracing::warn!(reason = %reason, "Credential expired");
        self.events.send(ClientEvent::CredentialExpired {
            reason: reason.clone(),
            return_to: return_to.clone(),
        });
        self.expiry_handler
            .on_expired(&ExpiryNotice { reason, return_to });
    }
}
