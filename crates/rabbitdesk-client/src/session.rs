//! Client session: owns one instance of every component.
//!
//! A [`ClientSession`] is created at client startup and torn down at logout.
//! Nothing in this crate is a global; everything hangs off the session.

use std::sync::{Arc, OnceLock};

use serde_json::Value;

use rabbitdesk_config::ClientConfig;
use rabbitdesk_core::{EventBroadcaster, SharedClock, SystemClock};

use crate::cache::ResponseCache;
use crate::credential::{
    CredentialMonitor, CredentialStore, ExpiryHandler, ExpiryNotice, LogExpiryHandler,
    MemoryCredentialStore, OAuthTokenRefresher, StoreError, StoredCredentials, TokenRefresher,
};
use crate::gateway::RequestGateway;
use crate::loader::ResourceLoader;
use crate::probe::{AvailabilityProbe, GatewayProber, TargetProber, WeakAvailabilityProbe};
use crate::transport::{ReqwestTransport, Transport};

/// Builder for [`ClientSession`]. Every collaborator has a production
/// default derived from the configuration.
pub struct SessionBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    store: Option<Arc<dyn CredentialStore>>,
    prober: Option<Arc<dyn TargetProber>>,
    expiry_handler: Option<Arc<dyn ExpiryHandler>>,
    clock: Option<SharedClock>,
}

impl SessionBuilder {
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replaces the default prober, which fetches the target overview
    /// through the session's gateway.
    #[must_use]
    pub fn prober(mut self, prober: Arc<dyn TargetProber>) -> Self {
        self.prober = Some(prober);
        self
    }

    #[must_use]
    pub fn expiry_handler(mut self, handler: Arc<dyn ExpiryHandler>) -> Self {
        self.expiry_handler = Some(handler);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> ClientSession {
        let config = self.config;
        let events = EventBroadcaster::new();
        let cache = Arc::new(ResponseCache::from_config(&config.cache));

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(ReqwestTransport::from_config(&config.api)));
        let refresher = self
            .refresher
            .unwrap_or_else(|| Arc::new(OAuthTokenRefresher::from_config(&config.api)));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryCredentialStore::new()));
        let clock = self.clock.unwrap_or_else(SystemClock::shared);

        // Probe results and cached data belong to the credential that
        // fetched them; both go when it does.
        let probe_slot: Arc<OnceLock<WeakAvailabilityProbe>> = Arc::default();
        let expiry_handler = Arc::new(SessionExpiryHandler {
            cache: cache.clone(),
            probe: probe_slot.clone(),
            downstream: self
                .expiry_handler
                .unwrap_or_else(|| Arc::new(LogExpiryHandler)),
        });

        let monitor = CredentialMonitor::builder(store)
            .config(&config.credential)
            .refresher(refresher)
            .expiry_handler(expiry_handler)
            .clock(clock)
            .events(events.clone())
            .build();
        let gateway = RequestGateway::new(transport, monitor.clone());

        let prober = self
            .prober
            .unwrap_or_else(|| Arc::new(GatewayProber::new(gateway.clone())));
        let probe = AvailabilityProbe::new(prober, &config.probe, events.clone());
        let _ = probe_slot.set(probe.downgrade());

        let loader = ResourceLoader::new(
            cache.clone(),
            gateway.clone(),
            probe.clone(),
            config.probe.fast_fail,
        );

        ClientSession {
            config,
            events,
            cache,
            monitor,
            gateway,
            probe,
            loader,
        }
    }
}

/// Clears session state on credential loss, then hands over to the
/// embedder's handler.
struct SessionExpiryHandler {
    cache: Arc<ResponseCache<Value>>,
    probe: Arc<OnceLock<WeakAvailabilityProbe>>,
    downstream: Arc<dyn ExpiryHandler>,
}

impl ExpiryHandler for SessionExpiryHandler {
    fn on_expired(&self, notice: &ExpiryNotice) {
        self.cache.clear();
        if let Some(probe) = self.probe.get().and_then(WeakAvailabilityProbe::upgrade) {
            probe.invalidate(None);
        }
        self.downstream.on_expired(notice);
    }
}

/// A running client: cache, credential monitor, gateway, probe and loader
/// sharing one configuration and one event bus.
#[derive(Debug)]
pub struct ClientSession {
    config: ClientConfig,
    events: EventBroadcaster,
    cache: Arc<ResponseCache<Value>>,
    monitor: CredentialMonitor,
    gateway: RequestGateway,
    probe: AvailabilityProbe,
    loader: ResourceLoader,
}

impl ClientSession {
    pub fn builder(config: ClientConfig) -> SessionBuilder {
        SessionBuilder {
            config,
            transport: None,
            refresher: None,
            store: None,
            prober: None,
            expiry_handler: None,
            clock: None,
        }
    }

    /// Session with production collaborators and an in-memory store.
    pub fn new(config: ClientConfig) -> Self {
        Self::builder(config).build()
    }

    /// Starts credential monitoring. Must be called within a Tokio runtime.
    pub fn start(&self) {
        self.monitor.start_monitoring();
    }

    /// Stores freshly obtained credentials and (re)starts monitoring.
    pub fn login(&self, credentials: &StoredCredentials) -> Result<(), StoreError> {
        self.cache.clear();
        self.probe.invalidate(None);
        self.monitor.set_credentials(credentials)?;
        self.monitor.start_monitoring();
        tracing::info!(server = %credentials.server, "Logged in");
        Ok(())
    }

    /// Tears the session down: stops monitoring, forgets the credential and
    /// drops cached data and probe results.
    pub fn logout(&self) -> Result<bool, StoreError> {
        self.monitor.stop_monitoring();
        self.cache.clear();
        self.probe.invalidate(None);
        let removed = self.monitor.clear()?;
        tracing::info!("Logged out");
        Ok(removed)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    pub fn cache(&self) -> &ResponseCache<Value> {
        &self.cache
    }

    pub fn monitor(&self) -> &CredentialMonitor {
        &self.monitor
    }

    pub fn gateway(&self) -> &RequestGateway {
        &self.gateway
    }

    pub fn probe(&self) -> &AvailabilityProbe {
        &self.probe
    }

    pub fn loader(&self) -> &ResourceLoader {
        &self.loader
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.monitor.stop_monitoring();
    }
}
