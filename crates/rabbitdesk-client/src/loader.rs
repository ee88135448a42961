//! Resource loading use cases.
//!
//! "Load queues for cluster X" and friends. The loader consults the cache,
//! optionally fast-fails on targets the probe reports down, fetches through
//! the gateway and writes the result back. Writes invalidate every cached
//! resource they can affect.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use rabbitdesk_core::ClientError;

use crate::cache::{CacheKey, ResponseCache};
use crate::gateway::RequestGateway;
use crate::probe::AvailabilityProbe;
use crate::transport::ApiRequest;

/// Broker resources exposed by the console API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Overview,
    Queues,
    Exchanges,
    Bindings,
    Connections,
    Channels,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Overview,
        ResourceKind::Queues,
        ResourceKind::Exchanges,
        ResourceKind::Bindings,
        ResourceKind::Connections,
        ResourceKind::Channels,
    ];

    /// Path segment and cache resource name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Overview => "overview",
            ResourceKind::Queues => "queues",
            ResourceKind::Exchanges => "exchanges",
            ResourceKind::Bindings => "bindings",
            ResourceKind::Connections => "connections",
            ResourceKind::Channels => "channels",
        }
    }

    /// Whether named items of this kind can be created and deleted.
    pub fn is_writable(&self) -> bool {
        matches!(self, ResourceKind::Queues | ResourceKind::Exchanges)
    }

    /// Kinds whose cached listings a write to this kind makes stale.
    fn affected_by_write(&self) -> &'static [ResourceKind] {
        match self {
            ResourceKind::Queues => &[
                ResourceKind::Queues,
                ResourceKind::Bindings,
                ResourceKind::Overview,
            ],
            ResourceKind::Exchanges => &[
                ResourceKind::Exchanges,
                ResourceKind::Bindings,
                ResourceKind::Overview,
            ],
            ResourceKind::Overview => &[ResourceKind::Overview],
            ResourceKind::Bindings => &[ResourceKind::Bindings, ResourceKind::Overview],
            ResourceKind::Connections => &[
                ResourceKind::Connections,
                ResourceKind::Channels,
                ResourceKind::Overview,
            ],
            ResourceKind::Channels => &[ResourceKind::Channels, ResourceKind::Overview],
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let singular = normalized.trim_end_matches('s');
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized || kind.as_str().trim_end_matches('s') == singular)
            .ok_or_else(|| format!("unknown resource kind '{s}'"))
    }
}

/// Percent-encodes one path segment. `/` is the default vhost name, so
/// it must survive as `%2F`.
pub fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Cache-first loader over the gateway.
#[derive(Debug, Clone)]
pub struct ResourceLoader {
    cache: Arc<ResponseCache<Value>>,
    gateway: RequestGateway,
    probe: AvailabilityProbe,
    fast_fail: bool,
}

impl ResourceLoader {
    pub fn new(
        cache: Arc<ResponseCache<Value>>,
        gateway: RequestGateway,
        probe: AvailabilityProbe,
        fast_fail: bool,
    ) -> Self {
        Self {
            cache,
            gateway,
            probe,
            fast_fail,
        }
    }

    /// Loads `kind` for `target`, from the cache when possible.
    pub async fn load(
        &self,
        target: &str,
        kind: ResourceKind,
        params: &[(String, String)],
    ) -> Result<Value, ClientError> {
        self.load_with_ttl(target, kind, params, None).await
    }

    /// Like [`load`](Self::load), caching a fetched result for `ttl`
    /// instead of the cache default.
    pub async fn load_with_ttl(
        &self,
        target: &str,
        kind: ResourceKind,
        params: &[(String, String)],
        ttl: Option<Duration>,
    ) -> Result<Value, ClientError> {
        let key = CacheKey::new(target, kind.as_str(), params.iter().map(|(k, v)| (k, v)));
        if let Some(value) = self.cache.get_key(&key) {
            return Ok(value);
        }
        // Logout and expiry clear the cache; a fetch that straddles either
        // must not repopulate it.
        let epoch = self.cache.epoch();

        if self.fast_fail {
            if let Some(err) = self.probe.check(target).await.to_error() {
                tracing::debug!(target_id = target, kind = %kind, "Fast-failing load");
                return Err(err);
            }
        }

        let request = ApiRequest::get(collection_path(target, kind)).with_query(params.to_vec());
        let response = self.gateway.execute(request).await?;
        self.cache.set_key_if_epoch(epoch, key, response.body.clone(), ttl);
        Ok(response.body)
    }

    /// Drops cached data for `(target, kind)` and loads it again.
    pub async fn reload(
        &self,
        target: &str,
        kind: ResourceKind,
        params: &[(String, String)],
    ) -> Result<Value, ClientError> {
        self.cache.invalidate(target, Some(kind.as_str()));
        self.load(target, kind, params).await
    }

    /// Creates or updates the named item.
    pub async fn create(
        &self,
        target: &str,
        kind: ResourceKind,
        name: &str,
        body: Value,
    ) -> Result<Value, ClientError> {
        let request = ApiRequest::put(item_path(target, kind, name), body);
        self.write(target, kind, request).await
    }

    /// Deletes the named item.
    pub async fn delete(
        &self,
        target: &str,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Value, ClientError> {
        let request = ApiRequest::delete(item_path(target, kind, name));
        self.write(target, kind, request).await
    }

    async fn write(
        &self,
        target: &str,
        kind: ResourceKind,
        request: ApiRequest,
    ) -> Result<Value, ClientError> {
        if self.fast_fail {
            if let Some(err) = self.probe.check(target).await.to_error() {
                return Err(err);
            }
        }

        let response = self.gateway.execute(request).await?;
        for affected in kind.affected_by_write() {
            self.cache.invalidate(target, Some(affected.as_str()));
        }
        Ok(response.body)
    }

    pub fn cache(&self) -> &ResponseCache<Value> {
        &self.cache
    }

    pub fn probe(&self) -> &AvailabilityProbe {
        &self.probe
    }
}

fn collection_path(target: &str, kind: ResourceKind) -> String {
    format!("/api/targets/{}/{}", encode_segment(target), kind.as_str())
}

fn item_path(target: &str, kind: ResourceKind, name: &str) -> String {
    format!("{}/{}", collection_path(target, kind), encode_segment(name))
}
