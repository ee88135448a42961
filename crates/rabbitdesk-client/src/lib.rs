//! # rabbitdesk-client
//!
//! Client-side resilience layer for the RabbitDesk management console.
//!
//! The console talks to broker clusters through an untrusted, possibly slow
//! network while holding a short-lived bearer credential. This crate keeps it
//! correct and responsive:
//!
//! - [`cache`] - TTL and size bounded response cache with FIFO eviction
//! - [`credential`] - credential status, refresh and expiry ([`CredentialMonitor`])
//! - [`gateway`] - request dispatch with a single refresh-and-retry on 401
//! - [`probe`] - deduplicated, cached per-target availability checks
//! - [`loader`] - cache-first resource loading on top of the above
//! - [`session`] - lifecycle owner wiring one instance of each together
//!
//! ```text
//! ResourceLoader ──► ResponseCache (hit? done)
//!       │
//!       ├──► AvailabilityProbe (fast-fail on down targets)
//!       │
//!       └──► RequestGateway ──► Transport
//!                  │
//!                  └── 401 ──► CredentialMonitor::force_refresh ──► TokenRefresher
//! ```

pub mod cache;
pub mod credential;
pub mod gateway;
pub mod loader;
pub mod probe;
pub mod session;
pub mod transport;

pub use cache::{CacheKey, CacheStats, NO_PARAMS, ResponseCache};
pub use credential::{
    CredentialMonitor, CredentialStatus, CredentialStore, ExpiryHandler, ExpiryNotice,
    FileCredentialStore, MemoryCredentialStore, OAuthTokenRefresher, StoredCredentials,
    TokenRefresher,
};
pub use gateway::{RequestContext, RequestGateway};
pub use loader::{ResourceKind, ResourceLoader};
pub use probe::{AvailabilityProbe, GatewayProber, TargetProber, TargetStatus};
pub use session::{ClientSession, SessionBuilder};
pub use transport::{ApiRequest, ApiResponse, Method, ReqwestTransport, Transport, TransportError};

pub use rabbitdesk_core::{ClientError, ClientEvent, Result};
