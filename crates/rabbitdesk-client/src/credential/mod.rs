//! Credential lifecycle.
//!
//! - `token` - `exp` claim decoding
//! - `status` - [`CredentialStatus`] derivation
//! - `store` - persisted credential stores
//! - `refresh` - token endpoint client
//! - `expiry` - terminal expiry callback
//! - `monitor` - [`CredentialMonitor`], tying the above together

mod expiry;
mod monitor;
mod refresh;
mod status;
mod store;
mod token;

pub use expiry::{ExpiryHandler, ExpiryNotice, LogExpiryHandler};
pub use monitor::{CredentialMonitor, CredentialMonitorBuilder};
pub use refresh::{OAuthTokenRefresher, RefreshError, TokenRefresher, TokenResponse};
pub use status::{CredentialStatus, Thresholds};
pub use store::{
    CredentialStore, FileCredentialStore, MemoryCredentialStore, StoreError, StoredCredentials,
};
pub use token::{TokenClaims, decode_expiry};
