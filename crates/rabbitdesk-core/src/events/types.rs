//! Event types emitted by the client layer.
//!
//! - `ClientEvent` - credential lifecycle and target availability events
//! - `ExpiryReason` - why a session was ended

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Why a credential was discarded and re-authentication requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpiryReason {
    /// The credential is missing, malformed or past its `exp` claim.
    Expired,
    /// The refresh call failed.
    RefreshFailed {
        /// Failure description.
        message: String,
    },
    /// A request was rejected and there was no refresh credential to use.
    NoRefreshCredential,
}

impl ExpiryReason {
    /// Returns a short label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpiryReason::Expired => "expired",
            ExpiryReason::RefreshFailed { .. } => "refresh_failed",
            ExpiryReason::NoRefreshCredential => "no_refresh_credential",
        }
    }
}

impl std::fmt::Display for ExpiryReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpiryReason::RefreshFailed { message } => write!(f, "refresh failed: {message}"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// Events published on the client event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// The credential crossed the warning threshold.
    CredentialWarning {
        /// Whole minutes left before expiry.
        remaining_minutes: i64,
        /// Expiry instant decoded from the credential.
        #[serde(with = "time::serde::rfc3339")]
        expires_at: OffsetDateTime,
    },
    /// A new access credential was obtained.
    CredentialRefreshed {
        /// Expiry of the new credential, if it carries one.
        #[serde(with = "time::serde::rfc3339::option")]
        expires_at: Option<OffsetDateTime>,
    },
    /// The session ended; the UI must re-authenticate.
    CredentialExpired {
        /// Why the session ended.
        reason: ExpiryReason,
        /// Location to return to after login.
        return_to: Option<String>,
    },
    /// A target became unreachable.
    TargetUnavailable {
        /// Target identifier.
        target: String,
        /// Probe error.
        error: String,
    },
    /// A previously unavailable target answered again.
    TargetRecovered {
        /// Target identifier.
        target: String,
        /// Probe round-trip time.
        response_time_ms: Option<u64>,
    },
}

impl ClientEvent {
    /// Returns the event name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::CredentialWarning { .. } => "credential_warning",
            ClientEvent::CredentialRefreshed { .. } => "credential_refreshed",
            ClientEvent::CredentialExpired { .. } => "credential_expired",
            ClientEvent::TargetUnavailable { .. } => "target_unavailable",
            ClientEvent::TargetRecovered { .. } => "target_recovered",
        }
    }

    /// Returns `true` for credential lifecycle events.
    pub fn is_credential_event(&self) -> bool {
        matches!(
            self,
            ClientEvent::CredentialWarning { .. }
                | ClientEvent::CredentialRefreshed { .. }
                | ClientEvent::CredentialExpired { .. }
        )
    }

    /// Returns the target this event concerns, for availability events.
    pub fn target(&self) -> Option<&str> {
        match self {
            ClientEvent::TargetUnavailable { target, .. }
            | ClientEvent::TargetRecovered { target, .. } => Some(target),
            _ => None,
        }
    }
}
