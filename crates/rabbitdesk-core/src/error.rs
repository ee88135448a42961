//! Client error taxonomy.
//!
//! Every failure the resilience layer surfaces to its callers is a
//! [`ClientError`]. A cache miss is not an error (it is `None`), and the
//! availability probe never returns one: it encodes failures in its status.

use std::fmt;

/// Errors surfaced by the RabbitDesk client layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// No usable credential is present, or it expired. Terminal: the
    /// caller must re-authenticate.
    #[error("Credential expired")]
    CredentialExpired,

    /// The credential refresh call failed. Handled like an expiry.
    #[error("Credential refresh failed: {message}")]
    CredentialRefreshFailed {
        /// Description of the refresh failure.
        message: String,
    },

    /// The server refused the request after the one allowed
    /// refresh-and-retry, or the action itself is forbidden.
    #[error("Authorization denied (HTTP {status}): {message}")]
    AuthorizationDenied {
        /// HTTP status as returned by the server (401 or 403).
        status: u16,
        /// Response body or description.
        message: String,
    },

    /// The target is unreachable or reported itself unhealthy.
    #[error("Target {target} unavailable: {message}")]
    Unavailable {
        /// Target identifier (e.g. cluster connection id).
        target: String,
        /// Reason reported by the probe.
        message: String,
    },

    /// No response was received.
    #[error("Network error: {message}")]
    Network {
        /// Description of the transport failure.
        message: String,
    },

    /// The server answered with a 5xx status.
    #[error("Server error (HTTP {status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },

    /// Any other non-success status, passed through verbatim.
    #[error("Request failed (HTTP {status}): {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },

    /// The operation exceeded its deadline.
    #[error("Operation timed out")]
    Timeout,

    /// A response could not be decoded.
    #[error("Failed to decode response: {message}")]
    Decode {
        /// Description of the decode failure.
        message: String,
    },
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    /// Creates a new `CredentialRefreshFailed` error.
    #[must_use]
    pub fn refresh_failed(message: impl Into<String>) -> Self {
        Self::CredentialRefreshFailed {
            message: message.into(),
        }
    }

    /// Creates a new `AuthorizationDenied` error.
    #[must_use]
    pub fn authorization_denied(status: u16, message: impl Into<String>) -> Self {
        Self::AuthorizationDenied {
            status,
            message: message.into(),
        }
    }

    /// Creates a new `Unavailable` error.
    #[must_use]
    pub fn unavailable(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Network` error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates a new `Decode` error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Maps a non-success HTTP status and body to the matching variant.
    ///
    /// 401 and 403 become `AuthorizationDenied`, 5xx becomes `Server`,
    /// everything else becomes `Status`.
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::AuthorizationDenied { status, message },
            500..=599 => Self::Server { status, message },
            _ => Self::Status { status, message },
        }
    }

    /// Returns the HTTP status carried by this error, if any.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::AuthorizationDenied { status, .. }
            | Self::Server { status, .. }
            | Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` if the caller may retry the operation later.
    ///
    /// The client layer itself never retries these.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. } | Self::Network { .. } | Self::Server { .. } | Self::Timeout
        )
    }

    /// Returns `true` if this error ends the session and requires login.
    #[must_use]
    pub fn is_session_loss(&self) -> bool {
        matches!(
            self,
            Self::CredentialExpired | Self::CredentialRefreshFailed { .. }
        )
    }

    /// Returns `true` for authorization failures (401/403).
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthorizationDenied { .. })
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::CredentialExpired | Self::CredentialRefreshFailed { .. } => {
                ErrorCategory::Credential
            }
            Self::AuthorizationDenied { .. } => ErrorCategory::Authorization,
            Self::Unavailable { .. } | Self::Timeout => ErrorCategory::Availability,
            Self::Network { .. } => ErrorCategory::Network,
            Self::Server { .. } | Self::Status { .. } => ErrorCategory::Upstream,
            Self::Decode { .. } => ErrorCategory::Protocol,
        }
    }
}

/// Categories of client errors for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Credential lifecycle errors (expiry, failed refresh).
    Credential,
    /// The server refused the action.
    Authorization,
    /// Target unreachable or timed out.
    Availability,
    /// Transport-level failures.
    Network,
    /// Non-success status answered by the server.
    Upstream,
    /// Malformed responses.
    Protocol,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Credential => write!(f, "credential"),
            Self::Authorization => write!(f, "authorization"),
            Self::Availability => write!(f, "availability"),
            Self::Network => write!(f, "network"),
            Self::Upstream => write!(f, "upstream"),
            Self::Protocol => write!(f, "protocol"),
        }
    }
}
