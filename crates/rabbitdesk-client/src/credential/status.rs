//! Credential status derivation.

use serde::Serialize;
use time::OffsetDateTime;

use rabbitdesk_config::CredentialConfig;

use super::token::decode_expiry;

/// Refresh and warning thresholds, in whole minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Refresh when remaining minutes are at or below this.
    pub refresh_minutes: i64,
    /// Warn when remaining minutes are above zero and at or below this.
    pub warning_minutes: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from(&CredentialConfig::default())
    }
}

impl From<&CredentialConfig> for Thresholds {
    fn from(config: &CredentialConfig) -> Self {
        Self {
            refresh_minutes: config.refresh_threshold_minutes,
            warning_minutes: config.warning_threshold_minutes,
        }
    }
}

/// Snapshot of the current credential's lifetime.
///
/// Computed from the token's `exp` claim and the wall clock only; never
/// requires a network call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialStatus {
    pub is_valid: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    pub remaining_minutes: Option<i64>,
    pub needs_refresh: bool,
    pub needs_warning: bool,
}

impl CredentialStatus {
    /// Status for a missing or undecodable credential. There is nothing to
    /// refresh, so both flags are off.
    pub fn invalid() -> Self {
        Self {
            is_valid: false,
            expires_at: None,
            remaining_minutes: None,
            needs_refresh: false,
            needs_warning: false,
        }
    }

    /// Derives the status of `token` at `now`.
    pub fn evaluate(token: Option<&str>, now: OffsetDateTime, thresholds: Thresholds) -> Self {
        let Some(expires_at) = token.and_then(decode_expiry) else {
            return Self::invalid();
        };

        let remaining_ms = (expires_at - now).whole_milliseconds();
        let remaining_minutes = i64::try_from(remaining_ms.div_euclid(60_000)).unwrap_or(i64::MIN);

        Self {
            is_valid: now < expires_at,
            expires_at: Some(expires_at),
            remaining_minutes: Some(remaining_minutes),
            needs_refresh: remaining_minutes <= thresholds.refresh_minutes,
            needs_warning: remaining_minutes > 0 && remaining_minutes <= thresholds.warning_minutes,
        }
    }
}
