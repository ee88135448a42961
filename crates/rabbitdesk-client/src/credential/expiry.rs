//! Terminal expiry callback.

use serde::Serialize;

use rabbitdesk_core::ExpiryReason;

/// Passed to the expiry handler when the session ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpiryNotice {
    pub reason: ExpiryReason,
    /// Where the user was when the session ended, so login can send them
    /// back.
    pub return_to: Option<String>,
}

/// Invoked once per credential loss. Typically redirects to login.
pub trait ExpiryHandler: Send + Sync {
    fn on_expired(&self, notice: &ExpiryNotice);
}

impl<F> ExpiryHandler for F
where
    F: Fn(&ExpiryNotice) + Send + Sync,
{
    fn on_expired(&self, notice: &ExpiryNotice) {
        self(notice)
    }
}

/// Handler that only logs. Used when the embedder installs none.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogExpiryHandler;

impl ExpiryHandler for LogExpiryHandler {
    fn on_expired(&self, notice: &ExpiryNotice) {
        tracing::warn!(
            reason = %notice.reason,
            return_to = notice.return_to.as_deref(),
            "Session expired, re-authentication required"
        );
    }
}
