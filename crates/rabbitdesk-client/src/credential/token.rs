//! Access token claim decoding.
//!
//! Only the payload segment is decoded. The signature is not verified: the
//! client never trusts claims for authorization, it only needs `exp` to
//! schedule refreshes.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use time::OffsetDateTime;

/// Claims the client reads from an access token.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TokenClaims {
    /// Expiry, seconds since the Unix epoch.
    #[serde(default)]
    pub exp: Option<f64>,
    /// Subject.
    #[serde(default)]
    pub sub: Option<String>,
    /// Human-readable user name, when the issuer provides one.
    #[serde(default)]
    pub preferred_username: Option<String>,
}

impl TokenClaims {
    /// Decodes the payload of a compact JWS.
    ///
    /// Returns `None` for anything that is not three dot-separated segments
    /// with a base64url JSON object in the middle.
    pub fn decode(token: &str) -> Option<Self> {
        let mut parts = token.split('.');
        let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }
        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Returns the expiry instant, if the token carries a usable `exp`.
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        let exp = self.exp?;
        if !exp.is_finite() {
            return None;
        }
        OffsetDateTime::from_unix_timestamp(exp.floor() as i64).ok()
    }

    /// Best display name for the token owner.
    pub fn display_name(&self) -> Option<&str> {
        self.preferred_username.as_deref().or(self.sub.as_deref())
    }
}

/// Returns the expiry encoded in `token`, or `None` if it has none or is
/// malformed.
pub fn decode_expiry(token: &str) -> Option<OffsetDateTime> {
    TokenClaims::decode(token)?.expires_at()
}
