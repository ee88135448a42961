//! Request gateway with a single refresh-and-retry on 401.
//!
//! Every request is wrapped in a [`RequestContext`] carrying its retry count,
//! so the retry bookkeeping never touches the transport's request type.
//!
//! ```text
//! send(token) ──► 2xx ─────────────────────────────► Ok(response)
//!      │
//!      ├──► 401, retry_count == 0 ──► force_refresh ──► send(new token)
//!      │                                   │                 │
//!      │                                   └─ Err ──► AuthorizationDenied(401)
//!      │                                                     │
//!      ├──► 401, retry_count == 1 ──────────────────► AuthorizationDenied(401)
//!      │
//!      └──► other status ───────────────────────────► ClientError::from_status
//! ```

use std::sync::Arc;

use rabbitdesk_core::ClientError;

use crate::credential::CredentialMonitor;
use crate::transport::{ApiRequest, ApiResponse, Transport, TransportError};

/// Maximum number of retries after an authorization failure.
pub const MAX_AUTH_RETRIES: u8 = 1;

/// A request plus the gateway's bookkeeping for it.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    pub request: ApiRequest,
    pub retry_count: u8,
}

impl RequestContext {
    pub fn new(request: ApiRequest) -> Self {
        Self {
            request,
            retry_count: 0,
        }
    }

    fn can_retry(&self) -> bool {
        self.retry_count < MAX_AUTH_RETRIES
    }
}

impl From<ApiRequest> for RequestContext {
    fn from(request: ApiRequest) -> Self {
        Self::new(request)
    }
}

/// Attaches the current credential to requests and coordinates the
/// refresh-and-retry protocol with the [`CredentialMonitor`].
#[derive(Clone)]
pub struct RequestGateway {
    transport: Arc<dyn Transport>,
    monitor: CredentialMonitor,
}

impl RequestGateway {
    pub fn new(transport: Arc<dyn Transport>, monitor: CredentialMonitor) -> Self {
        Self { transport, monitor }
    }

    pub fn monitor(&self) -> &CredentialMonitor {
        &self.monitor
    }

    /// Executes `request`.
    ///
    /// Returns the response for any 2xx status. A 401 triggers at most one
    /// refresh-and-retry; the retried outcome is returned as-is. Every other
    /// failure is passed through with its status preserved.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let mut context = RequestContext::new(request);
        let mut token = self.monitor.access_token();

        loop {
            let response = self.dispatch(&context, token.as_deref()).await?;

            if response.is_success() {
                return Ok(response);
            }

            if !response.is_unauthorized() {
                return Err(ClientError::from_status(response.status, response.message()));
            }

            if !context.can_retry() {
                tracing::warn!(
                    method = %context.request.method,
                    path = %context.request.path,
                    "Request rejected again after credential refresh"
                );
                return Err(ClientError::authorization_denied(401, response.message()));
            }
            context.retry_count += 1;

            token = match self.monitor.access_token() {
                // Another request already refreshed while this one was out
                Some(current) if token.as_deref() != Some(current.as_str()) => {
                    tracing::debug!("Retrying with credential refreshed concurrently");
                    Some(current)
                }
                _ => match self.monitor.force_refresh().await {
                    Ok(fresh) => Some(fresh),
                    Err(e) => {
                        tracing::debug!(error = %e, "Refresh unavailable after 401");
                        return Err(ClientError::authorization_denied(
                            401,
                            response.message(),
                        ));
                    }
                },
            };
        }
    }

    async fn dispatch(
        &self,
        context: &RequestContext,
        token: Option<&str>,
    ) -> Result<ApiResponse, ClientError> {
        self.transport
            .send(&context.request, token)
            .await
            .map_err(|e| match e {
                TransportError::Connect(message) => ClientError::network(message),
                TransportError::Timeout => ClientError::Timeout,
                TransportError::Decode(message) => ClientError::decode(message),
            })
    }
}

impl std::fmt::Debug for RequestGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGateway")
            .field("monitor", &self.monitor)
            .finish_non_exhaustive()
    }
}
