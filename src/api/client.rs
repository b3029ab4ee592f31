//! HTTP client that delivers pending actions to the farm-records REST API.
//!
//! Routing follows the server's resource-collection convention:
//! create goes to `POST /api/<resource-plural>`, update and delete go to
//! `PUT`/`DELETE /api/<resource-plural>/<id>`. Any 2xx response counts as
//! delivered; the server's endpoints are idempotent, so a retried action
//! that already landed is accepted again without side effects.

use reqwest::{Client, Method};
use tracing::debug;

use crate::config::EngineConfig;
use crate::models::{ActionKind, PendingAction, ResourceKind};

use super::{ActionTransport, ApiError};

/// API client for the farm-records server.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client from engine configuration. The client-wide
    /// request timeout also bounds how long a single delivery can stall a
    /// drain.
    pub fn new(config: &EngineConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Create a client with the given bearer token, sharing the connection
    /// pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    /// Set the bearer token for authenticated requests.
    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    /// Resolve an action to the REST verb and URL it must be sent to.
    fn route(&self, action: &PendingAction) -> Result<(Method, String), ApiError> {
        let resource: ResourceKind = action
            .resource
            .parse()
            .map_err(|_| ApiError::UnknownResource(action.resource.clone()))?;
        let collection = format!("{}/api/{}", self.base_url, resource.collection());

        match action.kind {
            ActionKind::Create => Ok((Method::POST, collection)),
            ActionKind::Update | ActionKind::Delete => {
                let id = action.target_id().ok_or_else(|| ApiError::MissingTargetId {
                    kind: action.kind.to_string(),
                    resource: action.resource.clone(),
                })?;
                let method = if action.kind == ActionKind::Update {
                    Method::PUT
                } else {
                    Method::DELETE
                };
                Ok((method, format!("{}/{}", collection, id)))
            }
        }
    }
}

impl ActionTransport for ApiClient {
    async fn deliver(&self, action: &PendingAction) -> Result<(), ApiError> {
        let (method, url) = self.route(action)?;
        debug!(id = %action.id, %method, url, "Delivering pending action");

        let mut request = self.client.request(method, &url);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }
        // Delete sends no body; create and update send the payload as JSON.
        if action.kind != ActionKind::Delete {
            request = request.json(&action.payload);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            debug!(id = %action.id, status = status.as_u16(), "Action delivered");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_response(status, &body))
    }
}

// ============================================================================
// Tests
// ============================================================================
