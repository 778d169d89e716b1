//! Permission gate consulted before any manual-override write.
//!
//! By default the service trusts the upstream BFF and only reads the caller
//! identity from `x-user-id`. When an auth-service endpoint is configured,
//! every gated call is checked against it.

use async_trait::async_trait;
use axum::http::HeaderMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::time::Duration;

/// Reconciliation service capabilities.
pub mod capabilities {
    /// Set a manual verdict on a transaction.
    pub const RECONCILIATION_MATCH_CREATE: &str = "reconciliation.match:create";

    /// Undo an existing match.
    pub const RECONCILIATION_MATCH_DELETE: &str = "reconciliation.match:delete";

    /// Accept or reject a suggested match.
    pub const RECONCILIATION_SUGGESTION_REVIEW: &str = "reconciliation.suggestion:review";
}

pub const USER_ID_HEADER: &str = "x-user-id";

/// Identity of the caller after a successful check.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthContext {
    pub user_id: String,
}

#[async_trait]
pub trait AccessGate: Send + Sync {
    async fn require_capability(
        &self,
        headers: &HeaderMap,
        capability: &str,
    ) -> Result<AuthContext, AppError>;
}

#[derive(Serialize)]
struct CheckRequest<'a> {
    user_id: &'a str,
    capability: &'a str,
}

#[derive(Deserialize)]
struct CheckResponse {
    allowed: bool,
}

#[derive(Clone)]
struct AuthServiceClient {
    client: Client,
    endpoint: String,
}

#[derive(Clone)]
pub struct CapabilityGate {
    inner: Option<AuthServiceClient>,
}

impl CapabilityGate {
    /// Enabled when `auth_endpoint` is non-empty.
    pub fn new(auth_endpoint: Option<&str>, timeout: Duration) -> Result<Self, AppError> {
        match auth_endpoint {
            Some(endpoint) if !endpoint.is_empty() => {
                let client = Client::builder().timeout(timeout).build().map_err(|e| {
                    AppError::ConfigError(anyhow::anyhow!(
                        "Failed to build auth-service client: {}",
                        e
                    ))
                })?;

                tracing::info!(
                    auth_endpoint = endpoint,
                    "Capability enforcement enabled via auth-service"
                );

                Ok(Self {
                    inner: Some(AuthServiceClient {
                        client,
                        endpoint: endpoint.trim_end_matches('/').to_string(),
                    }),
                })
            }
            _ => {
                tracing::info!("Capability enforcement disabled (BFF trust model)");
                Ok(Self::disabled())
            }
        }
    }

    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }
}

#[async_trait]
impl AccessGate for CapabilityGate {
    async fn require_capability(
        &self,
        headers: &HeaderMap,
        capability: &str,
    ) -> Result<AuthContext, AppError> {
        let user_id = extract_user_id(headers);

        let Some(auth) = &self.inner else {
            return Ok(AuthContext {
                user_id: user_id.unwrap_or_else(|| "system".to_string()),
            });
        };

        let user_id = user_id
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing x-user-id header")))?;

        let url = format!("{}/authz/check", auth.endpoint);
        let response = auth
            .client
            .post(&url)
            .json(&CheckRequest {
                user_id: &user_id,
                capability,
            })
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(url = %url, error = %e, "Capability check request failed");
                AppError::BadGateway(format!("auth-service unreachable: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(AppError::BadGateway(format!(
                "auth-service returned {}",
                response.status()
            )));
        }

        let check: CheckResponse = response
            .json()
            .await
            .map_err(|e| AppError::BadGateway(format!("Invalid auth-service response: {}", e)))?;

        if !check.allowed {
            tracing::warn!(
                user_id = %user_id,
                capability = capability,
                "Permission denied: missing capability"
            );
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "Missing capability: {}",
                capability
            )));
        }

        Ok(AuthContext { user_id })
    }
}

fn extract_user_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
