// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Admin authentication.
//!
//! A bearer token is resolved to an email by an [`IdentityProvider`]; the
//! email must then appear in the configured admin allow-list.

use crate::config::AdminConfig;
use crate::error::ApiError;
use crate::handlers::AppState;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

const IDENTITY_TIMEOUT: Duration = Duration::from_secs(5);

/// Identity lookup error types.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Invalid identity service URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Identity service request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Identity service returned status {0}")]
    Status(StatusCode),
}

/// Resolves a bearer token to the email of its owner.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `Ok(None)` for unknown or expired tokens.
    async fn email_for_token(&self, token: &str) -> Result<Option<String>, IdentityError>;
}

/// Fixed token table, for local development and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenIdentity {
    tokens: HashMap<String, String>,
}

impl StaticTokenIdentity {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenIdentity {
    async fn email_for_token(&self, token: &str) -> Result<Option<String>, IdentityError> {
        Ok(self.tokens.get(token).cloned())
    }
}

#[derive(Debug, Deserialize)]
struct RemoteUser {
    email: Option<String>,
}

/// Managed auth service (`GET {base}/auth/v1/user`).
pub struct RemoteIdentity {
    client: reqwest::Client,
    user_url: Url,
    api_key: Option<String>,
}

impl RemoteIdentity {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, IdentityError> {
        let base = Url::parse(base_url.trim_end_matches('/'))?;
        let user_url = Url::parse(&format!("{}/auth/v1/user", base.as_str().trim_end_matches('/')))?;
        let client = reqwest::Client::builder().timeout(IDENTITY_TIMEOUT).build()?;
        Ok(Self {
            client,
            user_url,
            api_key,
        })
    }

    pub fn user_url(&self) -> &Url {
        &self.user_url
    }
}

#[async_trait]
impl IdentityProvider for RemoteIdentity {
    async fn email_for_token(&self, token: &str) -> Result<Option<String>, IdentityError> {
        let mut request = self.client.get(self.user_url.clone()).bearer_auth(token);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key);
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status if status.is_success() => Ok(response.json::<RemoteUser>().await?.email),
            status => Err(IdentityError::Status(status)),
        }
    }
}

/// Build the identity provider from configuration.
///
/// The remote service wins when configured; otherwise the static token table.
pub fn identity_from_config(
    config: &AdminConfig,
) -> Result<Arc<dyn IdentityProvider>, IdentityError> {
    match &config.identity_url {
        Some(url) if !url.trim().is_empty() => Ok(Arc::new(RemoteIdentity::new(
            url,
            config.identity_api_key.clone(),
        )?)),
        _ => Ok(Arc::new(StaticTokenIdentity::new(config.tokens.clone()))),
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// An authenticated admin; extracting it rejects everyone else with 401.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminIdentity {
    pub email: String,
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AdminIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;

        let email = match state.identity.email_for_token(token).await {
            Ok(Some(email)) => email,
            Ok(None) => {
                debug!("Unknown admin token");
                return Err(ApiError::Unauthorized);
            }
            Err(e) => {
                warn!(error = %e, "Identity lookup failed");
                return Err(ApiError::Unauthorized);
            }
        };

        if !state.config.admin.is_admin(&email) {
            warn!(email = %email, "Non-admin attempted admin access");
            return Err(ApiError::Unauthorized);
        }

        Ok(Self {
            email: email.trim().to_lowercase(),
        })
    }
}
