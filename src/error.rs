// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP error responses.

use crate::geocode::GeocodeError;
use crate::pipeline::SubmissionError;
use crate::store::StoreError;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

/// Errors surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    ContentBlocked(String),

    #[error("Too many letters submitted. Please try again later.")]
    RateLimited {
        retry_after_secs: u64,
        limit: u32,
        reset_ms: i64,
    },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::ContentBlocked(_) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => Some("VALIDATION_ERROR"),
            Self::ContentBlocked(_) => Some("CONTENT_BLOCKED"),
            Self::RateLimited { .. } => Some("RATE_LIMITED"),
            Self::Unauthorized => None,
            Self::NotFound(_) => Some("NOT_FOUND"),
            Self::ServiceUnavailable(_) => Some("SERVICE_UNAVAILABLE"),
            Self::BadGateway(_) => Some("UPSTREAM_ERROR"),
            Self::Internal(_) => Some("INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let retry_after_secs = match &self {
            Self::RateLimited {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        };
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code(),
            retry_after_secs,
        };

        let mut response = (self.status(), Json(body)).into_response();

        if let Self::RateLimited {
            retry_after_secs,
            limit,
            reset_ms,
        } = self
        {
            let headers = response.headers_mut();
            headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(0u32));
            headers.insert("x-ratelimit-reset", HeaderValue::from(reset_ms));
        }

        response
    }
}

impl From<SubmissionError> for ApiError {
    fn from(err: SubmissionError) -> Self {
        match err {
            SubmissionError::RateLimited {
                decision,
                retry_after,
            } => Self::RateLimited {
                retry_after_secs: retry_after.as_secs(),
                limit: decision.limit,
                reset_ms: decision.reset_ms,
            },
            SubmissionError::Invalid(e) => Self::Validation(e.to_string()),
            SubmissionError::Blocked(reason) => Self::ContentBlocked(reason.to_string()),
            SubmissionError::Persistence(e) => e.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound("Letter not found".to_string()),
            StoreError::Backend(message) => {
                error!(error = %message, "Storage backend failure");
                Self::Internal("Internal server error".to_string())
            }
        }
    }
}

impl From<GeocodeError> for ApiError {
    fn from(err: GeocodeError) -> Self {
        match err {
            GeocodeError::NotConfigured => Self::ServiceUnavailable(
                "Geocoding is not configured. Set GOOGLE_MAPS_API_KEY.".to_string(),
            ),
            GeocodeError::Provider(message) => Self::BadRequest(message),
            GeocodeError::Status(_) => Self::BadRequest(err.to_string()),
            GeocodeError::Transport(_) | GeocodeError::Timeout => {
                Self::BadGateway("Failed to search cities".to_string())
            }
            GeocodeError::InvalidEndpoint(_) => Self::Internal(err.to_string()),
        }
    }
}
