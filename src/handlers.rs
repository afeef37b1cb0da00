// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the farewell letters service.
//!
//! Public routes serve approved letters and accept new submissions through
//! the [`SubmissionPipeline`]. Admin routes require an [`AdminIdentity`].

use crate::auth::{AdminIdentity, IdentityProvider};
use crate::clock::Clock;
use crate::config::Config;
use crate::error::ApiError;
use crate::geocode::{GeocodeProvider, Geocoder};
use crate::letters::{Letter, LetterFilter, LetterStatus, PublicLetter};
use crate::limiter::{client_ip, CounterStore, LimiterMode, RateLimiter};
use crate::metrics::Metrics;
use crate::moderation::{ContentModerator, ModerationRules};
use crate::pipeline::SubmissionPipeline;
use crate::store::LetterStore;
use crate::validator::LetterValidator;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use uuid::Uuid;

/// Most letters returned by the public list.
pub const PUBLIC_LIST_LIMIT: usize = 500;

/// Most ids accepted by one bulk update.
pub const MAX_BULK_IDS: usize = 100;

const MARKERS_CACHE_CONTROL: &str = "public, s-maxage=60, stale-while-revalidate=120";
const LETTER_CACHE_CONTROL: &str = "public, s-maxage=300, stale-while-revalidate=600";

/// Failure assembling the application state.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Invalid moderation pattern: {0}")]
    Moderation(#[from] regex::Error),

    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// External collaborators the service is wired to.
pub struct Backends {
    pub letters: Arc<dyn LetterStore>,
    /// `None` disables rate limiting
    pub counters: Option<Arc<dyn CounterStore>>,
    /// `None` disables geocoding
    pub geocoder: Option<Arc<dyn GeocodeProvider>>,
    pub identity: Arc<dyn IdentityProvider>,
    pub clock: Arc<dyn Clock>,
}

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub pipeline: SubmissionPipeline,
    pub store: Arc<dyn LetterStore>,
    pub geocoder: Geocoder,
    pub identity: Arc<dyn IdentityProvider>,
    pub metrics: Metrics,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(config: Config, backends: Backends) -> Result<Self, StartupError> {
        let metrics = Metrics::new()?;
        let moderator = ContentModerator::new(ModerationRules::from_config(&config.moderation))?;
        let limiter = RateLimiter::new(
            config.rate_limit.clone(),
            backends.counters,
            backends.clock.clone(),
        );

        let pipeline = SubmissionPipeline::new(
            limiter,
            LetterValidator::default(),
            moderator,
            backends.letters.clone(),
            metrics.clone(),
            backends.clock.clone(),
        );
        let geocoder = Geocoder::new(&config.geocode, backends.geocoder, backends.clock.clone())
            .with_metrics(metrics.clone());

        Ok(Self {
            config,
            pipeline,
            store: backends.letters,
            geocoder,
            identity: backends.identity,
            metrics,
            clock: backends.clock,
        })
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "farewell-letters",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Prometheus scrape endpoint.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let body = state
        .metrics
        .render()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}

/// Submit a new letter.
///
/// The body is read raw so the rate limit applies even to unparseable
/// requests.
pub async fn create_letter(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let client = client_ip(&headers);
    debug!(client_ip = %client, bytes = body.len(), "Processing letter submission");

    let accepted = state.pipeline.submit_raw(&client, &body).await?;
    let rate = accepted.rate;

    let mut response = (StatusCode::CREATED, Json(accepted.letter)).into_response();
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(rate.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(rate.remaining));
    if rate.mode == LimiterMode::Enforcing {
        headers.insert("x-ratelimit-reset", HeaderValue::from(rate.reset_ms));
    }
    Ok(response)
}

/// Approved letters, newest first.
pub async fn list_letters(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PublicLetter>>, ApiError> {
    let letters = state.store.list_approved(PUBLIC_LIST_LIMIT).await?;
    Ok(Json(letters.into_iter().map(PublicLetter::from).collect()))
}

/// Globe markers for approved letters.
pub async fn letter_markers(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let markers = state.store.markers().await?;
    Ok((
        [(header::CACHE_CONTROL, MARKERS_CACHE_CONTROL)],
        Json(markers),
    )
        .into_response())
}

fn parse_letter_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| ApiError::BadRequest("Invalid letter ID".to_string()))
}

/// A single approved letter.
pub async fn get_letter(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_letter_id(&id)?;
    let letter = state
        .store
        .get_approved(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Letter not found".to_string()))?;

    Ok((
        [(header::CACHE_CONTROL, LETTER_CACHE_CONTROL)],
        Json(PublicLetter::from(letter)),
    )
        .into_response())
}

/// City lookup query: either `q`, or `lat` and `lng`.
#[derive(Debug, Default, Deserialize)]
pub struct CityQuery {
    pub q: Option<String>,
    pub lat: Option<String>,
    pub lng: Option<String>,
}

impl CityQuery {
    fn coordinates(&self) -> Option<(f64, f64)> {
        let lat = self.lat.as_deref()?.trim().parse::<f64>().ok()?;
        let lng = self.lng.as_deref()?.trim().parse::<f64>().ok()?;
        (lat.is_finite() && lng.is_finite()).then_some((lat, lng))
    }
}

/// Forward or reverse geocoding.
pub async fn cities(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CityQuery>,
) -> Result<Response, ApiError> {
    if let Some((lat, lng)) = query.coordinates() {
        let place = state.geocoder.reverse(lat, lng).await?;
        return Ok(Json(place).into_response());
    }

    let q = query.q.as_deref().unwrap_or_default();
    let places = state.geocoder.search(q).await?;
    Ok(Json(places).into_response())
}

/// Admin list query string.
#[derive(Debug, Default, Deserialize)]
pub struct AdminListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub status: Option<String>,
    pub flagged: Option<String>,
    pub search: Option<String>,
}

impl AdminListQuery {
    /// Lenient: unparseable page/limit fall back to defaults.
    pub fn into_filter(self) -> Result<LetterFilter, ApiError> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(s) => Some(
                s.parse::<LetterStatus>()
                    .map_err(|_| ApiError::BadRequest("Invalid status".to_string()))?,
            ),
        };

        let page = self
            .page
            .and_then(|p| p.trim().parse::<u32>().ok())
            .unwrap_or(1)
            .max(1);
        let limit = self
            .limit
            .and_then(|l| l.trim().parse::<u32>().ok())
            .unwrap_or(LetterFilter::DEFAULT_LIMIT)
            .clamp(1, LetterFilter::MAX_LIMIT);

        Ok(LetterFilter {
            status,
            flagged_only: self.flagged.as_deref() == Some("true"),
            search: self.search.filter(|s| !s.trim().is_empty()),
            page,
            limit,
        })
    }
}

/// Admin listing with filters.
pub async fn admin_list_letters(
    State(state): State<Arc<AppState>>,
    admin: AdminIdentity,
    Query(query): Query<AdminListQuery>,
) -> Result<Response, ApiError> {
    let filter = query.into_filter()?;
    debug!(admin = %admin.email, ?filter, "Admin listing letters");
    let page = state.store.select_filtered(&filter).await?;
    Ok(Json(page).into_response())
}

/// Queue counters.
pub async fn admin_stats(
    State(state): State<Arc<AppState>>,
    _admin: AdminIdentity,
) -> Result<Response, ApiError> {
    Ok(Json(state.store.stats().await?).into_response())
}

#[derive(Debug, Deserialize)]
struct StatusUpdate {
    status: String,
}

/// Moderate one letter.
pub async fn admin_update_letter(
    State(state): State<Arc<AppState>>,
    admin: AdminIdentity,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let id = parse_letter_id(&id)?;
    let status = serde_json::from_slice::<StatusUpdate>(&body)
        .ok()
        .and_then(|u| u.status.parse::<LetterStatus>().ok())
        .ok_or_else(|| ApiError::BadRequest("Invalid status".to_string()))?;

    let mut updated = state
        .store
        .update_status(&[id], status, &admin.email, state.clock.now())
        .await?;
    let letter = updated
        .pop()
        .ok_or_else(|| ApiError::NotFound("Letter not found".to_string()))?;

    info!(admin = %admin.email, letter_id = %letter.id, status = %status, "Letter moderated");
    Ok(Json(letter).into_response())
}

#[derive(Debug, Deserialize)]
struct BulkUpdate {
    ids: Vec<Uuid>,
    status: String,
}

/// Bulk update response.
#[derive(Debug, Serialize)]
pub struct BulkUpdateResponse {
    pub updated: usize,
    pub letters: Vec<Letter>,
}

/// Moderate up to [`MAX_BULK_IDS`] letters at once.
pub async fn admin_bulk_update(
    State(state): State<Arc<AppState>>,
    admin: AdminIdentity,
    body: Bytes,
) -> Result<Response, ApiError> {
    let invalid = || ApiError::BadRequest("Invalid request body".to_string());

    let request = serde_json::from_slice::<BulkUpdate>(&body).map_err(|_| invalid())?;
    let status = request
        .status
        .parse::<LetterStatus>()
        .map_err(|_| invalid())?;
    // Each row is updated once, in first-seen order.
    let mut seen = HashSet::with_capacity(request.ids.len());
    let ids: Vec<Uuid> = request.ids.into_iter().filter(|id| seen.insert(*id)).collect();
    if ids.is_empty() {
        return Err(invalid());
    }
    if ids.len() > MAX_BULK_IDS {
        return Err(ApiError::BadRequest(
            "Maximum 100 items per bulk operation".to_string(),
        ));
    }

    let letters = state
        .store
        .update_status(&ids, status, &admin.email, state.clock.now())
        .await?;

    info!(admin = %admin.email, count = letters.len(), status = %status, "Bulk moderation");
    Ok(Json(BulkUpdateResponse {
        updated: letters.len(),
        letters,
    })
    .into_response())
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/api/letters", get(list_letters).post(create_letter))
        .route("/api/letters/markers", get(letter_markers))
        .route("/api/letters/:id", get(get_letter))
        .route("/api/cities", get(cities))
        .route("/api/admin/letters", get(admin_list_letters))
        .route("/api/admin/letters/stats", get(admin_stats))
        .route("/api/admin/letters/bulk", post(admin_bulk_update))
        .route("/api/admin/letters/:id", patch(admin_update_letter));

    if state.config.metrics.enabled {
        app = app.route(&state.config.metrics.path, get(metrics));
    }

    app.layer(cors_layer(&state.config.allowed_origins))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_DNS_PREFETCH_CONTROL,
            HeaderValue::from_static("on"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("permissions-policy"),
            HeaderValue::from_static("camera=(), microphone=(), geolocation=(self)"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
