// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! City search and reverse geocoding behind an LRU cache.
//!
//! The provider is only called on a cache miss. Failed or timed-out calls
//! never write to the cache. Reverse lookups degrade to an "unknown
//! location" place built from the raw coordinates.

pub mod cache;
pub mod google;

pub use cache::GeocodeCache;
pub use google::GoogleGeocoder;

use crate::clock::Clock;
use crate::config::GeocodeConfig;
use crate::metrics::Metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Minimum query length (in characters) sent to the provider.
pub const MIN_QUERY_CHARS: usize = 2;

/// A resolved place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    pub name: String,
    pub country: String,
    pub full_name: String,
    pub lat: f64,
    pub lng: f64,
}

/// Geocoding error types.
#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("Geocoding is not configured")]
    NotConfigured,

    #[error("Invalid geocoding endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("Geocoding provider error: {0}")]
    Provider(String),

    #[error("Geocoding provider returned status {0}")]
    Status(String),

    #[error("Geocoding request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Geocoding request timed out")]
    Timeout,
}

/// External geocoding service.
#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    /// Places matching free text.
    async fn forward_search(&self, query: &str) -> Result<Vec<Place>, GeocodeError>;

    /// Place at a coordinate.
    async fn reverse(&self, lat: f64, lng: f64) -> Result<Place, GeocodeError>;
}

/// Cache occupancy, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub forward_size: usize,
    pub reverse_size: usize,
    pub max_size: usize,
    /// Rounded up, so a sub-hour TTL reports 1
    pub ttl_hours: i64,
    pub ttl_secs: i64,
}

/// Cached geocoding front end.
pub struct Geocoder {
    provider: Option<Arc<dyn GeocodeProvider>>,
    forward: GeocodeCache<Vec<Place>>,
    reverse: GeocodeCache<Place>,
    timeout: Duration,
    max_results: usize,
    unknown_label: String,
    metrics: Option<Metrics>,
}

impl Geocoder {
    pub fn new(
        config: &GeocodeConfig,
        provider: Option<Arc<dyn GeocodeProvider>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            forward: GeocodeCache::new(config.cache_max_entries, config.cache_ttl(), clock.clone()),
            reverse: GeocodeCache::new(config.cache_max_entries, config.cache_ttl(), clock),
            timeout: config.timeout(),
            max_results: config.max_results,
            unknown_label: config.unknown_location_label.clone(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    /// Search places by name.
    pub async fn search(&self, query: &str) -> Result<Vec<Place>, GeocodeError> {
        if query.trim().chars().count() < MIN_QUERY_CHARS {
            return Ok(Vec::new());
        }
        let provider = self.provider.as_ref().ok_or(GeocodeError::NotConfigured)?;

        let key = cache::forward_key(query);
        if let Some(places) = self.forward.get(&key).await {
            self.record_lookup("forward", true);
            debug!(query = %query, "Forward geocode cache hit");
            return Ok(places);
        }
        self.record_lookup("forward", false);

        let mut places = tokio::time::timeout(self.timeout, provider.forward_search(query.trim()))
            .await
            .map_err(|_| GeocodeError::Timeout)??;
        places.truncate(self.max_results);

        self.forward.set(&key, places.clone()).await;
        Ok(places)
    }

    /// Resolve a coordinate to a place, falling back to an unknown location.
    pub async fn reverse(&self, lat: f64, lng: f64) -> Result<Place, GeocodeError> {
        let provider = self.provider.as_ref().ok_or(GeocodeError::NotConfigured)?;

        let key = cache::reverse_key(lat, lng);
        if let Some(place) = self.reverse.get(&key).await {
            self.record_lookup("reverse", true);
            return Ok(place);
        }
        self.record_lookup("reverse", false);

        let result = tokio::time::timeout(self.timeout, provider.reverse(lat, lng))
            .await
            .map_err(|_| GeocodeError::Timeout)
            .and_then(|r| r);

        match result {
            Ok(place) => {
                self.reverse.set(&key, place.clone()).await;
                Ok(place)
            }
            Err(e) => {
                warn!(lat, lng, error = %e, "Reverse geocoding failed, using raw coordinates");
                Ok(self.unknown_location(lat, lng))
            }
        }
    }

    /// Placeholder for a coordinate the provider could not resolve.
    pub fn unknown_location(&self, lat: f64, lng: f64) -> Place {
        Place {
            name: self.unknown_label.clone(),
            country: String::new(),
            full_name: format!("{lat:.4}, {lng:.4}"),
            lat,
            lng,
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let ttl_secs = self.forward.ttl().num_seconds().max(0);
        CacheStats {
            forward_size: self.forward.len().await,
            reverse_size: self.reverse.len().await,
            max_size: self.forward.max_entries(),
            ttl_hours: (ttl_secs + 3599) / 3600,
            ttl_secs,
        }
    }

    fn record_lookup(&self, cache: &str, hit: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.cache_lookup(cache, hit);
        }
    }
}
