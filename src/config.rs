// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the farewell-letters service.
//!
//! Defaults match the production deployment: 5 submissions per client per
//! sliding hour, 1000-entry geocode caches with a 24 hour TTL.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// Configuration for the farewell-letters service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Origins allowed by CORS
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Geocoding configuration
    #[serde(default)]
    pub geocode: GeocodeConfig,

    /// Moderation table extensions
    #[serde(default)]
    pub moderation: ModerationConfig,

    /// Admin identity configuration
    #[serde(default)]
    pub admin: AdminConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Where submission counters live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RateLimitBackend {
    /// No counter store; every request is admitted.
    Off,
    /// Process-local sliding window.
    Memory,
    /// Shared sliding window in Redis.
    Redis { url: String },
}

/// Rate limiting configuration for the submission endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Submissions allowed per window per client (default: 5)
    #[serde(default = "default_max_submissions")]
    pub max_submissions: u32,

    /// Sliding window length in seconds (default: 3600)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Counter store backend (default: off)
    #[serde(default = "default_backend")]
    pub backend: RateLimitBackend,

    /// Key prefix in the counter store
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Upper bound on a counter store round trip in milliseconds (default: 500)
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

/// Geocoding provider and cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeConfig {
    /// Google Maps API key; geocoding is disabled without it
    #[serde(default)]
    pub api_key: Option<String>,

    /// Provider endpoint
    #[serde(default = "default_geocode_endpoint")]
    pub endpoint: String,

    /// Result language (default: pt-BR)
    #[serde(default = "default_language")]
    pub language: String,

    /// Provider timeout in milliseconds (default: 5000)
    #[serde(default = "default_geocode_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum forward results returned (default: 5)
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Entries per cache (default: 1000)
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    /// Cache entry lifetime in seconds (default: 86400)
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Place name used when reverse geocoding fails
    #[serde(default = "default_unknown_location")]
    pub unknown_location_label: String,
}

/// Extra entries appended to the built-in moderation tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModerationConfig {
    #[serde(default)]
    pub extra_spam_keywords: Vec<String>,

    #[serde(default)]
    pub extra_blocked_words: Vec<String>,

    #[serde(default)]
    pub extra_borderline_words: Vec<String>,
}

/// Admin identity configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Emails allowed to use the admin endpoints
    #[serde(default)]
    pub emails: Vec<String>,

    /// Static bearer token to email table, used when no identity service is set
    #[serde(default)]
    pub tokens: HashMap<String, String>,

    /// Base URL of the managed auth service
    #[serde(default)]
    pub identity_url: Option<String>,

    /// API key sent to the managed auth service
    #[serde(default)]
    pub identity_api_key: Option<String>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_max_submissions() -> u32 {
    5
}

fn default_window_secs() -> u64 {
    3600
}

fn default_backend() -> RateLimitBackend {
    RateLimitBackend::Off
}

fn default_key_prefix() -> String {
    "ratelimit:letters".to_string()
}

fn default_store_timeout_ms() -> u64 {
    500
}

fn default_geocode_endpoint() -> String {
    "https://maps.googleapis.com/maps/api/geocode/json".to_string()
}

fn default_language() -> String {
    "pt-BR".to_string()
}

fn default_geocode_timeout_ms() -> u64 {
    5000
}

fn default_max_results() -> usize {
    5
}

fn default_cache_max_entries() -> usize {
    1000
}

fn default_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_unknown_location() -> String {
    "Local desconhecido".to_string()
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            allowed_origins: default_allowed_origins(),
            rate_limit: RateLimitConfig::default(),
            geocode: GeocodeConfig::default(),
            moderation: ModerationConfig::default(),
            admin: AdminConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_submissions: default_max_submissions(),
            window_secs: default_window_secs(),
            backend: default_backend(),
            key_prefix: default_key_prefix(),
            store_timeout_ms: default_store_timeout_ms(),
        }
    }
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: default_geocode_endpoint(),
            language: default_language(),
            timeout_ms: default_geocode_timeout_ms(),
            max_results: default_max_results(),
            cache_max_entries: default_cache_max_entries(),
            cache_ttl_secs: default_cache_ttl_secs(),
            unknown_location_label: default_unknown_location(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl RateLimitConfig {
    /// Get the sliding window duration
    pub fn window_duration(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Get the counter store timeout
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

impl GeocodeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl AdminConfig {
    /// Whether `email` is on the admin allow-list (case-insensitive).
    pub fn is_admin(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        !email.is_empty() && self.emails.iter().any(|e| *e == email)
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparseable values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let list = |key: &str| var(key).map(|v| split_list(&v)).unwrap_or_default();

        let defaults = Config::default();

        let redis_url = var("REDIS_URL");
        let backend = match var("RATE_LIMIT_BACKEND").map(|v| v.to_lowercase()).as_deref() {
            Some("memory") => RateLimitBackend::Memory,
            Some("off") => RateLimitBackend::Off,
            _ => match redis_url {
                Some(url) => RateLimitBackend::Redis { url },
                None => RateLimitBackend::Off,
            },
        };

        let allowed_origins = var("ALLOWED_ORIGINS")
            .map(|v| split_list(&v))
            .unwrap_or(defaults.allowed_origins);

        Self {
            bind_addr: var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            allowed_origins,
            rate_limit: RateLimitConfig {
                max_submissions: parsed(var("RATE_LIMIT_MAX")).unwrap_or(default_max_submissions()),
                window_secs: parsed(var("RATE_LIMIT_WINDOW_SECS")).unwrap_or(default_window_secs()),
                backend,
                store_timeout_ms: parsed(var("RATE_LIMIT_TIMEOUT_MS"))
                    .unwrap_or(default_store_timeout_ms()),
                ..Default::default()
            },
            geocode: GeocodeConfig {
                api_key: var("GOOGLE_MAPS_API_KEY"),
                language: var("GEOCODE_LANGUAGE").unwrap_or_else(default_language),
                timeout_ms: parsed(var("GEOCODE_TIMEOUT_MS")).unwrap_or(default_geocode_timeout_ms()),
                cache_max_entries: parsed(var("GEOCODE_CACHE_MAX"))
                    .unwrap_or(default_cache_max_entries()),
                cache_ttl_secs: parsed(var("GEOCODE_CACHE_TTL_SECS"))
                    .unwrap_or(default_cache_ttl_secs()),
                ..Default::default()
            },
            moderation: ModerationConfig {
                extra_spam_keywords: list("MODERATION_EXTRA_SPAM"),
                extra_blocked_words: list("MODERATION_EXTRA_BLOCKED"),
                extra_borderline_words: list("MODERATION_EXTRA_BORDERLINE"),
            },
            admin: AdminConfig {
                emails: list("ADMIN_EMAILS")
                    .into_iter()
                    .map(|e| e.to_lowercase())
                    .collect(),
                tokens: var("ADMIN_TOKENS")
                    .map(|v| parse_token_table(&v))
                    .unwrap_or_default(),
                identity_url: var("IDENTITY_URL"),
                identity_api_key: var("IDENTITY_API_KEY"),
            },
            metrics: MetricsConfig {
                enabled: parsed(var("METRICS_ENABLED")).unwrap_or(true),
                path: var("METRICS_PATH").unwrap_or_else(default_metrics_path),
            },
        }
    }
}

fn parsed<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.parse().ok())
}

/// Split a comma-separated list, dropping blanks.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `token=email,token=email`.
fn parse_token_table(value: &str) -> HashMap<String, String> {
    split_list(value)
        .into_iter()
        .filter_map(|pair| {
            let (token, email) = pair.split_once('=')?;
            let (token, email) = (token.trim(), email.trim());
            (!token.is_empty() && !email.is_empty())
                .then(|| (token.to_string(), email.to_lowercase()))
        })
        .collect()
}
