// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Farewell Letters Service
//!
//! Serves the letter wall API: moderated submissions, the public letter
//! feed, globe markers, city lookup and the admin review queue.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables (and `.env`):
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `RATE_LIMIT_MAX`: Letters per client per window (default: 5)
//! - `RATE_LIMIT_WINDOW_SECS`: Window length (default: 3600)
//! - `RATE_LIMIT_BACKEND`: `redis`, `memory` or `off`
//! - `REDIS_URL`: Redis counter store; implies the `redis` backend
//! - `GOOGLE_MAPS_API_KEY`: Enables city search
//! - `ADMIN_EMAILS`: Comma-separated admin allow-list
//! - `ADMIN_TOKENS` / `IDENTITY_URL`: How admin bearer tokens are resolved

use farewell_letters::{
    auth::identity_from_config,
    clock::{Clock, SystemClock},
    config::{Config, RateLimitBackend},
    geocode::{GeocodeProvider, GoogleGeocoder},
    handlers::{router, AppState, Backends},
    limiter::{CounterStore, MemoryCounterStore, RedisCounterStore},
    store::MemoryLetterStore,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::from_env();
    info!(
        bind_addr = %config.bind_addr,
        max_submissions = config.rate_limit.max_submissions,
        window_secs = config.rate_limit.window_secs,
        geocoding = config.geocode.api_key.is_some(),
        admins = config.admin.emails.len(),
        "Starting farewell letters service"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let counters = counter_store(&config).await;
    let geocoder = GoogleGeocoder::from_config(&config.geocode)?
        .map(|g| Arc::new(g) as Arc<dyn GeocodeProvider>);
    if geocoder.is_none() {
        warn!("GOOGLE_MAPS_API_KEY not set, city search disabled");
    }
    let identity = identity_from_config(&config.admin)?;

    let state = Arc::new(AppState::new(
        config.clone(),
        Backends {
            letters: Arc::new(MemoryLetterStore::new()),
            counters,
            geocoder,
            identity,
            clock,
        },
    )?);

    // Spawn cleanup task
    let cleanup_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            cleanup_state.pipeline.limiter().cleanup().await;
        }
    });

    let app = router(state);

    // Start server
    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Counter store for the configured backend.
///
/// An unreachable Redis does not block startup; the limiter reports
/// degraded decisions until it answers.
async fn counter_store(config: &Config) -> Option<Arc<dyn CounterStore>> {
    match &config.rate_limit.backend {
        RateLimitBackend::Off => {
            warn!("Rate limiting is disabled");
            None
        }
        RateLimitBackend::Memory => Some(Arc::new(MemoryCounterStore::new())),
        RateLimitBackend::Redis { url } => {
            let store = match RedisCounterStore::open(url) {
                Ok(store) => store,
                Err(e) => {
                    warn!(error = %e, "Invalid REDIS_URL, rate limiting disabled");
                    return None;
                }
            };
            match tokio::time::timeout(Duration::from_secs(5), store.ping()).await {
                Ok(Ok(())) => info!("Connected to Redis counter store"),
                Ok(Err(e)) => warn!(error = %e, "Redis unreachable, limiter will fail open"),
                Err(_) => warn!("Redis connection timed out, limiter will fail open"),
            }
            Some(Arc::new(store))
        }
    }
}
