// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus metrics.

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Submission outcome label values.
pub mod outcome {
    pub const ACCEPTED: &str = "accepted";
    pub const FLAGGED: &str = "flagged";
    pub const BLOCKED: &str = "blocked";
    pub const INVALID: &str = "invalid";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const FAILED: &str = "failed";
}

/// Service metrics, cheap to clone.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    submissions: IntCounterVec,
    fail_open: IntCounterVec,
    cache_lookups: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let submissions = IntCounterVec::new(
            Opts::new("letters_submissions_total", "Letter submissions by outcome"),
            &["outcome"],
        )?;
        let fail_open = IntCounterVec::new(
            Opts::new(
                "letters_rate_limit_fail_open_total",
                "Submissions admitted without a counter store",
            ),
            &["mode"],
        )?;
        let cache_lookups = IntCounterVec::new(
            Opts::new("geocode_cache_lookups_total", "Geocode cache lookups"),
            &["cache", "result"],
        )?;

        registry.register(Box::new(submissions.clone()))?;
        registry.register(Box::new(fail_open.clone()))?;
        registry.register(Box::new(cache_lookups.clone()))?;

        Ok(Self {
            registry,
            submissions,
            fail_open,
            cache_lookups,
        })
    }

    pub fn submission(&self, outcome: &str) {
        self.submissions.with_label_values(&[outcome]).inc();
    }

    pub fn fail_open(&self, mode: &str) {
        self.fail_open.with_label_values(&[mode]).inc();
    }

    pub fn cache_lookup(&self, cache: &str, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_lookups.with_label_values(&[cache, result]).inc();
    }

    pub fn submission_count(&self, outcome: &str) -> u64 {
        self.submissions.with_label_values(&[outcome]).get()
    }

    /// Render in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
