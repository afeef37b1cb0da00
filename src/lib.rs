// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Farewell Letters
//!
//! Backend for a public wall of short farewell letters pinned on a globe.
//! Every submission passes through a fixed pipeline:
//!
//! - Per-IP sliding-window rate limiting (5 letters per hour default)
//! - Field validation (content, author, coordinates, city)
//! - Hard blocking of links, spam and profanity
//! - Soft flagging of suspicious letters for manual review
//!
//! City search and reverse geocoding go through a bounded LRU cache with a
//! 24 hour TTL. Admins review the flagged queue through bearer-token
//! protected endpoints.

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod geocode;
pub mod handlers;
pub mod letters;
pub mod limiter;
pub mod metrics;
pub mod moderation;
pub mod pipeline;
pub mod store;
pub mod validator;

pub use config::Config;
pub use error::ApiError;
pub use handlers::{router, AppState, Backends};
pub use limiter::{LimiterMode, RateLimitDecision, RateLimiter};
pub use moderation::{BlockReason, ContentModerator, FlagReason, ModerationRules};
pub use pipeline::{SubmissionError, SubmissionPipeline};
pub use validator::{LetterValidator, ValidationError};
