// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Letter submission pipeline.
//!
//! Stages run in a fixed order and stop at the first rejection:
//!
//! 1. Rate limit (before the body is even parsed)
//! 2. Body parsing and field validation
//! 3. Hard block: links, spam, profanity
//! 4. Soft flag: heuristics that route the letter to manual review
//! 5. Persist as `pending` (flagged) or `approved` (clean)
//!
//! Rejected submissions are never stored.

use crate::clock::Clock;
use crate::letters::{Letter, LetterInput, LetterStatus, NewLetter};
use crate::limiter::{LimiterMode, RateLimitDecision, RateLimiter};
use crate::metrics::{outcome, Metrics};
use crate::moderation::{BlockReason, ContentModerator};
use crate::store::{LetterStore, StoreError};
use crate::validator::{LetterValidator, ValidationError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

/// Why a submission was turned away.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("Too many letters submitted. Please try again later.")]
    RateLimited {
        decision: RateLimitDecision,
        retry_after: Duration,
    },

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("{0}")]
    Blocked(BlockReason),

    #[error("Failed to save letter")]
    Persistence(#[from] StoreError),
}

/// A stored submission and the quota it consumed.
#[derive(Debug, Clone)]
pub struct Accepted {
    pub letter: Letter,
    pub rate: RateLimitDecision,
}

/// Runs a submission through every stage.
pub struct SubmissionPipeline {
    limiter: RateLimiter,
    validator: LetterValidator,
    moderator: ContentModerator,
    store: Arc<dyn LetterStore>,
    metrics: Metrics,
    clock: Arc<dyn Clock>,
}

impl SubmissionPipeline {
    pub fn new(
        limiter: RateLimiter,
        validator: LetterValidator,
        moderator: ContentModerator,
        store: Arc<dyn LetterStore>,
        metrics: Metrics,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            limiter,
            validator,
            moderator,
            store,
            metrics,
            clock,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Submit a raw JSON body.
    ///
    /// The rate limit is consumed before parsing, so malformed bodies count
    /// against the client too.
    pub async fn submit_raw(&self, client: &str, body: &[u8]) -> Result<Accepted, SubmissionError> {
        let rate = self.admit(client).await?;
        let input = serde_json::from_slice::<LetterInput>(body).map_err(|e| {
            info!(client_ip = %client, error = %e, "Malformed letter body");
            self.metrics.submission(outcome::INVALID);
            SubmissionError::Invalid(ValidationError::MalformedBody)
        })?;
        self.process(client, &input, rate).await
    }

    /// Submit an already-parsed body.
    pub async fn submit(
        &self,
        client: &str,
        input: &LetterInput,
    ) -> Result<Accepted, SubmissionError> {
        let rate = self.admit(client).await?;
        self.process(client, input, rate).await
    }

    async fn admit(&self, client: &str) -> Result<RateLimitDecision, SubmissionError> {
        let decision = self.limiter.check(client).await;

        if decision.mode != LimiterMode::Enforcing {
            self.metrics.fail_open(decision.mode.as_str());
        }

        if !decision.success {
            let retry_after = decision.retry_after(self.clock.now_ms());
            info!(
                client_ip = %client,
                retry_after_secs = retry_after.as_secs(),
                "Letter submission rate limited"
            );
            self.metrics.submission(outcome::RATE_LIMITED);
            return Err(SubmissionError::RateLimited {
                decision,
                retry_after,
            });
        }

        Ok(decision)
    }

    async fn process(
        &self,
        client: &str,
        input: &LetterInput,
        rate: RateLimitDecision,
    ) -> Result<Accepted, SubmissionError> {
        let valid = self.validator.validate(input).map_err(|e| {
            info!(client_ip = %client, error = %e, "Letter failed validation");
            self.metrics.submission(outcome::INVALID);
            e
        })?;

        let moderation = self.moderator.moderate_content(&valid.content);
        if let Some(reason) = moderation.reason.filter(|_| moderation.is_blocked) {
            info!(client_ip = %client, reason = reason.code(), "Letter blocked by moderation");
            self.metrics.submission(outcome::BLOCKED);
            return Err(SubmissionError::Blocked(reason));
        }

        let flagging = self.moderator.check_for_flagging(&valid.content);
        let status = if flagging.should_flag {
            LetterStatus::Pending
        } else {
            LetterStatus::Approved
        };

        let new_letter = NewLetter {
            content: valid.content,
            author: valid.author,
            is_anonymous: valid.is_anonymous,
            lat: valid.lat,
            lng: valid.lng,
            city: valid.city,
            status,
            flagged: flagging.should_flag,
            flag_reason: flagging.flag_reason,
        };

        let letter = self
            .store
            .insert(new_letter, self.clock.now())
            .await
            .map_err(|e| {
                error!(client_ip = %client, error = %e, "Failed to persist letter");
                self.metrics.submission(outcome::FAILED);
                e
            })?;

        if letter.flagged {
            info!(
                client_ip = %client,
                letter_id = %letter.id,
                flag_reason = letter.flag_reason.as_deref().unwrap_or_default(),
                "Letter flagged for review"
            );
            self.metrics.submission(outcome::FLAGGED);
        } else {
            info!(client_ip = %client, letter_id = %letter.id, "Letter approved");
            self.metrics.submission(outcome::ACCEPTED);
        }

        Ok(Accepted { letter, rate })
    }
}
