// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Letter records and the views derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Review state of a letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LetterStatus {
    Pending,
    Approved,
    Rejected,
}

impl LetterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for LetterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LetterStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(()),
        }
    }
}

/// A stored letter with its moderation metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Letter {
    pub id: Uuid,
    pub content: String,
    pub author: Option<String>,
    pub is_anonymous: bool,
    pub lat: f64,
    pub lng: f64,
    pub city: String,
    pub created_at: DateTime<Utc>,
    pub status: LetterStatus,
    pub flagged: bool,
    pub flag_reason: Option<String>,
    pub moderated_at: Option<DateTime<Utc>>,
    pub moderated_by: Option<String>,
}

/// Submission body as sent by the letter form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LetterInput {
    pub content: String,
    #[serde(default)]
    pub author: Option<String>,
    pub is_anonymous: bool,
    pub lat: f64,
    pub lng: f64,
    pub city: String,
}

/// A validated, moderated letter ready to be persisted.
///
/// `status`, `flagged` and `flag_reason` are decided once here and never
/// recomputed.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLetter {
    pub content: String,
    pub author: Option<String>,
    pub is_anonymous: bool,
    pub lat: f64,
    pub lng: f64,
    pub city: String,
    pub status: LetterStatus,
    pub flagged: bool,
    pub flag_reason: Option<String>,
}

impl NewLetter {
    /// Assign identity and creation time.
    pub fn into_letter(self, id: Uuid, created_at: DateTime<Utc>) -> Letter {
        Letter {
            id,
            content: self.content,
            author: self.author,
            is_anonymous: self.is_anonymous,
            lat: self.lat,
            lng: self.lng,
            city: self.city,
            created_at,
            status: self.status,
            flagged: self.flagged,
            flag_reason: self.flag_reason,
            moderated_at: None,
            moderated_by: None,
        }
    }
}

/// Public view of an approved letter; no moderation metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicLetter {
    pub id: Uuid,
    pub content: String,
    pub author: Option<String>,
    pub is_anonymous: bool,
    pub lat: f64,
    pub lng: f64,
    pub city: String,
    pub created_at: DateTime<Utc>,
}

impl From<Letter> for PublicLetter {
    fn from(letter: Letter) -> Self {
        Self {
            id: letter.id,
            content: letter.content,
            author: letter.author,
            is_anonymous: letter.is_anonymous,
            lat: letter.lat,
            lng: letter.lng,
            city: letter.city,
            created_at: letter.created_at,
        }
    }
}

/// Globe pin for an approved letter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LetterMarker {
    pub id: Uuid,
    pub lat: f64,
    pub lng: f64,
}

/// Admin list query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LetterFilter {
    pub status: Option<LetterStatus>,
    pub flagged_only: bool,
    pub search: Option<String>,
    /// 1-based
    pub page: u32,
    pub limit: u32,
}

impl LetterFilter {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 100;

    pub fn offset(&self) -> usize {
        (self.page.max(1) as usize - 1) * self.limit as usize
    }
}

impl Default for LetterFilter {
    fn default() -> Self {
        Self {
            status: None,
            flagged_only: false,
            search: None,
            page: 1,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

/// One page of admin results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LetterPage {
    pub letters: Vec<Letter>,
    pub total: usize,
    pub page: u32,
    pub limit: u32,
    pub has_more: bool,
}

/// Queue counters for the admin dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LetterStats {
    pub total: usize,
    pub pending: usize,
    /// Flagged letters still awaiting review
    pub flagged: usize,
    pub approved: usize,
    pub rejected: usize,
}
