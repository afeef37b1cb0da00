// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Letter submission validator.
//!
//! Implements the field rules of the letter form:
//! - Content presence and length (code points, after trimming)
//! - Optional author name length, dropped for anonymous letters
//! - Coordinate ranges
//! - City presence and length
//!
//! Every failing field is reported, not just the first.

use crate::letters::LetterInput;
use thiserror::Error;
use tracing::debug;

/// A single failing field.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("Content is required")]
    ContentRequired,

    #[error("Content must be at most {max} characters")]
    ContentTooLong { max: usize },

    #[error("Author name must be at most {max} characters")]
    AuthorTooLong { max: usize },

    #[error("Invalid latitude")]
    InvalidLatitude,

    #[error("Invalid longitude")]
    InvalidLongitude,

    #[error("City is required")]
    CityRequired,

    #[error("City name is too long")]
    CityTooLong { max: usize },
}

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{}", join_fields(.0))]
    Fields(Vec<FieldError>),

    #[error("Invalid request body")]
    MalformedBody,
}

impl ValidationError {
    pub fn fields(&self) -> &[FieldError] {
        match self {
            Self::Fields(fields) => fields,
            Self::MalformedBody => &[],
        }
    }
}

fn join_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Field limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationLimits {
    pub max_content: usize,
    pub max_author: usize,
    pub max_city: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_content: 280,
            max_author: 100,
            max_city: 255,
        }
    }
}

/// A submission whose fields passed validation, normalised.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidLetter {
    pub content: String,
    /// `None` for anonymous letters and blank names
    pub author: Option<String>,
    pub is_anonymous: bool,
    pub lat: f64,
    pub lng: f64,
    pub city: String,
}

/// Letter submission validator.
#[derive(Debug, Clone, Default)]
pub struct LetterValidator {
    limits: ValidationLimits,
}

impl LetterValidator {
    /// Create a new validator with the given limits.
    pub fn new(limits: ValidationLimits) -> Self {
        Self { limits }
    }

    /// Validate and normalise a submission.
    pub fn validate(&self, input: &LetterInput) -> Result<ValidLetter, ValidationError> {
        let mut errors = Vec::new();

        let content = input.content.trim();
        let content_len = content.chars().count();
        if content_len == 0 {
            errors.push(FieldError::ContentRequired);
        } else if content_len > self.limits.max_content {
            errors.push(FieldError::ContentTooLong {
                max: self.limits.max_content,
            });
        }

        let author = input
            .author
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty());
        if let Some(author) = author {
            if author.chars().count() > self.limits.max_author {
                errors.push(FieldError::AuthorTooLong {
                    max: self.limits.max_author,
                });
            }
        }

        if !input.lat.is_finite() || !(-90.0..=90.0).contains(&input.lat) {
            errors.push(FieldError::InvalidLatitude);
        }

        if !input.lng.is_finite() || !(-180.0..=180.0).contains(&input.lng) {
            errors.push(FieldError::InvalidLongitude);
        }

        let city = input.city.trim();
        let city_len = city.chars().count();
        if city_len == 0 {
            errors.push(FieldError::CityRequired);
        } else if city_len > self.limits.max_city {
            errors.push(FieldError::CityTooLong {
                max: self.limits.max_city,
            });
        }

        if !errors.is_empty() {
            debug!(errors = ?errors, "Letter failed validation");
            return Err(ValidationError::Fields(errors));
        }

        Ok(ValidLetter {
            content: content.to_string(),
            author: if input.is_anonymous {
                None
            } else {
                author.map(str::to_string)
            },
            is_anonymous: input.is_anonymous,
            lat: input.lat,
            lng: input.lng,
            city: city.to_string(),
        })
    }
}
