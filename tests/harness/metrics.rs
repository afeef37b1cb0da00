// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Outcome tallies for abuse simulation results.

use farewell_letters::{BlockReason, SubmissionError};
use farewell_letters::letters::LetterStatus;
use farewell_letters::pipeline::Accepted;
use std::collections::HashMap;

/// What the pipeline did with one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Approved,
    Flagged,
    BlockedLinks,
    BlockedSpam,
    BlockedInappropriate,
    Invalid,
    RateLimited,
    Failed,
}

impl Outcome {
    pub fn of(result: &Result<Accepted, SubmissionError>) -> Self {
        match result {
            Ok(accepted) if accepted.letter.status == LetterStatus::Pending => Self::Flagged,
            Ok(_) => Self::Approved,
            Err(SubmissionError::Blocked(BlockReason::Links)) => Self::BlockedLinks,
            Err(SubmissionError::Blocked(BlockReason::Spam)) => Self::BlockedSpam,
            Err(SubmissionError::Blocked(BlockReason::Inappropriate)) => {
                Self::BlockedInappropriate
            }
            Err(SubmissionError::Invalid(_)) => Self::Invalid,
            Err(SubmissionError::RateLimited { .. }) => Self::RateLimited,
            Err(SubmissionError::Persistence(_)) => Self::Failed,
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(
            self,
            Self::BlockedLinks | Self::BlockedSpam | Self::BlockedInappropriate
        )
    }
}

/// Collects outcomes during a simulation.
#[derive(Debug, Default)]
pub struct SubmissionTally {
    outcomes: HashMap<Outcome, usize>,
    per_client: HashMap<String, usize>,
    admitted_per_client: HashMap<String, usize>,
}

impl SubmissionTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pipeline result for a client.
    pub fn record(&mut self, client: &str, result: &Result<Accepted, SubmissionError>) -> Outcome {
        let outcome = Outcome::of(result);
        *self.outcomes.entry(outcome).or_insert(0) += 1;
        *self.per_client.entry(client.to_string()).or_insert(0) += 1;
        if outcome != Outcome::RateLimited {
            *self
                .admitted_per_client
                .entry(client.to_string())
                .or_insert(0) += 1;
        }
        outcome
    }

    pub fn total(&self) -> usize {
        self.outcomes.values().sum()
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.outcomes.get(&outcome).copied().unwrap_or(0)
    }

    pub fn blocked(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(o, _)| o.is_blocked())
            .map(|(_, n)| n)
            .sum()
    }

    /// Most submissions any single client got past the limiter.
    pub fn max_admitted_per_client(&self) -> usize {
        self.admitted_per_client.values().copied().max().unwrap_or(0)
    }

    pub fn unique_clients(&self) -> usize {
        self.per_client.len()
    }
}

impl std::fmt::Display for SubmissionTally {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Submission Tally ===")?;
        writeln!(f, "Total:          {}", self.total())?;
        writeln!(f, "Approved:       {}", self.count(Outcome::Approved))?;
        writeln!(f, "Flagged:        {}", self.count(Outcome::Flagged))?;
        writeln!(f, "Blocked:        {}", self.blocked())?;
        writeln!(f, "Invalid:        {}", self.count(Outcome::Invalid))?;
        writeln!(f, "Rate Limited:   {}", self.count(Outcome::RateLimited))?;
        writeln!(f, "Unique Clients: {}", self.unique_clients())?;
        Ok(())
    }
}
