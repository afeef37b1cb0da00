// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test harness for submission abuse simulation.
//!
//! Generators produce letter traffic (clean, borderline, spam floods) from
//! pools of client addresses; the tally records what the pipeline did
//! with each submission.

pub mod generators;
pub mod metrics;
