// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Bounded LRU cache with lazy TTL expiry.
//!
//! Recency is tracked by a sequence number: a read re-stamps the entry as
//! newest, an insert at capacity evicts the oldest stamp. The insertion
//! timestamp is kept across reads, so TTL counts from when the value was
//! fetched, not from when it was last used.

use crate::clock::Clock;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug)]
struct Entry<T> {
    value: T,
    inserted_at: DateTime<Utc>,
    seq: u64,
}

#[derive(Debug)]
struct CacheState<T> {
    entries: HashMap<String, Entry<T>>,
    /// seq -> key, oldest first
    recency: BTreeMap<u64, String>,
    next_seq: u64,
}

impl<T> CacheState<T> {
    fn stamp(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn remove(&mut self, key: &str) -> Option<Entry<T>> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.seq);
        Some(entry)
    }
}

/// LRU cache with a fixed capacity and TTL.
pub struct GeocodeCache<T> {
    state: Mutex<CacheState<T>>,
    max_entries: usize,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl<T: Clone> GeocodeCache<T> {
    pub fn new(max_entries: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                recency: BTreeMap::new(),
                next_seq: 0,
            }),
            max_entries: max_entries.max(1),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500)),
            clock,
        }
    }

    /// Fetch a live entry and mark it most recently used.
    ///
    /// An expired entry is removed and reported as absent.
    pub async fn get(&self, key: &str) -> Option<T> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        let inserted_at = state.entries.get(key)?.inserted_at;
        if now - inserted_at > self.ttl {
            state.remove(key);
            return None;
        }

        let seq = state.stamp();
        let key_owned = key.to_string();
        let entry = state.entries.get_mut(key)?;
        let old_seq = std::mem::replace(&mut entry.seq, seq);
        let value = entry.value.clone();
        state.recency.remove(&old_seq);
        state.recency.insert(seq, key_owned);

        Some(value)
    }

    /// Insert or replace an entry, evicting the least recently used one
    /// when full.
    pub async fn set(&self, key: &str, value: T) {
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        if state.remove(key).is_none() && state.entries.len() >= self.max_entries {
            if let Some((_, oldest)) = state.recency.pop_first() {
                state.entries.remove(&oldest);
            }
        }

        let seq = state.stamp();
        state.recency.insert(seq, key.to_string());
        state.entries.insert(
            key.to_string(),
            Entry {
                value,
                inserted_at: now,
                seq,
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }
}

/// Key for a forward lookup: case- and whitespace-insensitive.
pub fn forward_key(query: &str) -> String {
    format!("fwd:{}", query.trim().to_lowercase())
}

/// Key for a reverse lookup: coordinates rounded to 4 decimals (~11 m).
pub fn reverse_key(lat: f64, lng: f64) -> String {
    format!("rev:{},{}", round4(lat), round4(lng))
}

fn round4(value: f64) -> f64 {
    let rounded = (value * 10_000.0).round() / 10_000.0;
    // Avoid "-0" keys
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}
