// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Letter persistence.
//!
//! The production database is an external service; `MemoryLetterStore`
//! keeps everything in process memory for local runs and tests.

use crate::letters::{
    Letter, LetterFilter, LetterMarker, LetterPage, LetterStats, LetterStatus, NewLetter,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Storage error types.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Letter not found")]
    NotFound,

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Letter storage backend.
#[async_trait]
pub trait LetterStore: Send + Sync {
    /// Persist a new letter, assigning id and creation time.
    async fn insert(&self, letter: NewLetter, now: DateTime<Utc>) -> Result<Letter, StoreError>;

    /// A single letter, only if approved.
    async fn get_approved(&self, id: Uuid) -> Result<Option<Letter>, StoreError>;

    /// Approved letters, newest first.
    async fn list_approved(&self, limit: usize) -> Result<Vec<Letter>, StoreError>;

    async fn markers(&self) -> Result<Vec<LetterMarker>, StoreError>;

    /// Admin listing with filters and pagination, newest first.
    async fn select_filtered(&self, filter: &LetterFilter) -> Result<LetterPage, StoreError>;

    /// Set the status of every listed letter. Repeated ids are updated
    /// and returned once.
    ///
    /// Fails with `NotFound` (and changes nothing) if any id is unknown.
    async fn update_status(
        &self,
        ids: &[Uuid],
        status: LetterStatus,
        moderator: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Letter>, StoreError>;

    async fn stats(&self) -> Result<LetterStats, StoreError>;
}

#[derive(Debug, Default)]
struct Letters {
    /// Insertion order
    order: Vec<Uuid>,
    by_id: HashMap<Uuid, Letter>,
}

impl Letters {
    fn newest_first(&self) -> impl Iterator<Item = &Letter> {
        self.order.iter().rev().filter_map(|id| self.by_id.get(id))
    }
}

/// In-memory letter store.
#[derive(Debug, Default)]
pub struct MemoryLetterStore {
    letters: RwLock<Letters>,
}

impl MemoryLetterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.letters.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn matches(letter: &Letter, filter: &LetterFilter, needle: Option<&str>) -> bool {
    if filter.status.is_some_and(|s| s != letter.status) {
        return false;
    }
    if filter.flagged_only && !letter.flagged {
        return false;
    }
    match needle {
        Some(needle) => {
            letter.content.to_lowercase().contains(needle)
                || letter
                    .author
                    .as_deref()
                    .is_some_and(|a| a.to_lowercase().contains(needle))
        }
        None => true,
    }
}

#[async_trait]
impl LetterStore for MemoryLetterStore {
    async fn insert(&self, letter: NewLetter, now: DateTime<Utc>) -> Result<Letter, StoreError> {
        let letter = letter.into_letter(Uuid::new_v4(), now);
        let mut letters = self.letters.write().await;
        letters.order.push(letter.id);
        letters.by_id.insert(letter.id, letter.clone());
        Ok(letter)
    }

    async fn get_approved(&self, id: Uuid) -> Result<Option<Letter>, StoreError> {
        let letters = self.letters.read().await;
        Ok(letters
            .by_id
            .get(&id)
            .filter(|l| l.status == LetterStatus::Approved)
            .cloned())
    }

    async fn list_approved(&self, limit: usize) -> Result<Vec<Letter>, StoreError> {
        let letters = self.letters.read().await;
        Ok(letters
            .newest_first()
            .filter(|l| l.status == LetterStatus::Approved)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn markers(&self) -> Result<Vec<LetterMarker>, StoreError> {
        let letters = self.letters.read().await;
        Ok(letters
            .newest_first()
            .filter(|l| l.status == LetterStatus::Approved)
            .map(|l| LetterMarker {
                id: l.id,
                lat: l.lat,
                lng: l.lng,
            })
            .collect())
    }

    async fn select_filtered(&self, filter: &LetterFilter) -> Result<LetterPage, StoreError> {
        let needle = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let letters = self.letters.read().await;
        let matching: Vec<&Letter> = letters
            .newest_first()
            .filter(|l| matches(l, filter, needle.as_deref()))
            .collect();

        let total = matching.len();
        let offset = filter.offset();
        let page: Vec<Letter> = matching
            .into_iter()
            .skip(offset)
            .take(filter.limit as usize)
            .cloned()
            .collect();

        Ok(LetterPage {
            has_more: offset + page.len() < total,
            letters: page,
            total,
            page: filter.page.max(1),
            limit: filter.limit,
        })
    }

    async fn update_status(
        &self,
        ids: &[Uuid],
        status: LetterStatus,
        moderator: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Letter>, StoreError> {
        let mut letters = self.letters.write().await;
        if ids.iter().any(|id| !letters.by_id.contains_key(id)) {
            return Err(StoreError::NotFound);
        }

        let mut seen = HashSet::with_capacity(ids.len());
        let mut updated = Vec::with_capacity(ids.len());
        for id in ids.iter().filter(|id| seen.insert(**id)) {
            if let Some(letter) = letters.by_id.get_mut(id) {
                letter.status = status;
                letter.moderated_at = Some(now);
                letter.moderated_by = Some(moderator.to_string());
                updated.push(letter.clone());
            }
        }
        Ok(updated)
    }

    async fn stats(&self) -> Result<LetterStats, StoreError> {
        let letters = self.letters.read().await;
        let mut stats = LetterStats {
            total: letters.by_id.len(),
            ..Default::default()
        };
        for letter in letters.by_id.values() {
            match letter.status {
                LetterStatus::Pending => {
                    stats.pending += 1;
                    if letter.flagged {
                        stats.flagged += 1;
                    }
                }
                LetterStatus::Approved => stats.approved += 1,
                LetterStatus::Rejected => stats.rejected += 1,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_letter(content: &str, status: LetterStatus, flagged: bool) -> NewLetter {
        NewLetter {
            content: content.to_string(),
            author: Some("Ana".to_string()),
            is_anonymous: false,
            lat: -15.79,
            lng: -47.88,
            city: "Brasília".to_string(),
            status,
            flagged,
            flag_reason: flagged.then(|| "very_short".to_string()),
        }
    }

    async fn seeded() -> (MemoryLetterStore, Vec<Letter>) {
        let store = MemoryLetterStore::new();
        let base = Utc::now();
        let mut inserted = Vec::new();
        let rows = [
            ("primeira carta de despedida", LetterStatus::Approved, false),
            ("oi", LetterStatus::Pending, true),
            ("segunda carta aprovada", LetterStatus::Approved, false),
            ("carta rejeitada pelo painel", LetterStatus::Rejected, false),
            ("CARTA EM CAIXA ALTA", LetterStatus::Pending, false),
        ];
        for (i, (content, status, flagged)) in rows.into_iter().enumerate() {
            let at = base + chrono::Duration::seconds(i as i64);
            inserted.push(store.insert(new_letter(content, status, flagged), at).await.unwrap());
        }
        (store, inserted)
    }

    #[test]
    fn test_empty_store_reads() {
        let store = MemoryLetterStore::new();
        tokio_test::block_on(async {
            assert!(store.is_empty().await);
            assert!(store.list_approved(500).await.unwrap().is_empty());
            assert!(store.markers().await.unwrap().is_empty());
            assert_eq!(store.stats().await.unwrap(), LetterStats::default());
        });
    }

    #[tokio::test]
    async fn test_insert_assigns_identity() {
        let store = MemoryLetterStore::new();
        let now = Utc::now();
        let letter = store
            .insert(new_letter("uma carta", LetterStatus::Approved, false), now)
            .await
            .unwrap();
        assert_eq!(letter.created_at, now);
        assert!(letter.moderated_at.is_none());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_public_reads_only_see_approved() {
        let (store, inserted) = seeded().await;

        let listed = store.list_approved(500).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].content, "segunda carta aprovada");

        assert!(store.get_approved(inserted[0].id).await.unwrap().is_some());
        assert!(store.get_approved(inserted[1].id).await.unwrap().is_none());
        assert!(store.get_approved(Uuid::new_v4()).await.unwrap().is_none());

        assert_eq!(store.markers().await.unwrap().len(), 2);
        assert_eq!(store.list_approved(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_filtering() {
        let (store, _) = seeded().await;

        let pending = store
            .select_filtered(&LetterFilter {
                status: Some(LetterStatus::Pending),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(pending.total, 2);

        let flagged = store
            .select_filtered(&LetterFilter {
                flagged_only: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(flagged.total, 1);
        assert_eq!(flagged.letters[0].content, "oi");

        let search = store
            .select_filtered(&LetterFilter {
                search: Some("  Carta ".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(search.total, 4);

        let by_author = store
            .select_filtered(&LetterFilter {
                search: Some("ana".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_author.total, 5);
    }

    #[tokio::test]
    async fn test_pagination() {
        let (store, _) = seeded().await;
        let filter = LetterFilter {
            page: 1,
            limit: 2,
            ..Default::default()
        };

        let first = store.select_filtered(&filter).await.unwrap();
        assert_eq!(first.total, 5);
        assert_eq!(first.letters.len(), 2);
        assert_eq!(first.letters[0].content, "CARTA EM CAIXA ALTA");
        assert!(first.has_more);

        let last = store
            .select_filtered(&LetterFilter { page: 3, ..filter })
            .await
            .unwrap();
        assert_eq!(last.letters.len(), 1);
        assert!(!last.has_more);
    }

    #[tokio::test]
    async fn test_update_status() {
        let (store, inserted) = seeded().await;
        let now = Utc::now();

        let updated = store
            .update_status(&[inserted[1].id], LetterStatus::Approved, "mod@example.com", now)
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].status, LetterStatus::Approved);
        assert_eq!(updated[0].moderated_by.as_deref(), Some("mod@example.com"));
        assert_eq!(updated[0].moderated_at, Some(now));
        assert!(updated[0].flagged, "flag is kept after review");

        assert!(store.get_approved(inserted[1].id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_repeated_ids_once() {
        let (store, inserted) = seeded().await;
        let id = inserted[1].id;

        let updated = store
            .update_status(&[id, id, id], LetterStatus::Approved, "mod@example.com", Utc::now())
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].id, id);
    }

    #[tokio::test]
    async fn test_update_unknown_id_changes_nothing() {
        let (store, inserted) = seeded().await;
        let result = store
            .update_status(
                &[inserted[1].id, Uuid::new_v4()],
                LetterStatus::Rejected,
                "mod@example.com",
                Utc::now(),
            )
            .await;
        assert!(matches!(result, Err(StoreError::NotFound)));

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.rejected, 1);
    }

    #[tokio::test]
    async fn test_stats() {
        let (store, _) = seeded().await;
        let stats = store.stats().await.unwrap();
        assert_eq!(
            stats,
            LetterStats {
                total: 5,
                pending: 2,
                flagged: 1,
                approved: 2,
                rejected: 1,
            }
        );
    }
}
