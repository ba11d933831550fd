//! services/scheduler/src/adapters/memory.rs
//!
//! An in-process implementation of the flashcard ports, backed by `tokio` locks.
//! Used for tests and local runs without a database. Enforces the same rules as
//! the PostgreSQL adapter: one card per (user, question), optimistic review writes,
//! and a review that stores the card and its log entry together or not at all.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use exam_prep_core::domain::{CardStatus, Flashcard, ReviewEvent};
use exam_prep_core::ports::{CardStore, DueQuery, PortError, PortResult, ReviewLog};
use exam_prep_core::scheduler::{MAX_RATING, MIN_RATING};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryAdapter {
    cards: RwLock<HashMap<Uuid, Flashcard>>,
    logs: RwLock<Vec<ReviewEvent>>,
}

impl InMemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites a card wholesale. Lets callers seed arbitrary scheduling state.
    pub async fn put_card(&self, card: Flashcard) {
        self.cards.write().await.insert(card.id, card);
    }

    async fn sorted_cards<F>(&self, user_id: Uuid, keep: F) -> Vec<Flashcard>
    where
        F: Fn(&Flashcard) -> bool,
    {
        let cards = self.cards.read().await;
        let mut selected: Vec<Flashcard> = cards
            .values()
            .filter(|card| card.user_id == user_id && keep(card))
            .cloned()
            .collect();
        selected.sort_by_key(|card| (card.next_review_date, card.id));
        selected
    }
}

fn not_found(card_id: Uuid) -> PortError {
    PortError::NotFound(format!("Flashcard {} not found", card_id))
}

// The same rules the log table's foreign key and rating check enforce.
fn check_event(card: &Flashcard, event: &ReviewEvent) -> PortResult<()> {
    if event.flashcard_id != card.id || event.user_id != card.user_id {
        return Err(PortError::Unexpected(format!(
            "Review event {} does not belong to flashcard {}",
            event.id, card.id
        )));
    }
    if !(MIN_RATING..=MAX_RATING).contains(&event.rating) {
        return Err(PortError::Unexpected(format!(
            "Review event {} has rating {} outside {}..={}",
            event.id, event.rating, MIN_RATING, MAX_RATING
        )));
    }
    Ok(())
}

#[async_trait]
impl CardStore for InMemoryAdapter {
    async fn create_card(&self, card: Flashcard) -> PortResult<Flashcard> {
        let mut cards = self.cards.write().await;
        let duplicate = cards
            .values()
            .any(|c| c.user_id == card.user_id && c.question_id == card.question_id);
        if duplicate {
            return Err(PortError::Conflict(format!(
                "Flashcard for question {} already exists",
                card.question_id
            )));
        }
        cards.insert(card.id, card.clone());
        Ok(card)
    }

    async fn get_card(&self, user_id: Uuid, card_id: Uuid) -> PortResult<Flashcard> {
        self.cards
            .read()
            .await
            .get(&card_id)
            .filter(|card| card.user_id == user_id)
            .cloned()
            .ok_or_else(|| not_found(card_id))
    }

    async fn list_cards(
        &self,
        user_id: Uuid,
        status: Option<CardStatus>,
    ) -> PortResult<Vec<Flashcard>> {
        Ok(self
            .sorted_cards(user_id, |card| status.map_or(true, |s| card.status() == s))
            .await)
    }

    async fn record_review(
        &self,
        card: &Flashcard,
        expected_review_count: i32,
        event: ReviewEvent,
    ) -> PortResult<()> {
        // Both locks are held before either write, in the same order as `delete_card`.
        let mut cards = self.cards.write().await;
        let mut logs = self.logs.write().await;

        check_event(card, &event)?;
        let stored = match cards.get_mut(&card.id) {
            Some(stored)
                if stored.user_id == card.user_id
                    && stored.review_count == expected_review_count =>
            {
                stored
            }
            _ => {
                return Err(PortError::Conflict(format!(
                    "Flashcard {} was reviewed concurrently",
                    card.id
                )))
            }
        };

        *stored = card.clone();
        logs.push(event);
        Ok(())
    }

    async fn delete_card(&self, user_id: Uuid, card_id: Uuid) -> PortResult<()> {
        let mut cards = self.cards.write().await;
        let owned = cards
            .get(&card_id)
            .is_some_and(|card| card.user_id == user_id);
        if !owned {
            return Err(not_found(card_id));
        }
        cards.remove(&card_id);
        // Mirrors ON DELETE CASCADE on the review log table.
        self.logs
            .write()
            .await
            .retain(|event| event.flashcard_id != card_id);
        Ok(())
    }
}

#[async_trait]
impl ReviewLog for InMemoryAdapter {
    async fn append(&self, event: ReviewEvent) -> PortResult<()> {
        self.logs.write().await.push(event);
        Ok(())
    }

    async fn recent(&self, user_id: Uuid, limit: usize) -> PortResult<Vec<ReviewEvent>> {
        let logs = self.logs.read().await;
        let mut events: Vec<ReviewEvent> = logs
            .iter()
            .filter(|event| event.user_id == user_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.reviewed_at.cmp(&a.reviewed_at));
        events.truncate(limit);
        Ok(events)
    }

    async fn review_timestamps(&self, user_id: Uuid) -> PortResult<Vec<DateTime<Utc>>> {
        Ok(self
            .logs
            .read()
            .await
            .iter()
            .filter(|event| event.user_id == user_id)
            .map(|event| event.reviewed_at)
            .collect())
    }
}

#[async_trait]
impl DueQuery for InMemoryAdapter {
    async fn due_cards(&self, user_id: Uuid, today: NaiveDate) -> PortResult<Vec<Flashcard>> {
        Ok(self.sorted_cards(user_id, |card| card.is_due(today)).await)
    }
}
