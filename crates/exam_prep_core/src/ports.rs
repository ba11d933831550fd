//! crates/exam_prep_core/src/ports.rs
//!
//! Defines the service contracts (traits) the flashcard core depends on.
//! These traits form the boundary of the hexagonal architecture, keeping the
//! scheduler and review workflow independent of the storage implementation.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::domain::{CardStatus, Flashcard, ReviewEvent};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A uniqueness rule was violated or a concurrent write got there first.
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Persists card scheduling state keyed by (user, question).
#[async_trait]
pub trait CardStore: Send + Sync {
    /// Fails with `Conflict` if the user already has a card for the question.
    async fn create_card(&self, card: Flashcard) -> PortResult<Flashcard>;

    /// Fails with `NotFound` if the card does not exist or belongs to another user.
    async fn get_card(&self, user_id: Uuid, card_id: Uuid) -> PortResult<Flashcard>;

    /// Cards ordered by `next_review_date`, then `id`.
    async fn list_cards(
        &self,
        user_id: Uuid,
        status: Option<CardStatus>,
    ) -> PortResult<Vec<Flashcard>>;

    /// Writes the scheduling fields of `card` and appends `event` to the review
    /// log as one unit: either both land or neither does.
    ///
    /// The write only happens if the stored `review_count` still equals
    /// `expected_review_count`. Otherwise `Conflict`.
    async fn record_review(
        &self,
        card: &Flashcard,
        expected_review_count: i32,
        event: ReviewEvent,
    ) -> PortResult<()>;

    async fn delete_card(&self, user_id: Uuid, card_id: Uuid) -> PortResult<()>;
}

/// Append-only history of review events.
#[async_trait]
pub trait ReviewLog: Send + Sync {
    async fn append(&self, event: ReviewEvent) -> PortResult<()>;

    /// At most `limit` events, newest first.
    async fn recent(&self, user_id: Uuid, limit: usize) -> PortResult<Vec<ReviewEvent>>;

    /// When every review of the user happened, in no particular order.
    async fn review_timestamps(&self, user_id: Uuid) -> PortResult<Vec<DateTime<Utc>>>;
}

/// Answers "which cards are due on `today`".
#[async_trait]
pub trait DueQuery: Send + Sync {
    /// Cards with `next_review_date <= today`, in listing order.
    async fn due_cards(&self, user_id: Uuid, today: NaiveDate) -> PortResult<Vec<Flashcard>>;
}

/// Source of the review moment. Read once per operation.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// The calendar date `at` falls on for scheduling purposes.
    fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.date_naive()
    }
}

/// Wall clock, dates in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
