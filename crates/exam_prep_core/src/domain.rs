//! crates/exam_prep_core/src/domain.rs
//!
//! Defines the pure, core data structures for the flashcard feature.
//! These structs are independent of any database schema.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scheduler::{status_for, ReviewOutcome, DEFAULT_EASE_FACTOR, MIN_INTERVAL};

/// Coarse mastery stage of a card, derived from its repetition count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    Learning,
    Reviewing,
    Mastered,
}

impl CardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Learning => "learning",
            Self::Reviewing => "reviewing",
            Self::Mastered => "mastered",
        }
    }
}

impl fmt::Display for CardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown card status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for CardStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "learning" => Ok(Self::Learning),
            "reviewing" => Ok(Self::Reviewing),
            "mastered" => Ok(Self::Mastered),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A question a user has added to their personal deck, with its scheduling state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flashcard {
    pub id: Uuid,
    pub user_id: Uuid,
    pub question_id: Uuid,
    pub ease_factor: f64,
    /// Days until the next review.
    pub interval: i32,
    /// Consecutive successful reviews since the last failure.
    pub repetition: i32,
    pub next_review_date: NaiveDate,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub review_count: i32,
    pub created_at: DateTime<Utc>,
}

impl Flashcard {
    /// A new card, due immediately.
    pub fn new(user_id: Uuid, question_id: Uuid, today: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            question_id,
            ease_factor: DEFAULT_EASE_FACTOR,
            interval: MIN_INTERVAL,
            repetition: 0,
            next_review_date: today,
            last_reviewed_at: None,
            review_count: 0,
            created_at: now,
        }
    }

    /// Status is never stored independently of `repetition`.
    pub fn status(&self) -> CardStatus {
        status_for(self.repetition)
    }

    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.next_review_date <= today
    }

    /// Writes a scheduler outcome onto the card and records the review.
    pub fn apply_outcome(&mut self, outcome: &ReviewOutcome, reviewed_at: DateTime<Utc>) {
        self.ease_factor = outcome.ease_factor;
        self.interval = outcome.interval;
        self.repetition = outcome.repetition;
        self.next_review_date = outcome.next_review_date;
        self.last_reviewed_at = Some(reviewed_at);
        self.review_count = self.review_count.saturating_add(1);
    }
}

/// One immutable entry of the review history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEvent {
    pub id: Uuid,
    pub flashcard_id: Uuid,
    pub user_id: Uuid,
    /// The rating after clamping into 1..=5.
    pub rating: i32,
    pub review_interval: i32,
    pub reviewed_at: DateTime<Utc>,
}

/// Which cards a listing should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CardFilter {
    #[default]
    All,
    Due,
    Status(CardStatus),
}

/// Deck-level progress summary for one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlashcardStats {
    pub total_cards: usize,
    pub due_cards: usize,
    pub completion_percent: f64,
    pub review_streak: u32,
    pub next_review_date: Option<NaiveDate>,
}
