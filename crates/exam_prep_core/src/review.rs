//! crates/exam_prep_core/src/review.rs
//!
//! The review workflow around the scheduler: read the card, compute the outcome,
//! persist it and append to the review log. Also deck listing, due cards,
//! progress statistics and history.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{CardFilter, Flashcard, FlashcardStats, ReviewEvent};
use crate::ports::{CardStore, Clock, DueQuery, PortError, PortResult, ReviewLog};
use crate::scheduler::{
    calculate_next_review, clamp_rating, preview_outcomes, ReviewOutcome, ScheduleInput,
};

/// Number of times a review is recomputed after losing an optimistic-concurrency race.
pub const MAX_REVIEW_ATTEMPTS: usize = 3;

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Clone)]
pub struct ReviewService {
    cards: Arc<dyn CardStore>,
    log: Arc<dyn ReviewLog>,
    due: Arc<dyn DueQuery>,
    clock: Arc<dyn Clock>,
    history_limit: usize,
}

impl ReviewService {
    pub fn new(
        cards: Arc<dyn CardStore>,
        log: Arc<dyn ReviewLog>,
        due: Arc<dyn DueQuery>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cards,
            log,
            due,
            clock,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_history_limit(mut self, history_limit: usize) -> Self {
        self.history_limit = history_limit;
        self
    }

    fn today(&self) -> NaiveDate {
        self.clock.local_date(self.clock.now())
    }

    /// Adds a question to the user's deck, due today.
    pub async fn add_card(&self, user_id: Uuid, question_id: Uuid) -> PortResult<Flashcard> {
        let now = self.clock.now();
        let card = Flashcard::new(user_id, question_id, self.clock.local_date(now), now);
        let card = self.cards.create_card(card).await?;
        info!(%user_id, card_id = %card.id, %question_id, "Flashcard added to deck");
        Ok(card)
    }

    pub async fn remove_card(&self, user_id: Uuid, card_id: Uuid) -> PortResult<()> {
        self.cards.delete_card(user_id, card_id).await?;
        info!(%user_id, %card_id, "Flashcard removed from deck");
        Ok(())
    }

    /// Applies one review to a card and returns the updated card.
    ///
    /// The clock is read once; the same moment dates the card, the schedule and
    /// the log entry. The card and its log entry are stored together. If another
    /// review of the same card is saved in between our read and write, the whole
    /// step is recomputed from the fresh state.
    pub async fn review(&self, user_id: Uuid, card_id: Uuid, rating: i32) -> PortResult<Flashcard> {
        let reviewed_at = self.clock.now();
        let today = self.clock.local_date(reviewed_at);
        let rating = clamp_rating(rating);

        let mut attempt = 1;
        let card = loop {
            let mut card = self.cards.get_card(user_id, card_id).await?;
            let expected_review_count = card.review_count;

            let outcome = calculate_next_review(&ScheduleInput::from(&card), rating, today);
            card.apply_outcome(&outcome, reviewed_at);

            let event = ReviewEvent {
                id: Uuid::new_v4(),
                flashcard_id: card.id,
                user_id,
                rating,
                review_interval: card.interval,
                reviewed_at,
            };

            match self.cards.record_review(&card, expected_review_count, event).await {
                Ok(()) => break card,
                Err(PortError::Conflict(reason)) if attempt < MAX_REVIEW_ATTEMPTS => {
                    warn!(%card_id, attempt, %reason, "Concurrent review detected, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        debug!(
            %card_id,
            rating,
            interval = card.interval,
            ease_factor = card.ease_factor,
            status = %card.status(),
            "Review recorded"
        );
        Ok(card)
    }

    /// What each rating would do to the card, without saving anything.
    pub async fn preview(
        &self,
        user_id: Uuid,
        card_id: Uuid,
    ) -> PortResult<Vec<(i32, ReviewOutcome)>> {
        let card = self.cards.get_card(user_id, card_id).await?;
        Ok(preview_outcomes(&ScheduleInput::from(&card), self.today()))
    }

    pub async fn list_cards(&self, user_id: Uuid, filter: CardFilter) -> PortResult<Vec<Flashcard>> {
        match filter {
            CardFilter::All => self.cards.list_cards(user_id, None).await,
            CardFilter::Due => self.due_cards(user_id).await,
            CardFilter::Status(status) => self.cards.list_cards(user_id, Some(status)).await,
        }
    }

    /// Cards due today or overdue.
    pub async fn due_cards(&self, user_id: Uuid) -> PortResult<Vec<Flashcard>> {
        self.due.due_cards(user_id, self.today()).await
    }

    pub async fn stats(&self, user_id: Uuid) -> PortResult<FlashcardStats> {
        let now = self.clock.now();
        let today = self.clock.local_date(now);

        let cards = self.cards.list_cards(user_id, None).await?;
        let total_cards = cards.len();
        let due_cards = cards.iter().filter(|card| card.is_due(today)).count();
        let next_review_date = cards.iter().map(|card| card.next_review_date).min();

        let review_days: HashSet<NaiveDate> = self
            .log
            .review_timestamps(user_id)
            .await?
            .into_iter()
            .map(|at| self.clock.local_date(at))
            .collect();

        Ok(FlashcardStats {
            total_cards,
            due_cards,
            completion_percent: completion_percent(total_cards, due_cards),
            review_streak: review_streak(&review_days, today),
            next_review_date,
        })
    }

    /// The most recent review events, newest first.
    pub async fn history(&self, user_id: Uuid) -> PortResult<Vec<ReviewEvent>> {
        self.log.recent(user_id, self.history_limit).await
    }
}

/// Share of cards that are not yet due, as a percentage rounded to 2 places.
pub fn completion_percent(total_cards: usize, due_cards: usize) -> f64 {
    if total_cards == 0 {
        return 0.0;
    }
    let done = total_cards.saturating_sub(due_cards) as f64;
    (done / total_cards as f64 * 100.0 * 100.0).round() / 100.0
}

/// Consecutive days with at least one review, counting back from `today`.
/// Zero if nothing was reviewed today.
pub fn review_streak(review_days: &HashSet<NaiveDate>, today: NaiveDate) -> u32 {
    let mut streak = 0;
    let mut day = Some(today);
    while let Some(current) = day.filter(|d| review_days.contains(d)) {
        streak += 1;
        day = current.checked_sub_days(Days::new(1));
    }
    streak
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[test]
    fn test_streak_counts_back_from_today() {
        let days: HashSet<NaiveDate> = [day(10), day(9), day(8), day(5)].into_iter().collect();
        assert_eq!(review_streak(&days, day(10)), 3);
    }

    #[test]
    fn test_streak_is_zero_without_review_today() {
        let days: HashSet<NaiveDate> = [day(9), day(8)].into_iter().collect();
        assert_eq!(review_streak(&days, day(10)), 0);
        assert_eq!(review_streak(&HashSet::new(), day(10)), 0);
    }

    #[test]
    fn test_completion_percent() {
        assert_eq!(completion_percent(0, 0), 0.0);
        assert_eq!(completion_percent(4, 1), 75.0);
        assert_eq!(completion_percent(3, 1), 66.67);
        assert_eq!(completion_percent(5, 5), 0.0);
    }
}
