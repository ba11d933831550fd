//! crates/exam_prep_core/src/scheduler.rs
//!
//! The SM-2 spaced repetition scheduler.
//!
//! A pure function of (current scheduling state, rating) -> next scheduling state.
//! It performs no I/O and holds no state, so it can be called from any number of
//! tasks at once. Inputs are normalized instead of rejected: a freshly built,
//! never-persisted card is a valid input.

use chrono::{Days, NaiveDate};
use serde::Serialize;

use crate::domain::{CardStatus, Flashcard};

//=========================================================================================
// Policy Constants
//=========================================================================================

pub const DEFAULT_EASE_FACTOR: f64 = 2.5;
pub const MIN_EASE_FACTOR: f64 = 1.3;
pub const MIN_INTERVAL: i32 = 1;
/// Interval used for the second successful review of a streak.
pub const SECOND_INTERVAL: i32 = 6;

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;
/// Ratings at or above this count as a successful recall.
pub const PASSING_RATING: i32 = 3;

pub const REVIEWING_THRESHOLD: i32 = 3;
pub const MASTERED_THRESHOLD: i32 = 8;

//=========================================================================================
// Input and Output Types
//=========================================================================================

/// The scheduling fields read from a card. Every field may be unset.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScheduleInput {
    pub ease_factor: Option<f64>,
    pub interval: Option<i32>,
    pub repetition: Option<i32>,
}

/// Scheduling fields after defaults have been applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedSchedule {
    pub ease_factor: f64,
    pub interval: i32,
    pub repetition: i32,
}

impl ScheduleInput {
    /// Coalesces missing or corrupt fields to safe defaults.
    ///
    /// - ease factor: unset, zero or non-finite becomes 2.5; any other value is
    ///   kept as stored, even below the 1.3 floor
    /// - interval: unset or non-positive becomes 1
    /// - repetition: unset or negative becomes 0
    pub fn normalize(&self) -> NormalizedSchedule {
        let ease_factor = match self.ease_factor {
            Some(ef) if ef.is_finite() && ef != 0.0 => ef,
            _ => DEFAULT_EASE_FACTOR,
        };
        let interval = self.interval.unwrap_or(MIN_INTERVAL).max(MIN_INTERVAL);
        let repetition = self.repetition.unwrap_or(0).max(0);

        NormalizedSchedule {
            ease_factor,
            interval,
            repetition,
        }
    }
}

impl From<&Flashcard> for ScheduleInput {
    fn from(card: &Flashcard) -> Self {
        Self {
            ease_factor: Some(card.ease_factor),
            interval: Some(card.interval),
            repetition: Some(card.repetition),
        }
    }
}

/// The next scheduling state of a card after one review.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReviewOutcome {
    pub ease_factor: f64,
    pub interval: i32,
    pub repetition: i32,
    pub next_review_date: NaiveDate,
    pub status: CardStatus,
}

//=========================================================================================
// Scheduling
//=========================================================================================

/// Clamps a raw rating into `[MIN_RATING, MAX_RATING]`.
pub fn clamp_rating(rating: i32) -> i32 {
    rating.clamp(MIN_RATING, MAX_RATING)
}

/// Maps a repetition count onto its mastery stage.
pub fn status_for(repetition: i32) -> CardStatus {
    if repetition >= MASTERED_THRESHOLD {
        CardStatus::Mastered
    } else if repetition >= REVIEWING_THRESHOLD {
        CardStatus::Reviewing
    } else {
        CardStatus::Learning
    }
}

/// Computes the next review state for a card reviewed on `today` with `rating`.
///
/// A failing rating (< 3) resets the streak and leaves the ease factor untouched.
/// A passing rating grows the interval (1 day, then 6 days, then `interval * ease`)
/// and adjusts the ease factor by the SM-2 delta, floored at 1.3. There is no
/// upper bound on the ease factor.
///
/// Growth uses the stored ease factor as-is. Only the returned ease factor is
/// held at the floor, so a stored value below 1.3 never comes back out.
pub fn calculate_next_review(
    current: &ScheduleInput,
    rating: i32,
    today: NaiveDate,
) -> ReviewOutcome {
    let rating = clamp_rating(rating);
    let NormalizedSchedule {
        mut ease_factor,
        mut interval,
        mut repetition,
    } = current.normalize();

    if rating < PASSING_RATING {
        repetition = 0;
        interval = MIN_INTERVAL;
        ease_factor = ease_factor.max(MIN_EASE_FACTOR);
    } else {
        interval = match repetition {
            0 => MIN_INTERVAL,
            1 => SECOND_INTERVAL,
            _ => grow_interval(interval, ease_factor),
        };
        repetition = repetition.saturating_add(1);
        ease_factor = next_ease_factor(ease_factor, rating);
    }

    ReviewOutcome {
        ease_factor,
        interval,
        repetition,
        next_review_date: add_days(today, interval),
        status: status_for(repetition),
    }
}

/// The outcome for every possible rating, lowest first. Nothing is persisted.
pub fn preview_outcomes(current: &ScheduleInput, today: NaiveDate) -> Vec<(i32, ReviewOutcome)> {
    (MIN_RATING..=MAX_RATING)
        .map(|rating| (rating, calculate_next_review(current, rating, today)))
        .collect()
}

// Rounds half to even; the `as` cast saturates on absurdly large intervals.
fn grow_interval(interval: i32, ease_factor: f64) -> i32 {
    let grown = (f64::from(interval) * ease_factor).round_ties_even() as i32;
    grown.max(MIN_INTERVAL)
}

fn next_ease_factor(ease_factor: f64, rating: i32) -> f64 {
    let miss = f64::from(MAX_RATING - rating);
    let delta = 0.1 - miss * (0.08 + miss * 0.02);
    round_to_4(ease_factor + delta).max(MIN_EASE_FACTOR)
}

// Ties go to even on the scaled value: 1.83865 -> 1.8386.
fn round_to_4(value: f64) -> f64 {
    (value * 10_000.0).round_ties_even() / 10_000.0
}

fn add_days(date: NaiveDate, days: i32) -> NaiveDate {
    let days = u64::try_from(days).unwrap_or(1);
    date.checked_add_days(Days::new(days)).unwrap_or(NaiveDate::MAX)
}
