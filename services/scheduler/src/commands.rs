//! services/scheduler/src/commands.rs
//!
//! Command-line surface of the scheduler service. Each deck command maps onto one
//! `ReviewService` operation and renders its result as JSON.

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use exam_prep_core::domain::{CardFilter, CardStatus};
use exam_prep_core::scheduler::{preview_outcomes, ReviewOutcome, ScheduleInput};
use exam_prep_core::ReviewService;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::SchedulerError;

/// Spaced repetition scheduler for exam-prep flashcards.
#[derive(Debug, Parser)]
#[command(name = "scheduler", about = "Manage and review spaced repetition flashcards")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Apply pending database migrations.
    Migrate,
    /// Show what each rating would do to a card. Works offline; omitted fields are unset.
    Preview {
        #[arg(long)]
        ease_factor: Option<f64>,
        #[arg(long)]
        interval: Option<i32>,
        #[arg(long)]
        repetition: Option<i32>,
    },
    #[command(flatten)]
    Deck(DeckCommand),
}

#[derive(Debug, Subcommand)]
pub enum DeckCommand {
    /// Add a question to a user's deck.
    Add {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        question: Uuid,
    },
    /// Remove a card from a user's deck.
    Remove {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        card: Uuid,
    },
    /// Record a review with a 1-5 recall rating.
    Review {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        card: Uuid,
        #[arg(long, allow_negative_numbers = true)]
        rating: i32,
    },
    /// List cards: all, due, learning, reviewing or mastered.
    List {
        #[arg(long)]
        user: Uuid,
        #[arg(long, default_value = "all", value_parser = parse_filter)]
        filter: CardFilter,
    },
    /// Cards due today or overdue.
    Due {
        #[arg(long)]
        user: Uuid,
    },
    /// Deck totals, completion and review streak.
    Stats {
        #[arg(long)]
        user: Uuid,
    },
    /// Most recent review events.
    History {
        #[arg(long)]
        user: Uuid,
    },
}

pub fn parse_filter(raw: &str) -> Result<CardFilter, String> {
    match raw {
        "all" => Ok(CardFilter::All),
        "due" => Ok(CardFilter::Due),
        other => other
            .parse::<CardStatus>()
            .map(CardFilter::Status)
            .map_err(|e| e.to_string()),
    }
}

#[derive(Debug, Serialize)]
struct RatedOutcome {
    rating: i32,
    #[serde(flatten)]
    outcome: ReviewOutcome,
}

/// Preview for an arbitrary, possibly partial, scheduling state.
pub fn preview(current: &ScheduleInput, today: NaiveDate) -> Result<Value, SchedulerError> {
    let rows: Vec<RatedOutcome> = preview_outcomes(current, today)
        .into_iter()
        .map(|(rating, outcome)| RatedOutcome { rating, outcome })
        .collect();
    Ok(serde_json::to_value(rows)?)
}

pub fn preview_today(current: &ScheduleInput) -> Result<Value, SchedulerError> {
    preview(current, Utc::now().date_naive())
}

/// Runs one deck command against the service.
pub async fn execute(service: &ReviewService, command: DeckCommand) -> Result<Value, SchedulerError> {
    let value = match command {
        DeckCommand::Add { user, question } => {
            serde_json::to_value(service.add_card(user, question).await?)?
        }
        DeckCommand::Remove { user, card } => {
            service.remove_card(user, card).await?;
            json!({ "removed": card })
        }
        DeckCommand::Review { user, card, rating } => {
            let card = service.review(user, card, rating).await?;
            json!({ "card": card, "status": card.status() })
        }
        DeckCommand::List { user, filter } => {
            serde_json::to_value(service.list_cards(user, filter).await?)?
        }
        DeckCommand::Due { user } => serde_json::to_value(service.due_cards(user).await?)?,
        DeckCommand::Stats { user } => serde_json::to_value(service.stats(user).await?)?,
        DeckCommand::History { user } => serde_json::to_value(service.history(user).await?)?,
    };
    Ok(value)
}
