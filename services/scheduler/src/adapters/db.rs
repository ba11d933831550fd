//! services/scheduler/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of the
//! `CardStore`, `ReviewLog` and `DueQuery` ports from the core crate. It handles all
//! interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use exam_prep_core::domain::{CardStatus, Flashcard, ReviewEvent};
use exam_prep_core::ports::{CardStore, DueQuery, PortError, PortResult, ReviewLog};
use sqlx::{FromRow, PgExecutor, PgPool};
use tracing::debug;
use uuid::Uuid;

const CARD_COLUMNS: &str = "id, user_id, question_id, ease_factor, interval_days, repetition, \
     next_review_date, last_reviewed_at, review_count, created_at";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the flashcard ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

async fn insert_review_log<'e, E>(executor: E, event: &ReviewEvent) -> PortResult<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO flashcard_review_logs \
         (id, flashcard_id, user_id, rating, review_interval, reviewed_at) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(event.id)
    .bind(event.flashcard_id)
    .bind(event.user_id)
    .bind(event.rating)
    .bind(event.review_interval)
    .bind(event.reviewed_at)
    .execute(executor)
    .await
    .map_err(unexpected)?;
    Ok(())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct FlashcardRecord {
    id: Uuid,
    user_id: Uuid,
    question_id: Uuid,
    ease_factor: f64,
    interval_days: i32,
    repetition: i32,
    next_review_date: NaiveDate,
    last_reviewed_at: Option<DateTime<Utc>>,
    review_count: i32,
    created_at: DateTime<Utc>,
}
impl FlashcardRecord {
    fn to_domain(self) -> Flashcard {
        Flashcard {
            id: self.id,
            user_id: self.user_id,
            question_id: self.question_id,
            ease_factor: self.ease_factor,
            interval: self.interval_days,
            repetition: self.repetition,
            next_review_date: self.next_review_date,
            last_reviewed_at: self.last_reviewed_at,
            review_count: self.review_count,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct ReviewLogRecord {
    id: Uuid,
    flashcard_id: Uuid,
    user_id: Uuid,
    rating: i32,
    review_interval: i32,
    reviewed_at: DateTime<Utc>,
}
impl ReviewLogRecord {
    fn to_domain(self) -> ReviewEvent {
        ReviewEvent {
            id: self.id,
            flashcard_id: self.flashcard_id,
            user_id: self.user_id,
            rating: self.rating,
            review_interval: self.review_interval,
            reviewed_at: self.reviewed_at,
        }
    }
}

//=========================================================================================
// `CardStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl CardStore for DbAdapter {
    async fn create_card(&self, card: Flashcard) -> PortResult<Flashcard> {
        let sql = format!(
            "INSERT INTO flashcards (id, user_id, question_id, ease_factor, interval_days, repetition, \
             next_review_date, status, last_reviewed_at, review_count, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (user_id, question_id) DO NOTHING \
             RETURNING {CARD_COLUMNS}"
        );
        let record = sqlx::query_as::<_, FlashcardRecord>(&sql)
            .bind(card.id)
            .bind(card.user_id)
            .bind(card.question_id)
            .bind(card.ease_factor)
            .bind(card.interval)
            .bind(card.repetition)
            .bind(card.next_review_date)
            .bind(card.status().as_str())
            .bind(card.last_reviewed_at)
            .bind(card.review_count)
            .bind(card.created_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;

        match record {
            Some(record) => Ok(record.to_domain()),
            None => Err(PortError::Conflict(format!(
                "Flashcard for question {} already exists",
                card.question_id
            ))),
        }
    }

    async fn get_card(&self, user_id: Uuid, card_id: Uuid) -> PortResult<Flashcard> {
        let sql = format!("SELECT {CARD_COLUMNS} FROM flashcards WHERE id = $1 AND user_id = $2");
        let record = sqlx::query_as::<_, FlashcardRecord>(&sql)
            .bind(card_id)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => {
                    PortError::NotFound(format!("Flashcard {} not found", card_id))
                }
                _ => unexpected(e),
            })?;
        Ok(record.to_domain())
    }

    async fn list_cards(
        &self,
        user_id: Uuid,
        status: Option<CardStatus>,
    ) -> PortResult<Vec<Flashcard>> {
        let sql = format!(
            "SELECT {CARD_COLUMNS} FROM flashcards \
             WHERE user_id = $1 AND ($2::text IS NULL OR status = $2) \
             ORDER BY next_review_date ASC, id ASC"
        );
        let records = sqlx::query_as::<_, FlashcardRecord>(&sql)
            .bind(user_id)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn record_review(
        &self,
        card: &Flashcard,
        expected_review_count: i32,
        event: ReviewEvent,
    ) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let result = sqlx::query(
            "UPDATE flashcards SET ease_factor = $1, interval_days = $2, repetition = $3, \
             next_review_date = $4, status = $5, last_reviewed_at = $6, review_count = $7 \
             WHERE id = $8 AND user_id = $9 AND review_count = $10",
        )
        .bind(card.ease_factor)
        .bind(card.interval)
        .bind(card.repetition)
        .bind(card.next_review_date)
        .bind(card.status().as_str())
        .bind(card.last_reviewed_at)
        .bind(card.review_count)
        .bind(card.id)
        .bind(card.user_id)
        .bind(expected_review_count)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            debug!(card_id = %card.id, expected_review_count, "Stale review write rejected");
            tx.rollback().await.map_err(unexpected)?;
            return Err(PortError::Conflict(format!(
                "Flashcard {} was reviewed concurrently",
                card.id
            )));
        }

        // Dropping `tx` on an error here rolls the card update back.
        insert_review_log(&mut *tx, &event).await?;
        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn delete_card(&self, user_id: Uuid, card_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM flashcards WHERE id = $1 AND user_id = $2")
            .bind(card_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Flashcard {} not found", card_id)));
        }
        Ok(())
    }
}

//=========================================================================================
// `ReviewLog` Trait Implementation
//=========================================================================================

#[async_trait]
impl ReviewLog for DbAdapter {
    async fn append(&self, event: ReviewEvent) -> PortResult<()> {
        insert_review_log(&self.pool, &event).await
    }

    async fn recent(&self, user_id: Uuid, limit: usize) -> PortResult<Vec<ReviewEvent>> {
        let records = sqlx::query_as::<_, ReviewLogRecord>(
            "SELECT id, flashcard_id, user_id, rating, review_interval, reviewed_at \
             FROM flashcard_review_logs WHERE user_id = $1 \
             ORDER BY reviewed_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn review_timestamps(&self, user_id: Uuid) -> PortResult<Vec<DateTime<Utc>>> {
        sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT reviewed_at FROM flashcard_review_logs WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)
    }
}

//=========================================================================================
// `DueQuery` Trait Implementation
//=========================================================================================

#[async_trait]
impl DueQuery for DbAdapter {
    async fn due_cards(&self, user_id: Uuid, today: NaiveDate) -> PortResult<Vec<Flashcard>> {
        let sql = format!(
            "SELECT {CARD_COLUMNS} FROM flashcards \
             WHERE user_id = $1 AND next_review_date <= $2 \
             ORDER BY next_review_date ASC, id ASC"
        );
        let records = sqlx::query_as::<_, FlashcardRecord>(&sql)
            .bind(user_id)
            .bind(today)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }
}
