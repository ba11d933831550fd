//! End-to-end tests of the review workflow against the in-memory adapter.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use exam_prep_core::domain::{CardFilter, CardStatus, Flashcard, ReviewEvent};
use exam_prep_core::ports::{CardStore, PortError, PortResult, ReviewLog};
use exam_prep_core::ReviewService;
use scheduler_lib::adapters::{FixedClock, InMemoryAdapter};
use uuid::Uuid;

fn noon(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, day, 12, 0, 0).unwrap()
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 4, day).unwrap()
}

fn service_at(store: &Arc<InMemoryAdapter>, at: DateTime<Utc>) -> ReviewService {
    let utc = FixedOffset::east_opt(0).unwrap();
    ReviewService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(FixedClock::new(at, utc)),
    )
}

fn card_due_on(user_id: Uuid, next_review_date: NaiveDate) -> Flashcard {
    Flashcard::new(user_id, Uuid::new_v4(), next_review_date, noon(1))
}

#[tokio::test]
async fn test_add_card_uses_creation_defaults() {
    let store = Arc::new(InMemoryAdapter::new());
    let service = service_at(&store, noon(10));
    let user = Uuid::new_v4();

    let card = service.add_card(user, Uuid::new_v4()).await.unwrap();

    assert_eq!(card.ease_factor, 2.5);
    assert_eq!(card.interval, 1);
    assert_eq!(card.repetition, 0);
    assert_eq!(card.next_review_date, date(10));
    assert_eq!(card.status(), CardStatus::Learning);
    assert_eq!(card.created_at, noon(10));
}

#[tokio::test]
async fn test_same_question_cannot_be_added_twice() {
    let store = Arc::new(InMemoryAdapter::new());
    let service = service_at(&store, noon(10));
    let user = Uuid::new_v4();
    let question = Uuid::new_v4();

    service.add_card(user, question).await.unwrap();
    let err = service.add_card(user, question).await.unwrap_err();
    assert!(matches!(err, PortError::Conflict(_)));

    // Another user may add the same question.
    service.add_card(Uuid::new_v4(), question).await.unwrap();
}

#[tokio::test]
async fn test_review_persists_outcome_and_logs_event() {
    let store = Arc::new(InMemoryAdapter::new());
    let service = service_at(&store, noon(10));
    let user = Uuid::new_v4();
    let card = service.add_card(user, Uuid::new_v4()).await.unwrap();

    let reviewed = service.review(user, card.id, 5).await.unwrap();

    assert_eq!(reviewed.interval, 1);
    assert_eq!(reviewed.repetition, 1);
    assert!((reviewed.ease_factor - 2.6).abs() < 1e-9);
    assert_eq!(reviewed.next_review_date, date(11));
    assert_eq!(reviewed.review_count, 1);
    assert_eq!(reviewed.last_reviewed_at, Some(noon(10)));

    let stored = store.get_card(user, card.id).await.unwrap();
    assert_eq!(stored, reviewed);

    let history = service.history(user).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].flashcard_id, card.id);
    assert_eq!(history[0].rating, 5);
    assert_eq!(history[0].review_interval, 1);
    assert_eq!(history[0].reviewed_at, noon(10));
}

#[tokio::test]
async fn test_out_of_range_rating_is_clamped_and_logged_clamped() {
    let store = Arc::new(InMemoryAdapter::new());
    let service = service_at(&store, noon(10));
    let user = Uuid::new_v4();
    let card = service.add_card(user, Uuid::new_v4()).await.unwrap();

    service.review(user, card.id, 9).await.unwrap();
    let failed = service.review(user, card.id, 0).await.unwrap();

    assert_eq!(failed.repetition, 0);
    assert_eq!(failed.interval, 1);
    // Failure keeps the ease factor earned by the clamped 5.
    assert!((failed.ease_factor - 2.6).abs() < 1e-9);

    let ratings: Vec<i32> = service
        .history(user)
        .await
        .unwrap()
        .iter()
        .map(|event| event.rating)
        .collect();
    assert_eq!(ratings.len(), 2);
    assert!(ratings.contains(&5));
    assert!(ratings.contains(&1));
}

#[tokio::test]
async fn test_perfect_streak_reaches_mastered() {
    let store = Arc::new(InMemoryAdapter::new());
    let user = Uuid::new_v4();
    let card = service_at(&store, noon(1))
        .add_card(user, Uuid::new_v4())
        .await
        .unwrap();

    let mut statuses = Vec::new();
    let mut intervals = Vec::new();
    for day in 1..=8 {
        let reviewed = service_at(&store, noon(day))
            .review(user, card.id, 5)
            .await
            .unwrap();
        statuses.push(reviewed.status());
        intervals.push(reviewed.interval);
    }

    assert_eq!(&intervals[..3], &[1, 6, 16]);
    assert!(intervals.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(statuses[1], CardStatus::Learning);
    assert_eq!(statuses[2], CardStatus::Reviewing);
    assert_eq!(statuses[6], CardStatus::Reviewing);
    assert_eq!(statuses[7], CardStatus::Mastered);
}

#[tokio::test]
async fn test_cards_of_other_users_are_not_found() {
    let store = Arc::new(InMemoryAdapter::new());
    let service = service_at(&store, noon(10));
    let owner = Uuid::new_v4();
    let card = service.add_card(owner, Uuid::new_v4()).await.unwrap();

    let intruder = Uuid::new_v4();
    assert!(matches!(
        service.review(intruder, card.id, 5).await,
        Err(PortError::NotFound(_))
    ));
    assert!(matches!(
        service.remove_card(intruder, card.id).await,
        Err(PortError::NotFound(_))
    ));
    assert!(matches!(
        service.review(owner, Uuid::new_v4(), 5).await,
        Err(PortError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_remove_card_drops_it_and_its_history() {
    let store = Arc::new(InMemoryAdapter::new());
    let service = service_at(&store, noon(10));
    let user = Uuid::new_v4();
    let card = service.add_card(user, Uuid::new_v4()).await.unwrap();
    service.review(user, card.id, 4).await.unwrap();

    service.remove_card(user, card.id).await.unwrap();

    assert!(service.list_cards(user, CardFilter::All).await.unwrap().is_empty());
    assert!(service.history(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_due_cards_match_manual_filter() {
    let store = Arc::new(InMemoryAdapter::new());
    let service = service_at(&store, noon(10));
    let user = Uuid::new_v4();

    let offsets: [i64; 7] = [-5, -1, 0, 0, 1, 3, 10];
    for offset in offsets {
        let due = date(10)
            .checked_add_signed(chrono::Duration::days(offset))
            .unwrap();
        store.put_card(card_due_on(user, due)).await;
    }
    store.put_card(card_due_on(Uuid::new_v4(), date(1))).await;

    let due = service.due_cards(user).await.unwrap();
    let filtered = service.list_cards(user, CardFilter::Due).await.unwrap();

    assert_eq!(due.len(), offsets.iter().filter(|o| **o <= 0).count());
    assert_eq!(due, filtered);
    assert!(due.iter().all(|card| card.next_review_date <= date(10)));
    assert!(due.windows(2).all(|w| w[0].next_review_date <= w[1].next_review_date));
}

#[tokio::test]
async fn test_list_by_status() {
    let store = Arc::new(InMemoryAdapter::new());
    let service = service_at(&store, noon(10));
    let user = Uuid::new_v4();

    for repetition in [0, 2, 3, 7, 8, 12] {
        let mut card = card_due_on(user, date(12));
        card.repetition = repetition;
        store.put_card(card).await;
    }

    let count = |status| {
        let service = service.clone();
        async move {
            service
                .list_cards(user, CardFilter::Status(status))
                .await
                .unwrap()
                .len()
        }
    };
    assert_eq!(count(CardStatus::Learning).await, 2);
    assert_eq!(count(CardStatus::Reviewing).await, 2);
    assert_eq!(count(CardStatus::Mastered).await, 2);
    assert_eq!(service.list_cards(user, CardFilter::All).await.unwrap().len(), 6);
}

#[tokio::test]
async fn test_preview_does_not_persist() {
    let store = Arc::new(InMemoryAdapter::new());
    let service = service_at(&store, noon(10));
    let user = Uuid::new_v4();
    let card = service.add_card(user, Uuid::new_v4()).await.unwrap();

    let previews = service.preview(user, card.id).await.unwrap();

    assert_eq!(previews.len(), 5);
    assert_eq!(previews[4].1.repetition, 1);
    assert_eq!(store.get_card(user, card.id).await.unwrap(), card);
    assert!(service.history(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_stats_summarize_deck_and_streak() {
    let store = Arc::new(InMemoryAdapter::new());
    let service = service_at(&store, noon(10));
    let user = Uuid::new_v4();

    for due in [date(8), date(10), date(11), date(14)] {
        store.put_card(card_due_on(user, due)).await;
    }
    // Reviews today, yesterday and the day before, then a gap.
    for at in [noon(10), noon(9), noon(9), noon(8), noon(5)] {
        store
            .append(ReviewEvent {
                id: Uuid::new_v4(),
                flashcard_id: Uuid::new_v4(),
                user_id: user,
                rating: 4,
                review_interval: 1,
                reviewed_at: at,
            })
            .await
            .unwrap();
    }

    let stats = service.stats(user).await.unwrap();

    assert_eq!(stats.total_cards, 4);
    assert_eq!(stats.due_cards, 2);
    assert_eq!(stats.completion_percent, 50.0);
    assert_eq!(stats.review_streak, 3);
    assert_eq!(stats.next_review_date, Some(date(8)));
}

#[tokio::test]
async fn test_stats_for_empty_deck() {
    let store = Arc::new(InMemoryAdapter::new());
    let stats = service_at(&store, noon(10)).stats(Uuid::new_v4()).await.unwrap();

    assert_eq!(stats.total_cards, 0);
    assert_eq!(stats.due_cards, 0);
    assert_eq!(stats.completion_percent, 0.0);
    assert_eq!(stats.review_streak, 0);
    assert_eq!(stats.next_review_date, None);
}

#[tokio::test]
async fn test_streak_follows_local_calendar_day() {
    let store = Arc::new(InMemoryAdapter::new());
    let user = Uuid::new_v4();
    // 20:00 UTC on the 9th is already the 10th in UTC+8.
    let late = Utc.with_ymd_and_hms(2024, 4, 9, 20, 0, 0).unwrap();
    let taipei = FixedOffset::east_opt(8 * 3600).unwrap();
    let service = ReviewService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(FixedClock::new(late, taipei)),
    );
    let card = service.add_card(user, Uuid::new_v4()).await.unwrap();
    assert_eq!(card.next_review_date, date(10));

    let reviewed = service.review(user, card.id, 5).await.unwrap();
    assert_eq!(reviewed.next_review_date, date(11));
    assert_eq!(service.stats(user).await.unwrap().review_streak, 1);
}

#[tokio::test]
async fn test_history_is_newest_first_and_limited() {
    let store = Arc::new(InMemoryAdapter::new());
    let user = Uuid::new_v4();
    let card = service_at(&store, noon(1))
        .add_card(user, Uuid::new_v4())
        .await
        .unwrap();
    for day in 1..=6 {
        service_at(&store, noon(day))
            .review(user, card.id, 3)
            .await
            .unwrap();
    }

    let history = service_at(&store, noon(6))
        .with_history_limit(4)
        .history(user)
        .await
        .unwrap();

    let days: Vec<DateTime<Utc>> = history.iter().map(|e| e.reviewed_at).collect();
    assert_eq!(days, vec![noon(6), noon(5), noon(4), noon(3)]);
}

//=========================================================================================
// Optimistic concurrency
//=========================================================================================

/// Fails the first `failures` review writes with `error`, writing nothing.
struct FlakyStore {
    inner: Arc<InMemoryAdapter>,
    failures: usize,
    error: fn() -> PortError,
    attempts: AtomicUsize,
}

#[async_trait]
impl CardStore for FlakyStore {
    async fn create_card(&self, card: Flashcard) -> PortResult<Flashcard> {
        self.inner.create_card(card).await
    }

    async fn get_card(&self, user_id: Uuid, card_id: Uuid) -> PortResult<Flashcard> {
        self.inner.get_card(user_id, card_id).await
    }

    async fn list_cards(
        &self,
        user_id: Uuid,
        status: Option<CardStatus>,
    ) -> PortResult<Vec<Flashcard>> {
        self.inner.list_cards(user_id, status).await
    }

    async fn record_review(
        &self,
        card: &Flashcard,
        expected_review_count: i32,
        event: ReviewEvent,
    ) -> PortResult<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err((self.error)());
        }
        self.inner
            .record_review(card, expected_review_count, event)
            .await
    }

    async fn delete_card(&self, user_id: Uuid, card_id: Uuid) -> PortResult<()> {
        self.inner.delete_card(user_id, card_id).await
    }
}

fn lost_race() -> PortError {
    PortError::Conflict("simulated".to_string())
}

fn log_insert_failed() -> PortError {
    PortError::Unexpected("review log insert failed".to_string())
}

fn flaky_service(
    store: &Arc<InMemoryAdapter>,
    failures: usize,
    error: fn() -> PortError,
) -> (ReviewService, Arc<FlakyStore>) {
    let flaky = Arc::new(FlakyStore {
        inner: store.clone(),
        failures,
        error,
        attempts: AtomicUsize::new(0),
    });
    let service = ReviewService::new(
        flaky.clone(),
        store.clone(),
        store.clone(),
        Arc::new(FixedClock::new(noon(10), FixedOffset::east_opt(0).unwrap())),
    );
    (service, flaky)
}

fn event_for(card: &Flashcard, rating: i32) -> ReviewEvent {
    ReviewEvent {
        id: Uuid::new_v4(),
        flashcard_id: card.id,
        user_id: card.user_id,
        rating,
        review_interval: card.interval,
        reviewed_at: noon(10),
    }
}

#[tokio::test]
async fn test_review_retries_after_conflict() {
    let store = Arc::new(InMemoryAdapter::new());
    let user = Uuid::new_v4();
    let card = card_due_on(user, date(10));
    store.put_card(card.clone()).await;

    let (service, flaky) = flaky_service(&store, 2, lost_race);
    let reviewed = service.review(user, card.id, 4).await.unwrap();

    assert_eq!(flaky.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(reviewed.review_count, 1);
    assert_eq!(store.recent(user, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_review_gives_up_after_repeated_conflicts() {
    let store = Arc::new(InMemoryAdapter::new());
    let user = Uuid::new_v4();
    let card = card_due_on(user, date(10));
    store.put_card(card.clone()).await;

    let (service, _) = flaky_service(&store, 3, lost_race);
    let err = service.review(user, card.id, 4).await.unwrap_err();

    assert!(matches!(err, PortError::Conflict(_)));
    assert_eq!(store.get_card(user, card.id).await.unwrap(), card);
    assert!(store.recent(user, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_log_write_leaves_card_unchanged() {
    let store = Arc::new(InMemoryAdapter::new());
    let user = Uuid::new_v4();
    let card = card_due_on(user, date(10));
    store.put_card(card.clone()).await;

    let (service, flaky) = flaky_service(&store, 1, log_insert_failed);
    let err = service.review(user, card.id, 5).await.unwrap_err();

    assert!(matches!(err, PortError::Unexpected(_)));
    // Not a conflict, so no retry.
    assert_eq!(flaky.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(store.get_card(user, card.id).await.unwrap(), card);
    assert!(store.recent(user, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_store_writes_card_and_log_together_or_not_at_all() {
    let store = Arc::new(InMemoryAdapter::new());
    let user = Uuid::new_v4();
    let card = card_due_on(user, date(10));
    store.put_card(card.clone()).await;

    let mut reviewed = card.clone();
    reviewed.repetition = 1;
    reviewed.review_count = 1;

    // The log half is rejected (rating outside 1..=5), so the card stays put.
    let err = store
        .record_review(&reviewed, 0, event_for(&reviewed, 9))
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::Unexpected(_)));
    assert_eq!(store.get_card(user, card.id).await.unwrap(), card);
    assert!(store.recent(user, 10).await.unwrap().is_empty());

    store
        .record_review(&reviewed, 0, event_for(&reviewed, 4))
        .await
        .unwrap();
    assert_eq!(store.get_card(user, card.id).await.unwrap(), reviewed);
    assert_eq!(store.recent(user, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_stale_write_is_rejected_by_store() {
    let store = Arc::new(InMemoryAdapter::new());
    let user = Uuid::new_v4();
    let card = card_due_on(user, date(10));
    store.put_card(card.clone()).await;

    let mut first = card.clone();
    first.review_count = 1;
    store
        .record_review(&first, 0, event_for(&first, 4))
        .await
        .unwrap();

    let mut second = card.clone();
    second.review_count = 1;
    assert!(matches!(
        store.record_review(&second, 0, event_for(&second, 4)).await,
        Err(PortError::Conflict(_))
    ));
    // Only the winning review is logged.
    assert_eq!(store.recent(user, 10).await.unwrap().len(), 1);
}
