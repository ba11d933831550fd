pub mod adapters;
pub mod commands;
pub mod config;
pub mod error;

use std::sync::Arc;

use adapters::{DbAdapter, OffsetClock};
use config::Config;
use exam_prep_core::ReviewService;

/// Wires the PostgreSQL adapter and the configured clock into a `ReviewService`.
pub fn review_service(db: Arc<DbAdapter>, config: &Config) -> ReviewService {
    ReviewService::new(
        db.clone(),
        db.clone(),
        db,
        Arc::new(OffsetClock::new(config.review_utc_offset)),
    )
    .with_history_limit(config.history_limit)
}
