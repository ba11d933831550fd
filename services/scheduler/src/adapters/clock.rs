//! services/scheduler/src/adapters/clock.rs
//!
//! Clock implementations for the `Clock` port.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use exam_prep_core::ports::Clock;

/// Wall clock whose calendar days start at a fixed UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct OffsetClock {
    offset: FixedOffset,
}

impl OffsetClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Clock for OffsetClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }
}

/// A clock stopped at one moment. Advance it by swapping in a new instance.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    at: DateTime<Utc>,
    offset: FixedOffset,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self { at, offset }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.at
    }

    fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }
}
