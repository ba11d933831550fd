pub mod domain;
pub mod ports;
pub mod review;
pub mod scheduler;

pub use domain::{CardFilter, CardStatus, Flashcard, FlashcardStats, ReviewEvent};
pub use ports::{CardStore, Clock, DueQuery, PortError, PortResult, ReviewLog, SystemClock};
pub use review::ReviewService;
pub use scheduler::{calculate_next_review, status_for, ReviewOutcome, ScheduleInput};
