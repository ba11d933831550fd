pub mod clock;
pub mod db;
pub mod memory;

pub use clock::{FixedClock, OffsetClock};
pub use db::DbAdapter;
pub use memory::InMemoryAdapter;
