pub mod clock;
pub mod durable;
pub mod error;
pub mod migrations;
pub mod sqlite;
pub mod ttl;

pub use clock::{Clock, ManualClock, SystemClock};
pub use durable::{DurableEntry, DurableStore};
pub use error::CacheError;
pub use sqlite::SqliteStore;
pub use ttl::{CacheEntry, CacheStats, TtlCache};
