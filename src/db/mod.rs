pub mod feed;
pub mod models;
pub mod repository;
pub mod store;

pub use feed::{ResponseEvent, ResponseFeed};
pub use store::{EventStore, MemoryEventStore, SqliteEventStore};
