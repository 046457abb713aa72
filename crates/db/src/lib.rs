pub mod connection;
pub mod kv;
pub mod migrations;

pub use connection::{connect_with_settings, is_in_memory, DbPool};
pub use kv::{KvStoreError, SqliteKvStore};
