//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with one table:
//! - book(id, name, author, genre, date_published, file_path)

pub mod schema;
pub mod sqlite;

pub use sqlite::{SqliteStore, DbStats};
