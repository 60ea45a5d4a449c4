//! # Bookshelf - Book catalog service
//!
//! A catalog of book records, each optionally carrying an uploaded file.
//!
//! Bookshelf provides:
//! - `Book` records persisted in SQLite
//! - A filesystem blob store for uploaded files
//! - A repository that keeps records and files consistent on update/delete
//! - An HTTP surface for CRUD, filtered listing, download and preview

pub mod book;
pub mod blob;
pub mod storage;
pub mod repository;
pub mod server;
pub mod config;

// Re-exports for convenient access
pub use book::{Book, BookFilter, BookPatch, BookResponse, NewBook};
pub use blob::BlobStore;
pub use repository::BookRepository;
pub use storage::SqliteStore;

/// Result type alias for Bookshelf operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Bookshelf operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    pub fn book_not_found() -> Self {
        Error::NotFound("Book not found".to_string())
    }

    pub fn books_not_found() -> Self {
        Error::NotFound("Book(s) not found".to_string())
    }

    pub fn file_not_found() -> Self {
        Error::NotFound("File not found".to_string())
    }
}
