//! Database schema definitions

/// SQL to create the book table
pub const CREATE_BOOK_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS book (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL CHECK (length(name) BETWEEN 1 AND 256),
    author TEXT NOT NULL CHECK (length(author) BETWEEN 1 AND 256),
    genre TEXT NOT NULL CHECK (length(genre) BETWEEN 1 AND 256),
    date_published TEXT NOT NULL,
    file_path TEXT
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS ix_book_name ON book(name)",
    "CREATE INDEX IF NOT EXISTS ix_book_author ON book(author)",
    "CREATE INDEX IF NOT EXISTS ix_book_genre ON book(genre)",
];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![CREATE_BOOK_TABLE];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
