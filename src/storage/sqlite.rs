//! SQLite storage implementation

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params, params_from_iter};
use crate::book::{Book, BookFilter, NewBook, DATE_FORMAT};
use crate::{Error, Result};
use super::schema;

const BOOK_COLUMNS: &str = "id, name, author, genre, date_published, file_path";

/// SQLite-backed storage for book records
///
/// The connection sits behind a mutex; every method holds it for one
/// statement or one transaction. Clones share the connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn: Arc::new(Mutex::new(conn)) };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn: Arc::new(Mutex::new(conn)) };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn();
        for stmt in schema::all_schema_statements() {
            conn.execute(stmt, [])?;
        }
        Ok(())
    }

    /// A panic mid-statement leaves nothing half-applied outside a
    /// transaction, so a poisoned lock is still usable.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========== Book Operations ==========

    /// Get a book by id
    pub fn get_book(&self, id: i64) -> Result<Option<Book>> {
        self.conn()
            .query_row(
                &format!("SELECT {BOOK_COLUMNS} FROM book WHERE id = ?1"),
                [id],
                row_to_book,
            )
            .optional()
            .map_err(Into::into)
    }

    /// List one page of books matching every criterion set on `filter`, ordered by id.
    ///
    /// With `date_requires_genre` the date criterion only applies when a genre
    /// criterion is also present.
    pub fn list_books(&self, filter: &BookFilter, date_requires_genre: bool) -> Result<Vec<Book>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(name) = filter.name() {
            clauses.push(r"name LIKE ? ESCAPE '\'");
            values.push(Value::Text(contains_pattern(name)));
        }
        if let Some(author) = filter.author() {
            clauses.push(r"author LIKE ? ESCAPE '\'");
            values.push(Value::Text(contains_pattern(author)));
        }
        if let Some(genre) = filter.genre() {
            clauses.push(r"genre LIKE ? ESCAPE '\'");
            values.push(Value::Text(contains_pattern(genre)));
        }
        if let Some(date) = filter.date_published {
            if filter.genre().is_some() || !date_requires_genre {
                clauses.push("date_published = ?");
                values.push(Value::Text(date.format(DATE_FORMAT).to_string()));
            }
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {BOOK_COLUMNS} FROM book {where_clause} ORDER BY id LIMIT ? OFFSET ?"
        );
        values.push(Value::Integer(i64::from(filter.limit)));
        values.push(Value::Integer(filter.row_offset()));

        tracing::debug!("Listing books: {} ({} params)", sql, values.len());

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let books = stmt
            .query_map(params_from_iter(values), row_to_book)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(books)
    }

    /// Insert a new book and return it with its generated id
    pub fn insert_book(&self, book: &NewBook, file_path: Option<&str>) -> Result<Book> {
        let conn = self.conn();
        conn.execute(
            r#"
            INSERT INTO book (name, author, genre, date_published, file_path)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                book.name,
                book.author,
                book.genre,
                book.date_published,
                file_path,
            ],
        )?;

        Ok(Book {
            id: conn.last_insert_rowid(),
            name: book.name.clone(),
            author: book.author.clone(),
            genre: book.genre.clone(),
            date_published: book.date_published,
            file_path: file_path.map(str::to_string),
        })
    }

    /// Read a book, let `edit` change it and write every column back, all in
    /// one transaction.
    ///
    /// Returns the stored book and the file path it pointed at before, when
    /// `edit` changed it. NotFound if there is no such row.
    pub fn modify_book<F>(&self, id: i64, edit: F) -> Result<(Book, Option<String>)>
    where
        F: FnOnce(&mut Book),
    {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut book = tx
            .query_row(
                &format!("SELECT {BOOK_COLUMNS} FROM book WHERE id = ?1"),
                [id],
                row_to_book,
            )
            .optional()?
            .ok_or_else(Error::book_not_found)?;

        let previous_file = book.file_path.clone();
        edit(&mut book);
        book.id = id;

        tx.execute(
            r#"
            UPDATE book
            SET name = ?1, author = ?2, genre = ?3, date_published = ?4, file_path = ?5
            WHERE id = ?6
            "#,
            params![
                book.name,
                book.author,
                book.genre,
                book.date_published,
                book.file_path,
                book.id,
            ],
        )?;
        tx.commit()?;

        let replaced = previous_file.filter(|old| book.file_path.as_ref() != Some(old));
        Ok((book, replaced))
    }

    /// Delete a book row and commit. Returns the row as it was.
    pub fn delete_book(&self, id: i64) -> Result<Book> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let book = tx
            .query_row(
                &format!("DELETE FROM book WHERE id = ?1 RETURNING {BOOK_COLUMNS}"),
                [id],
                row_to_book,
            )
            .optional()?
            .ok_or_else(Error::book_not_found)?;
        tx.commit()?;
        Ok(book)
    }

    /// Every file path referenced by a book
    pub fn file_paths(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT file_path FROM book WHERE file_path IS NOT NULL AND file_path != ''"
        )?;
        let paths = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(paths)
    }

    /// Count all books
    pub fn count_books(&self) -> Result<usize> {
        let count: i64 = self.conn().query_row("SELECT COUNT(*) FROM book", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let with_files: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM book WHERE file_path IS NOT NULL AND file_path != ''",
            [],
            |row| row.get(0),
        )?;
        Ok(DbStats {
            books: self.count_books()?,
            books_with_files: with_files as usize,
        })
    }
}

/// Helper to convert a row to a Book
fn row_to_book(row: &rusqlite::Row) -> rusqlite::Result<Book> {
    Ok(Book {
        id: row.get(0)?,
        name: row.get(1)?,
        author: row.get(2)?,
        genre: row.get(3)?,
        date_published: row.get(4)?,
        file_path: row.get(5)?,
    })
}

/// LIKE pattern matching `needle` anywhere, with wildcards in `needle` taken literally
fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DbStats {
    pub books: usize,
    pub books_with_files: usize,
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Books: {}", self.books)?;
        writeln!(f, "  Books with files: {}", self.books_with_files)
    }
}
