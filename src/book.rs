//! Book types - the catalog entity and its request/response contracts
//!
//! - `Book`: the persisted record, including the storage path of its file
//! - `BookResponse`: what clients see (never the storage path)
//! - `NewBook` / `BookPatch`: create and partial-update payloads
//! - `BookFilter`: conjunctive filter plus pagination for listing

use crate::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Maximum length of the text columns (`name`, `author`, `genre`)
pub const MAX_TEXT_LEN: usize = 256;

/// Page size used when the caller does not ask for one
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Largest page size a caller may ask for
pub const MAX_PAGE_SIZE: u32 = 100;

/// Date format accepted on the wire and stored in SQLite
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A book record as stored in the `book` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    /// Generated on insert, immutable afterwards
    pub id: i64,
    pub name: String,
    pub author: String,
    pub genre: String,
    pub date_published: NaiveDate,
    /// Blob store path of the uploaded file, if any
    pub file_path: Option<String>,
}

/// Client-facing representation of a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookResponse {
    pub id: i64,
    pub name: String,
    pub author: String,
    pub genre: String,
    pub date_published: NaiveDate,
}

impl From<Book> for BookResponse {
    fn from(book: Book) -> Self {
        Self {
            id: book.id,
            name: book.name,
            author: book.author,
            genre: book.genre,
            date_published: book.date_published,
        }
    }
}

/// Payload for creating a book. All fields are required.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewBook {
    pub name: String,
    pub author: String,
    pub genre: String,
    pub date_published: NaiveDate,
}

impl NewBook {
    /// Build a payload from raw form values, rejecting missing or empty ones.
    pub fn from_fields(
        name: Option<String>,
        author: Option<String>,
        genre: Option<String>,
        date_published: Option<String>,
    ) -> Result<Self> {
        let date_published = required("date_published", date_published)?;
        let book = Self {
            name: required("name", name)?,
            author: required("author", author)?,
            genre: required("genre", genre)?,
            date_published: parse_date(&date_published)?,
        };
        book.validate()?;
        Ok(book)
    }

    pub fn validate(&self) -> Result<()> {
        check_text("name", &self.name)?;
        check_text("author", &self.author)?;
        check_text("genre", &self.genre)
    }
}

/// Partial update of a book.
///
/// `None` and empty strings both mean "leave the field alone": a patch can
/// never blank out a text field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BookPatch {
    pub name: Option<String>,
    pub author: Option<String>,
    pub genre: Option<String>,
    pub date_published: Option<NaiveDate>,
}

impl BookPatch {
    /// Build a patch from raw form values. An empty date string is "not provided".
    pub fn from_fields(
        name: Option<String>,
        author: Option<String>,
        genre: Option<String>,
        date_published: Option<String>,
    ) -> Result<Self> {
        let date_published = match date_published.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(parse_date(raw)?),
        };
        let patch = Self { name, author, genre, date_published };
        patch.validate()?;
        Ok(patch)
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [("name", &self.name), ("author", &self.author), ("genre", &self.genre)] {
            if let Some(v) = provided(value) {
                check_text(field, v)?;
            }
        }
        Ok(())
    }

    /// Overwrite the fields of `book` that this patch provides.
    pub fn apply(&self, book: &mut Book) {
        if let Some(name) = provided(&self.name) {
            book.name = name.to_string();
        }
        if let Some(author) = provided(&self.author) {
            book.author = author.to_string();
        }
        if let Some(genre) = provided(&self.genre) {
            book.genre = genre.to_string();
        }
        if let Some(date) = self.date_published {
            book.date_published = date;
        }
    }
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_SIZE
}

/// Filter and pagination parameters for listing books.
///
/// `offset` is a page index, not a row count: the first row returned is
/// `offset * limit`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BookFilter {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub date_published: Option<NaiveDate>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

impl Default for BookFilter {
    fn default() -> Self {
        Self {
            name: None,
            author: None,
            genre: None,
            date_published: None,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl BookFilter {
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 || self.limit > MAX_PAGE_SIZE {
            return Err(Error::InvalidInput(format!(
                "limit must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, self.limit
            )));
        }
        Ok(())
    }

    pub fn name(&self) -> Option<&str> {
        provided(&self.name)
    }

    pub fn author(&self) -> Option<&str> {
        provided(&self.author)
    }

    pub fn genre(&self) -> Option<&str> {
        provided(&self.genre)
    }

    /// Number of rows skipped before the requested page.
    pub fn row_offset(&self) -> i64 {
        i64::from(self.limit) * i64::from(self.offset)
    }
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|_| {
        Error::InvalidInput(format!("date_published must be in format YYYY-MM-DD, got '{}'", raw))
    })
}

fn provided(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn required(field: &str, value: Option<String>) -> Result<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::InvalidInput(format!("{} is required", field))),
    }
}

fn check_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{} must not be empty", field)));
    }
    if value.chars().count() > MAX_TEXT_LEN {
        return Err(Error::InvalidInput(format!(
            "{} must be at most {} characters",
            field, MAX_TEXT_LEN
        )));
    }
    Ok(())
}
