//! Book repository - record persistence plus blob store side effects
//!
//! Ordering rule for every mutation that retires a file: the row change is
//! committed first, the file is removed after. A crash in between leaves an
//! orphaned file (see `prune_orphans`), never a row pointing at nothing.

use std::collections::HashSet;

use crate::blob::{BlobStore, basename};
use crate::book::{Book, BookFilter, BookPatch, NewBook};
use crate::storage::SqliteStore;
use crate::{Error, Result};

pub struct BookRepository {
    store: SqliteStore,
    blobs: BlobStore,
    date_filter_requires_genre: bool,
}

impl BookRepository {
    pub fn new(store: SqliteStore, blobs: BlobStore) -> Self {
        Self {
            store,
            blobs,
            date_filter_requires_genre: true,
        }
    }

    /// Whether `list` only honours `date_published` when `genre` is also given.
    pub fn with_date_filter_requires_genre(mut self, enabled: bool) -> Self {
        self.date_filter_requires_genre = enabled;
        self
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Run `call` against the store on the blocking pool, off the runtime workers.
    async fn with_store<T, F>(&self, call: F) -> Result<T>
    where
        F: FnOnce(&SqliteStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || call(&store)).await?
    }

    pub async fn fetch_by_id(&self, id: i64) -> Result<Book> {
        self.with_store(move |store| store.get_book(id)?.ok_or_else(Error::book_not_found))
            .await
    }

    /// One page of matching books. An empty page is NotFound, never an empty list.
    pub async fn list(&self, filter: &BookFilter) -> Result<Vec<Book>> {
        filter.validate()?;
        let filter = filter.clone();
        let date_requires_genre = self.date_filter_requires_genre;
        let books = self
            .with_store(move |store| store.list_books(&filter, date_requires_genre))
            .await?;
        if books.is_empty() {
            return Err(Error::books_not_found());
        }
        Ok(books)
    }

    pub async fn create(&self, data: &NewBook, file_path: Option<&str>) -> Result<Book> {
        data.validate()?;
        let data = data.clone();
        let file_path = file_path.map(str::to_string);
        let book = self
            .with_store(move |store| store.insert_book(&data, file_path.as_deref()))
            .await?;
        tracing::info!("Created book {} ({:?})", book.id, book.name);
        Ok(book)
    }

    /// Apply `patch` and, if given and different, point the book at `new_file_path`.
    ///
    /// The read and the write share one transaction; the superseded file is
    /// removed only once it is committed.
    pub async fn update(
        &self,
        id: i64,
        patch: &BookPatch,
        new_file_path: Option<&str>,
    ) -> Result<Book> {
        patch.validate()?;
        let patch = patch.clone();
        let new_file_path = new_file_path.filter(|p| !p.is_empty()).map(str::to_string);

        let (book, replaced) = self
            .with_store(move |store| {
                store.modify_book(id, |book| {
                    patch.apply(book);
                    if let Some(path) = new_file_path {
                        book.file_path = Some(path);
                    }
                })
            })
            .await?;
        tracing::info!("Updated book {}", book.id);

        if let Some(old) = replaced {
            self.blobs.remove(Some(&old)).await?;
        }
        Ok(book)
    }

    /// Delete the row, then its file.
    pub async fn delete_by_id(&self, id: i64) -> Result<()> {
        let book = self.with_store(move |store| store.delete_book(id)).await?;
        tracing::info!("Deleted book {}", book.id);
        self.blobs.remove(book.file_path.as_deref()).await
    }

    /// Stored file of a book, verified to still exist on disk.
    pub async fn stored_file(&self, id: i64) -> Result<String> {
        let book = self.fetch_by_id(id).await?;
        match book.file_path {
            Some(path) if self.blobs.exists(Some(&path)).await => Ok(path),
            _ => Err(Error::file_not_found()),
        }
    }

    /// Remove stored files no book refers to. Returns the orphans found.
    pub async fn prune_orphans(&self, dry_run: bool) -> Result<Vec<String>> {
        // generated names are unique, so compare by name rather than by path spelling
        let stored = self.with_store(SqliteStore::file_paths).await?;
        let referenced: HashSet<&str> = stored.iter().map(|p| basename(p)).collect();
        let orphans: Vec<String> = self
            .blobs
            .stored_paths()
            .await?
            .into_iter()
            .filter(|path| !referenced.contains(basename(path)))
            .collect();

        if !dry_run {
            for path in &orphans {
                self.blobs.remove(Some(path)).await?;
            }
            tracing::info!("Pruned {} orphaned file(s)", orphans.len());
        }
        Ok(orphans)
    }
}
