use axum::{
    extract::DefaultBodyLimit,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use crate::blob::BlobStore;
use crate::config::{prepare_dirs, Settings, DEFAULT_MAX_UPLOAD_BYTES};
use crate::repository::BookRepository;
use crate::storage::SqliteStore;

pub mod routes;

/// Server state
pub struct AppState {
    pub repo: BookRepository,
    /// Largest request body accepted, uploads included
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(repo: BookRepository) -> Self {
        Self {
            repo,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }
}

/// Build the book routes around `state`.
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    Router::new()
        .route("/books", get(routes::list_books).post(routes::create_book))
        .route(
            "/books/{id}",
            get(routes::get_book)
                .put(routes::update_book)
                .delete(routes::delete_book),
        )
        .route("/books/{id}/download", get(routes::download_book_file))
        .route("/books/{id}/preview", get(routes::preview_book_file))
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Open the database and upload directory from `settings` and serve until Ctrl-C.
pub async fn start_server(settings: &Settings) -> anyhow::Result<()> {
    prepare_dirs(settings)?;
    let store = SqliteStore::open(&settings.database)?;
    let blobs = BlobStore::new(&settings.upload_dir);

    let repo = BookRepository::new(store, blobs)
        .with_date_filter_requires_genre(settings.date_filter_requires_genre);
    let state = Arc::new(AppState::new(repo).with_max_upload_bytes(settings.max_upload_bytes));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind((settings.host.as_str(), settings.port)).await?;
    tracing::info!("Starting server on {}", listener.local_addr()?);
    tracing::info!("Database: {}", settings.database.display());
    tracing::info!("Uploads: {}", settings.upload_dir.display());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
