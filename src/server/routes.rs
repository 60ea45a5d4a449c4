use axum::{
    body::{Body, Bytes},
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, Path, Query, Request, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum::extract::rejection::QueryRejection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use crate::blob::{original_name, BlobStore};
use crate::book::{BookFilter, BookPatch, BookResponse, NewBook};
use crate::server::AppState;
use crate::Error;

const OCTET_STREAM: &str = "application/octet-stream";
const PREVIEW_CONTENT_TYPE: &str = "application/pdf";

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Error::InvalidInput(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            Error::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg.clone()),
            Error::Storage(_) | Error::Io(_) | Error::Task(_) => {
                tracing::error!("Request failed: {}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };
        (status, Json(ErrorResponse { detail })).into_response()
    }
}

/// Multipart fields of a create or update request
#[derive(Default)]
struct BookForm {
    name: Option<String>,
    author: Option<String>,
    genre: Option<String>,
    date_published: Option<String>,
    file: Option<Upload>,
}

struct Upload {
    file_name: String,
    content: Bytes,
}

impl Upload {
    /// An upload part with no filename counts as "no file sent"
    fn is_present(&self) -> bool {
        !self.file_name.is_empty()
    }

    async fn save(&self, blobs: &BlobStore) -> crate::Result<String> {
        let mut reader: &[u8] = &self.content;
        blobs.save(&mut reader, &self.file_name).await
    }
}

/// A body cut off by the upload limit is 413; anything else wrong with the form is 422.
fn form_error(status: StatusCode, text: String) -> Error {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge(text)
    } else {
        Error::InvalidInput(text)
    }
}

fn invalid_multipart(e: MultipartError) -> Error {
    form_error(e.status(), e.body_text())
}

async fn read_form(multipart: Result<Multipart, MultipartRejection>) -> Result<BookForm, Error> {
    let mut multipart = multipart.map_err(|e| form_error(e.status(), e.body_text()))?;
    let mut form = BookForm::default();

    while let Some(field) = multipart.next_field().await.map_err(invalid_multipart)? {
        let Some(field_name) = field.name().map(str::to_string) else {
            continue;
        };
        match field_name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content = field.bytes().await.map_err(invalid_multipart)?;
                form.file = Some(Upload { file_name, content });
            }
            "name" => form.name = Some(field.text().await.map_err(invalid_multipart)?),
            "author" => form.author = Some(field.text().await.map_err(invalid_multipart)?),
            "genre" => form.genre = Some(field.text().await.map_err(invalid_multipart)?),
            "date_published" => {
                form.date_published = Some(field.text().await.map_err(invalid_multipart)?)
            }
            other => tracing::debug!("Ignoring unknown form field {}", other),
        }
    }

    Ok(form)
}

pub async fn get_book(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<BookResponse>, Error> {
    Ok(Json(state.repo.fetch_by_id(id).await?.into()))
}

pub async fn list_books(
    State(state): State<Arc<AppState>>,
    query: Result<Query<BookFilter>, QueryRejection>,
) -> Result<Json<Vec<BookResponse>>, Error> {
    let Query(filter) = query.map_err(|e| Error::InvalidInput(e.body_text()))?;
    let books = state.repo.list(&filter).await?;
    Ok(Json(books.into_iter().map(BookResponse::from).collect()))
}

pub async fn create_book(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<BookResponse>, Error> {
    let form = read_form(multipart).await?;
    let data = NewBook::from_fields(form.name, form.author, form.genre, form.date_published)?;
    let upload = form
        .file
        .filter(Upload::is_present)
        .ok_or_else(|| Error::InvalidInput("file is required".to_string()))?;

    let repo = &state.repo;
    let file_path = upload.save(repo.blobs()).await?;
    let book = repo.create(&data, Some(&file_path)).await?;
    Ok(Json(book.into()))
}

pub async fn update_book(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<BookResponse>, Error> {
    let form = read_form(multipart).await?;
    let patch = BookPatch::from_fields(form.name, form.author, form.genre, form.date_published)?;

    let repo = &state.repo;
    // check before storing anything, so a bad id leaves no file behind
    repo.fetch_by_id(id).await?;
    let file_path = match form.file.filter(Upload::is_present) {
        Some(upload) => Some(upload.save(repo.blobs()).await?),
        None => None,
    };
    let book = repo.update(id, &patch, file_path.as_deref()).await?;
    Ok(Json(book.into()))
}

pub async fn delete_book(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, Error> {
    state.repo.delete_by_id(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn download_book_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Response, Error> {
    let (path, mut response) = serve_stored_file(&state, id, request).await?;
    let disposition = content_disposition(original_name(&path))?;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(OCTET_STREAM));
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    Ok(response)
}

pub async fn preview_book_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Response, Error> {
    let (_, mut response) = serve_stored_file(&state, id, request).await?;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(PREVIEW_CONTENT_TYPE));
    Ok(response)
}

/// Stream a book's file back, or NotFound if the record or the file is gone.
///
/// The request is handed to `ServeFile` as is, so range and conditional
/// headers keep working.
async fn serve_stored_file(
    state: &AppState,
    id: i64,
    request: Request,
) -> Result<(String, Response), Error> {
    let path = state.repo.stored_file(id).await?;
    let response = ServeFile::new(&path)
        .oneshot(request)
        .await
        .unwrap_or_else(|never| match never {});
    if response.status() == StatusCode::NOT_FOUND {
        return Err(Error::file_not_found());
    }
    Ok((path, response.map(Body::new)))
}

fn content_disposition(file_name: &str) -> Result<HeaderValue, Error> {
    let plain = file_name
        .chars()
        .all(|c| c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\');
    let value = if plain {
        format!("attachment; filename=\"{}\"", file_name)
    } else {
        format!("attachment; filename*=utf-8''{}", urlencoding::encode(file_name))
    };
    HeaderValue::try_from(value).map_err(|e| Error::Io(std::io::Error::other(e)))
}
