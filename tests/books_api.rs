use axum::{
    Router,
    body::{Body, Bytes},
    http::{HeaderMap, Request, StatusCode, header},
};
use bookshelf::server::{AppState, router};
use bookshelf::{BlobStore, BookRepository, SqliteStore};
use http_body_util::BodyExt;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "bookshelf-test-boundary";

struct TestApp {
    router: Router,
    uploads: PathBuf,
    _dir: TempDir,
}

struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl TestResponse {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body is JSON")
    }
}

impl TestApp {
    fn new() -> Self {
        Self::build(|state| state)
    }

    fn with_upload_limit(max_upload_bytes: usize) -> Self {
        Self::build(|state| state.with_max_upload_bytes(max_upload_bytes))
    }

    fn build(configure: impl FnOnce(AppState) -> AppState) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let uploads = dir.path().join("uploads");
        let repo = BookRepository::new(
            SqliteStore::open_in_memory().unwrap(),
            BlobStore::new(&uploads),
        );
        Self {
            router: router(Arc::new(configure(AppState::new(repo)))),
            uploads,
            _dir: dir,
        }
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        TestResponse { status, headers, body }
    }

    async fn get(&self, uri: &str) -> TestResponse {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap()).await
    }

    async fn delete(&self, uri: &str) -> TestResponse {
        let request = Request::builder()
            .method("DELETE")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    async fn multipart(
        &self,
        method: &str,
        uri: &str,
        fields: &[(&str, &str)],
        file: Option<(&str, &[u8])>,
    ) -> TestResponse {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(fields, file)))
            .unwrap();
        self.send(request).await
    }

    async fn create(&self, name: &str, author: &str, genre: &str, date: &str, file: Option<(&str, &[u8])>) -> i64 {
        let response = self
            .multipart(
                "POST",
                "/books",
                &[("name", name), ("author", author), ("genre", genre), ("date_published", date)],
                file,
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "create failed: {:?}", response.body);
        response.json()["id"].as_i64().expect("id is an integer")
    }

    fn stored_files(&self) -> usize {
        std::fs::read_dir(&self.uploads).map(|dir| dir.count()).unwrap_or(0)
    }
}

fn upload<'a>(file_name: &'a str, content: &'a [u8]) -> Option<(&'a str, &'a [u8])> {
    Some((file_name, content))
}

fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, content)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

#[tokio::test]
async fn create_dune_then_download_original_bytes() {
    let app = TestApp::new();
    let content = b"%PDF-1.4 arrakis";

    let response = app
        .multipart(
            "POST",
            "/books",
            &[
                ("name", "Dune"),
                ("author", "Herbert"),
                ("genre", "SciFi"),
                ("date_published", "1965-08-01"),
            ],
            upload("dune.pdf", content),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let json = response.json();
    let id = json["id"].as_i64().unwrap();
    assert_eq!(json["name"], "Dune");
    assert_eq!(json["author"], "Herbert");
    assert_eq!(json["genre"], "SciFi");
    assert_eq!(json["date_published"], "1965-08-01");
    assert!(json.get("file_path").is_none());

    let fetched = app.get(&format!("/books/{id}")).await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.json(), json);

    let download = app.get(&format!("/books/{id}/download")).await;
    assert_eq!(download.status, StatusCode::OK);
    assert_eq!(&download.body[..], content);
    assert_eq!(download.headers[header::CONTENT_TYPE], "application/octet-stream");
    assert_eq!(
        download.headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"dune.pdf\""
    );

    let preview = app.get(&format!("/books/{id}/preview")).await;
    assert_eq!(preview.status, StatusCode::OK);
    assert_eq!(&preview.body[..], content);
    assert_eq!(preview.headers[header::CONTENT_TYPE], "application/pdf");
}

#[tokio::test]
async fn get_missing_book_is_404() {
    let app = TestApp::new();
    let response = app.get("/books/99999").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json()["detail"], "Book not found");
}

#[tokio::test]
async fn download_and_preview_of_missing_book_are_404() {
    let app = TestApp::new();
    assert_eq!(app.get("/books/99999/download").await.status, StatusCode::NOT_FOUND);
    assert_eq!(app.get("/books/99999/preview").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn download_is_404_once_file_is_gone() {
    let app = TestApp::new();
    let id = app.create("Dune", "Herbert", "SciFi", "1965-08-01", upload("dune.pdf", b"spice")).await;

    for entry in std::fs::read_dir(&app.uploads).unwrap() {
        std::fs::remove_file(entry.unwrap().path()).unwrap();
    }

    let download = app.get(&format!("/books/{id}/download")).await;
    assert_eq!(download.status, StatusCode::NOT_FOUND);
    assert_eq!(download.json()["detail"], "File not found");
    assert_eq!(app.get(&format!("/books/{id}/preview")).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn preview_serves_byte_ranges() {
    let app = TestApp::new();
    let id = app.create("Dune", "Herbert", "SciFi", "1965-08-01", upload("dune.pdf", b"%PDF-1.4 arrakis")).await;

    let request = Request::builder()
        .uri(format!("/books/{id}/preview"))
        .header(header::RANGE, "bytes=0-3")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(&response.body[..], b"%PDF");
    assert_eq!(response.headers[header::CONTENT_TYPE], "application/pdf");
}

#[tokio::test]
async fn oversized_upload_is_413_and_stores_nothing() {
    let app = TestApp::with_upload_limit(1024);
    let content = vec![b'x'; 10_000];

    let response = app
        .multipart(
            "POST",
            "/books",
            &[
                ("name", "Dune"),
                ("author", "Herbert"),
                ("genre", "SciFi"),
                ("date_published", "1965-08-01"),
            ],
            upload("dune.pdf", &content),
        )
        .await;

    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(response.json()["detail"].is_string());
    assert_eq!(app.stored_files(), 0);
    assert_eq!(app.get("/books").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn upload_within_limit_is_accepted() {
    let app = TestApp::with_upload_limit(4096);
    app.create("Dune", "Herbert", "SciFi", "1965-08-01", upload("dune.pdf", &[b'x'; 1000])).await;
    assert_eq!(app.stored_files(), 1);
}

#[tokio::test]
async fn list_empty_catalog_is_404() {
    let app = TestApp::new();
    let response = app.get("/books").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json()["detail"], "Book(s) not found");
}

#[tokio::test]
async fn list_pages_are_disjoint_and_ordered() {
    let app = TestApp::new();
    let first = app.create("Dune", "Herbert", "SciFi", "1965-08-01", upload("a.pdf", b"a")).await;
    let second = app.create("Emma", "Austen", "Romance", "1815-12-23", upload("b.pdf", b"b")).await;

    let all = app.get("/books").await.json();
    assert_eq!(all.as_array().unwrap().len(), 2);

    let page0 = app.get("/books?limit=1&offset=0").await.json();
    let page1 = app.get("/books?limit=1&offset=1").await.json();
    assert_eq!(page0[0]["id"].as_i64(), Some(first));
    assert_eq!(page1[0]["id"].as_i64(), Some(second));
    assert_eq!(page0[0], all[0]);
    assert_eq!(page1[0], all[1]);

    assert_eq!(app.get("/books?limit=1&offset=2").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_filters_by_substring() {
    let app = TestApp::new();
    app.create("Dune", "Frank Herbert", "SciFi", "1965-08-01", upload("a.pdf", b"a")).await;
    app.create("Emma", "Jane Austen", "Romance", "1815-12-23", upload("b.pdf", b"b")).await;

    let by_author = app.get("/books?author=AUSTEN").await.json();
    assert_eq!(by_author.as_array().unwrap().len(), 1);
    assert_eq!(by_author[0]["name"], "Emma");

    let by_genre_and_date = app.get("/books?genre=sci&date_published=1965-08-01").await.json();
    assert_eq!(by_genre_and_date.as_array().unwrap().len(), 1);
    assert_eq!(by_genre_and_date[0]["name"], "Dune");

    assert_eq!(app.get("/books?name=zzz").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_rejects_out_of_range_limit() {
    let app = TestApp::new();
    assert_eq!(app.get("/books?limit=0").await.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.get("/books?limit=101").await.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.get("/books?offset=-1").await.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn create_validates_form() {
    let app = TestApp::new();
    let fields = [
        ("name", "Dune"),
        ("author", "Herbert"),
        ("genre", "SciFi"),
        ("date_published", "1965-08-01"),
    ];

    let no_file = app.multipart("POST", "/books", &fields, None).await;
    assert_eq!(no_file.status, StatusCode::UNPROCESSABLE_ENTITY);

    let missing_name = app
        .multipart("POST", "/books", &fields[1..], upload("dune.pdf", b"x"))
        .await;
    assert_eq!(missing_name.status, StatusCode::UNPROCESSABLE_ENTITY);

    let bad_date = app
        .multipart(
            "POST",
            "/books",
            &[("name", "Dune"), ("author", "Herbert"), ("genre", "SciFi"), ("date_published", "August 1965")],
            upload("dune.pdf", b"x"),
        )
        .await;
    assert_eq!(bad_date.status, StatusCode::UNPROCESSABLE_ENTITY);

    let not_multipart = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/books")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await;
    assert_eq!(not_multipart.status, StatusCode::UNPROCESSABLE_ENTITY);

    // nothing was stored for any rejected request
    assert_eq!(app.stored_files(), 0);
}

#[tokio::test]
async fn partial_update_changes_only_name() {
    let app = TestApp::new();
    let id = app.create("Dune", "Herbert", "SciFi", "1965-08-01", upload("dune.pdf", b"spice")).await;

    let response = app
        .multipart(
            "PUT",
            &format!("/books/{id}"),
            &[("name", "Dune Messiah"), ("author", ""), ("date_published", "")],
            upload("", b""),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let json = response.json();
    assert_eq!(json["name"], "Dune Messiah");
    assert_eq!(json["author"], "Herbert");
    assert_eq!(json["genre"], "SciFi");
    assert_eq!(json["date_published"], "1965-08-01");

    let download = app.get(&format!("/books/{id}/download")).await;
    assert_eq!(&download.body[..], b"spice");
    assert_eq!(app.stored_files(), 1);
}

#[tokio::test]
async fn update_with_new_file_replaces_old_one() {
    let app = TestApp::new();
    let id = app.create("Dune", "Herbert", "SciFi", "1965-08-01", upload("dune.pdf", b"first")).await;

    let response = app
        .multipart("PUT", &format!("/books/{id}"), &[], upload("dune-2.pdf", b"second"))
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let download = app.get(&format!("/books/{id}/download")).await;
    assert_eq!(&download.body[..], b"second");
    assert_eq!(
        download.headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"dune-2.pdf\""
    );
    assert_eq!(app.stored_files(), 1);
}

#[tokio::test]
async fn update_missing_book_is_404_and_stores_nothing() {
    let app = TestApp::new();
    let response = app
        .multipart("PUT", "/books/42", &[("name", "Ghost")], upload("ghost.pdf", b"boo"))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(app.stored_files(), 0);
}

#[tokio::test]
async fn delete_removes_record_and_file() {
    let app = TestApp::new();
    let id = app.create("Book to Delete", "Author", "Genre", "2025-05-02", upload("x.pdf", b"bye")).await;
    assert_eq!(app.stored_files(), 1);

    let response = app.delete(&format!("/books/{id}")).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert!(response.body.is_empty());

    assert_eq!(app.get(&format!("/books/{id}")).await.status, StatusCode::NOT_FOUND);
    assert_eq!(app.get(&format!("/books/{id}/download")).await.status, StatusCode::NOT_FOUND);
    assert_eq!(app.stored_files(), 0);

    assert_eq!(app.delete(&format!("/books/{id}")).await.status, StatusCode::NOT_FOUND);
}
