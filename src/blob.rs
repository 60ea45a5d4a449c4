//! Blob store - uploaded files on the local filesystem
//!
//! Every upload lands under a single root directory as
//! `{uuid}_{original-filename}`. The UUID prefix keeps two uploads with the
//! same name apart; the suffix keeps the name readable on download.
//! Stored files are write-once and never locked.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWriteExt};
use uuid::Uuid;

use crate::Result;

/// Name used when an upload carries no usable filename
const FALLBACK_NAME: &str = "upload";

/// Filesystem-backed storage for uploaded book files
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Copy `reader` to a freshly generated path under the root and return that path.
    ///
    /// The root is created if it does not exist yet. The reader must be
    /// positioned at the start of the content.
    pub async fn save<R>(&self, reader: &mut R, original_name: &str) -> Result<String>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        tokio::fs::create_dir_all(&self.root).await?;

        let file_name = format!("{}_{}", Uuid::new_v4(), sanitize_name(original_name));
        let path = self.root.join(file_name);

        let mut file = tokio::fs::File::create(&path).await?;
        let written = tokio::io::copy(reader, &mut file).await?;
        file.flush().await?;

        let path = path.to_string_lossy().into_owned();
        tracing::debug!("Stored {} bytes at {}", written, path);
        Ok(path)
    }

    /// Whether `path` names an existing file. Missing or empty paths are never looked up.
    pub async fn exists(&self, path: Option<&str>) -> bool {
        match path {
            Some(p) if !p.is_empty() => tokio::fs::metadata(p)
                .await
                .map(|meta| meta.is_file())
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Delete the file at `path` if it exists; a missing file is not an error.
    pub async fn remove(&self, path: Option<&str>) -> Result<()> {
        let Some(p) = path else {
            return Ok(());
        };
        if !self.exists(path).await {
            return Ok(());
        }
        match tokio::fs::remove_file(p).await {
            Ok(()) => {
                tracing::debug!("Removed stored file {}", p);
                Ok(())
            }
            // lost a race with another remover
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Every file currently stored under the root.
    pub async fn stored_paths(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                paths.push(entry.path().to_string_lossy().into_owned());
            }
        }
        paths.sort();
        Ok(paths)
    }
}

/// File-name component of a path.
pub fn basename(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path)
}

/// The filename the file was uploaded with, i.e. the basename without the generated prefix.
pub fn original_name(path: &str) -> &str {
    let base = basename(path);
    match base.split_once('_') {
        Some((prefix, rest)) if Uuid::parse_str(prefix).is_ok() && !rest.is_empty() => rest,
        _ => base,
    }
}

/// Keep only the last component of a client-supplied filename.
fn sanitize_name(original_name: &str) -> &str {
    let last = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    match last {
        "" | "." | ".." => FALLBACK_NAME,
        name => name,
    }
}
