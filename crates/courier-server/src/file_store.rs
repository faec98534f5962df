use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use courier_shared::constants::UPLOADS_URL_PREFIX;
use courier_shared::{FileKind, FileRef};

use crate::error::ServerError;

/// Longest file extension carried over from an uploaded file name.
const MAX_EXTENSION_LEN: usize = 16;

/// Verify that a resolved path stays within the expected base directory.
/// Prevents path traversal attacks.
fn ensure_within(base: &Path, target: &Path) -> Result<PathBuf, ServerError> {
    let mut resolved = base.to_path_buf();
    for component in target.strip_prefix(base).unwrap_or(target).components() {
        match component {
            Component::Normal(c) => resolved.push(c),
            Component::CurDir => {}
            _ => {
                return Err(ServerError::BadRequest(
                    "Path traversal detected".to_string(),
                ));
            }
        }
    }
    if !resolved.starts_with(base) || resolved == base {
        return Err(ServerError::BadRequest(
            "Path traversal detected".to_string(),
        ));
    }
    Ok(resolved)
}

/// Keep the extension of an uploaded file name if it is short and plain.
fn sanitized_extension(original_name: Option<&str>) -> Option<String> {
    let ext = Path::new(original_name?).extension()?.to_str()?;
    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// MIME type served for a stored upload, from its extension.
fn content_type_for(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("mp3") => "audio/mpeg",
        Some("ogg") => "audio/ogg",
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain; charset=utf-8",
        Some("json") => "application/json",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}

/// A stored upload read back from disk.
#[derive(Debug)]
pub struct Upload {
    pub content_type: &'static str,
    pub data: Vec<u8>,
}

/// Local-disk storage for uploaded files.
///
/// Files are written under a generated name; only the resulting
/// [`FileRef`] travels with a message.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_path: PathBuf,
    max_size: usize,
}

impl FileStore {
    pub async fn new(base_path: PathBuf, max_size: usize) -> Result<Self, ServerError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            ServerError::FileStorage(format!(
                "Failed to create upload directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "File store initialized");

        Ok(Self {
            base_path,
            max_size,
        })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Write an upload to disk and return a reference to it.
    pub async fn store_file(
        &self,
        original_name: Option<&str>,
        content_type: Option<&str>,
        data: &[u8],
    ) -> Result<FileRef, ServerError> {
        if data.is_empty() {
            return Err(ServerError::BadRequest("Empty upload".to_string()));
        }
        if data.len() > self.max_size {
            return Err(ServerError::UploadTooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let stored_name = match sanitized_extension(original_name) {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        };
        let path = self.safe_path(&stored_name)?;

        fs::write(&path, data).await.map_err(|e| {
            ServerError::FileStorage(format!("Failed to write upload {}: {}", stored_name, e))
        })?;

        debug!(name = %stored_name, size = data.len(), "Stored upload");

        Ok(FileRef {
            url: format!("{UPLOADS_URL_PREFIX}{stored_name}"),
            kind: FileKind::from_content_type(content_type),
            name: original_name.map(str::to_string),
        })
    }

    /// Read back a stored upload by the name in its URL.
    pub async fn read_file(&self, name: &str) -> Result<Upload, ServerError> {
        let path = self.safe_path(name)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(ServerError::NotFound(format!("upload {name}")));
        }

        let data = fs::read(&path).await.map_err(|e| {
            ServerError::FileStorage(format!("Failed to read upload {}: {}", name, e))
        })?;

        debug!(name = %name, size = data.len(), "Read upload");
        Ok(Upload {
            content_type: content_type_for(name),
            data,
        })
    }

    fn safe_path(&self, name: &str) -> Result<PathBuf, ServerError> {
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(ServerError::BadRequest(
                "Path traversal detected".to_string(),
            ));
        }
        ensure_within(&self.base_path, &self.base_path.join(name))
    }
}
