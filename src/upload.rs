//! Validation and transient storage of uploaded images. An upload is streamed
//! to a file in the upload directory, read back, and the file is removed as
//! soon as the `TransientFile` guard goes out of scope

use crate::util;
use actix_multipart::Field;
use futures_util::TryStreamExt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// An upload that breaks the type or size limit. The request is rejected
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("unsupported file type '{0}': only image/* uploads are accepted")]
    UnsupportedType(String),

    #[error("file too large: the limit is {limit} bytes")]
    TooLarge { limit: usize },
}

/// Why an upload could not be stored. Only `Invalid` reaches the client
#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("failed to read the upload: {0}")]
    Multipart(String),

    #[error("transient storage failed: {0}")]
    Io(#[from] std::io::Error),
}

/// An uploaded image, read back from transient storage
#[derive(Debug)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub size: usize,
    pub file_name: String,
}

/// Accept only `image/*` content types
pub fn validate_mime(mime_type: &str) -> Result<(), ValidationError> {
    let essence = mime_type.trim().to_ascii_lowercase();
    match essence.strip_prefix("image/") {
        Some(subtype) if !subtype.is_empty() => Ok(()),
        _ => Err(ValidationError::UnsupportedType(mime_type.to_string())),
    }
}

pub fn validate_size(size: usize, limit: usize) -> Result<(), ValidationError> {
    match size > limit {
        true => Err(ValidationError::TooLarge { limit }),
        false => Ok(()),
    }
}

/// A file in transient storage, deleted on drop
#[derive(Debug)]
pub struct TransientFile {
    path: PathBuf,
}

impl TransientFile {
    /// Reserve a unique path for `original_name` inside `dir`
    pub fn new(dir: &Path, original_name: &str) -> Self {
        TransientFile {
            path: dir.join(util::unique_file_name(original_name)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TransientFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("removed transient file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("failed to remove {}: {e}", self.path.display()),
        }
    }
}

/// Stream a multipart field into transient storage, enforcing the type and
/// size limits, then read it back. The caller keeps the returned guard alive
/// until it is done with the image
pub async fn store_field(
    mut field: Field,
    dir: &Path,
    limit: usize,
) -> Result<(TransientFile, UploadedImage), UploadError> {
    let mime_type = field
        .content_type()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_default();
    validate_mime(&mime_type)?;

    let file_name = field
        .content_disposition()
        .get_filename()
        .unwrap_or_default()
        .to_string();

    let transient = TransientFile::new(dir, &file_name);
    let mut file = tokio::fs::File::create(transient.path()).await?;

    let mut size = 0;
    while let Some(chunk) = field
        .try_next()
        .await
        .map_err(|e| UploadError::Multipart(e.to_string()))?
    {
        size += chunk.len();
        validate_size(size, limit)?;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    drop(file);

    let bytes = tokio::fs::read(transient.path()).await?;
    debug!(
        "stored upload '{file_name}' ({size} bytes, {mime_type}) at {}",
        transient.path().display()
    );

    let image = UploadedImage {
        size: bytes.len(),
        bytes,
        mime_type,
        file_name,
    };
    Ok((transient, image))
}
