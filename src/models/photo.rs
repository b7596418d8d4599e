use std::ffi::OsStr;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use actix_multipart::Field;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use mime_guess::from_path;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;

pub const ALLOWED_IMAGE_TYPES: [&str; 5] = ["jpeg", "jpg", "png", "gif", "webp"];
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
pub const MAX_FILES_PER_REQUEST: usize = 50;

/// One uploaded image attached to a (report, task, type) triple.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoRef {
    pub filename: String,
    pub path: String,
    pub originalname: String,
    pub mimetype: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub fieldname: String,
}

/// Directory listing entry, independent of any report's photos map.
#[derive(Debug, Serialize)]
pub struct PhotoInfo {
    pub filename: String,
    pub path: String,
    pub size: u64,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

/// A file deposited on disk by the upload sink, before any report exists.
#[derive(Debug)]
pub struct UploadedFile {
    pub fieldname: String,
    pub filename: String,
    pub originalname: String,
    pub mimetype: String,
    pub size: u64,
}

/// Decoded multipart field name for an uploaded photo.
#[derive(Debug, PartialEq, Eq)]
pub enum PhotoField {
    Matched { task_id: String, kind: String },
    Unmatched,
}

/// Decodes `photos[<taskId>][<type>]`, falling back to the hyphen-delimited
/// form where the last segment is the type and everything before it (rejoined
/// with hyphens) is the task id. Anything else is `Unmatched`.
pub fn parse_photo_field(fieldname: &str) -> PhotoField {
    static BRACKET_PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = BRACKET_PATTERN
        .get_or_init(|| Regex::new(r"photos\[([^\]]+)\]\[([^\]]+)\]").expect("valid pattern"));

    if let Some(captures) = pattern.captures(fieldname) {
        return PhotoField::Matched {
            task_id: captures[1].to_string(),
            kind: captures[2].to_string(),
        };
    }

    let segments: Vec<&str> = fieldname.split('-').collect();
    if segments.len() >= 2 {
        let task_id = segments[..segments.len() - 1].join("-");
        let kind = segments[segments.len() - 1];
        if !task_id.is_empty() && !kind.is_empty() {
            return PhotoField::Matched {
                task_id,
                kind: kind.to_string(),
            };
        }
    }

    PhotoField::Unmatched
}

pub struct PhotoStore {
    dir: PathBuf,
}

impl PhotoStore {
    pub fn new(dir: PathBuf) -> PhotoStore {
        PhotoStore { dir }
    }

    fn resolve(&self, filename: &str) -> Result<PathBuf, StoreError> {
        if filename.is_empty()
            || filename.contains('/')
            || filename.contains('\\')
            || filename.contains("..")
        {
            return Err(StoreError::NotFound);
        }
        Ok(self.dir.join(filename))
    }

    /// Reads file bytes plus a content type guessed from the extension.
    pub fn read(&self, filename: &str) -> Result<(Vec<u8>, mime_guess::Mime), StoreError> {
        let path = self.resolve(filename)?;
        if !path.is_file() {
            return Err(StoreError::NotFound);
        }
        let bytes = fs::read(&path)?;
        let mime = from_path(&path).first_or_octet_stream();
        Ok((bytes, mime))
    }

    pub fn delete(&self, filename: &str) -> Result<(), StoreError> {
        let path = self.resolve(filename)?;
        if !path.is_file() {
            return Err(StoreError::NotFound);
        }
        fs::remove_file(path)?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<PhotoInfo>, StoreError> {
        let mut photos: Vec<PhotoInfo> = Vec::new();
        if !self.dir.is_dir() {
            return Ok(photos);
        }

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let filename = entry.file_name().to_string_lossy().to_string();
            // Birth time is unavailable on some filesystems.
            let created = metadata.created().unwrap_or(metadata.modified()?);

            photos.push(PhotoInfo {
                path: format!("/api/photos/{filename}"),
                filename,
                size: metadata.len(),
                created: created.into(),
                modified: metadata.modified()?.into(),
            });
        }

        Ok(photos)
    }

    /// Drains one multipart file field to disk under a generated unique name
    /// with the original extension preserved. Rejects anything outside the
    /// image allow-list and anything over the per-file size cap; a partial
    /// file is removed before the rejection is returned.
    pub async fn receive(&self, field: &mut Field) -> Result<UploadedFile, StoreError> {
        let fieldname = field.name().to_string();
        let originalname = field
            .content_disposition()
            .get_filename()
            .unwrap_or_default()
            .to_string();
        let mimetype = field
            .content_type()
            .map(|mime| mime.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let extension = Path::new(&originalname)
            .extension()
            .and_then(OsStr::to_str)
            .map(str::to_lowercase)
            .unwrap_or_default();

        if !ALLOWED_IMAGE_TYPES.contains(&extension.as_str())
            || !ALLOWED_IMAGE_TYPES.iter().any(|kind| mimetype.contains(kind))
        {
            return Err(StoreError::Validation(
                "Seules les images sont autorisées (JPEG, PNG, GIF, WebP)".to_string(),
            ));
        }

        let filename = format!("{}.{extension}", Uuid::new_v4());
        let path = self.dir.join(&filename);
        let mut file = fs::File::create(&path)?;
        let mut size: u64 = 0;

        while let Some(chunk) = field.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(error) => {
                    let _ = fs::remove_file(&path);
                    return Err(StoreError::Validation(error.to_string()));
                }
            };
            size += chunk.len() as u64;
            if size > MAX_FILE_SIZE {
                drop(file);
                let _ = fs::remove_file(&path);
                return Err(StoreError::Validation(
                    "Fichier trop volumineux (maximum 10 Mo)".to_string(),
                ));
            }
            file.write_all(&chunk)?;
        }

        debug!(%fieldname, %filename, size, "photo enregistrée");

        Ok(UploadedFile {
            fieldname,
            filename,
            originalname,
            mimetype,
            size,
        })
    }

    /// Best-effort removal used by the save handler when a request is
    /// rejected after some of its files already landed on disk.
    pub fn discard(&self, files: &[UploadedFile]) {
        for file in files {
            let _ = fs::remove_file(self.dir.join(&file.filename));
        }
    }
}
