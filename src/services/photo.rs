//! Photo Service
//!
//! Manages inspection photos: validation, upload to object storage, and the
//! photo rows that tie stored objects to inspections.

use std::sync::Arc;

use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{Photo, PhotoCategory, PhotoInfo};
use crate::services::photo_storage::{PhotoStorageBackend, StorageError};

/// Maximum accepted photo size in bytes (10 MiB)
pub const MAX_PHOTO_BYTES: usize = 10 * 1024 * 1024;

/// Content types accepted for inspection photos
const ALLOWED_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp"];

/// Errors that can occur during photo operations
#[derive(Debug, Error)]
pub enum PhotoError {
    #[error("Photo not found: {0}")]
    NotFound(Uuid),

    #[error("Inspection not found: {0}")]
    InspectionNotFound(Uuid),

    #[error("Invalid photo: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Service for inspection photos
#[derive(Clone)]
pub struct PhotoService {
    pool: PgPool,
    storage: Arc<dyn PhotoStorageBackend>,
}

impl PhotoService {
    pub fn new(pool: PgPool, storage: Arc<dyn PhotoStorageBackend>) -> Self {
        Self { pool, storage }
    }

    /// Validate, store and record a photo for an inspection
    #[allow(clippy::too_many_arguments)]
    pub async fn upload(
        &self,
        inspection_id: Uuid,
        uploader_id: Uuid,
        file_name: &str,
        content_type: &str,
        data: &[u8],
        category: PhotoCategory,
        label: Option<String>,
        needs_attention: bool,
    ) -> Result<PhotoInfo, PhotoError> {
        if data.is_empty() {
            return Err(PhotoError::Validation("photo is empty".to_string()));
        }
        if data.len() > MAX_PHOTO_BYTES {
            return Err(PhotoError::Validation(format!(
                "photo exceeds the {} MiB limit",
                MAX_PHOTO_BYTES / (1024 * 1024)
            )));
        }
        if !ALLOWED_CONTENT_TYPES.contains(&content_type) {
            return Err(PhotoError::Validation(format!(
                "unsupported content type {content_type}, expected one of {ALLOWED_CONTENT_TYPES:?}"
            )));
        }

        let exists =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM inspections WHERE inspection_id = $1")
                .bind(inspection_id)
                .fetch_one(&self.pool)
                .await?;
        if exists == 0 {
            return Err(PhotoError::InspectionNotFound(inspection_id));
        }

        let safe_name = sanitize_file_name(file_name);
        let key = format!("inspections/{}/{}-{}", inspection_id, Uuid::new_v4(), safe_name);

        let stored = self.storage.upload(&key, content_type, data).await?;

        let photo = sqlx::query_as::<_, Photo>(
            r#"
            INSERT INTO photos (photo_id, inspection_id, category, label, needs_attention,
                                storage_file_id, storage_key, file_name, content_type,
                                size_bytes, uploaded_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING photo_id, inspection_id, category, label, needs_attention,
                      storage_file_id, storage_key, file_name, content_type, size_bytes,
                      uploaded_by, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(inspection_id)
        .bind(category)
        .bind(&label)
        .bind(needs_attention)
        .bind(&stored.file_id)
        .bind(&stored.key)
        .bind(&safe_name)
        .bind(content_type)
        .bind(data.len() as i64)
        .bind(uploader_id)
        .fetch_one(&self.pool)
        .await?;

        info!(
            photo_id = %photo.photo_id,
            inspection_id = %inspection_id,
            size = data.len(),
            "Photo uploaded"
        );

        self.to_info(photo).await
    }

    /// List photos for an inspection
    pub async fn list(&self, inspection_id: Uuid) -> Result<Vec<PhotoInfo>, PhotoError> {
        let photos = sqlx::query_as::<_, Photo>(
            r#"
            SELECT photo_id, inspection_id, category, label, needs_attention,
                   storage_file_id, storage_key, file_name, content_type, size_bytes,
                   uploaded_by, created_at
            FROM photos
            WHERE inspection_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(inspection_id)
        .fetch_all(&self.pool)
        .await?;

        let mut infos = Vec::with_capacity(photos.len());
        for photo in photos {
            infos.push(self.to_info(photo).await?);
        }
        Ok(infos)
    }

    /// Delete a photo and its stored object.
    ///
    /// The row goes first; if the object delete then fails the worst case is
    /// an orphaned object, never a dangling row.
    pub async fn delete(&self, photo_id: Uuid) -> Result<(), PhotoError> {
        let photo = sqlx::query_as::<_, Photo>(
            r#"
            DELETE FROM photos
            WHERE photo_id = $1
            RETURNING photo_id, inspection_id, category, label, needs_attention,
                      storage_file_id, storage_key, file_name, content_type, size_bytes,
                      uploaded_by, created_at
            "#,
        )
        .bind(photo_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(PhotoError::NotFound(photo_id))?;

        if let Err(e) = self
            .storage
            .delete(&photo.storage_file_id, &photo.storage_key)
            .await
        {
            warn!(
                photo_id = %photo_id,
                key = %photo.storage_key,
                error = %e,
                "Photo row deleted but object removal failed"
            );
        }

        info!(photo_id = %photo_id, "Photo deleted");
        Ok(())
    }

    async fn to_info(&self, photo: Photo) -> Result<PhotoInfo, PhotoError> {
        let url = self.storage.download_url(&photo.storage_key).await?;
        Ok(PhotoInfo {
            photo_id: photo.photo_id,
            inspection_id: photo.inspection_id,
            category: photo.category,
            label: photo.label,
            needs_attention: photo.needs_attention,
            file_name: photo.file_name,
            content_type: photo.content_type,
            size_bytes: photo.size_bytes,
            url,
            created_at: photo.created_at,
        })
    }
}

/// Reduce an uploaded file name to characters safe for storage keys
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "photo".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("front view.jpg"), "front_view.jpg");
        assert_eq!(sanitize_file_name("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_file_name(""), "photo");
        assert_eq!(sanitize_file_name("engine-bay_01.png"), "engine-bay_01.png");
    }
}
