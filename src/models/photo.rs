//! Photo model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Where on the vehicle (or in the paperwork) a photo was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "photo_category", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PhotoCategory {
    Exterior,
    Interior,
    Engine,
    Underbody,
    Document,
    General,
}

impl Default for PhotoCategory {
    fn default() -> Self {
        Self::General
    }
}

/// Photo entity
#[derive(Debug, Clone, FromRow)]
pub struct Photo {
    pub photo_id: Uuid,
    pub inspection_id: Uuid,
    pub category: PhotoCategory,
    pub label: Option<String>,
    pub needs_attention: bool,
    pub storage_file_id: String,
    pub storage_key: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub uploaded_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Photo view returned to clients, including a resolvable download URL
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoInfo {
    pub photo_id: Uuid,
    pub inspection_id: Uuid,
    pub category: PhotoCategory,
    pub label: Option<String>,
    pub needs_attention: bool,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// Metadata fields accompanying a multipart photo upload, passed as query
/// parameters alongside the file part
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPhotoParams {
    #[serde(default)]
    pub category: Option<PhotoCategory>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub needs_attention: Option<bool>,
}
