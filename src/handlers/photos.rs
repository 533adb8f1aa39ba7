//! Photo handlers
//!
//! Multipart photo upload plus listing and deletion.

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::TryStreamExt;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Role, UploadPhotoParams};
use crate::services::photo::{PhotoError, MAX_PHOTO_BYTES};
use crate::services::PhotoService;
use crate::AppState;

use super::auth::AuthUser;
use super::ApiResponse;

/// POST /v1/inspections/{inspectionId}/photos
///
/// Multipart upload of a single photo. Category, label and the
/// needs-attention flag ride along as query parameters.
pub async fn upload_photo(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
    query: web::Query<UploadPhotoParams>,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    user.require_role(&[Role::Inspector, Role::Admin])?;
    let inspection_id = path.into_inner();
    let params = query.into_inner();

    let (file_name, content_type, data) = read_file_part(payload).await?;

    let service = PhotoService::new(state.db.clone(), state.storage.clone());
    let photo = service
        .upload(
            inspection_id,
            user.user_id,
            &file_name,
            &content_type,
            &data,
            params.category.unwrap_or_default(),
            params.label,
            params.needs_attention.unwrap_or(false),
        )
        .await
        .map_err(map_photo_error)?;

    Ok(HttpResponse::Created().json(ApiResponse::new(photo)))
}

/// GET /v1/inspections/{inspectionId}/photos
pub async fn list_photos(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    user.require_role(&[Role::Admin, Role::Reviewer, Role::Inspector])?;

    let service = PhotoService::new(state.db.clone(), state.storage.clone());
    let photos = service
        .list(path.into_inner())
        .await
        .map_err(map_photo_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(photos)))
}

/// DELETE /v1/photos/{photoId}
pub async fn delete_photo(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    user.require_role(&[Role::Admin, Role::Inspector])?;

    let service = PhotoService::new(state.db.clone(), state.storage.clone());
    service
        .delete(path.into_inner())
        .await
        .map_err(map_photo_error)?;

    Ok(HttpResponse::NoContent().finish())
}

/// Pull the first file part out of a multipart payload
async fn read_file_part(mut payload: Multipart) -> Result<(String, String, Vec<u8>), AppError> {
    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| AppError::Validation(format!("malformed multipart payload: {e}")))?
    {
        let Some(file_name) = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(ToString::to_string)
        else {
            // Not a file part; skip it
            continue;
        };

        let content_type = field
            .content_type()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let mut data = Vec::new();
        while let Some(chunk) = field
            .try_next()
            .await
            .map_err(|e| AppError::Validation(format!("failed reading upload: {e}")))?
        {
            if data.len() + chunk.len() > MAX_PHOTO_BYTES {
                return Err(AppError::Validation(format!(
                    "photo exceeds the {} MiB limit",
                    MAX_PHOTO_BYTES / (1024 * 1024)
                )));
            }
            data.extend_from_slice(&chunk);
        }

        return Ok((file_name, content_type, data));
    }

    Err(AppError::Validation(
        "no file part in the request".to_string(),
    ))
}

/// Map photo errors to application errors
fn map_photo_error(e: PhotoError) -> AppError {
    match e {
        PhotoError::NotFound(id) => AppError::NotFound(format!("photo not found: {id}")),
        PhotoError::InspectionNotFound(id) => {
            AppError::NotFound(format!("inspection not found: {id}"))
        }
        PhotoError::Validation(msg) => AppError::Validation(msg),
        PhotoError::Storage(e) => AppError::Upstream(e.to_string()),
        PhotoError::Database(e) => AppError::Database(e),
    }
}

/// Configure photo routes
pub fn configure_photo_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/inspections/{inspectionId}/photos")
            .route(web::get().to(list_photos))
            .route(web::post().to(upload_photo)),
    );
    cfg.service(web::resource("/photos/{photoId}").route(web::delete().to(delete_photo)));
}
