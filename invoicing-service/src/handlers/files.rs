use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use service_core::error::AppError;
use service_core::response::ApiResponse;

use super::parse_id;
use crate::middleware::{AuthUser, ADMIN_OR_INVOICING};
use crate::models::StoredFile;
use crate::startup::AppState;

pub async fn download_file(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let file_id = parse_id(&id, "file")?;
    let (file, bytes) = state.documents.download(auth.org_id(), file_id).await?;

    let disposition = format!("attachment; filename=\"{}\"", file.filename);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, file.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

pub async fn file_info(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<StoredFile>, AppError> {
    let file_id = parse_id(&id, "file")?;
    let file = state.documents.file_info(auth.org_id(), file_id).await?;
    Ok(ApiResponse::ok("File retrieved", file))
}

pub async fn delete_file(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, AppError> {
    auth.require(ADMIN_OR_INVOICING)?;

    let file_id = parse_id(&id, "file")?;
    state.documents.delete(auth.org_id(), file_id).await?;
    Ok(ApiResponse::message("File deleted"))
}
