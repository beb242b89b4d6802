//! Record list endpoints
//!
//! Listing, clipboard copy, download and confirmed delete for the records
//! of the current session.

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use archive_common::RecordId;

use crate::error::ApiResult;
use crate::presenter::{CopyField, DeleteOutcome, ListView};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CopyResponse {
    /// Text to place on the clipboard, absent when the copy failed
    pub copied: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    /// Answer to the delete prompt
    #[serde(default)]
    pub confirmed: bool,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub outcome: &'static str,
}

/// GET /api/records
pub async fn list_records(State(state): State<AppState>) -> Json<ListView> {
    Json(state.records.view())
}

/// POST /api/records/:id/copy/:field
pub async fn copy_field(
    State(state): State<AppState>,
    Path((id, field)): Path<(String, String)>,
) -> ApiResult<Json<CopyResponse>> {
    let field: CopyField = field.parse()?;
    let copied = state.records.copy_field(&RecordId::new(id), field).await?;
    Ok(Json(CopyResponse { copied }))
}

/// GET /api/records/:id/download
///
/// Serves the decoded PDF as an attachment under its original file name.
pub async fn download_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let download = state.records.download(&RecordId::new(id))?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        attachment_name(&download.file_name)
    );

    Ok((
        [
            (header::CONTENT_TYPE, download.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        download.bytes,
    )
        .into_response())
}

/// DELETE /api/records/:id
///
/// Nothing is sent to the store unless the body confirms the prompt.
pub async fn delete_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<DeleteRequest>,
) -> ApiResult<Json<DeleteResponse>> {
    let confirmed = request.confirmed;
    let outcome = state
        .records
        .delete(&RecordId::new(id), &move |_: &str| confirmed)
        .await?;

    Ok(Json(DeleteResponse {
        outcome: match outcome {
            DeleteOutcome::Cancelled => "cancelled",
            DeleteOutcome::Deleted => "deleted",
        },
    }))
}

/// File name safe to embed in a quoted header parameter
fn attachment_name(file_name: &str) -> String {
    file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
