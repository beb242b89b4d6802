//! Submission form endpoints

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap},
    Json,
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde::{Deserialize, Serialize};

use archive_common::RecordId;

use crate::error::{ApiError, ApiResult};
use crate::form::{FileSelection, FormState};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct FormUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    /// Original file name as picked by the user
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub record_id: RecordId,
    pub notice: Option<String>,
}

/// GET /api/form
pub async fn get_form(State(state): State<AppState>) -> Json<FormState> {
    Json(state.form.state())
}

/// PUT /api/form
///
/// Updates whichever text fields are present.
pub async fn update_form(
    State(state): State<AppState>,
    Json(update): Json<FormUpdate>,
) -> Json<FormState> {
    if let Some(name) = update.name {
        state.form.set_name(name);
    }
    if let Some(email) = update.email {
        state.form.set_email(email);
    }
    Json(state.form.state())
}

/// POST /api/form/file?name=...
///
/// The raw file is the request body; its MIME type is the Content-Type.
/// The body is read only up to the form's size limit, so any larger file
/// ends in the oversize rejection whatever its size.
pub async fn select_file(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
    headers: HeaderMap,
    body: Body,
) -> ApiResult<Json<FormState>> {
    if query.name.is_empty() {
        return Err(ApiError::BadRequest("file name is required".to_string()));
    }
    let mime_type = media_type(&headers);

    let limit = usize::try_from(state.form.max_file_bytes()).unwrap_or(usize::MAX);
    let bytes = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return Err(state.form.reject_oversize(&query.name, &mime_type).into());
        }
        Err(e) => return Err(ApiError::BadRequest(format!("unreadable file body: {}", e))),
    };

    state.form.select_file(FileSelection {
        name: query.name,
        mime_type,
        bytes: bytes.to_vec(),
    })?;
    Ok(Json(state.form.state()))
}

/// DELETE /api/form/file
pub async fn clear_file(State(state): State<AppState>) -> Json<FormState> {
    state.form.clear_file();
    Json(state.form.state())
}

/// POST /api/form/submit
pub async fn submit_form(State(state): State<AppState>) -> ApiResult<Json<SubmitResponse>> {
    let record_id = state.form.submit().await?;
    Ok(Json(SubmitResponse {
        record_id,
        notice: state.form.state().notice,
    }))
}

/// Content-Type without parameters, lowercased; empty when absent
fn media_type(headers: &HeaderMap) -> String {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default()
}
