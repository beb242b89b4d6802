//! Session status endpoint

use axum::{extract::State, Json};

use crate::session::SessionStatus;
use crate::AppState;

/// GET /api/session
///
/// `loading` until the identity provider has issued a session.
pub async fn get_session(State(state): State<AppState>) -> Json<SessionStatus> {
    Json(state.session.status())
}
