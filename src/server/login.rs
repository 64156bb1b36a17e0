//! OAuth redirect endpoint.
//!
//! The platform sends the moderator's browser here after the login dialog.
//! Everything the moderator needs to see next arrives in Messenger, so the
//! response itself is a short landing text.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use super::AppState;
use crate::persistence::Store;
use crate::platform::Platform;
use crate::types::SenderId;

const LANDING_TEXT: &str = "You can close this window and return to Messenger.";

#[derive(Debug, Default, Deserialize)]
pub struct LoginParams {
    pub sender: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("missing query parameter '{0}'")]
    MissingParam(&'static str),
}

impl IntoResponse for LoginError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

/// Login redirect handler.
///
/// # Response
///
/// - 200 OK once the code has been handled, whether or not the pages
///   could be read (failures are reported to the moderator in Messenger)
/// - 400 Bad Request if `sender` or `code` is missing
pub async fn login_handler<P: Platform, S: Store>(
    State(app_state): State<AppState<P, S>>,
    Query(params): Query<LoginParams>,
) -> Result<(StatusCode, &'static str), LoginError> {
    let sender = params
        .sender
        .filter(|s| !s.is_empty())
        .map(SenderId::new)
        .ok_or(LoginError::MissingParam("sender"))?;
    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or(LoginError::MissingParam("code"))?;

    if let Err(e) = app_state.bot().logged_in(&sender, &code).await {
        warn!(sender = %sender, error = %e, "Login failed");
        app_state
            .bot()
            .report_error(&format!("Login for {} failed: {}", sender, e))
            .await;
    }
    Ok((StatusCode::OK, LANDING_TEXT))
}
