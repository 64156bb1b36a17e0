//! Submission endpoint.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::AppState;
use crate::moderation::SubmitError;
use crate::persistence::Store;
use crate::platform::Platform;
use crate::types::{ChannelId, ItemId, ItemStatus};

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmitResponse {
    pub id: ItemId,
    pub status: ItemStatus,
}

impl IntoResponse for SubmitError {
    fn into_response(self) -> Response {
        let status = match &self {
            SubmitError::TooShort { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            SubmitError::UnknownChannel(_) => StatusCode::NOT_FOUND,
            SubmitError::Duplicate(_) => StatusCode::CONFLICT,
            SubmitError::Store(e) => {
                error!(error = %e, "Failed to store submission");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}

/// Submission handler.
///
/// # Response
///
/// - 201 Created with `{id, status}`
/// - 404 Not Found if the channel is not managed
/// - 409 Conflict if the same text was already submitted
/// - 422 Unprocessable Entity if the text is too short
///
/// An item that was stored but could not be sent to the moderator is still
/// 201; the admin gets an error report.
///
/// # Example
///
/// ```ignore
/// POST /channels/1234/items HTTP/1.1
/// Content-Type: application/json
///
/// {"text": "I still have my roommate's stapler"}
///
/// HTTP/1.1 201 Created
///
/// {"id": 7, "status": "pending"}
/// ```
pub async fn submit_handler<P: Platform, S: Store>(
    State(app_state): State<AppState<P, S>>,
    Path(channel_id): Path<String>,
    Json(request): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), SubmitError> {
    let channel = ChannelId::new(channel_id);
    let submission = app_state
        .bot()
        .moderator()
        .submit(&channel, &request.text)
        .await?;
    let item = submission.item;
    if let Some(e) = submission.queue_error {
        app_state
            .bot()
            .report_error(&format!("Item {} in {} is waiting: {}", item.id, channel, e))
            .await;
    }
    info!(channel = %channel, item = %item.id, status = item.status.as_str(), "Submission accepted");

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            id: item.id,
            status: item.status,
        }),
    ))
}
