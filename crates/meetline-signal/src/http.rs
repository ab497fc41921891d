//! HTTP endpoints: invitation email and health check

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use meetline_core::RoomId;

use crate::server::AppState;

pub const MISSING_FIELDS: &str = "Missing recipientEmail or meetingRoomId";
pub const INVITE_SENT: &str = "Invitation sent successfully!";
pub const INVITE_FAILED: &str = "Failed to send invitation.";

/// `POST /send-invite` body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendInviteRequest {
    #[serde(default)]
    pub recipient_email: Option<String>,
    /// String or number; web apps send either
    #[serde(default)]
    pub meeting_room_id: Option<Value>,
}

impl SendInviteRequest {
    /// Both fields, if present and non-blank
    fn fields(&self) -> Option<(&str, RoomId)> {
        let recipient = self.recipient_email.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let room = match self.meeting_room_id.as_ref()? {
            Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
            Value::Number(n) if n.as_f64() != Some(0.0) => n.to_string(),
            _ => return None,
        };
        Some((recipient, RoomId::new(room)))
    }
}

#[derive(Debug, Serialize)]
struct InviteOutcome {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    connections: usize,
}

/// Send a meeting invitation email
pub async fn send_invite(
    State(state): State<AppState>,
    body: Result<Json<SendInviteRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!("rejecting send-invite body: {}", rejection.body_text());
            SendInviteRequest::default()
        }
    };

    let Some((recipient, room)) = request.fields() else {
        return (StatusCode::BAD_REQUEST, Json(ErrorBody { error: MISSING_FIELDS })).into_response();
    };

    match state.mailer.send_invitation(recipient, &room).await {
        Ok(receipt) => {
            info!(room = %room, response = %receipt.response, "invitation delivered to transport");
            (
                StatusCode::OK,
                Json(InviteOutcome {
                    success: true,
                    message: Some(INVITE_SENT),
                    error: None,
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!(room = %room, error = %e, "failed to send invitation email");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(InviteOutcome {
                    success: false,
                    message: None,
                    error: Some(INVITE_FAILED),
                }),
            )
                .into_response()
        }
    }
}

/// Liveness plus connection count
pub async fn health(State(state): State<AppState>) -> Json<impl Serialize> {
    Json(Health {
        status: "healthy",
        connections: state.router.registry().len(),
    })
}
