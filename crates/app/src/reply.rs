use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct StatusBody {
    status: &'static str,
}

/// `{"status": ...}` JSON reply sent back to the webhook caller.
#[derive(Debug)]
pub struct StatusReply {
    status: StatusCode,
    body: StatusBody,
}

impl StatusReply {
    fn new(status: StatusCode, label: &'static str) -> Self {
        Self {
            status,
            body: StatusBody { status: label },
        }
    }

    pub fn success() -> Self {
        Self::new(StatusCode::OK, "success")
    }

    pub fn invalid_signature() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "invalid signature")
    }

    pub fn error() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "error")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for StatusReply {
    fn into_response(self) -> Response {
        let mut response = Json(self.body).into_response();
        *response.status_mut() = self.status;
        response
    }
}
