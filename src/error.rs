use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("{0}")]
    QuotaExceeded(String),

    #[error("Unknown quota category: {0}")]
    UnknownCategory(String),

    #[error("Could not determine caller identity")]
    MissingIdentity,
}

impl GateError {
    pub fn status(&self) -> StatusCode {
        match self {
            GateError::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            GateError::UnknownCategory(_) => StatusCode::NOT_FOUND,
            GateError::MissingIdentity => StatusCode::BAD_REQUEST,
        }
    }

    fn title(&self) -> &'static str {
        match self {
            GateError::QuotaExceeded(_) => "Limit Exceeded",
            GateError::UnknownCategory(_) => "Not Found",
            GateError::MissingIdentity => "Bad Request",
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status = self.status();
        (
            status,
            Json(json!({
                "error": self.title(),
                "code": status.as_u16(),
                "detail": self.to_string(),
            })),
        )
            .into_response()
    }
}
