use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure taxonomy surfaced by the conversation service and the HTTP layer.
/// Raw storage/provider details stay server-side; clients get a safe message.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("sign-in required")]
    Unauthorized,

    #[error("caller does not own this chat")]
    Forbidden,

    #[error("chat not found")]
    NotFound,

    #[error("completion provider failed: {0}")]
    Upstream(String),

    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::Upstream(_) => StatusCode::BAD_GATEWAY,
            Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message sent to the client. Storage and provider errors are
    /// replaced with a generic line; the detail is only logged.
    fn client_message(&self) -> String {
        match self {
            Error::Validation(msg) => msg.clone(),
            Error::Unauthorized => "Sign-in required".to_string(),
            Error::Forbidden => "You do not have access to this chat".to_string(),
            Error::NotFound => "Chat not found".to_string(),
            Error::Upstream(_) => "Failed to generate a response".to_string(),
            Error::Storage(_) => "Internal Server Error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }
        (status, Json(json!({ "message": self.client_message() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_detail_is_not_leaked() {
        let err = Error::Storage(sqlx::Error::PoolTimedOut);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.client_message(), "Internal Server Error");
    }

    #[test]
    fn validation_message_passes_through() {
        let err = Error::Validation("title must be a string".to_string());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.client_message(), "title must be a string");
    }
}
