use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Session not found")]
    SessionNotFound,

    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Room not found")]
    RoomNotFound,

    #[error("Room already exists")]
    RoomExists,

    #[error("Room bad value")]
    RoomBadValue,

    #[error("Too many requests")]
    TooManyRequests,

    #[error("Peer server not found")]
    PeerNotFound,

    #[error("Peer server invalid: {0}")]
    PeerInvalid(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            AppError::RoomExists => StatusCode::CONFLICT,
            AppError::SessionNotFound | AppError::RoomNotFound | AppError::PeerNotFound => {
                StatusCode::NOT_FOUND
            }
            AppError::InvalidToken(_) | AppError::InvalidHandshake(_) => StatusCode::UNAUTHORIZED,
            AppError::PeerInvalid(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::RoomBadValue | AppError::Io(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.to_string(),
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AppError::InvalidToken(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_errors_to_status_codes() {
        let cases = [
            (AppError::TooManyRequests, StatusCode::TOO_MANY_REQUESTS),
            (AppError::RoomExists, StatusCode::CONFLICT),
            (AppError::RoomNotFound, StatusCode::NOT_FOUND),
            (AppError::InvalidToken("bad".into()), StatusCode::UNAUTHORIZED),
            (AppError::PeerInvalid("nowhere".into()), StatusCode::BAD_REQUEST),
            (AppError::RoomBadValue, StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
