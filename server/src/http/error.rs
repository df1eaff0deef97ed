use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rest_store::TransportError;
use shared_types::ApiStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("backend unavailable: {0}")]
    Transport(#[from] TransportError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Transport(TransportError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Transport(TransportError::Connection(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error body in the same shape the backend uses for its own failures.
pub fn api_status(status: StatusCode, message: impl Into<String>) -> ApiStatus {
    ApiStatus::new(
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown"),
        message,
    )
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (status, Json(api_status(status, self.to_string()))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(error: ApiError) -> (StatusCode, ApiStatus) {
        let response = error.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_bad_request() {
        let (status, body) = body_of(ApiError::BadRequest("missing body".to_string())).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.code, 400);
        assert_eq!(body.reason, "Bad Request");
        assert_eq!(body.message, "missing body");
    }

    #[tokio::test]
    async fn test_transport_timeout() {
        let (status, body) = body_of(TransportError::Timeout.into()).await;

        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body.code, 504);
    }

    #[tokio::test]
    async fn test_transport_connection_failure() {
        let error = ApiError::from(TransportError::Connection("refused".to_string()));
        let (status, body) = body_of(error).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.message.contains("refused"));
    }

    #[tokio::test]
    async fn test_transport_stream_failure() {
        let error = ApiError::from(TransportError::Stream("bad selector".to_string()));
        let (status, _) = body_of(error).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
