//! Response envelope and error mapping.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use crate::{EcommerceError, ErrorKind};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: &'static str,
    pub data: T,
}

pub fn success<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { status: "success", data })
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    status: &'static str,
    kind: &'static str,
    message: &'a str,
}

/// Full message of an internal error, attached to the response so a
/// development-only layer can put it back into the body.
#[derive(Debug, Clone)]
pub struct InternalDetail(pub String);

const INTERNAL_MESSAGE: &str = "An internal error occurred";

#[derive(Debug)]
pub struct ApiError(pub EcommerceError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<EcommerceError> for ApiError {
    fn from(e: EcommerceError) -> Self { Self(e) }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(EcommerceError::InvalidArgument(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self(EcommerceError::InvalidArgument(rejection.body_text()))
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InsufficientStock
        | ErrorKind::Expired
        | ErrorKind::LimitExceeded
        | ErrorKind::BelowMinimum
        | ErrorKind::InvalidState
        | ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn error_response(kind: ErrorKind, message: &str) -> Response {
    let body = ErrorBody { status: "error", kind: kind.as_str(), message };
    (status_for(kind), Json(body)).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        match kind {
            ErrorKind::Internal => {
                tracing::error!(error = %self.0, "request failed");
                let mut response = error_response(kind, INTERNAL_MESSAGE);
                response.extensions_mut().insert(InternalDetail(self.0.to_string()));
                response
            }
            ErrorKind::Unavailable => {
                tracing::warn!(error = %self.0, "request failed");
                error_response(kind, &self.0.to_string())
            }
            _ => error_response(kind, &self.0.to_string()),
        }
    }
}

/// Development-mode response mapper: restores the real message of internal errors.
pub async fn expose_internal_detail(response: Response) -> Response {
    let detail = response.extensions().get::<InternalDetail>().map(|d| d.0.clone());
    match detail {
        Some(detail) => error_response(ErrorKind::Internal, &detail),
        None => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::InvalidArgument), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::InsufficientStock), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::LimitExceeded), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::Unavailable), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(ErrorKind::Internal), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_internal_message_hidden_until_exposed() {
        let response = ApiError(EcommerceError::Internal("pool exploded".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let exposed = expose_internal_detail(ApiError(EcommerceError::Internal("pool exploded".into())).into_response()).await;

        let hidden = body_json(response).await;
        assert_eq!(hidden["status"], "error");
        assert_eq!(hidden["kind"], "internal");
        assert_eq!(hidden["message"], INTERNAL_MESSAGE);
        let shown = body_json(exposed).await;
        assert!(shown["message"].as_str().unwrap().contains("pool exploded"));
    }

    #[tokio::test]
    async fn test_domain_error_carries_kind_and_message() {
        let response = ApiError(EcommerceError::not_found("coupon", "SAVE99")).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["kind"], "not_found");
        assert_eq!(body["message"], "coupon SAVE99 not found");
    }
}
