//! Maps repository errors onto the protocol shapes each route family uses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::models::ErrorBody;

/// The documentation link emitted alongside API error bodies.
pub(crate) const DOCS_URL: &str = "https://docs.github.com/rest";

//================================================================================================
// Types
//================================================================================================

/// An error surfaced by an API route.
#[derive(Debug)]
pub(crate) enum ApiError {
    /// 404 with a GitHub-shaped JSON body.
    NotFound(String),
    /// 422 for a malformed `sha` parameter.
    InvalidSha,
    /// 400 for malformed query input.
    BadRequest,
    /// 500 for everything else.
    Internal(String),
}

//================================================================================================
// Impls
//================================================================================================

impl ApiError {
    /// The standard 404 body.
    pub fn not_found() -> Self {
        ApiError::NotFound("Not Found".to_string())
    }
}

impl From<gitbox::Error> for ApiError {
    fn from(err: gitbox::Error) -> Self {
        match err {
            gitbox::Error::NotFound | gitbox::Error::TypeMismatch { .. } => ApiError::not_found(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                Json(ErrorBody {
                    message,
                    documentation_url: DOCS_URL.to_string(),
                }),
            )
                .into_response(),
            ApiError::InvalidSha => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorBody {
                    message: "The sha parameter must be exactly 40 characters and contain only \
                              [0-9a-f]."
                        .to_string(),
                    documentation_url: DOCS_URL.to_string(),
                }),
            )
                .into_response(),
            ApiError::BadRequest => {
                (StatusCode::BAD_REQUEST, "Bad request").into_response()
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
