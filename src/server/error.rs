//! Error-to-HTTP response conversion
//!
//! Failures before the response starts become plain-text responses: a
//! missing stream is `404 stream not found`, everything else is a 500 with
//! the error text.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::error::Error;

/// Wrapper so handlers can return `Result<_, ApiError>`
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        if self.0.is_not_found() {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<Error>,
{
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = %status, error = %self.0, "Request failed");
        }
        (status, self.0.to_string()).into_response()
    }
}
