//! HTTP rendering of `SluiceError`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sluice_error::{ErrorCategory, ErrorCode, SluiceError};

/// A `SluiceError` on its way out as an HTTP response. The body is the
/// serialised error.
#[derive(Debug)]
pub struct ApiError(pub SluiceError);

impl From<SluiceError> for ApiError {
    fn from(err: SluiceError) -> Self {
        Self(err)
    }
}

pub fn status_for(err: &SluiceError) -> StatusCode {
    match err.code {
        ErrorCode::QueryNotFound | ErrorCode::DataSourceNotFound => StatusCode::NOT_FOUND,
        ErrorCode::TokenMismatch => StatusCode::CONFLICT,
        _ => match err.category() {
            ErrorCategory::Admission => StatusCode::TOO_MANY_REQUESTS,
            ErrorCategory::Client => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (status_for(&self.0), Json(self.0)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ErrorCode::CapacityExhausted, StatusCode::TOO_MANY_REQUESTS),
            (ErrorCode::NoTableFound, StatusCode::BAD_REQUEST),
            (ErrorCode::SyntaxError, StatusCode::BAD_REQUEST),
            (ErrorCode::SourceQualifierMismatch, StatusCode::BAD_REQUEST),
            (ErrorCode::QueryExpired, StatusCode::BAD_REQUEST),
            (ErrorCode::QueryNotFound, StatusCode::NOT_FOUND),
            (ErrorCode::DataSourceNotFound, StatusCode::NOT_FOUND),
            (ErrorCode::TokenMismatch, StatusCode::CONFLICT),
            (ErrorCode::FallbackExhausted, StatusCode::INTERNAL_SERVER_ERROR),
            (ErrorCode::InternalPanic, StatusCode::INTERNAL_SERVER_ERROR),
            (ErrorCode::InvalidConfig, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (code, status) in cases {
            assert_eq!(status_for(&SluiceError::new(code, "x")), status, "{:?}", code);
        }
    }
}
