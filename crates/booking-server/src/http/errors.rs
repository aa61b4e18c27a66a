use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::models::{ErrorBody, ErrorResponse};

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: message.to_string(),
            },
        }),
    )
        .into_response()
}

pub(super) fn bad_request_response(code: &str, message: &str) -> Response {
    error_response(StatusCode::BAD_REQUEST, code, message)
}

pub(super) fn not_found_response(code: &str, message: &str) -> Response {
    error_response(StatusCode::NOT_FOUND, code, message)
}
