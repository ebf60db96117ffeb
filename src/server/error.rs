//! Maps crate errors to `{ "error": ... }` responses

use crate::proxy::ErrorBody;
use crate::ParleyError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

#[derive(Debug)]
pub enum ApiError {
    /// Bad request body; answered with 400
    Validation(String),
    /// Provider or internal failure; answered with 500
    Internal(String),
}

impl From<ParleyError> for ApiError {
    fn from(e: ParleyError) -> Self {
        match e {
            ParleyError::InvalidInput(msg) => ApiError::Validation(msg),
            ParleyError::Upstream(msg) => ApiError::Internal(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorBody::new(message))).into_response()
    }
}
