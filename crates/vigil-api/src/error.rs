//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use vigil_core::ErrorKind;
use vigil_cqrs::DispatchError;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error(transparent)]
  Dispatch(#[from] DispatchError),
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message, fields) = match &self {
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone(), None),
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone(), None),
      ApiError::Dispatch(e) => {
        let status = match e.kind() {
          ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
          ErrorKind::ConstraintViolation => StatusCode::CONFLICT,
          ErrorKind::NotFound => StatusCode::NOT_FOUND,
          ErrorKind::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, e.to_string(), e.field_errors().map(<[_]>::to_vec))
      }
    };

    let body = match fields {
      Some(fields) => {
        json!({ "error": message, "validation_errors": fields })
      }
      None => json!({ "error": message }),
    };
    (status, Json(body)).into_response()
  }
}
