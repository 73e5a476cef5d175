//! Error types for `vigil-core`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::activity::ActivityId;

/// A single field-level validation failure, itemized so callers can surface
/// every problem at once instead of failing on the first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
  /// The offending field, e.g. `"title"`.
  pub field:   String,
  pub message: String,
}

impl FieldError {
  pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
    Self { field: field.into(), message: message.into() }
  }
}

impl std::fmt::Display for FieldError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}: {}", self.field, self.message)
  }
}

/// The coarse error taxonomy exposed at API boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
  ValidationError,
  ConstraintViolation,
  NotFound,
  InternalError,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("activity failed validation: {}", format_fields(.0))]
  Validation(Vec<FieldError>),

  #[error("activity {0} already exists")]
  DuplicateId(ActivityId),

  #[error("activity not found: {0}")]
  NotFound(ActivityId),

  #[error("stored snapshot for {id} failed its checksum (expected {expected}, got {actual})")]
  ChecksumMismatch {
    id:       ActivityId,
    expected: String,
    actual:   String,
  },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Map onto the four-code taxonomy carried across the API boundary.
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Validation(_) => ErrorKind::ValidationError,
      Self::DuplicateId(_) => ErrorKind::ConstraintViolation,
      Self::NotFound(_) => ErrorKind::NotFound,
      Self::ChecksumMismatch { .. } | Self::Serialization(_) => {
        ErrorKind::InternalError
      }
    }
  }
}

fn format_fields(errors: &[FieldError]) -> String {
  errors
    .iter()
    .map(ToString::to_string)
    .collect::<Vec<_>>()
    .join("; ")
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
