//! Error type for `vigil-cqrs`.

use thiserror::Error;

use vigil_core::{ErrorKind, FieldError};

/// Why a dispatched command or query did not produce an outcome.
#[derive(Debug, Error)]
pub enum DispatchError {
  /// Envelope validation failed before any handler ran. Nothing was
  /// applied; the field errors itemize every problem found.
  #[error("rejected before dispatch: {}", format_fields(.0))]
  Rejected(Vec<FieldError>),

  /// The store refused or failed the operation.
  #[error(transparent)]
  Store(#[from] vigil_core::Error),
}

impl DispatchError {
  /// The four-code taxonomy for API mapping. Envelope rejections count as
  /// validation errors.
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Rejected(_) => ErrorKind::ValidationError,
      Self::Store(e) => e.kind(),
    }
  }

  /// Itemized field errors, when this failure carries them.
  pub fn field_errors(&self) -> Option<&[FieldError]> {
    match self {
      Self::Rejected(fields) => Some(fields),
      Self::Store(vigil_core::Error::Validation(fields)) => Some(fields),
      Self::Store(_) => None,
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

pub type Result<T, E = DispatchError> = std::result::Result<T, E>;
