//! Commands — the closed set of state-changing operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vigil_core::{
  FieldError,
  activity::{ActivityId, ActivityPatch, NewActivity},
};

/// Permitted clock skew on `issued_at` before an envelope is rejected.
const MAX_FUTURE_SKEW: chrono::Duration = chrono::Duration::minutes(5);

/// A state-changing operation. Each variant carries its full, statically
/// typed payload — there is no dynamic payload escape hatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Command {
  CreateActivity(NewActivity),
  UpdateActivity {
    id:    ActivityId,
    patch: ActivityPatch,
  },
  ArchiveActivity {
    id: ActivityId,
  },
  /// Hard delete: the record is purged, not archived.
  DeleteActivity {
    id: ActivityId,
  },
}

impl Command {
  /// Stable name for logging and metrics.
  pub fn name(&self) -> &'static str {
    match self {
      Self::CreateActivity(_) => "create_activity",
      Self::UpdateActivity { .. } => "update_activity",
      Self::ArchiveActivity { .. } => "archive_activity",
      Self::DeleteActivity { .. } => "delete_activity",
    }
  }
}

/// A command plus the metadata every command must carry: who issued it and
/// when. Validated before dispatch; an invalid envelope never reaches a
/// handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
  pub command_id: Uuid,
  /// The user or system component issuing the command.
  pub actor:      String,
  pub issued_at:  DateTime<Utc>,
  pub command:    Command,
}

impl CommandEnvelope {
  pub fn new(actor: impl Into<String>, command: Command) -> Self {
    Self {
      command_id: Uuid::new_v4(),
      actor:      actor.into(),
      issued_at:  Utc::now(),
      command,
    }
  }

  /// Envelope-level validation, run before dispatch. Payload-level
  /// validation (e.g. activity invariants) stays with the store.
  pub fn validate(&self, now: DateTime<Utc>) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if self.actor.trim().is_empty() {
      errors.push(FieldError::new("actor", "must not be empty"));
    }
    if self.issued_at > now + MAX_FUTURE_SKEW {
      errors.push(FieldError::new("issued_at", "is in the future"));
    }
    if let Command::UpdateActivity { patch, .. } = &self.command
      && patch.is_empty()
    {
      errors.push(FieldError::new("patch", "must change at least one field"));
    }

    errors
  }
}
