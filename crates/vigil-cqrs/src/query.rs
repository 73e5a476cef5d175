//! Queries — the closed set of read operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vigil_core::{
  FieldError,
  activity::ActivityId,
  event::EventFilter,
  query::ActivityQuery,
};

/// A read operation. Queries never mutate state and never publish events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Query {
  GetActivity { id: ActivityId },
  ListActivities(ActivityQuery),
  GetStats(Option<ActivityQuery>),
  FindOverdue,
  /// Replay from the bounded event history, optionally filtered.
  EventHistory(Option<EventFilter>),
}

impl Query {
  pub fn name(&self) -> &'static str {
    match self {
      Self::GetActivity { .. } => "get_activity",
      Self::ListActivities(_) => "list_activities",
      Self::GetStats(_) => "get_stats",
      Self::FindOverdue => "find_overdue",
      Self::EventHistory(_) => "event_history",
    }
  }
}

/// A query plus its issue timestamp. Queries do not require an actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryEnvelope {
  pub issued_at: DateTime<Utc>,
  pub query:     Query,
}

impl QueryEnvelope {
  pub fn new(query: Query) -> Self {
    Self { issued_at: Utc::now(), query }
  }

  pub fn validate(&self, now: DateTime<Utc>) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if self.issued_at > now + chrono::Duration::minutes(5) {
      errors.push(FieldError::new("issued_at", "is in the future"));
    }
    if let Query::ListActivities(query) = &self.query
      && query.limit == Some(0)
    {
      errors.push(FieldError::new("limit", "must be at least 1"));
    }
    errors
  }
}
