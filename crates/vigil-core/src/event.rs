//! Domain events and filters.
//!
//! Events are immutable once published. The bus keeps a bounded replay
//! history; nothing here survives the process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Event ───────────────────────────────────────────────────────────────────

/// What happened to the aggregate.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
  Created,
  Updated,
  Archived,
  Deleted,
}

/// Which aggregate family the event belongs to.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
  Activity,
  Incident,
  Guard,
}

/// An immutable record of a state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
  pub id:           Uuid,
  pub kind:         EventKind,
  pub aggregate:    Aggregate,
  /// Identifier of the affected aggregate, as an opaque string.
  pub aggregate_id: String,
  pub occurred_at:  DateTime<Utc>,
  /// Version of the aggregate after the change.
  pub version:      u64,
  /// The user or system component that caused the change.
  pub actor:        Option<String>,
  /// Snapshot or delta payload; shape depends on `kind`.
  pub data:         serde_json::Value,
}

impl DomainEvent {
  pub fn new(
    kind: EventKind,
    aggregate: Aggregate,
    aggregate_id: impl Into<String>,
    version: u64,
    actor: Option<String>,
    data: serde_json::Value,
  ) -> Self {
    Self {
      id: Uuid::new_v4(),
      kind,
      aggregate,
      aggregate_id: aggregate_id.into(),
      occurred_at: Utc::now(),
      version,
      actor,
      data,
    }
  }
}

// ─── Filter ──────────────────────────────────────────────────────────────────

/// Subscription and replay filter. All provided fields must match; absent
/// fields are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFilter {
  pub aggregate:    Option<Aggregate>,
  pub kind:         Option<EventKind>,
  pub aggregate_id: Option<String>,
  pub actor:        Option<String>,
  /// Match only events with `occurred_at >= after`.
  pub after:        Option<DateTime<Utc>>,
  /// Match only events with `occurred_at <= before`.
  pub before:       Option<DateTime<Utc>>,
}

impl EventFilter {
  /// Convenience filter for one aggregate family.
  pub fn for_aggregate(aggregate: Aggregate) -> Self {
    Self { aggregate: Some(aggregate), ..Default::default() }
  }

  pub fn matches(&self, event: &DomainEvent) -> bool {
    if let Some(aggregate) = self.aggregate
      && aggregate != event.aggregate
    {
      return false;
    }
    if let Some(kind) = self.kind
      && kind != event.kind
    {
      return false;
    }
    if let Some(id) = &self.aggregate_id
      && *id != event.aggregate_id
    {
      return false;
    }
    if let Some(actor) = &self.actor
      && event.actor.as_deref() != Some(actor.as_str())
    {
      return false;
    }
    if let Some(after) = self.after
      && event.occurred_at < after
    {
      return false;
    }
    if let Some(before) = self.before
      && event.occurred_at > before
    {
      return false;
    }
    true
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
