//! Activity — the fundamental record of the Vigil store.
//!
//! An activity is a single observed occurrence on a monitored site: a medical
//! call, a breached door, a patrol check-in. Records are never mutated in
//! place by the store; every write replaces the whole record and re-indexes.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FieldError;

// ─── Identity ────────────────────────────────────────────────────────────────

/// Unique, immutable identifier for an activity.
///
/// Stored and transported as an opaque string. Generated ids use the
/// `ACT-<uuid>` form, but caller-supplied ids (e.g. from an upstream camera
/// system) are accepted as-is.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ActivityId(String);

impl ActivityId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn generate() -> Self {
    Self(format!("ACT-{}", Uuid::new_v4()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for ActivityId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for ActivityId {
  fn from(s: &str) -> Self {
    Self(s.to_owned())
  }
}

// ─── Classification ──────────────────────────────────────────────────────────

/// Severity, ordered: `Low < Medium < High < Critical`.
/// The ordinal drives sorting and overdue thresholds.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
  Low,
  Medium,
  High,
  Critical,
}

impl Priority {
  /// How long an activity of this priority may sit in an active state
  /// before it is considered overdue.
  pub fn overdue_threshold(self) -> chrono::Duration {
    match self {
      Self::Critical => chrono::Duration::hours(2),
      Self::High => chrono::Duration::hours(8),
      Self::Medium | Self::Low => chrono::Duration::hours(24),
    }
  }
}

/// Where an activity sits in the triage workflow.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
  Detecting,
  Assigned,
  Responding,
  Resolved,
}

impl ActivityStatus {
  /// Anything short of `Resolved` still demands attention.
  pub fn is_active(self) -> bool {
    !matches!(self, Self::Resolved)
  }
}

/// The category of occurrence.
///
/// Serialised as its discriminant string (`"medical"`, `"security-breach"`,
/// …); unrecognised strings round-trip through [`ActivityType::Other`] so
/// upstream sources with their own taxonomies are never rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActivityType {
  Medical,
  SecurityBreach,
  Alert,
  PropertyDamage,
  PatrolUpdate,
  Evidence,
  /// Escape hatch for upstream sources with their own taxonomies.
  Other(String),
}

impl ActivityType {
  /// The discriminant string used as an index key and in API payloads.
  pub fn discriminant(&self) -> &str {
    match self {
      Self::Medical => "medical",
      Self::SecurityBreach => "security-breach",
      Self::Alert => "alert",
      Self::PropertyDamage => "property-damage",
      Self::PatrolUpdate => "patrol-update",
      Self::Evidence => "evidence",
      Self::Other(s) => s,
    }
  }
}

impl From<&str> for ActivityType {
  fn from(s: &str) -> Self {
    match s {
      "medical" => Self::Medical,
      "security-breach" => Self::SecurityBreach,
      "alert" => Self::Alert,
      "property-damage" => Self::PropertyDamage,
      "patrol-update" => Self::PatrolUpdate,
      "evidence" => Self::Evidence,
      other => Self::Other(other.to_owned()),
    }
  }
}

impl Serialize for ActivityType {
  fn serialize<S: serde::Serializer>(
    &self,
    serializer: S,
  ) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(self.discriminant())
  }
}

impl<'de> Deserialize<'de> for ActivityType {
  fn deserialize<D: serde::Deserializer<'de>>(
    deserializer: D,
  ) -> Result<Self, D::Error> {
    let s = String::deserialize(deserializer)?;
    Ok(Self::from(s.as_str()))
  }
}

// ─── Activity ────────────────────────────────────────────────────────────────

/// A single activity record.
///
/// Invariants, enforced by [`Activity::validate`]:
/// - `id` is non-empty and immutable after creation;
/// - `title` is non-empty;
/// - `confidence` is within `0..=100`;
/// - `updated_at >= created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
  pub id:                ActivityId,
  pub activity_type:     ActivityType,
  pub status:            ActivityStatus,
  pub priority:          Priority,
  pub title:             String,
  pub description:       String,
  pub location:          String,
  pub building:          Option<String>,
  pub zone:              Option<String>,
  /// The guard or operator currently responsible, if any.
  pub assigned_to:       Option<String>,
  pub created_by:        String,
  /// Detection confidence, 0–100.
  pub confidence:        u8,
  /// Incidents this activity has been folded into.
  pub incident_contexts: BTreeSet<ActivityId>,
  pub archived:          bool,
  pub created_at:        DateTime<Utc>,
  pub updated_at:        DateTime<Utc>,
}

impl Activity {
  /// Build a fresh activity from caller input. The id is generated unless
  /// supplied, timestamps are set to `now`, and the record starts
  /// unarchived in `Detecting` status.
  pub fn from_new(input: NewActivity, created_by: &str, now: DateTime<Utc>) -> Self {
    Self {
      id:                input.id.unwrap_or_else(ActivityId::generate),
      activity_type:     input.activity_type,
      status:            input.status.unwrap_or(ActivityStatus::Detecting),
      priority:          input.priority,
      title:             input.title,
      description:       input.description.unwrap_or_default(),
      location:          input.location,
      building:          input.building,
      zone:              input.zone,
      assigned_to:       input.assigned_to,
      created_by:        created_by.to_owned(),
      confidence:        input.confidence.unwrap_or(100),
      incident_contexts: input.incident_contexts,
      archived:          false,
      created_at:        now,
      updated_at:        now,
    }
  }

  /// Check the record invariants, returning every violation found.
  pub fn validate(&self) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if self.id.as_str().trim().is_empty() {
      errors.push(FieldError::new("id", "must not be empty"));
    }
    if self.title.trim().is_empty() {
      errors.push(FieldError::new("title", "must not be empty"));
    }
    if self.confidence > 100 {
      errors.push(FieldError::new("confidence", "must be within 0..=100"));
    }
    if self.updated_at < self.created_at {
      errors.push(FieldError::new(
        "updated_at",
        "must not precede created_at",
      ));
    }

    errors
  }

  /// Age of the record relative to `now`.
  pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
    now - self.created_at
  }

  /// Whether the activity is active (non-resolved, non-archived) and older
  /// than its priority's overdue threshold.
  pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
    !self.archived
      && self.status.is_active()
      && self.age(now) > self.priority.overdue_threshold()
  }
}

// ─── Inbound shapes ──────────────────────────────────────────────────────────

/// Input to activity creation — the fields a caller may supply.
/// Everything the store owns (timestamps, archival flag) is absent here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewActivity {
  /// Caller-supplied id; generated when absent.
  #[serde(default)]
  pub id:                Option<ActivityId>,
  pub activity_type:     ActivityType,
  #[serde(default)]
  pub status:            Option<ActivityStatus>,
  pub priority:          Priority,
  pub title:             String,
  #[serde(default)]
  pub description:       Option<String>,
  pub location:          String,
  #[serde(default)]
  pub building:          Option<String>,
  #[serde(default)]
  pub zone:              Option<String>,
  #[serde(default)]
  pub assigned_to:       Option<String>,
  #[serde(default)]
  pub confidence:        Option<u8>,
  #[serde(default)]
  pub incident_contexts: BTreeSet<ActivityId>,
}

impl NewActivity {
  /// Minimal constructor; optional fields default to `None`.
  pub fn new(
    activity_type: ActivityType,
    priority: Priority,
    title: impl Into<String>,
    location: impl Into<String>,
  ) -> Self {
    Self {
      id: None,
      activity_type,
      status: None,
      priority,
      title: title.into(),
      description: None,
      location: location.into(),
      building: None,
      zone: None,
      assigned_to: None,
      confidence: None,
      incident_contexts: BTreeSet::new(),
    }
  }
}

/// A partial update. `None` fields are left untouched; `assigned_to` and the
/// other nested options use a double-`Option` so "clear this field" and
/// "leave it alone" stay distinct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityPatch {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status:            Option<ActivityStatus>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub priority:          Option<Priority>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub title:             Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description:       Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub location:          Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none",
    with = "serde_double_option"
  )]
  pub building:          Option<Option<String>>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none",
    with = "serde_double_option"
  )]
  pub zone:              Option<Option<String>>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none",
    with = "serde_double_option"
  )]
  pub assigned_to:       Option<Option<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub confidence:        Option<u8>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub incident_contexts: Option<BTreeSet<ActivityId>>,
}

impl ActivityPatch {
  pub fn is_empty(&self) -> bool {
    self.status.is_none()
      && self.priority.is_none()
      && self.title.is_none()
      && self.description.is_none()
      && self.location.is_none()
      && self.building.is_none()
      && self.zone.is_none()
      && self.assigned_to.is_none()
      && self.confidence.is_none()
      && self.incident_contexts.is_none()
  }

  /// Apply the patch to `activity`, refreshing `updated_at`.
  /// The id, creator, and `created_at` are never touched.
  pub fn apply(&self, activity: &mut Activity, now: DateTime<Utc>) {
    if let Some(status) = self.status {
      activity.status = status;
    }
    if let Some(priority) = self.priority {
      activity.priority = priority;
    }
    if let Some(title) = &self.title {
      activity.title = title.clone();
    }
    if let Some(description) = &self.description {
      activity.description = description.clone();
    }
    if let Some(location) = &self.location {
      activity.location = location.clone();
    }
    if let Some(building) = &self.building {
      activity.building = building.clone();
    }
    if let Some(zone) = &self.zone {
      activity.zone = zone.clone();
    }
    if let Some(assigned_to) = &self.assigned_to {
      activity.assigned_to = assigned_to.clone();
    }
    if let Some(confidence) = self.confidence {
      activity.confidence = confidence;
    }
    if let Some(contexts) = &self.incident_contexts {
      activity.incident_contexts = contexts.clone();
    }
    activity.updated_at = now;
  }
}

/// Serde helper distinguishing an absent field from an explicit `null`.
mod serde_double_option {
  use serde::{Deserialize, Deserializer, Serialize, Serializer};

  pub fn serialize<T, S>(
    value: &Option<Option<T>>,
    serializer: S,
  ) -> Result<S::Ok, S::Error>
  where
    T: Serialize,
    S: Serializer,
  {
    match value {
      Some(inner) => inner.serialize(serializer),
      None => serializer.serialize_none(),
    }
  }

  pub fn deserialize<'de, T, D>(
    deserializer: D,
  ) -> Result<Option<Option<T>>, D::Error>
  where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
  {
    Option::<T>::deserialize(deserializer).map(Some)
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  fn sample() -> Activity {
    Activity::from_new(
      NewActivity::new(
        ActivityType::Alert,
        Priority::High,
        "Tailgate at lobby door",
        "Building A / Lobby",
      ),
      "system",
      Utc::now(),
    )
  }

  #[test]
  fn valid_activity_passes_validation() {
    assert!(sample().validate().is_empty());
  }

  #[test]
  fn validation_reports_every_violation() {
    let mut a = sample();
    a.title = "  ".into();
    a.updated_at = a.created_at - chrono::Duration::seconds(1);

    let errors = a.validate();
    let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
    assert_eq!(fields, ["title", "updated_at"]);
  }

  #[test]
  fn priority_ordering_matches_severity() {
    assert!(Priority::Low < Priority::Medium);
    assert!(Priority::Medium < Priority::High);
    assert!(Priority::High < Priority::Critical);
  }

  #[test]
  fn patch_apply_leaves_identity_alone() {
    let mut a = sample();
    let id = a.id.clone();
    let created = a.created_at;

    let patch = ActivityPatch {
      status: Some(ActivityStatus::Resolved),
      assigned_to: Some(Some("garcia.m".into())),
      ..Default::default()
    };
    let later = created + chrono::Duration::minutes(5);
    patch.apply(&mut a, later);

    assert_eq!(a.id, id);
    assert_eq!(a.created_at, created);
    assert_eq!(a.updated_at, later);
    assert_eq!(a.status, ActivityStatus::Resolved);
    assert_eq!(a.assigned_to.as_deref(), Some("garcia.m"));
  }

  #[test]
  fn overdue_respects_priority_thresholds() {
    let now = Utc::now();
    let mut a = sample();
    a.priority = Priority::Critical;
    a.created_at = now - chrono::Duration::hours(3);
    a.updated_at = a.created_at;
    assert!(a.is_overdue(now));

    a.priority = Priority::High;
    assert!(!a.is_overdue(now), "high threshold is 8h");

    a.priority = Priority::Critical;
    a.status = ActivityStatus::Resolved;
    assert!(!a.is_overdue(now), "resolved is never overdue");
  }
}
