//! The `ActivityStore` trait and the repository change feed.
//!
//! The trait is implemented by storage backends (e.g. `vigil-store-memory`).
//! Higher layers (`vigil-cqrs`, `vigil-api`) depend on this abstraction, not
//! on any concrete backend.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  activity::{Activity, ActivityId},
  query::{ActivityQuery, ActivityStats, OverdueActivity, Page},
  snapshot::StoredActivity,
};

// ─── Change feed ─────────────────────────────────────────────────────────────

/// What a repository-level change notification describes. This feed is
/// independent of the domain event bus: it fires for writes through this
/// store only, synchronously, after the write has been indexed.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
  Created,
  Updated,
  Archived,
  Deleted,
}

/// A change notification delivered to repository watchers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoChange {
  pub kind:     ChangeKind,
  pub activity: Activity,
  pub version:  u64,
}

/// Watcher filter; provided fields are ANDed, absent fields are wildcards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeFilter {
  #[serde(default)]
  pub kinds:    Vec<ChangeKind>,
  pub id:       Option<ActivityId>,
  pub building: Option<String>,
}

impl ChangeFilter {
  pub fn matches(&self, change: &RepoChange) -> bool {
    if !self.kinds.is_empty() && !self.kinds.contains(&change.kind) {
      return false;
    }
    if let Some(id) = &self.id
      && *id != change.activity.id
    {
      return false;
    }
    if let Some(building) = &self.building
      && change.activity.building.as_deref() != Some(building.as_str())
    {
      return false;
    }
    true
  }
}

/// Opaque handle returned by [`ActivityStore::subscribe_changes`].
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
  pub fn generate() -> Self {
    Self(Uuid::new_v4())
  }
}

/// Callback invoked for each matching [`RepoChange`].
pub type ChangeHandler = Arc<dyn Fn(&RepoChange) + Send + Sync>;

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Vigil activity store backend.
///
/// Records are replace-and-reindex only: no method mutates a stored activity
/// in place, and every successful write leaves all secondary indexes exactly
/// consistent with the primary table.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait ActivityStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Persist a new activity.
  ///
  /// Fails with a validation error if the record violates its invariants,
  /// or a constraint violation if the id is already taken; in both cases
  /// the store is left unchanged.
  fn create(
    &self,
    activity: Activity,
  ) -> impl Future<Output = Result<StoredActivity, Self::Error>> + Send + '_;

  /// Replace an existing activity, bumping its version and re-indexing.
  ///
  /// Fails with not-found if the id is absent, or a validation error if the
  /// replacement violates its invariants.
  fn update(
    &self,
    activity: Activity,
  ) -> impl Future<Output = Result<StoredActivity, Self::Error>> + Send + '_;

  /// Soft delete: set the archived flag, keeping the record queryable with
  /// `include_archived`. Idempotent on an already-archived record.
  fn archive<'a>(
    &'a self,
    id: &'a ActivityId,
  ) -> impl Future<Output = Result<StoredActivity, Self::Error>> + Send + 'a;

  /// Purge a record from the table, every index, and the cache.
  fn hard_delete<'a>(
    &'a self,
    id: &'a ActivityId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Cache-first point read. `None` if absent — not an error.
  fn find_by_id<'a>(
    &'a self,
    id: &'a ActivityId,
  ) -> impl Future<Output = Result<Option<Activity>, Self::Error>> + Send + 'a;

  /// Filter, sort, and paginate.
  fn find_many<'a>(
    &'a self,
    query: &'a ActivityQuery,
  ) -> impl Future<Output = Result<Page<Activity>, Self::Error>> + Send + 'a;

  /// Aggregate statistics over the filtered (unpaginated) set.
  fn get_stats<'a>(
    &'a self,
    query: Option<&'a ActivityQuery>,
  ) -> impl Future<Output = Result<ActivityStats, Self::Error>> + Send + 'a;

  /// Active, unarchived records older than their priority threshold.
  fn find_overdue(
    &self,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<OverdueActivity>, Self::Error>> + Send + '_;

  // ── Change feed ───────────────────────────────────────────────────────

  /// Register a watcher for repository-level changes. Watchers live until
  /// explicitly unsubscribed.
  fn subscribe_changes(
    &self,
    filter: Option<ChangeFilter>,
    handler: ChangeHandler,
  ) -> SubscriptionId;

  /// Remove a watcher. Idempotent.
  fn unsubscribe_changes(&self, id: SubscriptionId);
}
