//! [`MemoryStore`] — the in-memory implementation of [`ActivityStore`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use vigil_bus::EventBus;
use vigil_core::{
  Error, Result,
  activity::{Activity, ActivityId},
  event::{Aggregate, EventFilter},
  query::{ActivityQuery, ActivityStats, OverdueActivity, Page},
  snapshot::StoredActivity,
  store::{
    ActivityStore, ChangeFilter, ChangeHandler, ChangeKind, RepoChange,
    SubscriptionId,
  },
};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StoreConfig {
  /// How long a point-read result may be served from the cache.
  pub cache_ttl: Duration,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self { cache_ttl: Duration::from_secs(30) }
  }
}

// ─── State ───────────────────────────────────────────────────────────────────

struct CacheEntry {
  activity:  Activity,
  cached_at: Instant,
}

struct Watcher {
  id:      SubscriptionId,
  filter:  Option<ChangeFilter>,
  handler: ChangeHandler,
}

struct StoreState {
  table:    HashMap<ActivityId, StoredActivity>,
  indexes:  crate::indexes::Indexes,
  cache:    HashMap<ActivityId, CacheEntry>,
  watchers: Vec<Watcher>,
}

/// Detaches the store's cache-invalidation subscription from the bus when
/// the last store handle is dropped. Without this a long-lived bus would
/// accumulate one dead subscription per discarded store.
struct InvalidationGuard {
  bus: Weak<EventBus>,
  id:  vigil_bus::SubscriptionId,
}

impl Drop for InvalidationGuard {
  fn drop(&mut self) {
    if let Some(bus) = self.bus.upgrade() {
      bus.unsubscribe(self.id);
    }
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// An activity store held entirely in process memory.
///
/// Cloning is cheap — the inner state is reference-counted and shared.
#[derive(Clone)]
pub struct MemoryStore {
  cache_ttl:     Duration,
  state:         Arc<Mutex<StoreState>>,
  _invalidation: Arc<InvalidationGuard>,
}

impl MemoryStore {
  /// Build a store wired to `bus`: any `Aggregate::Activity` event seen on
  /// the bus invalidates the cache entry for its aggregate id, regardless
  /// of which code path produced the write. The subscription is detached
  /// when the last clone of the store is dropped.
  pub fn new(bus: &Arc<EventBus>, config: StoreConfig) -> Self {
    let state = Arc::new(Mutex::new(StoreState {
      table:    HashMap::new(),
      indexes:  crate::indexes::Indexes::default(),
      cache:    HashMap::new(),
      watchers: Vec::new(),
    }));

    let weak: Weak<Mutex<StoreState>> = Arc::downgrade(&state);
    let subscription = bus.subscribe(
      Some(EventFilter::for_aggregate(Aggregate::Activity)),
      Arc::new(move |event| {
        if let Some(state) = weak.upgrade() {
          let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
          state.cache.remove(&ActivityId::new(&*event.aggregate_id));
        }
        Ok(())
      }),
    );

    Self {
      cache_ttl: config.cache_ttl,
      state,
      _invalidation: Arc::new(InvalidationGuard {
        bus: Arc::downgrade(bus),
        id:  subscription,
      }),
    }
  }

  /// Store with the default 30-second cache TTL.
  pub fn with_defaults(bus: &Arc<EventBus>) -> Self {
    Self::new(bus, StoreConfig::default())
  }

  fn state(&self) -> MutexGuard<'_, StoreState> {
    // A poisoned lock means a panicked writer; the collections themselves
    // are still structurally sound, so recover and keep serving.
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Fan a change out to matching watchers. Handlers run outside the state
  /// lock so a watcher may call back into the store.
  fn notify(&self, change: RepoChange) {
    let handlers: Vec<ChangeHandler> = {
      let state = self.state();
      state
        .watchers
        .iter()
        .filter(|w| w.filter.as_ref().is_none_or(|f| f.matches(&change)))
        .map(|w| Arc::clone(&w.handler))
        .collect()
    };
    for handler in handlers {
      handler(&change);
    }
  }

  /// Number of live cache entries — a debugging surface, not an API.
  pub fn cache_len(&self) -> usize {
    self.state().cache.len()
  }

  /// Record count in the primary table (archived included).
  pub fn len(&self) -> usize {
    self.state().table.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  #[cfg(test)]
  pub(crate) fn cached(&self, id: &ActivityId) -> Option<Activity> {
    self.state().cache.get(id).map(|entry| entry.activity.clone())
  }

  #[cfg(test)]
  pub(crate) fn with_indexes<T>(
    &self,
    f: impl FnOnce(&crate::indexes::Indexes) -> T,
  ) -> T {
    f(&self.state().indexes)
  }

  /// Test-only: overwrite a stored snapshot, bypassing every write path.
  #[cfg(test)]
  pub(crate) fn tamper_stored(
    &self,
    id: &ActivityId,
    f: impl FnOnce(&mut StoredActivity),
  ) {
    let mut state = self.state();
    if let Some(stored) = state.table.get_mut(id) {
      f(stored);
    }
  }
}

// ─── ActivityStore impl ──────────────────────────────────────────────────────

impl ActivityStore for MemoryStore {
  type Error = Error;

  // ── Writes ────────────────────────────────────────────────────────────

  async fn create(&self, activity: Activity) -> Result<StoredActivity> {
    let errors = activity.validate();
    if !errors.is_empty() {
      return Err(Error::Validation(errors));
    }

    let stored = {
      let mut state = self.state();
      if state.table.contains_key(&activity.id) {
        return Err(Error::DuplicateId(activity.id));
      }

      let stored = StoredActivity::first(activity)?;
      state.indexes.insert(&stored.activity);
      state.cache.insert(stored.activity.id.clone(), CacheEntry {
        activity:  stored.activity.clone(),
        cached_at: Instant::now(),
      });
      state
        .table
        .insert(stored.activity.id.clone(), stored.clone());
      stored
    };

    tracing::debug!(id = %stored.activity.id, "activity created");
    self.notify(RepoChange {
      kind:     ChangeKind::Created,
      activity: stored.activity.clone(),
      version:  stored.version,
    });
    Ok(stored)
  }

  async fn update(&self, activity: Activity) -> Result<StoredActivity> {
    let stored = {
      let mut state = self.state();
      let existing = state
        .table
        .get(&activity.id)
        .ok_or_else(|| Error::NotFound(activity.id.clone()))?
        .clone();

      // Creation metadata is immutable; whatever the caller sent, the
      // stored values win.
      let mut next = activity;
      next.created_at = existing.activity.created_at;
      next.created_by = existing.activity.created_by.clone();

      let errors = next.validate();
      if !errors.is_empty() {
        return Err(Error::Validation(errors));
      }

      // Old values out of the indexes before the new ones go in.
      state.indexes.remove(&existing.activity);
      let stored = existing.replaced_with(next)?;
      state.indexes.insert(&stored.activity);
      state.cache.insert(stored.activity.id.clone(), CacheEntry {
        activity:  stored.activity.clone(),
        cached_at: Instant::now(),
      });
      state
        .table
        .insert(stored.activity.id.clone(), stored.clone());
      stored
    };

    tracing::debug!(
      id = %stored.activity.id,
      version = stored.version,
      "activity updated"
    );
    self.notify(RepoChange {
      kind:     ChangeKind::Updated,
      activity: stored.activity.clone(),
      version:  stored.version,
    });
    Ok(stored)
  }

  async fn archive(&self, id: &ActivityId) -> Result<StoredActivity> {
    let stored = {
      let mut state = self.state();
      let existing = state
        .table
        .get(id)
        .ok_or_else(|| Error::NotFound(id.clone()))?
        .clone();

      if existing.activity.archived {
        return Ok(existing);
      }

      let mut next = existing.activity.clone();
      next.archived = true;
      next.updated_at = Utc::now();

      state.indexes.remove(&existing.activity);
      let stored = existing.replaced_with(next)?;
      state.indexes.insert(&stored.activity);
      state.cache.insert(id.clone(), CacheEntry {
        activity:  stored.activity.clone(),
        cached_at: Instant::now(),
      });
      state.table.insert(id.clone(), stored.clone());
      stored
    };

    tracing::debug!(id = %id, "activity archived");
    self.notify(RepoChange {
      kind:     ChangeKind::Archived,
      activity: stored.activity.clone(),
      version:  stored.version,
    });
    Ok(stored)
  }

  async fn hard_delete(&self, id: &ActivityId) -> Result<()> {
    let removed = {
      let mut state = self.state();
      let stored = state
        .table
        .remove(id)
        .ok_or_else(|| Error::NotFound(id.clone()))?;
      state.indexes.remove(&stored.activity);
      state.cache.remove(id);
      stored
    };

    tracing::debug!(id = %id, "activity purged");
    self.notify(RepoChange {
      kind:     ChangeKind::Deleted,
      activity: removed.activity,
      version:  removed.version,
    });
    Ok(())
  }

  // ── Reads ─────────────────────────────────────────────────────────────

  async fn find_by_id(&self, id: &ActivityId) -> Result<Option<Activity>> {
    let mut state = self.state();

    if let Some(entry) = state.cache.get(id) {
      if entry.cached_at.elapsed() <= self.cache_ttl {
        return Ok(Some(entry.activity.clone()));
      }
      state.cache.remove(id);
    }

    let Some(stored) = state.table.get(id) else {
      return Ok(None);
    };

    // Cache miss: rehydrate from the table, verifying the checksum.
    let activity = stored.verified_activity()?;
    state.cache.insert(id.clone(), CacheEntry {
      activity:  activity.clone(),
      cached_at: Instant::now(),
    });
    Ok(Some(activity))
  }

  async fn find_many(&self, query: &ActivityQuery) -> Result<Page<Activity>> {
    let mut matched: Vec<Activity> = {
      let state = self.state();
      state
        .table
        .values()
        .map(|stored| &stored.activity)
        .filter(|activity| query.matches(activity))
        .cloned()
        .collect()
    };

    matched.sort_by(|a, b| query.compare(a, b));
    Ok(Page::slice(matched, query.offset, query.limit))
  }

  async fn get_stats(
    &self,
    query: Option<&ActivityQuery>,
  ) -> Result<ActivityStats> {
    let default_query = ActivityQuery::default();
    let query = query.unwrap_or(&default_query);

    let state = self.state();
    let matched = state
      .table
      .values()
      .map(|stored| &stored.activity)
      .filter(|activity| query.matches(activity));
    Ok(ActivityStats::compute(matched))
  }

  async fn find_overdue(
    &self,
    now: DateTime<Utc>,
  ) -> Result<Vec<OverdueActivity>> {
    // Nothing younger than the tightest threshold (critical, 2h) can be
    // overdue, so the timeline scan stops there.
    let cutoff = now - chrono::Duration::hours(2);

    let state = self.state();
    let mut overdue: Vec<OverdueActivity> = state
      .indexes
      .created_at_or_before(cutoff)
      .filter_map(|id| state.table.get(id))
      .filter(|stored| stored.activity.is_overdue(now))
      .map(|stored| OverdueActivity {
        activity:          stored.activity.clone(),
        age_seconds:       stored.activity.age(now).num_seconds(),
        threshold_seconds: stored
          .activity
          .priority
          .overdue_threshold()
          .num_seconds(),
      })
      .collect();

    // Oldest (most overdue) first; ties on id for determinism.
    overdue.sort_by(|a, b| {
      b.age_seconds
        .cmp(&a.age_seconds)
        .then_with(|| a.activity.id.cmp(&b.activity.id))
    });
    Ok(overdue)
  }

  // ── Change feed ───────────────────────────────────────────────────────

  fn subscribe_changes(
    &self,
    filter: Option<ChangeFilter>,
    handler: ChangeHandler,
  ) -> SubscriptionId {
    let id = SubscriptionId::generate();
    self.state().watchers.push(Watcher { id, filter, handler });
    id
  }

  fn unsubscribe_changes(&self, id: SubscriptionId) {
    self.state().watchers.retain(|w| w.id != id);
  }
}
