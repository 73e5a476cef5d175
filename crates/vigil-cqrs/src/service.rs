//! The `ActivityService` port — the stable interface the presentation layer
//! depends on.
//!
//! Two interchangeable implementations are provided and selected at
//! construction time:
//!
//! - [`DirectActivityService`] goes straight to the store, matching the
//!   legacy behaviour (no domain events);
//! - [`CqrsActivityService`] wraps each call in an envelope and routes it
//!   through the [`Dispatcher`], so events are published and envelope
//!   validation applies.
//!
//! Errors always propagate to the caller. A failure in one path never
//! silently degrades to the other.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;

use vigil_core::{
  activity::{Activity, ActivityId, ActivityPatch, NewActivity},
  query::{ActivityQuery, Page},
  store::ActivityStore,
};

use crate::{
  Command, CommandEnvelope, CommandOutcome, DispatchError, Dispatcher, Query,
  QueryEnvelope, QueryOutcome, Result,
};

// ─── Port ────────────────────────────────────────────────────────────────────

/// The legacy-shaped activity operations.
pub trait ActivityService: Send + Sync {
  fn create_activity(
    &self,
    input: NewActivity,
  ) -> impl Future<Output = Result<Activity>> + Send + '_;

  fn update_activity(
    &self,
    id: ActivityId,
    patch: ActivityPatch,
  ) -> impl Future<Output = Result<Activity>> + Send + '_;

  fn get_activities(
    &self,
    query: ActivityQuery,
  ) -> impl Future<Output = Result<Page<Activity>>> + Send + '_;
}

// ─── Direct implementation ───────────────────────────────────────────────────

/// Store-direct implementation: the legacy code path, kept callable for
/// comparison and migration. Publishes nothing on the bus.
pub struct DirectActivityService<S> {
  store: Arc<S>,
  actor: String,
}

impl<S> DirectActivityService<S> {
  pub fn new(store: Arc<S>, actor: impl Into<String>) -> Self {
    Self { store, actor: actor.into() }
  }
}

impl<S> ActivityService for DirectActivityService<S>
where
  S: ActivityStore,
  S::Error: Into<vigil_core::Error>,
{
  async fn create_activity(&self, input: NewActivity) -> Result<Activity> {
    let activity = Activity::from_new(input, &self.actor, Utc::now());
    let stored = self.store.create(activity).await.map_err(|e| DispatchError::Store(e.into()))?;
    Ok(stored.activity)
  }

  async fn update_activity(
    &self,
    id: ActivityId,
    patch: ActivityPatch,
  ) -> Result<Activity> {
    let mut activity = self
      .store
      .find_by_id(&id)
      .await
      .map_err(|e| DispatchError::Store(e.into()))?
      .ok_or(vigil_core::Error::NotFound(id))?;
    patch.apply(&mut activity, Utc::now());

    let stored = self.store.update(activity).await.map_err(|e| DispatchError::Store(e.into()))?;
    Ok(stored.activity)
  }

  async fn get_activities(
    &self,
    query: ActivityQuery,
  ) -> Result<Page<Activity>> {
    let page = self
      .store
      .find_many(&query)
      .await
      .map_err(|e| DispatchError::Store(e.into()))?;
    Ok(page)
  }
}

// ─── Dispatcher-backed implementation ────────────────────────────────────────

/// Dispatcher-backed implementation: every call becomes a validated
/// envelope, and successful writes publish domain events.
pub struct CqrsActivityService<S> {
  dispatcher: Dispatcher<S>,
  actor:      String,
}

impl<S> CqrsActivityService<S> {
  pub fn new(dispatcher: Dispatcher<S>, actor: impl Into<String>) -> Self {
    Self { dispatcher, actor: actor.into() }
  }
}

impl<S> ActivityService for CqrsActivityService<S>
where
  S: ActivityStore,
  S::Error: Into<vigil_core::Error>,
{
  async fn create_activity(&self, input: NewActivity) -> Result<Activity> {
    let envelope =
      CommandEnvelope::new(&*self.actor, Command::CreateActivity(input));
    match self.dispatcher.dispatch_command(envelope).await? {
      CommandOutcome::Created(stored) => Ok(stored.activity),
      other => unreachable!("create dispatched to {other:?}"),
    }
  }

  async fn update_activity(
    &self,
    id: ActivityId,
    patch: ActivityPatch,
  ) -> Result<Activity> {
    let envelope = CommandEnvelope::new(
      &*self.actor,
      Command::UpdateActivity { id, patch },
    );
    match self.dispatcher.dispatch_command(envelope).await? {
      CommandOutcome::Updated(stored) => Ok(stored.activity),
      other => unreachable!("update dispatched to {other:?}"),
    }
  }

  async fn get_activities(
    &self,
    query: ActivityQuery,
  ) -> Result<Page<Activity>> {
    let envelope = QueryEnvelope::new(Query::ListActivities(query));
    match self.dispatcher.dispatch_query(envelope).await? {
      QueryOutcome::Activities(page) => Ok(page),
      other => unreachable!("list dispatched to {other:?}"),
    }
  }
}
