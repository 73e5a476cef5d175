//! The [`Dispatcher`] — routes validated envelopes to the store and
//! publishes domain events for successful commands.

use std::sync::Arc;

use chrono::Utc;

use vigil_bus::EventBus;
use vigil_core::{
  activity::{Activity, ActivityId},
  event::{Aggregate, DomainEvent, EventKind},
  query::{ActivityStats, OverdueActivity, Page},
  snapshot::StoredActivity,
  store::ActivityStore,
};

use crate::{
  DispatchError, Result,
  command::{Command, CommandEnvelope},
  query::{Query, QueryEnvelope},
};

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// What a successful command produced.
#[derive(Debug, Clone)]
pub enum CommandOutcome {
  Created(StoredActivity),
  Updated(StoredActivity),
  Archived(StoredActivity),
  Deleted(ActivityId),
}

impl CommandOutcome {
  /// The affected activity, when the record still exists.
  pub fn activity(&self) -> Option<&Activity> {
    match self {
      Self::Created(s) | Self::Updated(s) | Self::Archived(s) => {
        Some(&s.activity)
      }
      Self::Deleted(_) => None,
    }
  }
}

/// What a successful query produced.
#[derive(Debug, Clone)]
pub enum QueryOutcome {
  Activity(Option<Activity>),
  Activities(Page<Activity>),
  Stats(ActivityStats),
  Overdue(Vec<OverdueActivity>),
  Events(Vec<DomainEvent>),
}

// ─── Dispatcher ──────────────────────────────────────────────────────────────

/// Routes commands and queries to a store backend, with the bus as the
/// side-effect channel. Cheap to clone.
pub struct Dispatcher<S> {
  store: Arc<S>,
  bus:   Arc<EventBus>,
}

impl<S> Clone for Dispatcher<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store), bus: Arc::clone(&self.bus) }
  }
}

impl<S> Dispatcher<S>
where
  S: ActivityStore,
  S::Error: Into<vigil_core::Error>,
{
  pub fn new(store: Arc<S>, bus: Arc<EventBus>) -> Self {
    Self { store, bus }
  }

  pub fn store(&self) -> &Arc<S> {
    &self.store
  }

  pub fn bus(&self) -> &Arc<EventBus> {
    &self.bus
  }

  // ── Commands ──────────────────────────────────────────────────────────

  /// Validate and execute a command, publishing the matching domain event
  /// once the store write succeeds. Validation failures reject the whole
  /// envelope; nothing is partially applied.
  pub async fn dispatch_command(
    &self,
    envelope: CommandEnvelope,
  ) -> Result<CommandOutcome> {
    let errors = envelope.validate(Utc::now());
    if !errors.is_empty() {
      tracing::debug!(
        command = envelope.command.name(),
        ?errors,
        "command rejected by envelope validation"
      );
      return Err(DispatchError::Rejected(errors));
    }

    let CommandEnvelope { command_id, actor, command, .. } = envelope;
    tracing::info!(
      command = command.name(),
      %command_id,
      %actor,
      "dispatching command"
    );

    match command {
      Command::CreateActivity(input) => {
        let activity = Activity::from_new(input, &actor, Utc::now());
        let stored =
          self.store.create(activity).await.map_err(|e| DispatchError::Store(e.into()))?;
        self.publish(EventKind::Created, &stored, &actor)?;
        Ok(CommandOutcome::Created(stored))
      }

      Command::UpdateActivity { id, patch } => {
        let mut activity = self
          .store
          .find_by_id(&id)
          .await
          .map_err(|e| DispatchError::Store(e.into()))?
          .ok_or(vigil_core::Error::NotFound(id))?;
        patch.apply(&mut activity, Utc::now());

        let stored =
          self.store.update(activity).await.map_err(|e| DispatchError::Store(e.into()))?;
        self.publish(EventKind::Updated, &stored, &actor)?;
        Ok(CommandOutcome::Updated(stored))
      }

      Command::ArchiveActivity { id } => {
        // Archiving an archived record is a no-op in the store; replay
        // must not show a state change that never happened.
        let already_archived = self
          .store
          .find_by_id(&id)
          .await
          .map_err(|e| DispatchError::Store(e.into()))?
          .is_some_and(|a| a.archived);

        let stored =
          self.store.archive(&id).await.map_err(|e| DispatchError::Store(e.into()))?;
        if !already_archived {
          self.publish(EventKind::Archived, &stored, &actor)?;
        }
        Ok(CommandOutcome::Archived(stored))
      }

      Command::DeleteActivity { id } => {
        // Snapshot the record first so the event can carry its last state.
        let last = self
          .store
          .find_by_id(&id)
          .await
          .map_err(|e| DispatchError::Store(e.into()))?
          .ok_or_else(|| vigil_core::Error::NotFound(id.clone()))?;

        self.store.hard_delete(&id).await.map_err(|e| DispatchError::Store(e.into()))?;
        self.bus.publish(DomainEvent::new(
          EventKind::Deleted,
          Aggregate::Activity,
          id.as_str(),
          0,
          Some(actor),
          serde_json::to_value(&last)
            .map_err(vigil_core::Error::Serialization)?,
        ));
        Ok(CommandOutcome::Deleted(id))
      }
    }
  }

  // ── Queries ───────────────────────────────────────────────────────────

  pub async fn dispatch_query(
    &self,
    envelope: QueryEnvelope,
  ) -> Result<QueryOutcome> {
    let errors = envelope.validate(Utc::now());
    if !errors.is_empty() {
      return Err(DispatchError::Rejected(errors));
    }

    tracing::debug!(query = envelope.query.name(), "dispatching query");

    match envelope.query {
      Query::GetActivity { id } => {
        let found =
          self.store.find_by_id(&id).await.map_err(|e| DispatchError::Store(e.into()))?;
        Ok(QueryOutcome::Activity(found))
      }
      Query::ListActivities(query) => {
        let page =
          self.store.find_many(&query).await.map_err(|e| DispatchError::Store(e.into()))?;
        Ok(QueryOutcome::Activities(page))
      }
      Query::GetStats(query) => {
        let stats = self
          .store
          .get_stats(query.as_ref())
          .await
          .map_err(|e| DispatchError::Store(e.into()))?;
        Ok(QueryOutcome::Stats(stats))
      }
      Query::FindOverdue => {
        let overdue = self
          .store
          .find_overdue(Utc::now())
          .await
          .map_err(|e| DispatchError::Store(e.into()))?;
        Ok(QueryOutcome::Overdue(overdue))
      }
      Query::EventHistory(filter) => {
        Ok(QueryOutcome::Events(self.bus.event_history(filter.as_ref())))
      }
    }
  }

  fn publish(
    &self,
    kind: EventKind,
    stored: &StoredActivity,
    actor: &str,
  ) -> Result<()> {
    self.bus.publish(DomainEvent::new(
      kind,
      Aggregate::Activity,
      stored.activity.id.as_str(),
      stored.version,
      Some(actor.to_owned()),
      serde_json::to_value(&stored.activity)
        .map_err(vigil_core::Error::Serialization)?,
    ));
    Ok(())
  }
}
