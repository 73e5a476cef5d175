//! Handler for `GET /events` — replay of the bus history.

use axum::{
  Json,
  extract::{Query, State},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use vigil_core::{
  event::{Aggregate, DomainEvent, EventFilter, EventKind},
  store::ActivityStore,
};
use vigil_cqrs::{Dispatcher, Query as CqrsQuery, QueryEnvelope, QueryOutcome};

use crate::error::ApiError;

/// Query parameters for event replay. All provided fields must match.
#[derive(Debug, Deserialize, Default)]
pub struct EventParams {
  pub aggregate:    Option<Aggregate>,
  pub kind:         Option<EventKind>,
  pub aggregate_id: Option<String>,
  pub actor:        Option<String>,
  pub after:        Option<DateTime<Utc>>,
  pub before:       Option<DateTime<Utc>>,
}

impl EventParams {
  fn into_filter(self) -> Option<EventFilter> {
    let filter = EventFilter {
      aggregate:    self.aggregate,
      kind:         self.kind,
      aggregate_id: self.aggregate_id,
      actor:        self.actor,
      after:        self.after,
      before:       self.before,
    };
    (filter != EventFilter::default()).then_some(filter)
  }
}

/// `GET /events`
pub async fn list<S>(
  State(dispatcher): State<Dispatcher<S>>,
  Query(params): Query<EventParams>,
) -> Result<Json<Vec<DomainEvent>>, ApiError>
where
  S: ActivityStore + 'static,
  S::Error: Into<vigil_core::Error>,
{
  let envelope =
    QueryEnvelope::new(CqrsQuery::EventHistory(params.into_filter()));
  match dispatcher.dispatch_query(envelope).await? {
    QueryOutcome::Events(events) => Ok(Json(events)),
    other => unreachable!("events dispatched to {other:?}"),
  }
}
