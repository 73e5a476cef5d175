//! Handlers for `/activities` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/activities` | Body: [`NewActivity`]; returns 201 + stored record |
//! | `GET`    | `/activities` | Query params mirror [`ActivityQuery`]; CSV lists |
//! | `GET`    | `/activities/stats` | Aggregates over the same filters |
//! | `GET`    | `/activities/overdue` | Active records past their threshold |
//! | `GET`    | `/activities/:id` | 404 if not found |
//! | `PATCH`  | `/activities/:id` | Body: [`ActivityPatch`] |
//! | `POST`   | `/activities/:id/archive` | Soft delete |
//! | `DELETE` | `/activities/:id` | Hard delete; returns 204 |
//!
//! The acting user is read from the `x-actor` header; writes without it are
//! attributed to `"api"`.

use axum::{
  Json,
  extract::{Path, Query, State},
  http::{HeaderMap, StatusCode},
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use vigil_core::{
  activity::{Activity, ActivityId, ActivityPatch, NewActivity},
  query::{ActivityQuery, ActivityStats, OverdueActivity, Page, SortKey, SortOrder},
  snapshot::StoredActivity,
  store::ActivityStore,
};
use vigil_cqrs::{
  Command, CommandEnvelope, CommandOutcome, Dispatcher, Query as CqrsQuery,
  QueryEnvelope, QueryOutcome,
};

use crate::error::ApiError;

/// Fallback actor for writes without an `x-actor` header.
const DEFAULT_ACTOR: &str = "api";

fn actor_from(headers: &HeaderMap) -> String {
  headers
    .get("x-actor")
    .and_then(|v| v.to_str().ok())
    .map(str::to_owned)
    .unwrap_or_else(|| DEFAULT_ACTOR.to_owned())
}

// ─── List params ─────────────────────────────────────────────────────────────

/// Query parameters for list/stats endpoints. List-valued filters are
/// accepted as comma-separated strings, e.g. `?priorities=high,critical`.
#[derive(Debug, Deserialize, Default)]
pub struct ListParams {
  pub ids:              Option<String>,
  pub types:            Option<String>,
  pub statuses:         Option<String>,
  pub priorities:       Option<String>,
  pub assigned_to:      Option<String>,
  pub location:         Option<String>,
  pub building:         Option<String>,
  pub zone:             Option<String>,
  pub search:           Option<String>,
  pub created_after:    Option<DateTime<Utc>>,
  pub created_before:   Option<DateTime<Utc>>,
  #[serde(default)]
  pub include_archived: bool,
  pub min_confidence:   Option<u8>,
  pub sort:             Option<SortKey>,
  pub order:            Option<SortOrder>,
  pub limit:            Option<usize>,
  pub offset:           Option<usize>,
}

/// Parse one CSV token list into typed values via their serde string forms.
fn parse_csv<T: serde::de::DeserializeOwned>(
  field: &str,
  csv: &str,
) -> Result<Vec<T>, ApiError> {
  csv
    .split(',')
    .map(str::trim)
    .filter(|tok| !tok.is_empty())
    .map(|tok| {
      serde_json::from_value(Value::String(tok.to_owned()))
        .map_err(|_| ApiError::BadRequest(format!("{field}: unknown value {tok:?}")))
    })
    .collect()
}

/// Split a CSV of opaque ids; ids are never rejected, only unmatched.
fn parse_ids(csv: &str) -> Vec<ActivityId> {
  csv
    .split(',')
    .map(str::trim)
    .filter(|tok| !tok.is_empty())
    .map(ActivityId::new)
    .collect()
}

impl ListParams {
  fn into_query(self) -> Result<ActivityQuery, ApiError> {
    Ok(ActivityQuery {
      ids:              self
        .ids
        .as_deref()
        .map(parse_ids)
        .unwrap_or_default(),
      types:            self
        .types
        .as_deref()
        .map(|csv| parse_csv("types", csv))
        .transpose()?
        .unwrap_or_default(),
      statuses:         self
        .statuses
        .as_deref()
        .map(|csv| parse_csv("statuses", csv))
        .transpose()?
        .unwrap_or_default(),
      priorities:       self
        .priorities
        .as_deref()
        .map(|csv| parse_csv("priorities", csv))
        .transpose()?
        .unwrap_or_default(),
      assigned_to:      self.assigned_to,
      location:         self.location,
      building:         self.building,
      zone:             self.zone,
      search:           self.search,
      created_after:    self.created_after,
      created_before:   self.created_before,
      include_archived: self.include_archived,
      min_confidence:   self.min_confidence,
      sort:             self.sort.unwrap_or_default(),
      order:            self.order.unwrap_or_default(),
      limit:            self.limit,
      offset:           self.offset,
    })
  }
}

// ─── Create ──────────────────────────────────────────────────────────────────

/// `POST /activities`
pub async fn create<S>(
  State(dispatcher): State<Dispatcher<S>>,
  headers: HeaderMap,
  Json(body): Json<NewActivity>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ActivityStore + 'static,
  S::Error: Into<vigil_core::Error>,
{
  let envelope =
    CommandEnvelope::new(actor_from(&headers), Command::CreateActivity(body));
  match dispatcher.dispatch_command(envelope).await? {
    CommandOutcome::Created(stored) => {
      Ok((StatusCode::CREATED, Json(stored)))
    }
    other => unreachable!("create dispatched to {other:?}"),
  }
}

// ─── List ────────────────────────────────────────────────────────────────────

/// `GET /activities`
pub async fn list<S>(
  State(dispatcher): State<Dispatcher<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Page<Activity>>, ApiError>
where
  S: ActivityStore + 'static,
  S::Error: Into<vigil_core::Error>,
{
  let query = params.into_query()?;
  let envelope = QueryEnvelope::new(CqrsQuery::ListActivities(query));
  match dispatcher.dispatch_query(envelope).await? {
    QueryOutcome::Activities(page) => Ok(Json(page)),
    other => unreachable!("list dispatched to {other:?}"),
  }
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /activities/:id`
pub async fn get_one<S>(
  State(dispatcher): State<Dispatcher<S>>,
  Path(id): Path<String>,
) -> Result<Json<Activity>, ApiError>
where
  S: ActivityStore + 'static,
  S::Error: Into<vigil_core::Error>,
{
  let envelope = QueryEnvelope::new(CqrsQuery::GetActivity {
    id: ActivityId::new(&*id),
  });
  match dispatcher.dispatch_query(envelope).await? {
    QueryOutcome::Activity(Some(activity)) => Ok(Json(activity)),
    QueryOutcome::Activity(None) => {
      Err(ApiError::NotFound(format!("activity {id} not found")))
    }
    other => unreachable!("get dispatched to {other:?}"),
  }
}

// ─── Update ──────────────────────────────────────────────────────────────────

/// `PATCH /activities/:id`
pub async fn update_one<S>(
  State(dispatcher): State<Dispatcher<S>>,
  Path(id): Path<String>,
  headers: HeaderMap,
  Json(patch): Json<ActivityPatch>,
) -> Result<Json<StoredActivity>, ApiError>
where
  S: ActivityStore + 'static,
  S::Error: Into<vigil_core::Error>,
{
  let envelope = CommandEnvelope::new(
    actor_from(&headers),
    Command::UpdateActivity { id: ActivityId::new(&*id), patch },
  );
  match dispatcher.dispatch_command(envelope).await? {
    CommandOutcome::Updated(stored) => Ok(Json(stored)),
    other => unreachable!("update dispatched to {other:?}"),
  }
}

// ─── Archive ─────────────────────────────────────────────────────────────────

/// `POST /activities/:id/archive`
pub async fn archive_one<S>(
  State(dispatcher): State<Dispatcher<S>>,
  Path(id): Path<String>,
  headers: HeaderMap,
) -> Result<Json<StoredActivity>, ApiError>
where
  S: ActivityStore + 'static,
  S::Error: Into<vigil_core::Error>,
{
  let envelope = CommandEnvelope::new(
    actor_from(&headers),
    Command::ArchiveActivity { id: ActivityId::new(&*id) },
  );
  match dispatcher.dispatch_command(envelope).await? {
    CommandOutcome::Archived(stored) => Ok(Json(stored)),
    other => unreachable!("archive dispatched to {other:?}"),
  }
}

// ─── Delete ──────────────────────────────────────────────────────────────────

/// `DELETE /activities/:id` — hard delete.
pub async fn delete_one<S>(
  State(dispatcher): State<Dispatcher<S>>,
  Path(id): Path<String>,
  headers: HeaderMap,
) -> Result<StatusCode, ApiError>
where
  S: ActivityStore + 'static,
  S::Error: Into<vigil_core::Error>,
{
  let envelope = CommandEnvelope::new(
    actor_from(&headers),
    Command::DeleteActivity { id: ActivityId::new(&*id) },
  );
  dispatcher.dispatch_command(envelope).await?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Stats ───────────────────────────────────────────────────────────────────

/// `GET /activities/stats`
pub async fn stats<S>(
  State(dispatcher): State<Dispatcher<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<ActivityStats>, ApiError>
where
  S: ActivityStore + 'static,
  S::Error: Into<vigil_core::Error>,
{
  let query = params.into_query()?;
  let envelope = QueryEnvelope::new(CqrsQuery::GetStats(Some(query)));
  match dispatcher.dispatch_query(envelope).await? {
    QueryOutcome::Stats(stats) => Ok(Json(stats)),
    other => unreachable!("stats dispatched to {other:?}"),
  }
}

// ─── Overdue ─────────────────────────────────────────────────────────────────

/// `GET /activities/overdue`
pub async fn overdue<S>(
  State(dispatcher): State<Dispatcher<S>>,
) -> Result<Json<Vec<OverdueActivity>>, ApiError>
where
  S: ActivityStore + 'static,
  S::Error: Into<vigil_core::Error>,
{
  let envelope = QueryEnvelope::new(CqrsQuery::FindOverdue);
  match dispatcher.dispatch_query(envelope).await? {
    QueryOutcome::Overdue(overdue) => Ok(Json(overdue)),
    other => unreachable!("overdue dispatched to {other:?}"),
  }
}
