//! JSON REST API for Vigil.
//!
//! Exposes an axum [`Router`] backed by any [`vigil_core::store::ActivityStore`],
//! with every request routed through a [`Dispatcher`]. Auth, TLS, and
//! transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", vigil_api::api_router(dispatcher.clone()))
//! ```

pub mod activities;
pub mod error;
pub mod events;

use axum::{
  Router,
  routing::{get, post},
};
use serde::Deserialize;

use vigil_bus::DEFAULT_HISTORY_CAPACITY;
use vigil_core::store::ActivityStore;
use vigil_cqrs::Dispatcher;

pub use error::ApiError;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` with
/// `VIGIL_*` environment overrides.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                   String,
  #[serde(default = "default_port")]
  pub port:                   u16,
  /// Point-read cache TTL, in seconds.
  #[serde(default = "default_cache_ttl_seconds")]
  pub cache_ttl_seconds:      u64,
  /// Bounded replay history kept by the event bus.
  #[serde(default = "default_event_history_capacity")]
  pub event_history_capacity: usize,
}

fn default_host() -> String {
  "127.0.0.1".to_owned()
}

fn default_port() -> u16 {
  8080
}

fn default_cache_ttl_seconds() -> u64 {
  30
}

fn default_event_history_capacity() -> usize {
  DEFAULT_HISTORY_CAPACITY
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                   default_host(),
      port:                   default_port(),
      cache_ttl_seconds:      default_cache_ttl_seconds(),
      event_history_capacity: default_event_history_capacity(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router over `dispatcher`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(dispatcher: Dispatcher<S>) -> Router<()>
where
  S: ActivityStore + 'static,
  S::Error: Into<vigil_core::Error>,
{
  Router::new()
    // Activities
    .route(
      "/activities",
      get(activities::list::<S>).post(activities::create::<S>),
    )
    .route("/activities/stats", get(activities::stats::<S>))
    .route("/activities/overdue", get(activities::overdue::<S>))
    .route(
      "/activities/{id}",
      get(activities::get_one::<S>)
        .patch(activities::update_one::<S>)
        .delete(activities::delete_one::<S>),
    )
    .route("/activities/{id}/archive", post(activities::archive_one::<S>))
    // Events
    .route("/events", get(events::list::<S>))
    .with_state(dispatcher)
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  use axum::{
    body::Body,
    http::{Request, StatusCode},
  };
  use serde_json::{Value, json};
  use tower::ServiceExt as _;
  use vigil_bus::EventBus;
  use vigil_store_memory::MemoryStore;

  fn app() -> Router {
    let bus = Arc::new(EventBus::default());
    let store = Arc::new(MemoryStore::with_defaults(&bus));
    api_router(Dispatcher::new(store, bus))
  }

  async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
  ) -> (StatusCode, Value) {
    let mut builder =
      Request::builder().method(method).uri(uri).header("x-actor", "garcia.m");
    let body = match body {
      Some(v) => {
        builder = builder.header("content-type", "application/json");
        Body::from(v.to_string())
      }
      None => Body::empty(),
    };
    let resp =
      app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();

    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
      .await
      .unwrap();
    let value = if bytes.is_empty() {
      Value::Null
    } else {
      serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
  }

  fn new_activity(title: &str, priority: &str) -> Value {
    json!({
      "activity_type": "security-breach",
      "priority":      priority,
      "title":         title,
      "location":      "Building C / Dock",
    })
  }

  // ── Create / read ────────────────────────────────────────────────────────

  #[tokio::test]
  async fn create_returns_201_with_stored_record() {
    let app = app();

    let (status, body) =
      send(&app, "POST", "/activities", Some(new_activity("Forced door", "high")))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["version"], 1);
    assert_eq!(body["activity"]["title"], "Forced door");
    assert_eq!(body["activity"]["created_by"], "garcia.m");

    let id = body["activity"]["id"].as_str().unwrap().to_owned();
    let (status, fetched) =
      send(&app, "GET", &format!("/activities/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["title"], "Forced door");
  }

  #[tokio::test]
  async fn missing_activity_is_404() {
    let app = app();
    let (status, body) = send(&app, "GET", "/activities/ghost", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("ghost"));
  }

  #[tokio::test]
  async fn validation_errors_are_itemized() {
    let app = app();
    let (status, body) =
      send(&app, "POST", "/activities", Some(new_activity("   ", "high")))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["validation_errors"][0]["field"], "title");
  }

  // ── List / filter ────────────────────────────────────────────────────────

  #[tokio::test]
  async fn list_filters_by_csv_priorities() {
    let app = app();
    for (title, priority) in
      [("one", "low"), ("two", "high"), ("three", "critical")]
    {
      send(&app, "POST", "/activities", Some(new_activity(title, priority)))
        .await;
    }

    let (status, body) =
      send(&app, "GET", "/activities?priorities=high,critical", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);

    let (status, body) =
      send(&app, "GET", "/activities?priorities=urgent", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("urgent"));
  }

  #[tokio::test]
  async fn list_filters_by_ids_and_exact_location() {
    let app = app();
    for (id, location) in
      [("a1", "gate-1"), ("a2", "gate-2"), ("a3", "gate-2")]
    {
      let body = json!({
        "id":            id,
        "activity_type": "alert",
        "priority":      "medium",
        "title":         format!("Alert {id}"),
        "location":      location,
      });
      send(&app, "POST", "/activities", Some(body)).await;
    }

    let (status, body) =
      send(&app, "GET", "/activities?ids=a1,a3", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);

    let (status, body) =
      send(&app, "GET", "/activities?location=gate-2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);

    // Exact match, not a prefix.
    let (_, body) = send(&app, "GET", "/activities?location=gate", None).await;
    assert_eq!(body["total"], 0);
  }

  #[tokio::test]
  async fn pagination_reports_has_more() {
    let app = app();
    for title in ["one", "two", "three"] {
      send(&app, "POST", "/activities", Some(new_activity(title, "high")))
        .await;
    }

    let (status, body) =
      send(&app, "GET", "/activities?limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 2);
    assert_eq!(body["total"], 3);
    assert_eq!(body["has_more"], true);
  }

  // ── Archive / delete ─────────────────────────────────────────────────────

  #[tokio::test]
  async fn archive_hides_from_default_listing() {
    let app = app();
    let (_, created) =
      send(&app, "POST", "/activities", Some(new_activity("Spill", "low")))
        .await;
    let id = created["activity"]["id"].as_str().unwrap().to_owned();

    let (status, archived) =
      send(&app, "POST", &format!("/activities/{id}/archive"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(archived["activity"]["archived"], true);

    let (_, page) = send(&app, "GET", "/activities", None).await;
    assert_eq!(page["total"], 0);
    let (_, page) =
      send(&app, "GET", "/activities?include_archived=true", None).await;
    assert_eq!(page["total"], 1);
  }

  #[tokio::test]
  async fn delete_returns_204_and_record_is_gone() {
    let app = app();
    let (_, created) =
      send(&app, "POST", "/activities", Some(new_activity("Spill", "low")))
        .await;
    let id = created["activity"]["id"].as_str().unwrap().to_owned();

    let (status, body) =
      send(&app, "DELETE", &format!("/activities/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, _) =
      send(&app, "GET", &format!("/activities/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn patch_bumps_version() {
    let app = app();
    let (_, created) =
      send(&app, "POST", "/activities", Some(new_activity("Spill", "low")))
        .await;
    let id = created["activity"]["id"].as_str().unwrap().to_owned();

    let (status, updated) = send(
      &app,
      "PATCH",
      &format!("/activities/{id}"),
      Some(json!({ "status": "responding", "assigned_to": "chen.l" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["version"], 2);
    assert_eq!(updated["activity"]["status"], "responding");
    assert_eq!(updated["activity"]["assigned_to"], "chen.l");
  }

  // ── Aggregates ───────────────────────────────────────────────────────────

  #[tokio::test]
  async fn stats_and_overdue_endpoints_respond() {
    let app = app();
    for (title, priority) in [("one", "high"), ("two", "critical")] {
      send(&app, "POST", "/activities", Some(new_activity(title, priority)))
        .await;
    }

    let (status, stats) = send(&app, "GET", "/activities/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total"], 2);
    assert_eq!(stats["by_priority"]["critical"], 1);

    // Fresh records are inside every threshold.
    let (status, overdue) =
      send(&app, "GET", "/activities/overdue", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(overdue.as_array().unwrap().len(), 0);
  }

  // ── Events ───────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn events_replay_is_filterable() {
    let app = app();
    let (_, created) =
      send(&app, "POST", "/activities", Some(new_activity("Spill", "low")))
        .await;
    let id = created["activity"]["id"].as_str().unwrap().to_owned();
    send(
      &app,
      "PATCH",
      &format!("/activities/{id}"),
      Some(json!({ "status": "assigned" })),
    )
    .await;

    let (status, events) = send(&app, "GET", "/events", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(events.as_array().unwrap().len(), 2);
    assert_eq!(events[0]["kind"], "created");
    assert_eq!(events[0]["actor"], "garcia.m");

    let (_, updates) = send(&app, "GET", "/events?kind=updated", None).await;
    assert_eq!(updates.as_array().unwrap().len(), 1);
    assert_eq!(updates[0]["aggregate_id"], id);
  }
}
