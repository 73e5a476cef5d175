//! Integration tests for `MemoryStore`: index consistency, cache behaviour,
//! query semantics, and the change feed.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;

use vigil_bus::EventBus;
use vigil_core::{
  Error,
  activity::{
    Activity, ActivityId, ActivityStatus, ActivityType, NewActivity, Priority,
  },
  event::{Aggregate, DomainEvent, EventKind},
  query::{ActivityQuery, SortKey, SortOrder},
  snapshot::checksum_of,
  store::{ActivityStore, ChangeFilter, ChangeKind},
};

use crate::{MemoryStore, StoreConfig};

fn harness() -> (Arc<EventBus>, MemoryStore) {
  let bus = Arc::new(EventBus::default());
  let store = MemoryStore::with_defaults(&bus);
  (bus, store)
}

fn activity(id: &str, priority: Priority) -> Activity {
  let mut input = NewActivity::new(
    ActivityType::Alert,
    priority,
    format!("Alert {id}"),
    "Perimeter / Gate 3",
  );
  input.id = Some(ActivityId::new(id));
  Activity::from_new(input, "system", Utc::now())
}

// ─── Create ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_read_back() {
  let (_bus, store) = harness();

  let stored = store.create(activity("a1", Priority::High)).await.unwrap();
  assert_eq!(stored.version, 1);

  let found = store
    .find_by_id(&ActivityId::new("a1"))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(found.title, "Alert a1");
}

#[tokio::test]
async fn duplicate_id_is_rejected_and_store_unchanged() {
  let (_bus, store) = harness();
  store.create(activity("a1", Priority::High)).await.unwrap();

  let mut dupe = activity("a1", Priority::Low);
  dupe.title = "Imposter".into();
  let err = store.create(dupe).await.unwrap_err();
  assert!(matches!(err, Error::DuplicateId(_)));
  assert_eq!(err.kind(), vigil_core::ErrorKind::ConstraintViolation);

  // The original record is untouched.
  assert_eq!(store.len(), 1);
  let found = store
    .find_by_id(&ActivityId::new("a1"))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(found.title, "Alert a1");
  assert_eq!(found.priority, Priority::High);
}

#[tokio::test]
async fn invalid_activity_is_rejected_with_itemized_errors() {
  let (_bus, store) = harness();
  let mut bad = activity("a1", Priority::Low);
  bad.title = String::new();

  let err = store.create(bad).await.unwrap_err();
  let Error::Validation(fields) = err else {
    panic!("expected validation error");
  };
  assert_eq!(fields[0].field, "title");
  assert!(store.is_empty());
}

// ─── Update ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn update_bumps_version_and_preserves_creation_metadata() {
  let (_bus, store) = harness();
  let stored = store.create(activity("a1", Priority::High)).await.unwrap();

  let mut next = stored.activity.clone();
  next.status = ActivityStatus::Assigned;
  next.assigned_to = Some("garcia.m".into());
  next.created_by = "someone-else".into(); // must be ignored
  next.updated_at = Utc::now();

  let updated = store.update(next).await.unwrap();
  assert_eq!(updated.version, 2);
  assert_eq!(updated.activity.created_by, "system");
  assert_eq!(updated.activity.created_at, stored.activity.created_at);
  assert_eq!(updated.activity.status, ActivityStatus::Assigned);
}

#[tokio::test]
async fn update_missing_activity_is_not_found() {
  let (_bus, store) = harness();
  let err = store.update(activity("ghost", Priority::Low)).await.unwrap_err();
  assert!(matches!(err, Error::NotFound(_)));
}

// ─── Index consistency ───────────────────────────────────────────────────────

#[tokio::test]
async fn indexes_follow_create_update_and_delete() {
  let (_bus, store) = harness();

  let a1 = ActivityId::new("a1");
  let a2 = ActivityId::new("a2");
  store.create(activity("a1", Priority::High)).await.unwrap();
  store.create(activity("a2", Priority::Critical)).await.unwrap();

  store.with_indexes(|idx| {
    assert_eq!(idx.ids_with_priority(Priority::High), [a1.clone()].into());
    assert_eq!(
      idx.ids_with_status(ActivityStatus::Detecting),
      [a1.clone(), a2.clone()].into()
    );
    assert_eq!(idx.timeline_len(), 2);
  });

  // Update a1: new status, new assignee, new type. Old entries must go.
  let mut next = store.find_by_id(&a1).await.unwrap().unwrap();
  next.status = ActivityStatus::Responding;
  next.activity_type = ActivityType::SecurityBreach;
  next.assigned_to = Some("chen.l".into());
  next.updated_at = Utc::now();
  store.update(next).await.unwrap();

  store.with_indexes(|idx| {
    assert_eq!(
      idx.ids_with_status(ActivityStatus::Detecting),
      [a2.clone()].into()
    );
    assert_eq!(
      idx.ids_with_status(ActivityStatus::Responding),
      [a1.clone()].into()
    );
    assert!(idx.ids_with_type("alert").contains(&a2));
    assert!(!idx.ids_with_type("alert").contains(&a1));
    assert_eq!(idx.ids_with_type("security-breach"), [a1.clone()].into());
    assert_eq!(idx.ids_with_assignee("chen.l"), [a1.clone()].into());
  });

  // Hard delete purges every index.
  store.hard_delete(&a1).await.unwrap();
  store.with_indexes(|idx| {
    assert!(idx.ids_with_status(ActivityStatus::Responding).is_empty());
    assert!(idx.ids_with_type("security-breach").is_empty());
    assert!(idx.ids_with_assignee("chen.l").is_empty());
    assert_eq!(idx.timeline_len(), 1);
  });
}

#[tokio::test]
async fn incident_links_are_indexed() {
  let (_bus, store) = harness();
  let incident = ActivityId::new("INC-7");

  let mut a = activity("a1", Priority::Medium);
  a.incident_contexts.insert(incident.clone());
  store.create(a).await.unwrap();

  store.with_indexes(|idx| {
    assert_eq!(
      idx.ids_linked_to(&incident),
      [ActivityId::new("a1")].into()
    );
  });

  // Unlinking on update removes the entry.
  let mut next = store
    .find_by_id(&ActivityId::new("a1"))
    .await
    .unwrap()
    .unwrap();
  next.incident_contexts.clear();
  next.updated_at = Utc::now();
  store.update(next).await.unwrap();

  store.with_indexes(|idx| {
    assert!(idx.ids_linked_to(&incident).is_empty());
  });
}

// ─── Archive / delete ────────────────────────────────────────────────────────

#[tokio::test]
async fn archive_is_soft_and_idempotent() {
  let (_bus, store) = harness();
  let a1 = ActivityId::new("a1");
  store.create(activity("a1", Priority::Low)).await.unwrap();

  let archived = store.archive(&a1).await.unwrap();
  assert!(archived.activity.archived);
  assert_eq!(archived.version, 2);

  // Second archive is a no-op, version unchanged.
  let again = store.archive(&a1).await.unwrap();
  assert_eq!(again.version, 2);

  // Hidden from default queries, visible with include_archived.
  let page = store.find_many(&ActivityQuery::default()).await.unwrap();
  assert!(page.items.is_empty());
  let page = store
    .find_many(&ActivityQuery { include_archived: true, ..Default::default() })
    .await
    .unwrap();
  assert_eq!(page.items.len(), 1);
}

#[tokio::test]
async fn hard_delete_then_reads_fail_cleanly() {
  let (_bus, store) = harness();
  let a1 = ActivityId::new("a1");
  store.create(activity("a1", Priority::Low)).await.unwrap();

  store.hard_delete(&a1).await.unwrap();
  assert!(store.find_by_id(&a1).await.unwrap().is_none());
  let err = store.hard_delete(&a1).await.unwrap_err();
  assert!(matches!(err, Error::NotFound(_)));
}

// ─── Cache ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn reads_within_ttl_are_served_from_cache() {
  let bus = Arc::new(EventBus::default());
  let store = MemoryStore::new(
    &bus,
    StoreConfig { cache_ttl: Duration::from_secs(30) },
  );
  let a1 = ActivityId::new("a1");
  store.create(activity("a1", Priority::High)).await.unwrap();
  store.find_by_id(&a1).await.unwrap();

  // Rewrite the table behind the store's back (checksum kept valid).
  store.tamper_stored(&a1, |stored| {
    stored.activity.title = "rewritten".into();
    stored.checksum = checksum_of(&stored.activity).unwrap();
  });

  // Still within TTL: the stale cached title is returned.
  let found = store.find_by_id(&a1).await.unwrap().unwrap();
  assert_eq!(found.title, "Alert a1");
}

#[tokio::test]
async fn expired_cache_entries_are_refetched() {
  let bus = Arc::new(EventBus::default());
  let store = MemoryStore::new(
    &bus,
    StoreConfig { cache_ttl: Duration::from_millis(40) },
  );
  let a1 = ActivityId::new("a1");
  store.create(activity("a1", Priority::High)).await.unwrap();
  store.find_by_id(&a1).await.unwrap();

  store.tamper_stored(&a1, |stored| {
    stored.activity.title = "rewritten".into();
    stored.checksum = checksum_of(&stored.activity).unwrap();
  });

  tokio::time::sleep(Duration::from_millis(80)).await;

  // TTL elapsed: the next read must come from the primary table.
  let found = store.find_by_id(&a1).await.unwrap().unwrap();
  assert_eq!(found.title, "rewritten");
}

#[tokio::test]
async fn checksum_is_verified_on_cache_miss() {
  let bus = Arc::new(EventBus::default());
  let store =
    MemoryStore::new(&bus, StoreConfig { cache_ttl: Duration::ZERO });
  let a1 = ActivityId::new("a1");
  store.create(activity("a1", Priority::High)).await.unwrap();

  // Corrupt the snapshot without fixing the checksum.
  store.tamper_stored(&a1, |stored| {
    stored.activity.confidence = 3;
  });

  let err = store.find_by_id(&a1).await.unwrap_err();
  assert!(matches!(err, Error::ChecksumMismatch { .. }));
}

#[test]
fn dropping_the_store_detaches_its_bus_subscription() {
  let bus = Arc::new(EventBus::default());
  let store = MemoryStore::with_defaults(&bus);
  assert_eq!(bus.subscription_stats().len(), 1);

  // Clones share one subscription; only the last drop detaches it.
  let clone = store.clone();
  drop(store);
  assert_eq!(bus.subscription_stats().len(), 1);

  drop(clone);
  assert!(bus.subscription_stats().is_empty());
}

#[tokio::test]
async fn bus_events_invalidate_the_cache() {
  let (bus, store) = harness();
  let a1 = ActivityId::new("a1");
  store.create(activity("a1", Priority::High)).await.unwrap();
  store.find_by_id(&a1).await.unwrap();
  assert!(store.cached(&a1).is_some());

  // An activity event from any source drops the entry…
  bus.publish(DomainEvent::new(
    EventKind::Updated,
    Aggregate::Activity,
    "a1",
    2,
    None,
    serde_json::Value::Null,
  ));
  assert!(store.cached(&a1).is_none());

  // …while events for other aggregates leave the cache alone.
  store.find_by_id(&a1).await.unwrap();
  bus.publish(DomainEvent::new(
    EventKind::Updated,
    Aggregate::Guard,
    "a1",
    1,
    None,
    serde_json::Value::Null,
  ));
  assert!(store.cached(&a1).is_some());
}

// ─── Queries ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn find_many_filters_sorts_and_paginates() {
  let (_bus, store) = harness();
  for (id, priority) in [
    ("a1", Priority::Low),
    ("a2", Priority::Critical),
    ("a3", Priority::High),
    ("a4", Priority::Medium),
    ("a5", Priority::Critical),
  ] {
    store.create(activity(id, priority)).await.unwrap();
  }

  // Highest priority first; critical ties broken by ascending id.
  let page = store
    .find_many(&ActivityQuery {
      sort: SortKey::Priority,
      order: SortOrder::Desc,
      limit: Some(3),
      ..Default::default()
    })
    .await
    .unwrap();
  let ids: Vec<&str> =
    page.items.iter().map(|a| a.id.as_str()).collect();
  assert_eq!(ids, ["a2", "a5", "a3"]);
  assert_eq!(page.total, 5);
  assert!(page.has_more);

  // Second page picks up where the first left off.
  let page = store
    .find_many(&ActivityQuery {
      sort: SortKey::Priority,
      order: SortOrder::Desc,
      limit: Some(3),
      offset: Some(3),
      ..Default::default()
    })
    .await
    .unwrap();
  let ids: Vec<&str> =
    page.items.iter().map(|a| a.id.as_str()).collect();
  assert_eq!(ids, ["a4", "a1"]);
  assert!(!page.has_more);

  // Priority filter narrows the set.
  let page = store
    .find_many(&ActivityQuery {
      priorities: vec![Priority::Critical],
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(page.total, 2);
}

#[tokio::test]
async fn location_filter_is_exact_and_indexed() {
  let (_bus, store) = harness();

  store.create(activity("a1", Priority::Low)).await.unwrap();
  let mut a2 = activity("a2", Priority::Low);
  a2.location = "Lobby".into();
  store.create(a2).await.unwrap();

  // Exact match only; "Gate 3" is a substring of a1's location, not equal.
  let page = store
    .find_many(&ActivityQuery {
      location: Some("Lobby".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(page.total, 1);
  assert_eq!(page.items[0].id.as_str(), "a2");

  let page = store
    .find_many(&ActivityQuery {
      location: Some("Gate 3".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(page.total, 0);

  store.with_indexes(|idx| {
    assert_eq!(
      idx.ids_at_location("Lobby"),
      [ActivityId::new("a2")].into()
    );
    assert_eq!(
      idx.ids_at_location("Perimeter / Gate 3"),
      [ActivityId::new("a1")].into()
    );
  });

  // A moved record leaves its old location key behind.
  let mut next = store
    .find_by_id(&ActivityId::new("a2"))
    .await
    .unwrap()
    .unwrap();
  next.location = "Perimeter / Gate 3".into();
  next.updated_at = Utc::now();
  store.update(next).await.unwrap();

  store.with_indexes(|idx| {
    assert!(idx.ids_at_location("Lobby").is_empty());
    assert_eq!(idx.ids_at_location("Perimeter / Gate 3").len(), 2);
  });
}

#[tokio::test]
async fn stats_aggregate_counts_and_means() {
  let (_bus, store) = harness();

  let now = Utc::now();
  let mut resolved = activity("a1", Priority::High);
  resolved.status = ActivityStatus::Resolved;
  resolved.created_at = now - chrono::Duration::minutes(10);
  resolved.updated_at = now;
  resolved.building = Some("Building A".into());
  resolved.confidence = 80;
  store.create(resolved).await.unwrap();

  let mut open = activity("a2", Priority::Critical);
  open.building = Some("Building A".into());
  open.confidence = 60;
  store.create(open).await.unwrap();

  let stats = store.get_stats(None).await.unwrap();
  assert_eq!(stats.total, 2);
  assert_eq!(stats.by_priority.get("critical"), Some(&1));
  assert_eq!(stats.by_status.get("resolved"), Some(&1));
  assert_eq!(stats.by_building.get("Building A"), Some(&2));
  assert_eq!(stats.mean_confidence, Some(70.0));

  let mean = stats.mean_resolution_seconds.unwrap();
  assert!((mean - 600.0).abs() < 1.0, "mean resolution was {mean}");
}

#[tokio::test]
async fn overdue_tracks_priority_thresholds_and_resolution() {
  let (_bus, store) = harness();
  let now = Utc::now();

  // Critical, 3h old: past its 2h threshold.
  let mut a1 = activity("a1", Priority::Critical);
  a1.created_at = now - chrono::Duration::hours(3);
  a1.updated_at = a1.created_at;
  store.create(a1).await.unwrap();

  // High, 3h old: within its 8h threshold.
  let mut a2 = activity("a2", Priority::High);
  a2.created_at = now - chrono::Duration::hours(3);
  a2.updated_at = a2.created_at;
  store.create(a2).await.unwrap();

  let overdue = store.find_overdue(now).await.unwrap();
  assert_eq!(overdue.len(), 1);
  assert_eq!(overdue[0].activity.id.as_str(), "a1");
  assert_eq!(overdue[0].threshold_seconds, 2 * 3600);

  // Resolving a1 clears it.
  let mut next = store
    .find_by_id(&ActivityId::new("a1"))
    .await
    .unwrap()
    .unwrap();
  next.status = ActivityStatus::Resolved;
  next.updated_at = now;
  store.update(next).await.unwrap();

  let overdue = store.find_overdue(now).await.unwrap();
  assert!(overdue.is_empty());
}

// ─── Change feed ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn watchers_receive_matching_changes_until_unsubscribed() {
  let (_bus, store) = harness();
  let seen: Arc<Mutex<Vec<(ChangeKind, String)>>> =
    Arc::new(Mutex::new(Vec::new()));

  let log = Arc::clone(&seen);
  let sub = store.subscribe_changes(
    Some(ChangeFilter {
      kinds: vec![ChangeKind::Created, ChangeKind::Archived],
      ..Default::default()
    }),
    Arc::new(move |change| {
      log
        .lock()
        .unwrap()
        .push((change.kind, change.activity.id.as_str().to_owned()));
    }),
  );

  store.create(activity("a1", Priority::Low)).await.unwrap();

  let mut next = store
    .find_by_id(&ActivityId::new("a1"))
    .await
    .unwrap()
    .unwrap();
  next.title = "edited".into();
  next.updated_at = Utc::now();
  store.update(next).await.unwrap(); // filtered out

  store.archive(&ActivityId::new("a1")).await.unwrap();

  store.unsubscribe_changes(sub);
  store.create(activity("a2", Priority::Low)).await.unwrap(); // after unsubscribe

  assert_eq!(
    *seen.lock().unwrap(),
    [
      (ChangeKind::Created, "a1".to_owned()),
      (ChangeKind::Archived, "a1".to_owned()),
    ]
  );
}
