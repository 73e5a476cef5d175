//! Secondary indexes over the primary activity table.
//!
//! Invariant: after every mutation, each index contains exactly the set of
//! ids whose current attribute value matches that key. The store enforces
//! this by removing a record from all indexes under its *old* attribute
//! values before re-inserting it under the new ones — never by editing in
//! place.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};

use vigil_core::activity::{
  Activity, ActivityId, ActivityStatus, Priority,
};

type IdSet = HashSet<ActivityId>;

/// All secondary indexes, plus the created-at timeline used for time-bounded
/// scans (overdue detection).
#[derive(Debug, Default)]
pub(crate) struct Indexes {
  by_type:     HashMap<String, IdSet>,
  by_status:   HashMap<ActivityStatus, IdSet>,
  by_priority: HashMap<Priority, IdSet>,
  by_assignee: HashMap<String, IdSet>,
  by_location: HashMap<String, IdSet>,
  by_building: HashMap<String, IdSet>,
  /// Linked incident id → activities folded into it.
  by_incident: HashMap<ActivityId, IdSet>,
  /// Ordered by `(created_at, id)` ascending.
  timeline:    BTreeMap<(DateTime<Utc>, ActivityId), ()>,
}

impl Indexes {
  /// Add `activity` under all of its current attribute values.
  pub fn insert(&mut self, activity: &Activity) {
    let id = activity.id.clone();

    self
      .by_type
      .entry(activity.activity_type.discriminant().to_owned())
      .or_default()
      .insert(id.clone());
    self
      .by_status
      .entry(activity.status)
      .or_default()
      .insert(id.clone());
    self
      .by_priority
      .entry(activity.priority)
      .or_default()
      .insert(id.clone());
    if let Some(assignee) = &activity.assigned_to {
      self
        .by_assignee
        .entry(assignee.clone())
        .or_default()
        .insert(id.clone());
    }
    self
      .by_location
      .entry(activity.location.clone())
      .or_default()
      .insert(id.clone());
    if let Some(building) = &activity.building {
      self
        .by_building
        .entry(building.clone())
        .or_default()
        .insert(id.clone());
    }
    for incident in &activity.incident_contexts {
      self
        .by_incident
        .entry(incident.clone())
        .or_default()
        .insert(id.clone());
    }
    self.timeline.insert((activity.created_at, id), ());
  }

  /// Remove `activity` from all indexes under its current attribute values.
  /// Must be called with the snapshot as stored, before any field changes.
  pub fn remove(&mut self, activity: &Activity) {
    let id = &activity.id;

    prune(
      &mut self.by_type,
      activity.activity_type.discriminant().to_owned(),
      id,
    );
    prune(&mut self.by_status, activity.status, id);
    prune(&mut self.by_priority, activity.priority, id);
    if let Some(assignee) = &activity.assigned_to {
      prune(&mut self.by_assignee, assignee.clone(), id);
    }
    prune(&mut self.by_location, activity.location.clone(), id);
    if let Some(building) = &activity.building {
      prune(&mut self.by_building, building.clone(), id);
    }
    for incident in &activity.incident_contexts {
      prune(&mut self.by_incident, incident.clone(), id);
    }
    self.timeline.remove(&(activity.created_at, id.clone()));
  }

  /// Ids created at or before `cutoff`, oldest first.
  pub fn created_at_or_before(
    &self,
    cutoff: DateTime<Utc>,
  ) -> impl Iterator<Item = &ActivityId> {
    self
      .timeline
      .keys()
      .take_while(move |(created_at, _)| *created_at <= cutoff)
      .map(|(_, id)| id)
  }

  #[cfg(test)]
  pub fn ids_with_status(&self, status: ActivityStatus) -> IdSet {
    self.by_status.get(&status).cloned().unwrap_or_default()
  }

  #[cfg(test)]
  pub fn ids_with_assignee(&self, assignee: &str) -> IdSet {
    self.by_assignee.get(assignee).cloned().unwrap_or_default()
  }

  #[cfg(test)]
  pub fn ids_with_type(&self, discriminant: &str) -> IdSet {
    self.by_type.get(discriminant).cloned().unwrap_or_default()
  }

  #[cfg(test)]
  pub fn ids_with_priority(&self, priority: Priority) -> IdSet {
    self.by_priority.get(&priority).cloned().unwrap_or_default()
  }

  #[cfg(test)]
  pub fn ids_at_location(&self, location: &str) -> IdSet {
    self.by_location.get(location).cloned().unwrap_or_default()
  }

  #[cfg(test)]
  pub fn ids_linked_to(&self, incident: &ActivityId) -> IdSet {
    self.by_incident.get(incident).cloned().unwrap_or_default()
  }

  #[cfg(test)]
  pub fn timeline_len(&self) -> usize {
    self.timeline.len()
  }
}

/// Drop `id` from the set under `key`, removing the set if it empties so
/// stale keys never accumulate.
fn prune<K: std::hash::Hash + Eq>(
  index: &mut HashMap<K, IdSet>,
  key: K,
  id: &ActivityId,
) {
  if let Some(set) = index.get_mut(&key) {
    set.remove(id);
    if set.is_empty() {
      index.remove(&key);
    }
  }
}
