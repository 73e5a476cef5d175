//! Query, pagination, and aggregate-statistics types.
//!
//! The filter pipeline runs entirely in memory, so the matching and ordering
//! rules live here where every backend and test can share them.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::activity::{
  Activity, ActivityId, ActivityStatus, ActivityType, Priority,
};

// ─── Query ───────────────────────────────────────────────────────────────────

/// Sort key for [`ActivityQuery`]. `CreatedAt` descending is the default —
/// newest first, the order the original feed rendered.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
  #[default]
  CreatedAt,
  UpdatedAt,
  Priority,
  Title,
}

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
  Asc,
  #[default]
  Desc,
}

/// Parameters for `find_many` / `get_stats`.
///
/// All provided filters are ANDed. Archived records are excluded unless
/// `include_archived` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityQuery {
  #[serde(default)]
  pub ids:              Vec<ActivityId>,
  #[serde(default)]
  pub types:            Vec<ActivityType>,
  #[serde(default)]
  pub statuses:         Vec<ActivityStatus>,
  #[serde(default)]
  pub priorities:       Vec<Priority>,
  pub assigned_to:      Option<String>,
  /// Exact match on the location string, distinct from `search`.
  pub location:         Option<String>,
  pub building:         Option<String>,
  pub zone:             Option<String>,
  /// Case-insensitive substring match over title, description, and location.
  pub search:           Option<String>,
  pub created_after:    Option<DateTime<Utc>>,
  pub created_before:   Option<DateTime<Utc>>,
  #[serde(default)]
  pub include_archived: bool,
  /// Keep only records with at least this confidence.
  pub min_confidence:   Option<u8>,
  #[serde(default)]
  pub sort:             SortKey,
  #[serde(default)]
  pub order:            SortOrder,
  pub limit:            Option<usize>,
  pub offset:           Option<usize>,
}

impl ActivityQuery {
  /// Whether `activity` passes every provided filter.
  pub fn matches(&self, activity: &Activity) -> bool {
    if !self.include_archived && activity.archived {
      return false;
    }
    if !self.ids.is_empty() && !self.ids.contains(&activity.id) {
      return false;
    }
    if !self.types.is_empty() && !self.types.contains(&activity.activity_type)
    {
      return false;
    }
    if !self.statuses.is_empty() && !self.statuses.contains(&activity.status)
    {
      return false;
    }
    if !self.priorities.is_empty()
      && !self.priorities.contains(&activity.priority)
    {
      return false;
    }
    if let Some(assignee) = &self.assigned_to
      && activity.assigned_to.as_deref() != Some(assignee.as_str())
    {
      return false;
    }
    if let Some(location) = &self.location
      && activity.location != *location
    {
      return false;
    }
    if let Some(building) = &self.building
      && activity.building.as_deref() != Some(building.as_str())
    {
      return false;
    }
    if let Some(zone) = &self.zone
      && activity.zone.as_deref() != Some(zone.as_str())
    {
      return false;
    }
    if let Some(needle) = &self.search {
      let needle = needle.to_lowercase();
      let haystack_hit = activity.title.to_lowercase().contains(&needle)
        || activity.description.to_lowercase().contains(&needle)
        || activity.location.to_lowercase().contains(&needle);
      if !haystack_hit {
        return false;
      }
    }
    if let Some(after) = self.created_after
      && activity.created_at < after
    {
      return false;
    }
    if let Some(before) = self.created_before
      && activity.created_at > before
    {
      return false;
    }
    if let Some(min) = self.min_confidence
      && activity.confidence < min
    {
      return false;
    }
    true
  }

  /// Total ordering for result sets. Equal sort keys tie-break on ascending
  /// id, so pagination over an unchanged store is deterministic.
  pub fn compare(&self, a: &Activity, b: &Activity) -> Ordering {
    let keyed = match self.sort {
      SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
      SortKey::UpdatedAt => a.updated_at.cmp(&b.updated_at),
      SortKey::Priority => a.priority.cmp(&b.priority),
      SortKey::Title => a.title.cmp(&b.title),
    };
    let directed = match self.order {
      SortOrder::Asc => keyed,
      SortOrder::Desc => keyed.reverse(),
    };
    directed.then_with(|| a.id.cmp(&b.id))
  }
}

// ─── Pagination ──────────────────────────────────────────────────────────────

/// One page of results plus enough bookkeeping to continue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
  pub items:    Vec<T>,
  /// Size of the full (unpaginated) result set.
  pub total:    usize,
  pub has_more: bool,
}

impl<T> Page<T> {
  /// Slice `matched` (already filtered and sorted) by offset/limit.
  pub fn slice(matched: Vec<T>, offset: Option<usize>, limit: Option<usize>) -> Self {
    let total = matched.len();
    let offset = offset.unwrap_or(0);

    let mut iter = matched.into_iter().skip(offset);
    let items: Vec<T> = match limit {
      Some(limit) => iter.by_ref().take(limit).collect(),
      None => iter.collect(),
    };

    let has_more = offset + items.len() < total;
    Self { items, total, has_more }
  }
}

// ─── Statistics ──────────────────────────────────────────────────────────────

/// Aggregate counts and means over a (filtered, unpaginated) result set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityStats {
  pub total:                   usize,
  pub by_priority:             HashMap<String, usize>,
  pub by_status:               HashMap<String, usize>,
  pub by_type:                 HashMap<String, usize>,
  pub by_building:             HashMap<String, usize>,
  /// Mean `updated_at - created_at` over resolved records, in seconds.
  pub mean_resolution_seconds: Option<f64>,
  pub mean_confidence:         Option<f64>,
}

impl ActivityStats {
  /// Compute stats over `activities`.
  pub fn compute<'a, I>(activities: I) -> Self
  where
    I: IntoIterator<Item = &'a Activity>,
  {
    let mut stats = Self::default();
    let mut resolution_total = 0.0_f64;
    let mut resolved = 0_usize;
    let mut confidence_total = 0.0_f64;

    for activity in activities {
      stats.total += 1;

      *stats
        .by_priority
        .entry(format!("{:?}", activity.priority).to_lowercase())
        .or_default() += 1;
      *stats
        .by_status
        .entry(format!("{:?}", activity.status).to_lowercase())
        .or_default() += 1;
      *stats
        .by_type
        .entry(activity.activity_type.discriminant().to_owned())
        .or_default() += 1;
      if let Some(building) = &activity.building {
        *stats.by_building.entry(building.clone()).or_default() += 1;
      }

      if activity.status == ActivityStatus::Resolved {
        resolved += 1;
        resolution_total +=
          (activity.updated_at - activity.created_at).num_milliseconds() as f64
            / 1000.0;
      }
      confidence_total += f64::from(activity.confidence);
    }

    if resolved > 0 {
      stats.mean_resolution_seconds =
        Some(resolution_total / resolved as f64);
    }
    if stats.total > 0 {
      stats.mean_confidence = Some(confidence_total / stats.total as f64);
    }

    stats
  }
}

// ─── Overdue ─────────────────────────────────────────────────────────────────

/// An active activity that has outlived its priority's threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverdueActivity {
  pub activity:          Activity,
  pub age_seconds:       i64,
  pub threshold_seconds: i64,
}

// ─── Tests ───────────────────────────────────────────────────────────────────
