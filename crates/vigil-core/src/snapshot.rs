//! Snapshot wrapper — what the store actually keeps in its primary table.
//!
//! An activity is persisted as an immutable snapshot plus bookkeeping: a
//! monotonically increasing version counter and a SHA-256 checksum of the
//! serialised snapshot. The checksum is verified whenever a snapshot is
//! rehydrated on a cache miss; a mismatch means in-process memory corruption
//! or a write that bypassed the store, and surfaces as a typed error rather
//! than a silently wrong read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
  Error, Result,
  activity::Activity,
};

/// An [`Activity`] snapshot with store-side bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredActivity {
  pub activity: Activity,
  /// Bumped by one on every successful update. Starts at 1.
  pub version:  u64,
  /// SHA-256 hex digest of the serialised activity.
  pub checksum: String,
}

impl StoredActivity {
  /// Wrap a freshly created activity at version 1.
  pub fn first(activity: Activity) -> Result<Self> {
    let checksum = checksum_of(&activity)?;
    Ok(Self { activity, version: 1, checksum })
  }

  /// Replace the snapshot with a newer one, bumping the version.
  pub fn replaced_with(&self, activity: Activity) -> Result<Self> {
    let checksum = checksum_of(&activity)?;
    Ok(Self { activity, version: self.version + 1, checksum })
  }

  /// Rehydrate the activity, verifying the stored checksum.
  pub fn verified_activity(&self) -> Result<Activity> {
    let actual = checksum_of(&self.activity)?;
    if actual != self.checksum {
      return Err(Error::ChecksumMismatch {
        id:       self.activity.id.clone(),
        expected: self.checksum.clone(),
        actual,
      });
    }
    Ok(self.activity.clone())
  }

  pub fn created_at(&self) -> DateTime<Utc> {
    self.activity.created_at
  }

  pub fn updated_at(&self) -> DateTime<Utc> {
    self.activity.updated_at
  }
}

/// SHA-256 hex digest of the JSON-serialised activity. Field order is fixed
/// by the struct definition, so the serialisation is deterministic.
pub fn checksum_of(activity: &Activity) -> Result<String> {
  let bytes = serde_json::to_vec(activity)?;
  let digest = Sha256::digest(&bytes);
  Ok(format!("{digest:x}"))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;
  use crate::activity::{
    ActivityType, NewActivity, Priority,
  };

  fn sample() -> Activity {
    let mut input = NewActivity::new(
      ActivityType::Medical,
      Priority::Critical,
      "Collapse reported",
      "Building B / Floor 2",
    );
    input.description = Some("Caller reports a person down near the lifts".into());
    input.confidence = Some(87);
    Activity::from_new(input, "dispatch", Utc::now())
  }

  #[test]
  fn snapshot_round_trip_is_lossless() {
    let activity = sample();
    let stored = StoredActivity::first(activity.clone()).unwrap();

    let json = serde_json::to_string(&stored).unwrap();
    let back: StoredActivity = serde_json::from_str(&json).unwrap();

    assert_eq!(back, stored);
    assert_eq!(back.verified_activity().unwrap(), activity);
  }

  #[test]
  fn version_bumps_on_replacement() {
    let stored = StoredActivity::first(sample()).unwrap();
    let mut next = stored.activity.clone();
    next.title = "Collapse reported — medics en route".into();
    next.updated_at = next.created_at + chrono::Duration::minutes(1);

    let replaced = stored.replaced_with(next).unwrap();
    assert_eq!(replaced.version, 2);
    assert_ne!(replaced.checksum, stored.checksum);
  }

  #[test]
  fn tampered_snapshot_fails_verification() {
    let mut stored = StoredActivity::first(sample()).unwrap();
    stored.activity.confidence = 1;

    let err = stored.verified_activity().unwrap_err();
    assert!(matches!(err, Error::ChecksumMismatch { .. }));
    assert_eq!(err.kind(), crate::ErrorKind::InternalError);
  }
}
