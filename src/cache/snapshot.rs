//! Persistent snapshot of the whole working dataset.
//!
//! One coarse snapshot rather than per-entity entries: the UI loads
//! everything and then renders, so the snapshot is either entirely valid
//! or not used at all.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::traits::KeyValueStore;
use crate::error::StorageError;
use crate::model::{Activity, Character, CharacterId, Job, Planet};

/// Storage slot holding the serialized snapshot
pub const SNAPSHOT_KEY: &str = "snapshot";
/// Storage slot holding the snapshot timestamp
pub const STORED_AT_KEY: &str = "snapshot_stored_at";

/// Data handed to [`PersistentCache::save`]. Missing collections default to empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotPayload {
  #[serde(default)]
  pub characters: Vec<Character>,
  #[serde(default)]
  pub activities: BTreeMap<CharacterId, Activity>,
  #[serde(default)]
  pub jobs: BTreeMap<CharacterId, Vec<Job>>,
  #[serde(default)]
  pub planets: BTreeMap<CharacterId, Planet>,
}

/// A stored snapshot as read back from storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
  #[serde(default)]
  pub characters: Vec<Character>,
  #[serde(default)]
  pub activities: BTreeMap<CharacterId, Activity>,
  #[serde(default)]
  pub jobs: BTreeMap<CharacterId, Vec<Job>>,
  #[serde(default)]
  pub planets: BTreeMap<CharacterId, Planet>,
  pub stored_at: DateTime<Utc>,
}

impl Snapshot {
  fn stamp(payload: &SnapshotPayload, stored_at: DateTime<Utc>) -> Self {
    Self {
      characters: payload.characters.clone(),
      activities: payload.activities.clone(),
      jobs: payload.jobs.clone(),
      planets: payload.planets.clone(),
      stored_at,
    }
  }

  /// Strip the timestamp, leaving the data as it was saved.
  pub fn into_payload(self) -> SnapshotPayload {
    SnapshotPayload {
      characters: self.characters,
      activities: self.activities,
      jobs: self.jobs,
      planets: self.planets,
    }
  }

  /// Total number of jobs across all characters.
  pub fn job_count(&self) -> usize {
    self.jobs.values().map(Vec::len).sum()
  }
}

/// Summary of the current snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SnapshotInfo {
  pub character_count: usize,
  pub job_count: usize,
  pub age_seconds: i64,
  pub is_expired: bool,
}

/// Durable single-snapshot cache with expiry.
pub struct PersistentCache<S: KeyValueStore> {
  storage: Arc<S>,
  duration: Duration,
}

impl<S: KeyValueStore> PersistentCache<S> {
  pub fn new(storage: S) -> Self {
    Self::from_shared(Arc::new(storage))
  }

  /// Build on storage that is also used elsewhere.
  pub fn from_shared(storage: Arc<S>) -> Self {
    Self {
      storage,
      duration: Duration::minutes(5),
    }
  }

  /// Set how long a snapshot stays valid.
  pub fn with_duration(mut self, duration: Duration) -> Self {
    self.duration = duration;
    self
  }

  pub fn duration(&self) -> Duration {
    self.duration
  }

  /// Store a new snapshot, replacing any previous one.
  ///
  /// Storage failures are logged and swallowed; use [`try_save`](Self::try_save)
  /// to observe them.
  pub fn save(&self, payload: &SnapshotPayload) {
    match self.try_save(payload) {
      Ok(()) => info!(
        characters = payload.characters.len(),
        "Snapshot saved to persistent cache"
      ),
      Err(e) => warn!(error = %e, "Failed to save snapshot"),
    }
  }

  pub fn try_save(&self, payload: &SnapshotPayload) -> Result<(), StorageError> {
    let stored_at = Utc::now();
    let json = serde_json::to_string(&Snapshot::stamp(payload, stored_at))
      .map_err(|e| StorageError::Serialize(e.to_string()))?;

    self.storage.set(SNAPSHOT_KEY, &json)?;
    if let Err(e) = self.storage.set(STORED_AT_KEY, &stored_at.to_rfc3339()) {
      // The new payload must not be paired with the previous timestamp
      if let Err(clear_err) = self.try_clear() {
        warn!(error = %clear_err, "Failed to remove half-written snapshot");
      }
      return Err(e);
    }
    Ok(())
  }

  /// Return the snapshot if present and not expired.
  ///
  /// Expired or corrupt snapshots are removed as a side effect. Storage
  /// failures degrade to `None`.
  pub fn load(&self) -> Option<Snapshot> {
    match self.try_load() {
      Ok(snapshot) => snapshot,
      Err(e) => {
        warn!(error = %e, "Failed to load snapshot, clearing");
        self.clear();
        None
      }
    }
  }

  /// Like [`load`](Self::load) but surfaces failures of the medium itself.
  ///
  /// Corrupt contents are still reported as `Ok(None)` after clearing.
  pub fn try_load(&self) -> Result<Option<Snapshot>, StorageError> {
    let (payload, stored_at) = match self.read_slots()? {
      (None, None) => return Ok(None),
      (Some(payload), Some(stored_at)) => (payload, stored_at),
      _ => {
        warn!("Snapshot is missing its payload or timestamp, clearing");
        self.try_clear()?;
        return Ok(None);
      }
    };

    let stored_at = match parse_timestamp(&stored_at) {
      Ok(ts) => ts,
      Err(e) => {
        warn!(error = %e, "Discarding corrupt snapshot");
        self.try_clear()?;
        return Ok(None);
      }
    };

    let age = Utc::now() - stored_at;
    if age > self.duration {
      debug!(age_secs = age.num_seconds(), "Snapshot expired, clearing");
      self.try_clear()?;
      return Ok(None);
    }

    match serde_json::from_str::<Snapshot>(&payload) {
      Ok(snapshot) => {
        debug!(age_secs = age.num_seconds(), "Snapshot loaded from persistent cache");
        Ok(Some(snapshot))
      }
      Err(e) => {
        warn!(error = %e, "Discarding unparsable snapshot");
        self.try_clear()?;
        Ok(None)
      }
    }
  }

  /// Remove the snapshot. Idempotent and infallible from the caller's view.
  pub fn clear(&self) {
    if let Err(e) = self.try_clear() {
      warn!(error = %e, "Failed to clear snapshot");
    }
  }

  pub fn try_clear(&self) -> Result<(), StorageError> {
    self.storage.remove(SNAPSHOT_KEY)?;
    self.storage.remove(STORED_AT_KEY)?;
    Ok(())
  }

  /// Whether a non-expired snapshot exists. Never modifies storage.
  pub fn is_valid(&self) -> bool {
    match self.read_slots() {
      Ok((Some(_), Some(stored_at))) => parse_timestamp(&stored_at)
        .map(|ts| Utc::now() - ts <= self.duration)
        .unwrap_or(false),
      Ok(_) => false,
      Err(e) => {
        warn!(error = %e, "Failed to check snapshot validity");
        false
      }
    }
  }

  /// Summarize the current snapshot, expired or not. Never modifies storage.
  pub fn describe(&self) -> Option<SnapshotInfo> {
    let (payload, stored_at) = match self.read_slots() {
      Ok((Some(payload), Some(stored_at))) => (payload, stored_at),
      Ok(_) => return None,
      Err(e) => {
        warn!(error = %e, "Failed to read snapshot info");
        return None;
      }
    };

    let stored_at = parse_timestamp(&stored_at).ok()?;
    let snapshot: Snapshot = serde_json::from_str(&payload).ok()?;
    let age = Utc::now() - stored_at;

    Some(SnapshotInfo {
      character_count: snapshot.characters.len(),
      job_count: snapshot.job_count(),
      age_seconds: (age.num_milliseconds() as f64 / 1000.0).round() as i64,
      is_expired: age > self.duration,
    })
  }

  fn read_slots(&self) -> Result<(Option<String>, Option<String>), StorageError> {
    Ok((
      self.storage.get(SNAPSHOT_KEY)?,
      self.storage.get(STORED_AT_KEY)?,
    ))
  }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StorageError> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| StorageError::Corrupt {
      key: STORED_AT_KEY.to_string(),
      reason: e.to_string(),
    })
}
