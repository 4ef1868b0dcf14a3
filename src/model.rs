//! Entities held in the persisted working-dataset snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type CharacterId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
  pub character_id: CharacterId,
  pub character_name: String,
}

/// Used and available slots of one kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotUsage {
  pub total: u32,
  pub used: u32,
}

impl SlotUsage {
  pub fn free(&self) -> u32 {
    self.total.saturating_sub(self.used)
  }
}

/// Industry line usage per activity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityLines {
  pub manufacturing: SlotUsage,
  pub research: SlotUsage,
  pub reactions: SlotUsage,
}

/// Slot usage summary for one character.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
  pub lines: ActivityLines,
  pub planets: SlotUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
  InProgress,
  Paused,
  Ready,
  Completed,
  Delivered,
  Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
  pub job_id: u64,
  pub product_name: String,
  pub activity_id: u32,
  pub start_date: DateTime<Utc>,
  pub end_date: DateTime<Utc>,
  pub location_name: String,
  pub status: JobStatus,
}

/// A planetary colony.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Planet {
  pub planet_id: u64,
  pub planet_type: String,
  #[serde(default)]
  pub solar_system_id: Option<u64>,
  #[serde(default)]
  pub upgrade_level: u8,
  #[serde(default)]
  pub num_pins: u32,
  #[serde(default)]
  pub last_update: Option<DateTime<Utc>>,
}
