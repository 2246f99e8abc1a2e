//! Quest model: a to-do item that pays out XP when completed.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_CATEGORY: &str = "general";
pub const DEFAULT_ESTIMATED_MINUTES: u32 = 30;

/// Categories the dashboard knows how to color. Anything else is accepted as-is.
pub const KNOWN_CATEGORIES: [&str; 6] = ["general", "work", "personal", "health", "learning", "social"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// XP paid out on completion.
    pub fn xp_reward(self) -> u32 {
        match self {
            Priority::Low => 10,
            Priority::Medium => 25,
            Priority::High => 50,
            Priority::Urgent => 100,
        }
    }

    /// Lenient parse: unknown or empty input falls back to medium.
    pub fn parse_lossy(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// Input for a new quest. Missing fields are defaulted, never rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestDraft {
    pub title: String,
    pub priority: Priority,
    pub category: String,
    pub estimated_minutes: u32,
}

impl QuestDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            priority: Priority::Medium,
            category: DEFAULT_CATEGORY.to_string(),
            estimated_minutes: DEFAULT_ESTIMATED_MINUTES,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_minutes(mut self, minutes: u32) -> Self {
        self.estimated_minutes = minutes;
        self
    }
}

/// Every field tolerates being missing, null or of the wrong type: bad values
/// fall back to defaults and [`Quest::normalize`] repairs the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quest {
    /// Stable ULID. Rows written by older builds may lack one; the board fills it in on load.
    #[serde(default, deserialize_with = "lossy")]
    pub id: String,
    #[serde(default, deserialize_with = "lossy")]
    pub title: String,
    #[serde(default, deserialize_with = "deserialize_priority_lossy")]
    pub priority: Priority,
    #[serde(default = "default_category", deserialize_with = "lossy")]
    pub category: String,
    #[serde(default = "default_minutes", deserialize_with = "lossy")]
    pub estimated_minutes: u32,
    #[serde(default, deserialize_with = "lossy")]
    pub is_completed: bool,
    /// Fixed at creation; later priority changes never touch it.
    /// 0 marks a row that never stored one and is filled from `priority`.
    #[serde(default, deserialize_with = "lossy")]
    pub xp_reward: u32,
    #[serde(default = "Utc::now", deserialize_with = "deserialize_timestamp_lossy")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "lossy")]
    pub completed_at: Option<DateTime<Utc>>,
}

fn lossy<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|v| serde_json::from_value(v).ok()).unwrap_or_default())
}

fn deserialize_priority_lossy<'de, D>(deserializer: D) -> Result<Priority, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(raw)) => Priority::parse_lossy(&raw),
        _ => Priority::default(),
    })
}

fn deserialize_timestamp_lossy<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_else(Utc::now))
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

fn default_minutes() -> u32 {
    DEFAULT_ESTIMATED_MINUTES
}

impl Quest {
    pub fn new(id: impl Into<String>, draft: QuestDraft, now: DateTime<Utc>) -> Self {
        let category = draft.category.trim();
        Self {
            id: id.into(),
            title: draft.title,
            priority: draft.priority,
            category: if category.is_empty() {
                DEFAULT_CATEGORY.to_string()
            } else {
                category.to_string()
            },
            estimated_minutes: if draft.estimated_minutes == 0 {
                DEFAULT_ESTIMATED_MINUTES
            } else {
                draft.estimated_minutes
            },
            is_completed: false,
            xp_reward: draft.priority.xp_reward(),
            created_at: now,
            completed_at: None,
        }
    }

    /// Flip to completed. Returns false if it already was.
    pub(crate) fn mark_completed(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_completed {
            return false;
        }
        self.is_completed = true;
        self.completed_at = Some(now);
        true
    }

    /// Repair a row read from disk. Returns whether anything changed.
    pub(crate) fn normalize(&mut self) -> bool {
        let before = self.clone();
        match (self.is_completed, self.completed_at) {
            (true, None) => self.completed_at = Some(self.created_at),
            (false, Some(_)) => self.is_completed = true,
            _ => {}
        }
        if self.xp_reward == 0 {
            self.xp_reward = self.priority.xp_reward();
        }
        if self.category.trim().is_empty() {
            self.category = default_category();
        }
        if self.estimated_minutes == 0 {
            self.estimated_minutes = DEFAULT_ESTIMATED_MINUTES;
        }
        *self != before
    }
}

/// Decode a stored quest list row by row. Rows that are not objects are
/// dropped with a warning; the second value counts them.
pub fn quests_from_rows(rows: Vec<Value>) -> (Vec<Quest>, usize) {
    let mut dropped = 0;
    let quests = rows
        .into_iter()
        .enumerate()
        .filter_map(|(i, row)| match serde_json::from_value::<Quest>(row) {
            Ok(q) => Some(q),
            Err(e) => {
                tracing::warn!(row = i, error = %e, "dropping unreadable quest row");
                dropped += 1;
                None
            }
        })
        .collect();
    (quests, dropped)
}
