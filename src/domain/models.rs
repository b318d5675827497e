use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SortCategory {
    Task,
    Event,
    Reminder,
    Thought,
    Worry,
    Idea,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SortPriority {
    High,
    Medium,
    Low,
}

/// One brain-dump entry classified by the remote sort endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SortedItem {
    pub text: String,
    pub category: SortCategory,
    pub priority: SortPriority,
    #[serde(rename = "dueDate", skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BrainDumpSource {
    Manual,
    GoogleTasks,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrainDumpItem {
    pub id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<SortCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<SortPriority>,
    pub source: BrainDumpSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BrainDumpItem {
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("brain_dump.id must not be empty".to_string());
        }
        if self.text.trim().is_empty() {
            return Err("brain_dump.text must not be empty".to_string());
        }
        if self.source == BrainDumpSource::GoogleTasks && self.source_id.is_none() {
            return Err("brain_dump.source_id is required for imported items".to_string());
        }
        Ok(())
    }
}

/// Daily usage counter persisted under the `streak` storage key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreakRecord {
    pub last_use_date: Option<NaiveDate>,
    pub count: u32,
}

impl Default for StreakRecord {
    fn default() -> Self {
        Self {
            last_use_date: None,
            count: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TranscriptionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TranscriptionResult {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            transcription: None,
            summary: None,
            error: Some(error.into()),
        }
    }
}

/// Renders a second count as `MM:SS`. Minutes widen past two digits as
/// needed; seconds are always zero-padded to two.
pub fn format_time(total_seconds: u64) -> String {
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    format!("{minutes:02}:{seconds:02}")
}

/// Computes the day-based usage streak. Comparison is by calendar day,
/// not elapsed hours: a use at 23:59 followed by one at 00:01 counts as
/// consecutive days.
pub fn calculate_streak(last_use: Option<NaiveDate>, today: NaiveDate, current: u32) -> u32 {
    let Some(last_use) = last_use else {
        return 1;
    };

    if last_use == today {
        return current;
    }
    if today.signed_duration_since(last_use).num_days() == 1 {
        return current + 1;
    }
    1
}
