//! Task and column models
//!
//! Field names follow the wire format (`columnId`, `createdAt`, ...) so the
//! same types travel inside patches and land in storage unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::id::{ColumnId, TaskId, Timestamp};

/// Priority of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
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
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!(
                "Invalid priority '{}': expected low, medium or high",
                other
            )),
        }
    }
}

/// A column on the board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Unique identifier
    pub id: ColumnId,

    /// Display name
    pub name: String,

    /// Zero-based rank among columns
    pub index: i64,
}

impl Column {
    pub fn new(id: impl Into<ColumnId>, name: impl Into<String>, index: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            index,
        }
    }
}

/// A task card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,

    /// Human-readable title
    pub title: String,

    /// Free-form description (empty when not set)
    #[serde(default)]
    pub description: String,

    /// Column the task sits in
    pub column_id: ColumnId,

    /// Rank among tasks sharing `column_id`
    pub index: i64,

    /// When the task was created
    pub created_at: Timestamp,

    /// When the task was last updated
    pub updated_at: Timestamp,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub priority: Priority,
}

impl Task {
    /// Creates a task in a column at the given rank, stamped with `now`
    pub fn new(
        id: impl Into<TaskId>,
        title: impl Into<String>,
        column_id: impl Into<ColumnId>,
        index: i64,
        now: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            column_id: column_id.into(),
            index,
            created_at: now,
            updated_at: now,
            tags: Vec::new(),
            priority: Priority::default(),
        }
    }

    /// Returns a copy relocated to `column_id` at `index`, touched at `at`
    ///
    /// `updated_at` always moves forward, even when `at` lags behind the
    /// task's own clock.
    pub fn moved(&self, column_id: ColumnId, index: i64, at: Timestamp) -> Self {
        Self {
            column_id,
            index,
            updated_at: at.max(self.updated_at.saturating_add(1)),
            ..self.clone()
        }
    }
}

/// User-supplied fields for a new task
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskInput {
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub priority: Option<Priority>,
}

impl TaskInput {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Splits a comma-separated tag list, trimming and dropping empties
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_uses_camel_case_on_the_wire() {
        let task = Task::new("t1", "X", "c1", 0, 1);
        let json = serde_json::to_value(&task).unwrap();

        assert_eq!(json["columnId"], "c1");
        assert_eq!(json["createdAt"], 1);
        assert_eq!(json["updatedAt"], 1);
        assert_eq!(json["priority"], "medium");
    }

    #[test]
    fn task_deserializes_without_optional_fields() {
        let json = r#"{"id":"t1","title":"X","columnId":"c1","index":0,"createdAt":1,"updatedAt":1}"#;
        let task: Task = serde_json::from_str(json).unwrap();

        assert_eq!(task.description, "");
        assert!(task.tags.is_empty());
        assert_eq!(task.priority, Priority::Medium);
    }

    #[test]
    fn moved_task_keeps_identity() {
        let task = Task::new("t1", "X", "c1", 0, 10);
        let moved = task.moved(ColumnId::new("c2"), 3, 20);

        assert_eq!(moved.id, task.id);
        assert_eq!(moved.column_id, "c2");
        assert_eq!(moved.index, 3);
        assert_eq!(moved.updated_at, 20);
        assert_eq!(moved.created_at, 10);
    }

    #[test]
    fn moved_task_at_clock_limit_saturates() {
        let mut task = Task::new("t1", "X", "c1", 0, 10);
        task.updated_at = i64::MAX;

        let moved = task.moved(ColumnId::new("c2"), 0, 20);
        assert_eq!(moved.column_id, "c2");
        assert_eq!(moved.updated_at, i64::MAX);
    }

    #[test]
    fn moved_task_never_goes_back_in_time() {
        let task = Task::new("t1", "X", "c1", 0, 10);
        let moved = task.moved(ColumnId::new("c1"), 1, 5);
        assert_eq!(moved.updated_at, 11);
    }

    #[test]
    fn priority_parsing() {
        assert_eq!("High".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!(" low ".parse::<Priority>().unwrap(), Priority::Low);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn tags_are_split_and_trimmed() {
        assert_eq!(parse_tags(" ui, ,backend ,"), vec!["ui", "backend"]);
        assert!(parse_tags("").is_empty());
    }
}
