use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single task. `id` is empty until the store has persisted it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Todo {
    pub id: String,
    pub title: String,
    pub description: String,
    pub is_completed: bool,
    pub priority: i64,
    pub created_at: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
}

impl Default for Todo {
    fn default() -> Self {
        Self {
            id: String::new(),
            title: String::new(),
            description: String::new(),
            is_completed: false,
            priority: Priority::Low.level(),
            created_at: Utc::now(),
            due_date: None,
        }
    }
}

impl Todo {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self { title: title.into(), description: description.into(), ..Self::default() }
    }

    pub fn is_persisted(&self) -> bool { !self.id.is_empty() }

    pub fn priority_tier(&self) -> Priority { Priority::from_level(self.priority) }

    pub fn with_completed(&self, is_completed: bool) -> Self {
        Self { is_completed, ..self.clone() }
    }
}

/// Display tier for a stored priority level. Levels outside 1..=3 are kept
/// as stored and shown as `Low`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Priority { Low, Medium, High }

impl Priority {
    pub fn from_level(level: i64) -> Self {
        match level {
            3 => Self::High,
            2 => Self::Medium,
            _ => Self::Low,
        }
    }

    pub fn level(self) -> i64 {
        match self { Self::Low => 1, Self::Medium => 2, Self::High => 3 }
    }

    pub fn label(self) -> &'static str {
        match self { Self::Low => "Low", Self::Medium => "Medium", Self::High => "High" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_priority_renders_low() {
        assert_eq!(Priority::from_level(0), Priority::Low);
        assert_eq!(Priority::from_level(7), Priority::Low);
        assert_eq!(Priority::from_level(-2).label(), "Low");
        assert_eq!(Priority::from_level(2).label(), "Medium");
        assert_eq!(Priority::from_level(3), Priority::High);
    }

    #[test]
    fn new_todo_is_transient_with_defaults() {
        let todo = Todo::new("Buy milk", "");
        assert!(!todo.is_persisted());
        assert_eq!(todo.priority, 1);
        assert!(!todo.is_completed);
        assert!(todo.due_date.is_none());
    }

    #[test]
    fn with_completed_keeps_identity() {
        let todo = Todo { id: "abc123".into(), ..Todo::new("Buy milk", "") };
        let done = todo.with_completed(true);
        assert_eq!(done.id, "abc123");
        assert!(done.is_completed);
        assert_eq!(done.created_at, todo.created_at);
    }
}
