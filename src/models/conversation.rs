use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::task::Priority;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// An AI-proposed action item, not yet a persisted task.
///
/// `due_date` is empty when no date was determined; `notes` carries free
/// text and does not participate in identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoSuggestion {
    pub title: String,
    #[serde(default)]
    pub due_date: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Structured AI output attached to a conversation.
///
/// `dismissed_todos` holds identity keys of suggestions the user rejected
/// (or promoted); it only ever grows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedInfo {
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub people: Vec<String>,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub todos: Vec<TodoSuggestion>,
    #[serde(default)]
    pub dismissed_todos: HashSet<String>,
}
