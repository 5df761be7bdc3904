//! Structured-info extraction from chat conversations.
//!
//! One-shot LLM call over the transcript, schema-validated parse of the
//! returned JSON, then a merge of the suggested todos against the pending
//! list, prior dismissals and existing tasks. Promote/dismiss both funnel
//! through here so every read-merge-write of a conversation's extracted
//! info happens under that conversation's lock.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use rusqlite::Connection;

use crate::database::{self, queries};
use crate::models::{ExtractedInfo, Settings, Task, TodoSuggestion};
use crate::services::ai_provider::{self, ChatMessage};
use crate::services::todo_normalizer;

// ─── Per-conversation locking ───

static CONVERSATION_GATES: OnceLock<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>> =
    OnceLock::new();

/// Commands run concurrently on the async runtime; extract/promote/dismiss
/// for one conversation serialize through this gate.
pub fn conversation_gate(conversation_id: &str) -> Arc<tokio::sync::Mutex<()>> {
    let gates = CONVERSATION_GATES.get_or_init(|| Mutex::new(HashMap::new()));
    let mut gates = gates.lock().unwrap_or_else(|e| e.into_inner());
    gates
        .entry(conversation_id.to_string())
        .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
        .clone()
}

// ─── AI payload parsing ───

const EXTRACTION_SYSTEM_PROMPT: &str = r#"You extract structured information from a diary chat transcript.
Return strict JSON with keys: events (string[]), people (string[]), locations (string[]),
todos ([{title, due_date, priority, notes}]).
Rules:
- title: short action phrase in the user's language; omit the item if there is no concrete action.
- due_date: "YYYY-MM-DD" if the conversation determines one, otherwise the string "未知".
- priority: one of low, medium, high, urgent.
- notes: optional free text with extra context, or omit it.
Do NOT propose todos that duplicate the existing task titles listed in the request.
Output RAW JSON only, no markdown code blocks."#;

#[derive(Debug, Default, serde::Deserialize)]
struct RawExtraction {
    #[serde(default)]
    events: Vec<String>,
    #[serde(default)]
    people: Vec<String>,
    #[serde(default)]
    locations: Vec<String>,
    #[serde(default)]
    todos: Vec<RawTodoSuggestion>,
}

#[derive(Debug, serde::Deserialize)]
struct RawTodoSuggestion {
    #[serde(default)]
    title: String,
    #[serde(default, alias = "dueDate")]
    due_date: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

/// Parse the model's reply into a typed payload. Malformed output is a hard
/// error: nothing gets stored from a reply we cannot validate.
fn parse_extraction(content: &str) -> Result<RawExtraction, String> {
    let clean = ai_provider::strip_code_fences(content);
    serde_json::from_str(clean).map_err(|e| format!("extraction JSON parse error: {}", e))
}

/// Canonicalize raw todos; items without a usable title are dropped here
/// rather than surfaced as errors.
fn normalize_todos(raw: Vec<RawTodoSuggestion>) -> Vec<TodoSuggestion> {
    raw.into_iter()
        .map(|t| {
            todo_normalizer::normalize_fields(
                &t.title,
                t.due_date.as_deref(),
                t.priority.as_deref(),
                t.notes,
            )
        })
        .filter(|t| !t.title.is_empty())
        .collect()
}

fn build_extraction_request(transcript: &[ChatMessage], task_titles: &[String]) -> Vec<ChatMessage> {
    let mut dialog = String::new();
    for msg in transcript {
        dialog.push_str(&format!("{}: {}\n", msg.role, msg.content));
    }

    let tasks_line = if task_titles.is_empty() {
        "(none)".to_string()
    } else {
        task_titles.join("; ")
    };

    vec![
        ChatMessage {
            role: "system".to_string(),
            content: EXTRACTION_SYSTEM_PROMPT.to_string(),
        },
        ChatMessage {
            role: "user".to_string(),
            content: format!(
                "Existing task titles: {}\n\nTranscript:\n{}",
                tasks_line, dialog
            ),
        },
    ]
}

// ─── Transcript / task loading ───

pub fn load_transcript(conn: &Connection, conversation_id: &str) -> Result<Vec<ChatMessage>, String> {
    let mut stmt = conn
        .prepare(
            "SELECT role, content FROM chat_messages
             WHERE conversation_id = ?1 ORDER BY created_at ASC",
        )
        .map_err(|e| e.to_string())?;

    let rows = stmt
        .query_map([conversation_id], |row| {
            Ok(ChatMessage {
                role: row.get::<_, String>(0)?,
                content: row.get::<_, String>(1)?,
            })
        })
        .map_err(|e| e.to_string())?;

    Ok(rows.filter_map(|r| r.ok()).collect())
}

fn conversation_exists(conn: &Connection, conversation_id: &str) -> Result<bool, String> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM conversations WHERE id = ?1",
            [conversation_id],
            |row| row.get(0),
        )
        .map_err(|e| e.to_string())?;
    Ok(count > 0)
}

fn live_tasks(conn: &Connection) -> Result<Vec<Task>, String> {
    queries::get_tasks(conn, None, None).map_err(|e| e.to_string())
}

// ─── Operations ───

/// Run an extraction pass for one conversation and merge the result into its
/// stored `ExtractedInfo`.
pub async fn extract_conversation_info(
    data_dir: &Path,
    conversation_id: &str,
    settings: &Settings,
) -> Result<ExtractedInfo, String> {
    let gate = conversation_gate(conversation_id);
    let _guard = gate.lock().await;

    let db_path = data_dir.join(database::DB_FILE);
    let (transcript, task_titles) = {
        let conn = Connection::open(&db_path).map_err(|e| e.to_string())?;
        if !conversation_exists(&conn, conversation_id)? {
            return Err("Conversation not found".to_string());
        }
        let transcript = load_transcript(&conn, conversation_id)?;
        if transcript.is_empty() {
            return Err("Conversation has no messages to extract from".to_string());
        }
        let titles = live_tasks(&conn)?.into_iter().map(|t| t.title).collect::<Vec<_>>();
        (transcript, titles)
    };

    let messages = build_extraction_request(&transcript, &task_titles);
    let content = ai_provider::chat_completion(&settings.ai, &messages, 0.2, 900).await?;
    let raw = parse_extraction(&content)?;
    let incoming = normalize_todos(raw.todos);

    let conn = Connection::open(&db_path).map_err(|e| e.to_string())?;
    let tasks = live_tasks(&conn)?;
    let (task_keys, task_title_keys) = todo_normalizer::task_keys(&tasks);

    let mut info = queries::get_extracted_info(&conn, conversation_id)
        .map_err(|e| e.to_string())?
        .unwrap_or_default();

    info.todos = todo_normalizer::merge_suggestions(
        &info.todos,
        &incoming,
        &info.dismissed_todos,
        &task_keys,
        &task_title_keys,
    );
    info.events = raw.events;
    info.people = raw.people;
    info.locations = raw.locations;

    queries::upsert_extracted_info(&conn, conversation_id, &info).map_err(|e| e.to_string())?;
    Ok(info)
}

/// Turn a pending suggestion into a real task. The dismissal keys are only
/// recorded once task creation has succeeded; on failure the suggestion
/// stays pending so the user can retry.
pub fn promote_suggestion(
    conn: &Connection,
    conversation_id: &str,
    suggestion: &TodoSuggestion,
) -> Result<Task, String> {
    let (request, additions) = todo_normalizer::promote(suggestion);
    if additions.is_empty() {
        return Err("Suggestion has no title".to_string());
    }

    let mut info = queries::get_extracted_info(conn, conversation_id)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "No extracted info for conversation".to_string())?;

    let task = queries::insert_task(conn, &request).map_err(|e| e.to_string())?;

    remove_pending(&mut info, suggestion);
    info.dismissed_todos.extend(additions);
    queries::upsert_extracted_info(conn, conversation_id, &info).map_err(|e| e.to_string())?;

    Ok(task)
}

/// Permanently hide a suggestion from future extraction passes.
pub fn dismiss_suggestion(
    conn: &Connection,
    conversation_id: &str,
    suggestion: &TodoSuggestion,
) -> Result<ExtractedInfo, String> {
    let mut info = queries::get_extracted_info(conn, conversation_id)
        .map_err(|e| e.to_string())?
        .unwrap_or_default();

    remove_pending(&mut info, suggestion);
    todo_normalizer::dismiss(suggestion, &mut info.dismissed_todos);
    queries::upsert_extracted_info(conn, conversation_id, &info).map_err(|e| e.to_string())?;

    Ok(info)
}

fn remove_pending(info: &mut ExtractedInfo, suggestion: &TodoSuggestion) {
    let normalized = todo_normalizer::normalize(suggestion);
    let key = todo_normalizer::suggestion_key(&normalized);
    let title_key = todo_normalizer::suggestion_title_key(&normalized);
    info.todos.retain(|t| {
        let t = todo_normalizer::normalize(t);
        todo_normalizer::suggestion_key(&t) != key
            && todo_normalizer::suggestion_title_key(&t) != title_key
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Priority, TaskStatus};

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::database::schema::create_tables(&conn).unwrap();
        conn.execute(
            "INSERT INTO conversations (id, title, created_at, updated_at) VALUES ('c1', 't', 0, 0)",
            [],
        )
        .unwrap();
        conn
    }

    fn suggestion(title: &str) -> TodoSuggestion {
        TodoSuggestion {
            title: title.to_string(),
            due_date: "未知".to_string(),
            priority: Priority::Medium,
            notes: None,
        }
    }

    #[test]
    fn parses_plain_and_fenced_payloads() {
        let payload = r#"{"events":["会议"],"todos":[{"title":"买牛奶","due_date":"未知","priority":"medium"}]}"#;
        let raw = parse_extraction(payload).unwrap();
        assert_eq!(raw.events, vec!["会议"]);
        assert_eq!(raw.todos.len(), 1);

        let fenced = format!("```json\n{}\n```", payload);
        assert_eq!(parse_extraction(&fenced).unwrap().todos.len(), 1);
    }

    #[test]
    fn malformed_payload_is_an_error_not_a_guess() {
        assert!(parse_extraction("I could not find anything.").is_err());
        assert!(parse_extraction("{\"todos\": \"oops\"}").is_err());
    }

    #[test]
    fn normalize_drops_titleless_items_and_defaults_priority() {
        let raw = vec![
            RawTodoSuggestion {
                title: "  ".to_string(),
                due_date: None,
                priority: None,
                notes: None,
            },
            RawTodoSuggestion {
                title: "订机票".to_string(),
                due_date: Some("未知".to_string()),
                priority: Some("bogus".to_string()),
                notes: Some(" 去上海 ".to_string()),
            },
        ];
        let todos = normalize_todos(raw);
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].title, "订机票");
        assert_eq!(todos[0].due_date, "");
        assert_eq!(todos[0].priority, Priority::Medium);
        assert_eq!(todos[0].notes.as_deref(), Some("去上海"));
    }

    #[test]
    fn extraction_request_lists_existing_tasks() {
        let transcript = vec![ChatMessage {
            role: "user".to_string(),
            content: "明天要买牛奶".to_string(),
        }];
        let messages =
            build_extraction_request(&transcript, &["买牛奶".to_string(), "回电话".to_string()]);
        assert_eq!(messages.len(), 2);
        assert!(messages[1].content.contains("买牛奶; 回电话"));
        assert!(messages[1].content.contains("user: 明天要买牛奶"));
    }

    #[test]
    fn promote_creates_task_and_suppresses_suggestion() {
        let conn = test_conn();
        let s = suggestion("订机票");
        let mut info = ExtractedInfo::default();
        info.todos.push(s.clone());
        queries::upsert_extracted_info(&conn, "c1", &info).unwrap();

        let task = promote_suggestion(&conn, "c1", &s).unwrap();
        assert_eq!(task.title, "订机票");
        assert_eq!(task.status, TaskStatus::NotStarted);

        let info = queries::get_extracted_info(&conn, "c1").unwrap().unwrap();
        assert!(info.todos.is_empty());
        assert!(info.dismissed_todos.contains("订机票||medium"));
        assert!(info.dismissed_todos.contains("订机票"));
    }

    #[test]
    fn promote_without_stored_info_leaves_no_partial_state() {
        let conn = test_conn();
        let err = promote_suggestion(&conn, "c1", &suggestion("订机票")).unwrap_err();
        assert!(err.contains("No extracted info"));
        // No task row was created either.
        assert!(queries::get_tasks(&conn, None, None).unwrap().is_empty());
    }

    #[test]
    fn promote_rejects_blank_titles() {
        let conn = test_conn();
        assert!(promote_suggestion(&conn, "c1", &suggestion("   ")).is_err());
    }

    #[test]
    fn dismiss_records_both_key_granularities() {
        let conn = test_conn();
        let s = suggestion("买牛奶");
        let mut info = ExtractedInfo::default();
        info.todos.push(s.clone());
        queries::upsert_extracted_info(&conn, "c1", &info).unwrap();

        let info = dismiss_suggestion(&conn, "c1", &s).unwrap();
        assert!(info.todos.is_empty());
        assert!(info.dismissed_todos.contains("买牛奶||medium"));
        assert!(info.dismissed_todos.contains("买牛奶"));
    }
}
