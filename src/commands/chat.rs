use chrono::Utc;
use serde::{Deserialize, Serialize};
use tauri::{AppHandle, Emitter, Manager};
use uuid::Uuid;

use crate::database;
use crate::models::{Conversation, Settings};
use crate::services::ai_provider::{self, ChatMessage};

fn load_settings(app_handle: &AppHandle) -> Option<Settings> {
    let data_dir = app_handle.path().app_data_dir().ok()?;
    let settings_path = data_dir.join("config").join("settings.json");
    let data = std::fs::read_to_string(settings_path).ok()?;
    let mut settings: Settings = serde_json::from_str(&data).ok()?;
    crate::utils::config::apply_env_defaults(&mut settings);
    Some(settings)
}

fn load_recent_chat_context(
    conn: &rusqlite::Connection,
    conversation_id: &str,
    limit: i64,
) -> Result<Vec<ChatMessage>, String> {
    let mut stmt = conn
        .prepare(
            "SELECT role, content
             FROM chat_messages
             WHERE conversation_id = ?1
             ORDER BY created_at DESC
             LIMIT ?2",
        )
        .map_err(|e| e.to_string())?;

    let rows = stmt
        .query_map(rusqlite::params![conversation_id, limit], |row| {
            Ok(ChatMessage {
                role: row.get::<_, String>(0)?,
                content: row.get::<_, String>(1)?,
            })
        })
        .map_err(|e| e.to_string())?;

    let mut messages: Vec<ChatMessage> = rows.filter_map(|r| r.ok()).collect();
    messages.reverse();
    Ok(messages)
}

// ─── Types ───

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageResponse {
    pub id: i64,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub created_at: i64,
}

// ─── Commands ───

#[tauri::command]
pub async fn create_conversation(app_handle: AppHandle) -> Result<Conversation, String> {
    let data_dir = app_handle.path().app_data_dir().map_err(|e| e.to_string())?;
    let db_path = data_dir.join(database::DB_FILE);
    let conn = rusqlite::Connection::open(&db_path).map_err(|e| e.to_string())?;

    let conversation = Conversation {
        id: Uuid::new_v4().to_string(),
        title: "New Chat".to_string(),
        created_at: Utc::now().timestamp(),
        updated_at: Utc::now().timestamp(),
    };

    conn.execute(
        "INSERT INTO conversations (id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            conversation.id,
            conversation.title,
            conversation.created_at,
            conversation.updated_at
        ],
    )
    .map_err(|e| e.to_string())?;

    Ok(conversation)
}

#[tauri::command]
pub async fn get_conversations(app_handle: AppHandle) -> Result<Vec<Conversation>, String> {
    let data_dir = app_handle.path().app_data_dir().map_err(|e| e.to_string())?;
    let db_path = data_dir.join(database::DB_FILE);
    let conn = rusqlite::Connection::open(&db_path).map_err(|e| e.to_string())?;

    let mut stmt = conn
        .prepare(
            "SELECT id, title, created_at, updated_at
             FROM conversations ORDER BY updated_at DESC",
        )
        .map_err(|e| e.to_string())?;

    let conversations = stmt
        .query_map([], |row| {
            Ok(Conversation {
                id: row.get(0)?,
                title: row.get(1)?,
                created_at: row.get(2)?,
                updated_at: row.get(3)?,
            })
        })
        .map_err(|e| e.to_string())?
        .filter_map(|r| r.ok())
        .collect();

    Ok(conversations)
}

#[tauri::command]
pub async fn delete_conversation(app_handle: AppHandle, conversation_id: String) -> Result<(), String> {
    let data_dir = app_handle.path().app_data_dir().map_err(|e| e.to_string())?;
    let db_path = data_dir.join(database::DB_FILE);
    let conn = rusqlite::Connection::open(&db_path).map_err(|e| e.to_string())?;

    // Delete dependents first, then the conversation
    conn.execute("DELETE FROM chat_messages WHERE conversation_id = ?1", [&conversation_id])
        .map_err(|e| e.to_string())?;
    conn.execute("DELETE FROM extracted_info WHERE conversation_id = ?1", [&conversation_id])
        .map_err(|e| e.to_string())?;
    conn.execute("DELETE FROM conversations WHERE id = ?1", [&conversation_id])
        .map_err(|e| e.to_string())?;

    Ok(())
}

#[tauri::command]
pub async fn get_chat_messages(
    app_handle: AppHandle,
    conversation_id: String,
) -> Result<Vec<ChatMessageResponse>, String> {
    let data_dir = app_handle.path().app_data_dir().map_err(|e| e.to_string())?;
    let db_path = data_dir.join(database::DB_FILE);
    let conn = rusqlite::Connection::open(&db_path).map_err(|e| e.to_string())?;

    let mut stmt = conn
        .prepare(
            "SELECT id, conversation_id, role, content, created_at
             FROM chat_messages WHERE conversation_id = ?1 ORDER BY created_at ASC",
        )
        .map_err(|e| e.to_string())?;

    let messages = stmt
        .query_map([&conversation_id], |row| {
            Ok(ChatMessageResponse {
                id: row.get(0)?,
                conversation_id: row.get(1)?,
                role: row.get(2)?,
                content: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .map_err(|e| e.to_string())?
        .filter_map(|r| r.ok())
        .collect();

    Ok(messages)
}

#[tauri::command]
pub async fn send_chat_message(
    app_handle: AppHandle,
    conversation_id: String,
    message: String,
) -> Result<ChatMessageResponse, String> {
    let now = Utc::now().timestamp();
    let data_dir = app_handle.path().app_data_dir().map_err(|e| e.to_string())?;
    let db_path = data_dir.join(database::DB_FILE);

    // 1. Load recent chat context (before inserting this message)
    let recent_context = {
        let conn = rusqlite::Connection::open(&db_path).map_err(|e| e.to_string())?;
        load_recent_chat_context(&conn, &conversation_id, 12)?
    };

    // 2. Store user message
    {
        let conn = rusqlite::Connection::open(&db_path).map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO chat_messages (conversation_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![conversation_id, "user", message, now],
        )
        .map_err(|e| e.to_string())?;

        // Update conversation title from first message
        let msg_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM chat_messages WHERE conversation_id = ?1",
                [&conversation_id],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if msg_count <= 1 {
            // Use first ~50 chars of first message as title
            let title = if message.chars().count() > 50 {
                let end = message.char_indices().nth(50).map(|(i, _)| i).unwrap_or(message.len());
                format!("{}...", &message[..end])
            } else {
                message.clone()
            };
            conn.execute(
                "UPDATE conversations SET title = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![title, now, conversation_id],
            )
            .map_err(|e| e.to_string())?;
        } else {
            conn.execute(
                "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
                rusqlite::params![now, conversation_id],
            )
            .map_err(|e| e.to_string())?;
        }
    }

    // 3. Produce the assistant reply
    let settings = load_settings(&app_handle).unwrap_or_default();
    let resolved_api_key = crate::utils::config::resolve_api_key(&settings.ai.api_key);

    let answer = if !settings.general.mode.is_ai() {
        "AI chat is unavailable in traditional mode. Switch to AI mode in Settings.".to_string()
    } else if !settings.ai.enabled || resolved_api_key.is_empty() {
        "AI is not configured. Please set your API key in Settings.".to_string()
    } else {
        let mut messages = vec![ChatMessage {
            role: "system".to_string(),
            content: ai_provider::CHAT_SYSTEM_PROMPT.to_string(),
        }];
        for msg in &recent_context {
            if msg.content.trim().is_empty() {
                continue;
            }
            messages.push(msg.clone());
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: message.clone(),
        });

        let on_token = |chunk: &str| {
            let _ = app_handle.emit("chat://token", chunk);
        };
        match ai_provider::chat_completion_stream(&settings.ai, &messages, on_token).await {
            Ok(reply) => {
                let _ = app_handle.emit("chat://done", "final_answer");
                reply
            }
            Err(e) => format!("Sorry, I encountered an error: {}", e),
        }
    };

    // 4. Store assistant message
    let response_time = Utc::now().timestamp();
    let conn = rusqlite::Connection::open(&db_path).map_err(|e| e.to_string())?;
    conn.execute(
        "INSERT INTO chat_messages (conversation_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![conversation_id, "assistant", answer, response_time],
    )
    .map_err(|e| e.to_string())?;

    let msg_id = conn.last_insert_rowid();

    Ok(ChatMessageResponse {
        id: msg_id,
        conversation_id,
        role: "assistant".to_string(),
        content: answer,
        created_at: response_time,
    })
}
