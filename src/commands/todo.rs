use tauri::{AppHandle, Manager};

use crate::database::{self, queries};
use crate::models::{ExtractedInfo, Settings, Task, TodoSuggestion};
use crate::services::extraction;

fn load_settings(app_handle: &AppHandle) -> Option<Settings> {
    let data_dir = app_handle.path().app_data_dir().ok()?;
    let settings_path = data_dir.join("config").join("settings.json");
    let data = std::fs::read_to_string(settings_path).ok()?;
    let mut settings: Settings = serde_json::from_str(&data).ok()?;
    crate::utils::config::apply_env_defaults(&mut settings);
    Some(settings)
}

/// Run an AI extraction pass over a conversation and merge the suggested
/// todos into its pending list.
#[tauri::command]
pub async fn extract_conversation_info(
    app_handle: AppHandle,
    conversation_id: String,
) -> Result<ExtractedInfo, String> {
    let settings = load_settings(&app_handle).unwrap_or_default();
    if !settings.ai.enabled {
        return Err("AI is disabled in settings".to_string());
    }

    let data_dir = app_handle.path().app_data_dir().map_err(|e| e.to_string())?;
    extraction::extract_conversation_info(&data_dir, &conversation_id, &settings).await
}

#[tauri::command]
pub async fn get_extracted_info(
    app_handle: AppHandle,
    conversation_id: String,
) -> Result<ExtractedInfo, String> {
    let data_dir = app_handle.path().app_data_dir().map_err(|e| e.to_string())?;
    let db_path = data_dir.join(database::DB_FILE);
    let conn = rusqlite::Connection::open(&db_path).map_err(|e| e.to_string())?;

    Ok(queries::get_extracted_info(&conn, &conversation_id)
        .map_err(|e| e.to_string())?
        .unwrap_or_default())
}

/// Create a real task from a pending suggestion. The suggestion is removed
/// from the pending list and suppressed for future extraction passes only
/// when task creation succeeds.
#[tauri::command]
pub async fn promote_todo(
    app_handle: AppHandle,
    conversation_id: String,
    suggestion: TodoSuggestion,
) -> Result<Task, String> {
    let gate = extraction::conversation_gate(&conversation_id);
    let _guard = gate.lock().await;

    let data_dir = app_handle.path().app_data_dir().map_err(|e| e.to_string())?;
    let db_path = data_dir.join(database::DB_FILE);
    let conn = rusqlite::Connection::open(&db_path).map_err(|e| e.to_string())?;

    extraction::promote_suggestion(&conn, &conversation_id, &suggestion)
}

/// Permanently hide a suggestion; it will not resurface from later
/// extraction passes.
#[tauri::command]
pub async fn dismiss_todo(
    app_handle: AppHandle,
    conversation_id: String,
    suggestion: TodoSuggestion,
) -> Result<ExtractedInfo, String> {
    let gate = extraction::conversation_gate(&conversation_id);
    let _guard = gate.lock().await;

    let data_dir = app_handle.path().app_data_dir().map_err(|e| e.to_string())?;
    let db_path = data_dir.join(database::DB_FILE);
    let conn = rusqlite::Connection::open(&db_path).map_err(|e| e.to_string())?;

    extraction::dismiss_suggestion(&conn, &conversation_id, &suggestion)
}
