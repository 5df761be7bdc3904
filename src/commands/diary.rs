use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tauri::{AppHandle, Manager};
use uuid::Uuid;

use crate::database::{self, queries};
use crate::models::{CreateDiaryEntryRequest, DiaryEntry, DiaryImage, Settings};
use crate::services::{ai_provider, extraction};

fn load_settings(app_handle: &AppHandle) -> Option<Settings> {
    let data_dir = app_handle.path().app_data_dir().ok()?;
    let settings_path = data_dir.join("config").join("settings.json");
    let data = std::fs::read_to_string(settings_path).ok()?;
    let mut settings: Settings = serde_json::from_str(&data).ok()?;
    crate::utils::config::apply_env_defaults(&mut settings);
    Some(settings)
}

#[tauri::command]
pub async fn create_diary_entry(
    app_handle: AppHandle,
    request: CreateDiaryEntryRequest,
) -> Result<DiaryEntry, String> {
    if request.title.trim().is_empty() && request.content.trim().is_empty() {
        return Err("Diary entry cannot be empty".to_string());
    }

    let data_dir = app_handle.path().app_data_dir().map_err(|e| e.to_string())?;
    let db_path = data_dir.join(database::DB_FILE);
    let conn = rusqlite::Connection::open(&db_path).map_err(|e| e.to_string())?;

    queries::insert_diary_entry(&conn, &request).map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn get_diary_entries(
    app_handle: AppHandle,
    from: Option<i64>,
    to: Option<i64>,
    limit: Option<i32>,
) -> Result<Vec<DiaryEntry>, String> {
    let data_dir = app_handle.path().app_data_dir().map_err(|e| e.to_string())?;
    let db_path = data_dir.join(database::DB_FILE);
    let conn = rusqlite::Connection::open(&db_path).map_err(|e| e.to_string())?;

    queries::get_diary_entries(&conn, from, to, limit).map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn get_diary_entry(app_handle: AppHandle, id: i64) -> Result<DiaryEntry, String> {
    let data_dir = app_handle.path().app_data_dir().map_err(|e| e.to_string())?;
    let db_path = data_dir.join(database::DB_FILE);
    let conn = rusqlite::Connection::open(&db_path).map_err(|e| e.to_string())?;

    queries::get_diary_entry(&conn, id)
        .map_err(|e| e.to_string())?
        .filter(|entry| !entry.deleted)
        .ok_or_else(|| "Diary entry not found".to_string())
}

#[tauri::command]
pub async fn update_diary_entry(
    app_handle: AppHandle,
    id: i64,
    title: Option<String>,
    content: Option<String>,
    mood: Option<String>,
    tags: Option<Vec<String>>,
) -> Result<DiaryEntry, String> {
    let data_dir = app_handle.path().app_data_dir().map_err(|e| e.to_string())?;
    let db_path = data_dir.join(database::DB_FILE);
    let conn = rusqlite::Connection::open(&db_path).map_err(|e| e.to_string())?;

    queries::update_diary_entry(&conn, id, title, content, mood, tags)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "Diary entry not found".to_string())
}

#[tauri::command]
pub async fn delete_diary_entry(app_handle: AppHandle, id: i64) -> Result<(), String> {
    let data_dir = app_handle.path().app_data_dir().map_err(|e| e.to_string())?;
    let db_path = data_dir.join(database::DB_FILE);
    let conn = rusqlite::Connection::open(&db_path).map_err(|e| e.to_string())?;

    queries::soft_delete_diary_entry(&conn, id).map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn attach_diary_image(
    app_handle: AppHandle,
    entry_id: i64,
    file_name: String,
    data_base64: String,
) -> Result<DiaryImage, String> {
    let data_dir = app_handle.path().app_data_dir().map_err(|e| e.to_string())?;
    let db_path = data_dir.join(database::DB_FILE);
    let conn = rusqlite::Connection::open(&db_path).map_err(|e| e.to_string())?;

    let entry = queries::get_diary_entry(&conn, entry_id).map_err(|e| e.to_string())?;
    if entry.map(|e| e.deleted).unwrap_or(true) {
        return Err("Diary entry not found".to_string());
    }

    let bytes = BASE64
        .decode(data_base64.as_bytes())
        .map_err(|e| format!("Invalid image data: {}", e))?;

    let extension = std::path::Path::new(&file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("png");
    let stored_name = format!("{}.{}", Uuid::new_v4(), extension);

    let attachments_dir = data_dir.join(database::ATTACHMENTS_DIR);
    std::fs::create_dir_all(&attachments_dir).map_err(|e| e.to_string())?;
    std::fs::write(attachments_dir.join(&stored_name), bytes).map_err(|e| e.to_string())?;

    queries::insert_diary_image(&conn, entry_id, &stored_name).map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn get_diary_images(app_handle: AppHandle, entry_id: i64) -> Result<Vec<DiaryImage>, String> {
    let data_dir = app_handle.path().app_data_dir().map_err(|e| e.to_string())?;
    let db_path = data_dir.join(database::DB_FILE);
    let conn = rusqlite::Connection::open(&db_path).map_err(|e| e.to_string())?;

    queries::get_diary_images(&conn, entry_id).map_err(|e| e.to_string())
}

/// Draft a diary entry from a chat conversation. The draft is returned to
/// the UI for editing; nothing is saved here.
#[tauri::command]
pub async fn generate_diary_draft(
    app_handle: AppHandle,
    conversation_id: String,
) -> Result<String, String> {
    let settings = load_settings(&app_handle).unwrap_or_default();
    if !settings.ai.enabled {
        return Err("AI is disabled in settings".to_string());
    }

    let data_dir = app_handle.path().app_data_dir().map_err(|e| e.to_string())?;
    let db_path = data_dir.join(database::DB_FILE);
    let transcript = {
        let conn = rusqlite::Connection::open(&db_path).map_err(|e| e.to_string())?;
        extraction::load_transcript(&conn, &conversation_id)?
    };
    if transcript.is_empty() {
        return Err("Conversation has no messages to draft from".to_string());
    }

    ai_provider::diary_draft(&settings.ai, &transcript).await
}
