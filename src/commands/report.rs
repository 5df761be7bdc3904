use tauri::{AppHandle, Manager};

use crate::database::{self, queries};
use crate::models::{Settings, WeeklyReport};
use crate::services::report_engine;

fn load_settings(app_handle: &AppHandle) -> Option<Settings> {
    let data_dir = app_handle.path().app_data_dir().ok()?;
    let settings_path = data_dir.join("config").join("settings.json");
    let data = std::fs::read_to_string(settings_path).ok()?;
    let mut settings: Settings = serde_json::from_str(&data).ok()?;
    crate::utils::config::apply_env_defaults(&mut settings);
    Some(settings)
}

#[tauri::command]
pub async fn generate_weekly_report(
    app_handle: AppHandle,
    week_start: Option<String>,
) -> Result<WeeklyReport, String> {
    let settings = load_settings(&app_handle).unwrap_or_default();
    let data_dir = app_handle.path().app_data_dir().map_err(|e| e.to_string())?;
    report_engine::generate_weekly_report(&data_dir, week_start, &settings).await
}

#[tauri::command]
pub async fn get_weekly_reports(
    app_handle: AppHandle,
    limit: Option<i32>,
) -> Result<Vec<WeeklyReport>, String> {
    let data_dir = app_handle.path().app_data_dir().map_err(|e| e.to_string())?;
    let db_path = data_dir.join(database::DB_FILE);
    let conn = rusqlite::Connection::open(&db_path).map_err(|e| e.to_string())?;

    queries::list_weekly_reports(&conn, limit).map_err(|e| e.to_string())
}
