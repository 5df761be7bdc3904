use tauri::{AppHandle, Manager};

use crate::services::backup;

#[tauri::command]
pub async fn create_backup(app_handle: AppHandle, password: String) -> Result<String, String> {
    if password.is_empty() {
        return Err("Backup password cannot be empty".to_string());
    }

    let data_dir = app_handle.path().app_data_dir().map_err(|e| e.to_string())?;
    let path = backup::create_backup(&data_dir, &password).map_err(|e| e.to_string())?;
    Ok(path.to_string_lossy().to_string())
}

#[tauri::command]
pub async fn restore_backup(
    app_handle: AppHandle,
    archive_path: String,
    password: String,
) -> Result<(), String> {
    let data_dir = app_handle.path().app_data_dir().map_err(|e| e.to_string())?;
    backup::restore_backup(&data_dir, std::path::Path::new(&archive_path), &password)
        .map_err(|e| e.to_string())
}
