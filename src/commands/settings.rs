use tauri::{AppHandle, Manager};

use crate::models::Settings;
use crate::services::network_guard;

#[tauri::command]
pub async fn get_settings(app_handle: AppHandle) -> Result<Settings, String> {
    let data_dir = app_handle.path().app_data_dir().map_err(|e| e.to_string())?;
    let config_path = data_dir.join("config").join("settings.json");

    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path).map_err(|e| e.to_string())?;
        let mut settings: Settings = serde_json::from_str(&content).map_err(|e| e.to_string())?;
        crate::utils::config::apply_env_defaults(&mut settings);
        Ok(settings)
    } else {
        let mut settings = Settings::default();
        crate::utils::config::apply_env_defaults(&mut settings);
        Ok(settings)
    }
}

#[tauri::command]
pub async fn update_settings(app_handle: AppHandle, settings: Settings) -> Result<(), String> {
    let data_dir = app_handle.path().app_data_dir().map_err(|e| e.to_string())?;
    let config_dir = data_dir.join("config");

    std::fs::create_dir_all(&config_dir).map_err(|e| e.to_string())?;

    let config_path = config_dir.join("settings.json");
    let content = serde_json::to_string_pretty(&settings).map_err(|e| e.to_string())?;

    std::fs::write(&config_path, content).map_err(|e| e.to_string())?;

    // The network guard follows the persisted mode immediately.
    network_guard::apply_mode(settings.general.mode);

    Ok(())
}
