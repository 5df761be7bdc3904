// Prevents additional console window on Windows (silent launch).
#![cfg_attr(target_os = "windows", windows_subsystem = "windows")]

mod commands;
mod database;
mod models;
mod services;
mod utils;

use tauri::Manager;

fn main() {
    utils::config::load_dotenv();
    let _ = env_logger::try_init();

    tauri::Builder::default()
        .setup(|app| {
            let app_handle = app.handle();
            let data_dir = app_handle.path().app_data_dir().expect("Failed to get app data dir");

            // Create data directory if it doesn't exist
            std::fs::create_dir_all(&data_dir).expect("Failed to create data directory");
            std::fs::create_dir_all(data_dir.join(database::ATTACHMENTS_DIR))
                .expect("Failed to create attachments directory");

            // Initialize database
            let db_path = data_dir.join(database::DB_FILE);
            database::init_database(&db_path).expect("Failed to initialize database");

            // Mirror the persisted operating mode into the network guard
            // before any command can run.
            let settings = read_settings(&app_handle).unwrap_or_default();
            services::network_guard::apply_mode(settings.general.mode);

            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            // Diary commands
            commands::diary::create_diary_entry,
            commands::diary::get_diary_entries,
            commands::diary::get_diary_entry,
            commands::diary::update_diary_entry,
            commands::diary::delete_diary_entry,
            commands::diary::attach_diary_image,
            commands::diary::get_diary_images,
            commands::diary::generate_diary_draft,
            // Task commands
            commands::task::create_task,
            commands::task::get_tasks,
            commands::task::update_task,
            commands::task::queue_task_autosave,
            commands::task::cancel_task_autosave,
            commands::task::delete_task,
            // Chat commands
            commands::chat::create_conversation,
            commands::chat::get_conversations,
            commands::chat::delete_conversation,
            commands::chat::get_chat_messages,
            commands::chat::send_chat_message,
            // Todo extraction commands
            commands::todo::extract_conversation_info,
            commands::todo::get_extracted_info,
            commands::todo::promote_todo,
            commands::todo::dismiss_todo,
            // Weekly report commands
            commands::report::generate_weekly_report,
            commands::report::get_weekly_reports,
            // Backup commands
            commands::backup::create_backup,
            commands::backup::restore_backup,
            // Settings commands
            commands::settings::get_settings,
            commands::settings::update_settings,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}

fn read_settings(app_handle: &tauri::AppHandle) -> Option<models::Settings> {
    let data_dir = app_handle.path().app_data_dir().ok()?;
    let config_path = data_dir.join("config").join("settings.json");
    if !config_path.exists() {
        let mut settings = models::Settings::default();
        utils::config::apply_env_defaults(&mut settings);
        return Some(settings);
    }
    let content = std::fs::read_to_string(config_path).ok()?;
    let mut settings = serde_json::from_str::<models::Settings>(&content).ok()?;
    utils::config::apply_env_defaults(&mut settings);
    Some(settings)
}
