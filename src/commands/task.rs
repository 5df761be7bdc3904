use tauri::{AppHandle, Manager};

use crate::database::{self, queries};
use crate::models::{CreateTaskRequest, Task, TaskStatus, UpdateTaskRequest};
use crate::services::autosave;

#[tauri::command]
pub async fn create_task(app_handle: AppHandle, request: CreateTaskRequest) -> Result<Task, String> {
    if request.title.trim().is_empty() {
        return Err("Task title cannot be empty".to_string());
    }

    let data_dir = app_handle.path().app_data_dir().map_err(|e| e.to_string())?;
    let db_path = data_dir.join(database::DB_FILE);
    let conn = rusqlite::Connection::open(&db_path).map_err(|e| e.to_string())?;

    queries::insert_task(&conn, &request).map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn get_tasks(
    app_handle: AppHandle,
    status: Option<String>,
    limit: Option<i32>,
) -> Result<Vec<Task>, String> {
    let status = match status.as_deref() {
        Some(raw) => Some(TaskStatus::from_str(raw).ok_or_else(|| format!("Unknown status: {}", raw))?),
        None => None,
    };

    let data_dir = app_handle.path().app_data_dir().map_err(|e| e.to_string())?;
    let db_path = data_dir.join(database::DB_FILE);
    let conn = rusqlite::Connection::open(&db_path).map_err(|e| e.to_string())?;

    queries::get_tasks(&conn, status, limit).map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn update_task(
    app_handle: AppHandle,
    id: i64,
    patch: UpdateTaskRequest,
) -> Result<Task, String> {
    // An explicit save supersedes whatever edit is still debouncing.
    autosave::task_autosaver().cancel(id);

    let data_dir = app_handle.path().app_data_dir().map_err(|e| e.to_string())?;
    let db_path = data_dir.join(database::DB_FILE);
    let conn = rusqlite::Connection::open(&db_path).map_err(|e| e.to_string())?;

    queries::update_task(&conn, id, &patch)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "Task not found".to_string())
}

/// Debounced variant of `update_task` used while the user is typing.
#[tauri::command]
pub async fn queue_task_autosave(
    app_handle: AppHandle,
    id: i64,
    patch: UpdateTaskRequest,
) -> Result<(), String> {
    let data_dir = app_handle.path().app_data_dir().map_err(|e| e.to_string())?;
    let db_path = data_dir.join(database::DB_FILE);

    autosave::task_autosaver().queue(id, move || {
        let conn = match rusqlite::Connection::open(&db_path) {
            Ok(conn) => conn,
            Err(e) => {
                log::error!("Task auto-save failed to open database: {}", e);
                return;
            }
        };
        if let Err(e) = queries::update_task(&conn, id, &patch) {
            log::error!("Task auto-save failed for task {}: {}", id, e);
        }
    });

    Ok(())
}

#[tauri::command]
pub async fn cancel_task_autosave(id: i64) -> Result<(), String> {
    autosave::task_autosaver().cancel(id);
    Ok(())
}

#[tauri::command]
pub async fn delete_task(app_handle: AppHandle, id: i64) -> Result<(), String> {
    autosave::task_autosaver().cancel(id);

    let data_dir = app_handle.path().app_data_dir().map_err(|e| e.to_string())?;
    let db_path = data_dir.join(database::DB_FILE);
    let conn = rusqlite::Connection::open(&db_path).map_err(|e| e.to_string())?;

    queries::soft_delete_task(&conn, id).map_err(|e| e.to_string())
}
