use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

use crate::models::{
    CreateDiaryEntryRequest, CreateTaskRequest, DiaryEntry, DiaryImage, ExtractedInfo, Priority,
    Task, TaskStatus, UpdateTaskRequest, WeeklyReport,
};

// ─── Tasks ───

fn map_task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let priority: String = row.get(3)?;
    let status: String = row.get(5)?;
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        priority: Priority::from_str(&priority).unwrap_or_default(),
        deadline: row.get(4)?,
        status: TaskStatus::from_str(&status).unwrap_or_default(),
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        completed_at: row.get(8)?,
        deleted: row.get::<_, i64>(9)? != 0,
    })
}

const TASK_COLUMNS: &str =
    "id, title, description, priority, deadline, status, created_at, updated_at, completed_at, deleted";

pub fn insert_task(conn: &Connection, req: &CreateTaskRequest) -> Result<Task> {
    let now = chrono::Utc::now().timestamp();
    conn.execute(
        "INSERT INTO tasks (title, description, priority, deadline, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 'not_started', ?5, ?5)",
        rusqlite::params![
            req.title,
            req.description,
            req.priority.as_str(),
            req.deadline,
            now
        ],
    )?;
    let id = conn.last_insert_rowid();
    Ok(Task {
        id,
        title: req.title.clone(),
        description: req.description.clone(),
        priority: req.priority,
        deadline: req.deadline.clone(),
        status: TaskStatus::NotStarted,
        created_at: now,
        updated_at: now,
        completed_at: None,
        deleted: false,
    })
}

pub fn get_task(conn: &Connection, id: i64) -> Result<Option<Task>> {
    let task = conn
        .query_row(
            &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
            [id],
            map_task_row,
        )
        .optional()?;
    Ok(task)
}

/// Live (not soft-deleted) tasks, newest first. `status` narrows the result.
pub fn get_tasks(conn: &Connection, status: Option<TaskStatus>, limit: Option<i32>) -> Result<Vec<Task>> {
    let limit_clause = limit.map(|l| format!("LIMIT {}", l)).unwrap_or_default();
    let query = format!(
        "SELECT {} FROM tasks
         WHERE deleted = 0 AND (?1 IS NULL OR status = ?1)
         ORDER BY created_at DESC
         {}",
        TASK_COLUMNS, limit_clause
    );

    let mut stmt = conn.prepare(&query)?;
    let tasks = stmt
        .query_map([status.map(|s| s.as_str())], map_task_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tasks)
}

/// Apply a partial update; returns the updated task, or None if it no longer exists.
pub fn update_task(conn: &Connection, id: i64, patch: &UpdateTaskRequest) -> Result<Option<Task>> {
    let Some(mut task) = get_task(conn, id)? else {
        return Ok(None);
    };

    if let Some(title) = &patch.title {
        task.title = title.clone();
    }
    if let Some(description) = &patch.description {
        task.description = Some(description.clone());
    }
    if let Some(priority) = patch.priority {
        task.priority = priority;
    }
    if let Some(deadline) = &patch.deadline {
        task.deadline = if deadline.trim().is_empty() {
            None
        } else {
            Some(deadline.clone())
        };
    }
    if let Some(status) = patch.status {
        task.status = status;
    }

    let now = chrono::Utc::now().timestamp();
    task.updated_at = now;
    task.completed_at = if task.status == TaskStatus::Completed {
        task.completed_at.or(Some(now))
    } else {
        None
    };

    conn.execute(
        "UPDATE tasks SET title = ?1, description = ?2, priority = ?3, deadline = ?4,
                status = ?5, updated_at = ?6, completed_at = ?7
         WHERE id = ?8",
        rusqlite::params![
            task.title,
            task.description,
            task.priority.as_str(),
            task.deadline,
            task.status.as_str(),
            task.updated_at,
            task.completed_at,
            id
        ],
    )?;

    Ok(Some(task))
}

pub fn soft_delete_task(conn: &Connection, id: i64) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    conn.execute(
        "UPDATE tasks SET deleted = 1, updated_at = ?1 WHERE id = ?2",
        rusqlite::params![now, id],
    )?;
    Ok(())
}

// ─── Diary ───

fn map_diary_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DiaryEntry> {
    let tags_json: Option<String> = row.get(4)?;
    let tags: Vec<String> = tags_json
        .and_then(|t| serde_json::from_str(&t).ok())
        .unwrap_or_default();
    Ok(DiaryEntry {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        mood: row.get(3)?,
        tags,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        deleted: row.get::<_, i64>(7)? != 0,
    })
}

const DIARY_COLUMNS: &str = "id, title, content, mood, tags, created_at, updated_at, deleted";

pub fn insert_diary_entry(conn: &Connection, req: &CreateDiaryEntryRequest) -> Result<DiaryEntry> {
    let now = chrono::Utc::now().timestamp();
    let tags = req.tags.clone().unwrap_or_default();
    let tags_json = serde_json::to_string(&tags)?;
    conn.execute(
        "INSERT INTO diary_entries (title, content, mood, tags, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        rusqlite::params![req.title, req.content, req.mood, tags_json, now],
    )?;
    Ok(DiaryEntry {
        id: conn.last_insert_rowid(),
        title: req.title.clone(),
        content: req.content.clone(),
        mood: req.mood.clone(),
        tags,
        created_at: now,
        updated_at: now,
        deleted: false,
    })
}

pub fn get_diary_entry(conn: &Connection, id: i64) -> Result<Option<DiaryEntry>> {
    let entry = conn
        .query_row(
            &format!("SELECT {} FROM diary_entries WHERE id = ?1", DIARY_COLUMNS),
            [id],
            map_diary_row,
        )
        .optional()?;
    Ok(entry)
}

pub fn get_diary_entries(
    conn: &Connection,
    from: Option<i64>,
    to: Option<i64>,
    limit: Option<i32>,
) -> Result<Vec<DiaryEntry>> {
    let limit_clause = limit.map(|l| format!("LIMIT {}", l)).unwrap_or_default();
    let query = format!(
        "SELECT {} FROM diary_entries
         WHERE deleted = 0
         AND (?1 IS NULL OR created_at >= ?1)
         AND (?2 IS NULL OR created_at <= ?2)
         ORDER BY created_at DESC
         {}",
        DIARY_COLUMNS, limit_clause
    );

    let mut stmt = conn.prepare(&query)?;
    let entries = stmt
        .query_map([from, to], map_diary_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

pub fn update_diary_entry(
    conn: &Connection,
    id: i64,
    title: Option<String>,
    content: Option<String>,
    mood: Option<String>,
    tags: Option<Vec<String>>,
) -> Result<Option<DiaryEntry>> {
    let Some(mut entry) = get_diary_entry(conn, id)? else {
        return Ok(None);
    };

    if let Some(title) = title {
        entry.title = title;
    }
    if let Some(content) = content {
        entry.content = content;
    }
    if let Some(mood) = mood {
        entry.mood = if mood.trim().is_empty() { None } else { Some(mood) };
    }
    if let Some(tags) = tags {
        entry.tags = tags;
    }
    entry.updated_at = chrono::Utc::now().timestamp();

    let tags_json = serde_json::to_string(&entry.tags)?;
    conn.execute(
        "UPDATE diary_entries SET title = ?1, content = ?2, mood = ?3, tags = ?4, updated_at = ?5
         WHERE id = ?6",
        rusqlite::params![entry.title, entry.content, entry.mood, tags_json, entry.updated_at, id],
    )?;

    Ok(Some(entry))
}

pub fn soft_delete_diary_entry(conn: &Connection, id: i64) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    conn.execute(
        "UPDATE diary_entries SET deleted = 1, updated_at = ?1 WHERE id = ?2",
        rusqlite::params![now, id],
    )?;
    Ok(())
}

pub fn insert_diary_image(conn: &Connection, entry_id: i64, file_name: &str) -> Result<DiaryImage> {
    let now = chrono::Utc::now().timestamp();
    conn.execute(
        "INSERT INTO diary_images (entry_id, file_name, created_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![entry_id, file_name, now],
    )?;
    Ok(DiaryImage {
        id: conn.last_insert_rowid(),
        entry_id,
        file_name: file_name.to_string(),
        created_at: now,
    })
}

pub fn get_diary_images(conn: &Connection, entry_id: i64) -> Result<Vec<DiaryImage>> {
    let mut stmt = conn.prepare(
        "SELECT id, entry_id, file_name, created_at
         FROM diary_images WHERE entry_id = ?1 ORDER BY created_at ASC",
    )?;
    let images = stmt
        .query_map([entry_id], |row| {
            Ok(DiaryImage {
                id: row.get(0)?,
                entry_id: row.get(1)?,
                file_name: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(images)
}

// ─── Extracted info ───

pub fn get_extracted_info(conn: &Connection, conversation_id: &str) -> Result<Option<ExtractedInfo>> {
    let info = conn
        .query_row(
            "SELECT events, people, locations, todos, dismissed_todos
             FROM extracted_info WHERE conversation_id = ?1",
            [conversation_id],
            |row| {
                let events: String = row.get(0)?;
                let people: String = row.get(1)?;
                let locations: String = row.get(2)?;
                let todos: String = row.get(3)?;
                let dismissed: String = row.get(4)?;
                Ok((events, people, locations, todos, dismissed))
            },
        )
        .optional()?;

    Ok(info.map(|(events, people, locations, todos, dismissed)| ExtractedInfo {
        events: serde_json::from_str(&events).unwrap_or_default(),
        people: serde_json::from_str(&people).unwrap_or_default(),
        locations: serde_json::from_str(&locations).unwrap_or_default(),
        todos: serde_json::from_str(&todos).unwrap_or_default(),
        dismissed_todos: serde_json::from_str(&dismissed).unwrap_or_default(),
    }))
}

pub fn upsert_extracted_info(conn: &Connection, conversation_id: &str, info: &ExtractedInfo) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    conn.execute(
        "INSERT INTO extracted_info (conversation_id, events, people, locations, todos, dismissed_todos, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(conversation_id) DO UPDATE SET
            events = excluded.events,
            people = excluded.people,
            locations = excluded.locations,
            todos = excluded.todos,
            dismissed_todos = excluded.dismissed_todos,
            updated_at = excluded.updated_at",
        rusqlite::params![
            conversation_id,
            serde_json::to_string(&info.events)?,
            serde_json::to_string(&info.people)?,
            serde_json::to_string(&info.locations)?,
            serde_json::to_string(&info.todos)?,
            serde_json::to_string(&info.dismissed_todos)?,
            now
        ],
    )?;
    Ok(())
}

// ─── Weekly reports ───

pub fn upsert_weekly_report(
    conn: &Connection,
    week_start: &str,
    content: &str,
    source: &str,
) -> Result<WeeklyReport> {
    let now = chrono::Utc::now().timestamp();
    conn.execute(
        "INSERT INTO weekly_reports (week_start, content, source, created_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(week_start) DO UPDATE SET
            content = excluded.content,
            source = excluded.source,
            created_at = excluded.created_at",
        rusqlite::params![week_start, content, source, now],
    )?;

    let report = conn.query_row(
        "SELECT id, week_start, content, source, created_at
         FROM weekly_reports WHERE week_start = ?1",
        [week_start],
        |row| {
            Ok(WeeklyReport {
                id: row.get(0)?,
                week_start: row.get(1)?,
                content: row.get(2)?,
                source: row.get(3)?,
                created_at: row.get(4)?,
            })
        },
    )?;
    Ok(report)
}

pub fn list_weekly_reports(conn: &Connection, limit: Option<i32>) -> Result<Vec<WeeklyReport>> {
    let limit_clause = limit.map(|l| format!("LIMIT {}", l)).unwrap_or_default();
    let query = format!(
        "SELECT id, week_start, content, source, created_at
         FROM weekly_reports ORDER BY week_start DESC {}",
        limit_clause
    );
    let mut stmt = conn.prepare(&query)?;
    let reports = stmt
        .query_map([], |row| {
            Ok(WeeklyReport {
                id: row.get(0)?,
                week_start: row.get(1)?,
                content: row.get(2)?,
                source: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(reports)
}
