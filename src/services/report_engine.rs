//! AI-written weekly reports over diary entries and tasks, with a local
//! fallback when AI is unavailable or the call fails.

use std::path::Path;

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use rusqlite::Connection;

use crate::database::{self, queries};
use crate::models::{DiaryEntry, Settings, Task, TaskStatus, WeeklyReport};
use crate::services::ai_provider::{self, ChatMessage};
use crate::utils::config;

const REPORT_SYSTEM_PROMPT: &str = r#"You write a personal weekly review for a diary app user.
You receive the week's diary entries and task activity. Write in the user's language.
Structure: a short overall reflection, what got done, what is still open, and one gentle suggestion for next week.
Keep it under 400 words. Output plain text only (no markdown)."#;

/// Monday..Sunday window containing `reference`.
pub fn week_bounds(reference: NaiveDate) -> (NaiveDate, NaiveDate) {
    let days_from_monday = reference.weekday().num_days_from_monday() as i64;
    let start = reference - Duration::days(days_from_monday);
    (start, start + Duration::days(6))
}

fn local_timestamp(date: NaiveDate, time: NaiveTime) -> i64 {
    Local
        .from_local_datetime(&NaiveDateTime::new(date, time))
        .single()
        .map(|dt| dt.timestamp())
        .unwrap_or_default()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let end = text
        .char_indices()
        .nth(max_chars)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    format!("{}...", &text[..end])
}

struct WeekContext {
    entries: Vec<DiaryEntry>,
    completed: Vec<Task>,
    open: Vec<Task>,
}

fn build_week_context(
    conn: &Connection,
    start_ts: i64,
    end_ts: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<WeekContext, String> {
    let entries =
        queries::get_diary_entries(conn, Some(start_ts), Some(end_ts), None).map_err(|e| e.to_string())?;

    let tasks = queries::get_tasks(conn, None, None).map_err(|e| e.to_string())?;
    let in_window = |deadline: &Option<String>| {
        deadline
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .map(|d| d >= start && d <= end)
            .unwrap_or(false)
    };

    let (completed, open): (Vec<Task>, Vec<Task>) = tasks
        .into_iter()
        .filter(|t| {
            let completed_this_week = t
                .completed_at
                .map(|ts| ts >= start_ts && ts <= end_ts)
                .unwrap_or(false);
            completed_this_week || (t.status != TaskStatus::Completed && in_window(&t.deadline))
        })
        .partition(|t| t.status == TaskStatus::Completed);

    Ok(WeekContext { entries, completed, open })
}

fn build_report_prompt(context: &WeekContext, start: NaiveDate, end: NaiveDate) -> String {
    let mut prompt = format!("Week: {} to {}\n\nDiary entries:\n", start, end);
    if context.entries.is_empty() {
        prompt.push_str("(none)\n");
    }
    for entry in &context.entries {
        let day = Local
            .timestamp_opt(entry.created_at, 0)
            .single()
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        prompt.push_str(&format!(
            "- [{}] {}: {}\n",
            day,
            entry.title,
            truncate_chars(&entry.content, 300)
        ));
    }

    prompt.push_str("\nCompleted tasks:\n");
    if context.completed.is_empty() {
        prompt.push_str("(none)\n");
    }
    for task in &context.completed {
        prompt.push_str(&format!("- {}\n", task.title));
    }

    prompt.push_str("\nOpen tasks due this week:\n");
    if context.open.is_empty() {
        prompt.push_str("(none)\n");
    }
    for task in &context.open {
        prompt.push_str(&format!(
            "- {} (due {})\n",
            task.title,
            task.deadline.as_deref().unwrap_or("?")
        ));
    }

    prompt
}

fn fallback_report_content(context: &WeekContext, start: NaiveDate, end: NaiveDate) -> String {
    let mut content = format!(
        "本周回顾 {} ~ {}\n写了 {} 篇日记，完成 {} 个任务，还有 {} 个任务待处理。\n",
        start,
        end,
        context.entries.len(),
        context.completed.len(),
        context.open.len()
    );
    if !context.completed.is_empty() {
        let titles: Vec<&str> = context.completed.iter().map(|t| t.title.as_str()).collect();
        content.push_str(&format!("已完成：{}\n", titles.join("、")));
    }
    if !context.open.is_empty() {
        let titles: Vec<&str> = context.open.iter().map(|t| t.title.as_str()).collect();
        content.push_str(&format!("待处理：{}\n", titles.join("、")));
    }
    content
}

/// Generate (or regenerate) the report for the week containing `week_start`,
/// defaulting to the current week.
pub async fn generate_weekly_report(
    data_dir: &Path,
    week_start: Option<String>,
    settings: &Settings,
) -> Result<WeeklyReport, String> {
    let reference = match week_start.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|e| format!("Invalid week start date: {}", e))?,
        None => Local::now().date_naive(),
    };
    let (start, end) = week_bounds(reference);
    let start_ts = local_timestamp(start, NaiveTime::MIN);
    let end_ts = local_timestamp(end + Duration::days(1), NaiveTime::MIN) - 1;

    let db_path = data_dir.join(database::DB_FILE);
    let context = {
        let conn = Connection::open(&db_path).map_err(|e| e.to_string())?;
        build_week_context(&conn, start_ts, end_ts, start, end)?
    };

    let api_key = config::resolve_api_key(&settings.ai.api_key);
    let ai_available = settings.general.mode.is_ai() && settings.ai.enabled && !api_key.is_empty();

    let (content, source) = if ai_available {
        let messages = vec![
            ChatMessage {
                role: "system".to_string(),
                content: REPORT_SYSTEM_PROMPT.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: build_report_prompt(&context, start, end),
            },
        ];
        match ai_provider::chat_completion(&settings.ai, &messages, 0.3, 1200).await {
            Ok(text) => (text, "ai"),
            Err(e) => {
                log::warn!("AI weekly report failed, falling back to local: {}", e);
                let fallback = format!(
                    "{}\n(AI Report Failed: {})",
                    fallback_report_content(&context, start, end),
                    e
                );
                (fallback, "local")
            }
        }
    } else {
        (fallback_report_content(&context, start, end), "local")
    };

    let conn = Connection::open(&db_path).map_err(|e| e.to_string())?;
    queries::upsert_weekly_report(&conn, &start.format("%Y-%m-%d").to_string(), &content, source)
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;

    #[test]
    fn week_bounds_snap_to_monday() {
        // 2024-05-01 is a Wednesday.
        let (start, end) = week_bounds(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 4, 29).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 5, 5).unwrap());

        // A Monday maps to itself.
        let (start, _) = week_bounds(NaiveDate::from_ymd_opt(2024, 4, 29).unwrap());
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 4, 29).unwrap());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("今天天气很好", 3), "今天天...");
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[test]
    fn fallback_report_counts_the_week() {
        let start = NaiveDate::from_ymd_opt(2024, 4, 29).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 5, 5).unwrap();
        let context = WeekContext {
            entries: vec![],
            completed: vec![Task {
                id: 1,
                title: "买牛奶".to_string(),
                description: None,
                priority: Priority::Medium,
                deadline: None,
                status: TaskStatus::Completed,
                created_at: 0,
                updated_at: 0,
                completed_at: Some(1),
                deleted: false,
            }],
            open: vec![],
        };
        let content = fallback_report_content(&context, start, end);
        assert!(content.contains("写了 0 篇日记"));
        assert!(content.contains("完成 1 个任务"));
        assert!(content.contains("买牛奶"));
    }
}
