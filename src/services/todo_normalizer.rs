//! Canonicalization and dedup of AI-suggested todo items.
//!
//! Suggestions carry two identities: a full key over (title, due date,
//! priority) for exact-duplicate detection, and a coarser title key so the
//! same task title with a different date or priority is still treated as a
//! duplicate. Dismissals and existing tasks suppress suggestions under both
//! granularities. Everything here is pure: no I/O, no hidden state.

use std::collections::HashSet;

use crate::models::{CreateTaskRequest, Priority, Task, TodoSuggestion};

/// Field delimiter inside a full key. Titles containing this character can
/// collide; acceptable for a single user's diary-scale data.
pub const KEY_DELIMITER: char = '|';

/// Placeholder strings the AI layer emits when it could not determine a date.
const UNKNOWN_DATE_SENTINELS: [&str; 2] = ["未知", "unknown"];

// ─── Canonicalization ───

/// Empty string when the raw value is missing, blank, or the "unknown"
/// sentinel; the trimmed string otherwise. No format validation happens here.
pub fn normalize_due_date(raw: Option<&str>) -> String {
    let trimmed = raw.unwrap_or("").trim();
    if trimmed.is_empty() || UNKNOWN_DATE_SENTINELS.contains(&trimmed) {
        return String::new();
    }
    trimmed.to_string()
}

/// Exact valid values pass through; everything else becomes medium.
pub fn normalize_priority(raw: Option<&str>) -> Priority {
    raw.and_then(|p| Priority::from_str(p.trim())).unwrap_or_default()
}

pub fn build_key(title: &str, due_date: &str, priority: Priority) -> String {
    format!(
        "{}{}{}{}{}",
        title.trim(),
        KEY_DELIMITER,
        due_date,
        KEY_DELIMITER,
        priority.as_str()
    )
}

pub fn build_title_key(title: &str) -> String {
    title.trim().to_lowercase()
}

pub fn suggestion_key(suggestion: &TodoSuggestion) -> String {
    build_key(&suggestion.title, &suggestion.due_date, suggestion.priority)
}

pub fn suggestion_title_key(suggestion: &TodoSuggestion) -> String {
    build_title_key(&suggestion.title)
}

/// Build a well-formed suggestion from raw AI output fields.
pub fn normalize_fields(
    title: &str,
    due_date: Option<&str>,
    priority: Option<&str>,
    notes: Option<String>,
) -> TodoSuggestion {
    TodoSuggestion {
        title: title.trim().to_string(),
        due_date: normalize_due_date(due_date),
        priority: normalize_priority(priority),
        notes: notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
    }
}

/// Re-canonicalize a suggestion that may have arrived denormalized
/// (untrimmed title, sentinel date) from storage or the UI.
pub fn normalize(suggestion: &TodoSuggestion) -> TodoSuggestion {
    TodoSuggestion {
        title: suggestion.title.trim().to_string(),
        due_date: normalize_due_date(Some(&suggestion.due_date)),
        priority: suggestion.priority,
        notes: suggestion
            .notes
            .clone()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()),
    }
}

// ─── Identity sets ───

/// Title keys implied by a dismissal set. A full key's title is everything
/// before the first delimiter; entries that are already bare title keys map
/// to themselves.
pub fn dismissal_title_keys(dismissed: &HashSet<String>) -> HashSet<String> {
    dismissed
        .iter()
        .map(|key| build_title_key(key.split(KEY_DELIMITER).next().unwrap_or(key)))
        .collect()
}

/// Full keys and title keys of all live tasks.
pub fn task_keys(tasks: &[Task]) -> (HashSet<String>, HashSet<String>) {
    let mut keys = HashSet::new();
    let mut title_keys = HashSet::new();
    for task in tasks.iter().filter(|t| !t.deleted) {
        let due = normalize_due_date(task.deadline.as_deref());
        keys.insert(build_key(&task.title, &due, task.priority));
        title_keys.insert(build_title_key(&task.title));
    }
    (keys, title_keys)
}

// ─── Filtering / merging ───

/// A suggestion may be shown or promoted only when its title is non-empty
/// and neither of its identities matches a dismissal or an existing task.
pub fn is_eligible(
    suggestion: &TodoSuggestion,
    dismissed_keys: &HashSet<String>,
    dismissed_title_keys: &HashSet<String>,
    task_keys: &HashSet<String>,
    task_title_keys: &HashSet<String>,
) -> bool {
    if suggestion.title.trim().is_empty() {
        return false;
    }
    let key = suggestion_key(suggestion);
    let title_key = suggestion_title_key(suggestion);
    if dismissed_keys.contains(&key) || dismissed_title_keys.contains(&title_key) {
        return false;
    }
    if task_keys.contains(&key) || task_title_keys.contains(&title_key) {
        return false;
    }
    true
}

/// Merge a fresh extraction pass into the pending list.
///
/// Existing pending entries come first (pruned of anything dismissed or
/// promoted since they were stored), then incoming entries that introduce a
/// new full key AND a new title key. Relative order within each source is
/// preserved. Re-running the merge on its own output with empty `incoming`
/// returns the same list.
pub fn merge_suggestions(
    existing_pending: &[TodoSuggestion],
    incoming: &[TodoSuggestion],
    dismissed: &HashSet<String>,
    task_keys: &HashSet<String>,
    task_title_keys: &HashSet<String>,
) -> Vec<TodoSuggestion> {
    let dismissed_title_keys = dismissal_title_keys(dismissed);
    let mut seen_keys: HashSet<String> = HashSet::new();
    let mut seen_title_keys: HashSet<String> = HashSet::new();
    let mut merged = Vec::new();

    for source in [existing_pending, incoming] {
        for raw in source {
            let suggestion = normalize(raw);
            if !is_eligible(
                &suggestion,
                dismissed,
                &dismissed_title_keys,
                task_keys,
                task_title_keys,
            ) {
                continue;
            }
            let key = suggestion_key(&suggestion);
            let title_key = suggestion_title_key(&suggestion);
            if seen_keys.contains(&key) || seen_title_keys.contains(&title_key) {
                continue;
            }
            seen_keys.insert(key);
            seen_title_keys.insert(title_key);
            merged.push(suggestion);
        }
    }

    merged
}

// ─── Dismissal / promotion ───

/// Keys a dismissal of this suggestion contributes: the full key and the
/// title key. A blank-title suggestion contributes nothing.
pub fn dismissal_additions(suggestion: &TodoSuggestion) -> Vec<String> {
    let normalized = normalize(suggestion);
    if normalized.title.is_empty() {
        return Vec::new();
    }
    vec![suggestion_key(&normalized), suggestion_title_key(&normalized)]
}

pub fn dismiss(suggestion: &TodoSuggestion, dismissed: &mut HashSet<String>) {
    for key in dismissal_additions(suggestion) {
        dismissed.insert(key);
    }
}

/// Map a suggestion onto a task-creation request plus the dismissal keys to
/// record alongside it. The caller must commit both together: if task
/// creation fails, the additions are discarded and the suggestion stays
/// pending for retry.
pub fn promote(suggestion: &TodoSuggestion) -> (CreateTaskRequest, Vec<String>) {
    let normalized = normalize(suggestion);
    let request = CreateTaskRequest {
        title: normalized.title.clone(),
        description: normalized.notes.clone(),
        priority: normalized.priority,
        deadline: if normalized.due_date.is_empty() {
            None
        } else {
            Some(normalized.due_date.clone())
        },
    };
    let additions = dismissal_additions(&normalized);
    (request, additions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskStatus;

    fn suggestion(title: &str, due_date: &str, priority: Priority) -> TodoSuggestion {
        TodoSuggestion {
            title: title.to_string(),
            due_date: due_date.to_string(),
            priority,
            notes: None,
        }
    }

    fn task(title: &str, deadline: Option<&str>, priority: Priority) -> Task {
        Task {
            id: 1,
            title: title.to_string(),
            description: None,
            priority,
            deadline: deadline.map(|d| d.to_string()),
            status: TaskStatus::NotStarted,
            created_at: 0,
            updated_at: 0,
            completed_at: None,
            deleted: false,
        }
    }

    fn empty_sets() -> (HashSet<String>, HashSet<String>, HashSet<String>, HashSet<String>) {
        (HashSet::new(), HashSet::new(), HashSet::new(), HashSet::new())
    }

    #[test]
    fn due_date_sentinels_normalize_to_empty() {
        assert_eq!(normalize_due_date(Some("未知")), "");
        assert_eq!(normalize_due_date(Some("unknown")), "");
        assert_eq!(normalize_due_date(Some("")), "");
        assert_eq!(normalize_due_date(Some("   ")), "");
        assert_eq!(normalize_due_date(None), "");
        assert_eq!(normalize_due_date(Some(" 2024-05-01 ")), "2024-05-01");
    }

    #[test]
    fn priority_falls_back_to_medium() {
        assert_eq!(normalize_priority(Some("bogus")), Priority::Medium);
        assert_eq!(normalize_priority(None), Priority::Medium);
        assert_eq!(normalize_priority(Some("low")), Priority::Low);
        assert_eq!(normalize_priority(Some("medium")), Priority::Medium);
        assert_eq!(normalize_priority(Some("high")), Priority::High);
        assert_eq!(normalize_priority(Some("urgent")), Priority::Urgent);
    }

    #[test]
    fn keys_are_stable_and_trimmed() {
        let key = build_key("  买牛奶 ", "", Priority::Medium);
        assert_eq!(key, "买牛奶||medium");
        assert_eq!(key, build_key("  买牛奶 ", "", Priority::Medium));
        assert_eq!(build_title_key("  Buy Milk "), "buy milk");

        let s = suggestion("买牛奶", "未知", Priority::Medium);
        assert_eq!(suggestion_key(&normalize(&s)), "买牛奶||medium");
    }

    #[test]
    fn blank_title_is_never_eligible() {
        let (d, dt, tk, ttk) = empty_sets();
        let s = suggestion("   ", "2024-05-01", Priority::High);
        assert!(!is_eligible(&s, &d, &dt, &tk, &ttk));
    }

    #[test]
    fn dismissal_suppresses_exact_and_title_variants() {
        let s = suggestion("买牛奶", "未知", Priority::Medium);
        let mut dismissed = HashSet::new();
        dismiss(&normalize(&s), &mut dismissed);
        assert!(dismissed.contains("买牛奶||medium"));
        assert!(dismissed.contains("买牛奶"));

        // Identical suggestion is excluded...
        let merged = merge_suggestions(&[], &[s.clone()], &dismissed, &HashSet::new(), &HashSet::new());
        assert!(merged.is_empty());

        // ...and so is a variant with a concrete date.
        let variant = suggestion("买牛奶", "2024-06-01", Priority::Medium);
        let merged = merge_suggestions(&[], &[variant], &dismissed, &HashSet::new(), &HashSet::new());
        assert!(merged.is_empty());
    }

    #[test]
    fn existing_task_suppresses_by_title_key() {
        let tasks = vec![task("买牛奶", Some("2024-07-01"), Priority::Low)];
        let (keys, title_keys) = task_keys(&tasks);

        let s = suggestion("买牛奶", "未知", Priority::Urgent);
        let dismissed = HashSet::new();
        let dismissed_titles = dismissal_title_keys(&dismissed);
        assert!(!is_eligible(&normalize(&s), &dismissed, &dismissed_titles, &keys, &title_keys));
    }

    #[test]
    fn deleted_tasks_do_not_suppress() {
        let mut gone = task("买牛奶", None, Priority::Medium);
        gone.deleted = true;
        let (keys, title_keys) = task_keys(&[gone]);
        assert!(keys.is_empty());
        assert!(title_keys.is_empty());
    }

    #[test]
    fn merge_prefers_existing_order_then_incoming() {
        let existing = vec![
            suggestion("买牛奶", "未知", Priority::Medium),
            suggestion("回电话", "2024-05-02", Priority::High),
        ];
        let incoming = vec![
            suggestion("买牛奶", "未知", Priority::Medium),
            suggestion("订机票", "未知", Priority::Urgent),
        ];

        let merged = merge_suggestions(
            &existing,
            &incoming,
            &HashSet::new(),
            &HashSet::new(),
            &HashSet::new(),
        );

        let titles: Vec<&str> = merged.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["买牛奶", "回电话", "订机票"]);
        assert_eq!(merged[0].priority, Priority::Medium);
        assert_eq!(merged[1].due_date, "2024-05-02");
        assert_eq!(merged[2].priority, Priority::Urgent);
    }

    #[test]
    fn merge_is_idempotent() {
        let existing = vec![
            suggestion("买牛奶", "未知", Priority::Medium),
            suggestion("回电话", "2024-05-02", Priority::High),
        ];
        let incoming = vec![suggestion("订机票", "未知", Priority::Urgent)];
        let (d, _, tk, ttk) = empty_sets();

        let once = merge_suggestions(&existing, &incoming, &d, &tk, &ttk);
        let twice = merge_suggestions(&once, &[], &d, &tk, &ttk);
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_drops_near_duplicates_within_incoming() {
        // Same title, different date/priority: only the first survives.
        let incoming = vec![
            suggestion("交房租", "2024-05-01", Priority::High),
            suggestion("交房租", "未知", Priority::Medium),
        ];
        let (d, _, tk, ttk) = empty_sets();
        let merged = merge_suggestions(&[], &incoming, &d, &tk, &ttk);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].due_date, "2024-05-01");
    }

    #[test]
    fn merge_prunes_stale_pending_entries() {
        let pending = vec![
            suggestion("买牛奶", "未知", Priority::Medium),
            suggestion("回电话", "2024-05-02", Priority::High),
        ];
        // "买牛奶" was dismissed since the pending list was stored.
        let mut dismissed = HashSet::new();
        dismiss(&pending[0], &mut dismissed);

        let merged = merge_suggestions(&pending, &[], &dismissed, &HashSet::new(), &HashSet::new());
        let titles: Vec<&str> = merged.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["回电话"]);
    }

    #[test]
    fn promote_maps_fields_and_returns_additions() {
        let s = TodoSuggestion {
            title: " 订机票 ".to_string(),
            due_date: "2024-06-01".to_string(),
            priority: Priority::Urgent,
            notes: Some("去上海".to_string()),
        };
        let (request, additions) = promote(&s);
        assert_eq!(request.title, "订机票");
        assert_eq!(request.description.as_deref(), Some("去上海"));
        assert_eq!(request.priority, Priority::Urgent);
        assert_eq!(request.deadline.as_deref(), Some("2024-06-01"));
        assert_eq!(additions, vec!["订机票|2024-06-01|urgent".to_string(), "订机票".to_string()]);

        // No date determined → no deadline on the task.
        let undated = suggestion("买牛奶", "未知", Priority::Medium);
        let (request, _) = promote(&undated);
        assert!(request.deadline.is_none());
    }

    #[test]
    fn promotion_without_recorded_dismissal_keeps_suggestion_eligible() {
        // Task creation failed: the caller discards the additions, so the
        // suggestion must still be eligible on retry.
        let s = suggestion("订机票", "未知", Priority::Urgent);
        let (_, additions) = promote(&s);
        let (d, dt, tk, ttk) = empty_sets();
        assert!(is_eligible(&normalize(&s), &d, &dt, &tk, &ttk));

        // Task creation succeeded: recording the additions suppresses it.
        let mut dismissed = HashSet::new();
        dismissed.extend(additions);
        let merged = merge_suggestions(&[], &[s], &dismissed, &tk, &ttk);
        assert!(merged.is_empty());
    }

    #[test]
    fn dismissal_of_blank_title_contributes_nothing() {
        let s = suggestion("  ", "2024-05-01", Priority::Low);
        assert!(dismissal_additions(&s).is_empty());

        let mut dismissed = HashSet::new();
        dismiss(&s, &mut dismissed);
        assert!(dismissed.is_empty());
    }

    #[test]
    fn dismissal_insertion_is_idempotent() {
        let s = suggestion("买牛奶", "未知", Priority::Medium);
        let mut dismissed = HashSet::new();
        dismiss(&s, &mut dismissed);
        let snapshot = dismissed.clone();
        dismiss(&s, &mut dismissed);
        assert_eq!(dismissed, snapshot);
    }
}
