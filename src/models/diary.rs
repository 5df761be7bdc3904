use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiaryEntry {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub mood: Option<String>,
    pub tags: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted: bool,
}

/// File-based image attachment; the file lives under `attachments/` in the
/// app data dir and `file_name` is its name inside that directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiaryImage {
    pub id: i64,
    pub entry_id: i64,
    pub file_name: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDiaryEntryRequest {
    pub title: String,
    pub content: String,
    pub mood: Option<String>,
    pub tags: Option<Vec<String>>,
}
