use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyReport {
    pub id: i64,
    /// Monday of the covered week, as "YYYY-MM-DD".
    pub week_start: String,
    pub content: String,
    /// "ai" when the content came from the model, "local" for the fallback.
    pub source: String,
    pub created_at: i64,
}
