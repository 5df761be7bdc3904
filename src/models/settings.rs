use serde::{Deserialize, Serialize};

/// Operating mode. Traditional keeps the app fully offline; AI mode enables
/// chat, extraction, diary drafts and weekly reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppMode {
    #[default]
    Traditional,
    Ai,
}

impl AppMode {
    pub fn is_ai(&self) -> bool {
        matches!(self, AppMode::Ai)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub version: String,
    pub general: GeneralSettings,
    pub ai: AISettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            general: GeneralSettings::default(),
            ai: AISettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSettings {
    pub language: String,
    pub theme: String,
    #[serde(default)]
    pub mode: AppMode,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            language: "zh-CN".to_string(),
            theme: "light".to_string(),
            mode: AppMode::Traditional,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AISettings {
    pub enabled: bool,
    pub provider: String,
    pub api_base: String,
    pub api_key: String,
    pub model: String,
}

impl Default for AISettings {
    fn default() -> Self {
        let env_key = std::env::var("DEEPSEEK_API_KEY").unwrap_or_default();
        Self {
            enabled: true,
            provider: "deepseek".to_string(),
            api_base: "https://api.deepseek.com/v1".to_string(),
            api_key: env_key,
            model: "deepseek-chat".to_string(),
        }
    }
}
