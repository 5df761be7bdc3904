//! Thin adapter over an OpenAI-compatible chat completions API.

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use crate::models::AISettings;
use crate::services::network_guard;
use crate::utils::config;

// ─── Types ───

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatRecvMessage,
}

#[derive(Deserialize)]
struct ChatRecvMessage {
    content: Option<String>,
}

// For streaming
#[derive(Deserialize)]
struct ChatStreamResponse {
    choices: Vec<ChatStreamChoice>,
}

#[derive(Deserialize)]
struct ChatStreamChoice {
    delta: ChatStreamDelta,
}

#[derive(Deserialize)]
struct ChatStreamDelta {
    content: Option<String>,
}

pub const CHAT_SYSTEM_PROMPT: &str = r#"You are Smart Diary's companion — a warm, attentive assistant inside a personal journaling app.
The user talks to you about their day, plans and feelings. Respond conversationally in the user's language.
Keep answers short and personal; this is a diary, not a search engine.
When the user mentions concrete plans or commitments, acknowledge them naturally — a separate extraction step turns them into to-do suggestions, so do not output lists of action items yourself.
Output plain text only (no markdown, no **bold** markers)."#;

// ─── Helpers ───

fn endpoint(ai: &AISettings) -> String {
    format!("{}/chat/completions", ai.api_base.trim_end_matches('/'))
}

fn resolve_key(ai: &AISettings) -> Result<String, String> {
    let api_key = config::resolve_api_key(&ai.api_key);
    if api_key.is_empty() {
        return Err("AI is disabled or API key is missing".to_string());
    }
    Ok(api_key)
}

/// Model output sometimes arrives wrapped in a markdown code fence.
pub fn strip_code_fences(content: &str) -> &str {
    content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

// ─── Calls ───

/// One-shot completion; returns the assistant message content.
pub async fn chat_completion(
    ai: &AISettings,
    messages: &[ChatMessage],
    temperature: f32,
    max_tokens: u32,
) -> Result<String, String> {
    network_guard::ensure_network_allowed()?;
    let api_key = resolve_key(ai)?;

    let request = ChatRequest {
        model: ai.model.clone(),
        messages: messages.to_vec(),
        temperature,
        max_tokens,
        stream: false,
    };

    let client = reqwest::Client::new();
    let response = client
        .post(endpoint(ai))
        .header("Authorization", format!("Bearer {}", api_key))
        .header("Content-Type", "application/json")
        .json(&request)
        .send()
        .await
        .map_err(|e| format!("API request failed: {}", e))?;

    let status = response.status();
    let text = response.text().await.map_err(|e| e.to_string())?;
    if !status.is_success() {
        return Err(format!("API Error {}: {}", status, text));
    }

    let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| e.to_string())?;
    parsed
        .choices
        .first()
        .and_then(|c| c.message.content.clone())
        .ok_or_else(|| "AI returned empty content".to_string())
}

const DIARY_DRAFT_SYSTEM_PROMPT: &str = r#"You turn a chat transcript into a first-person diary draft for the user.
Write in the user's language, past tense, as if the user wrote it themselves.
Cover what happened, who was involved and how the user felt; leave out the assistant's replies as such.
Keep it under 300 words. Output plain text only."#;

/// Draft a diary entry from a conversation transcript.
pub async fn diary_draft(ai: &AISettings, transcript: &[ChatMessage]) -> Result<String, String> {
    let mut dialog = String::new();
    for msg in transcript {
        dialog.push_str(&format!("{}: {}\n", msg.role, msg.content));
    }

    let messages = vec![
        ChatMessage {
            role: "system".to_string(),
            content: DIARY_DRAFT_SYSTEM_PROMPT.to_string(),
        },
        ChatMessage {
            role: "user".to_string(),
            content: format!("Transcript:\n{}", dialog),
        },
    ];
    chat_completion(ai, &messages, 0.7, 1200).await
}

/// Streaming completion; each token is handed to `on_token` as it arrives
/// and the accumulated reply is returned at the end.
pub async fn chat_completion_stream<F>(
    ai: &AISettings,
    messages: &[ChatMessage],
    mut on_token: F,
) -> Result<String, String>
where
    F: FnMut(&str),
{
    network_guard::ensure_network_allowed()?;
    let api_key = resolve_key(ai)?;

    let request = ChatRequest {
        model: ai.model.clone(),
        messages: messages.to_vec(),
        temperature: 0.7,
        max_tokens: 1024,
        stream: true,
    };

    let client = reqwest::Client::new();
    let response = client
        .post(endpoint(ai))
        .header("Authorization", format!("Bearer {}", api_key))
        .header("Content-Type", "application/json")
        .json(&request)
        .send()
        .await
        .map_err(|e| format!("Net err: {}", e))?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        return Err(format!("API Error {}: {}", status, text));
    }

    // Process the SSE stream line by line
    let mut full_response = String::new();
    let mut buffer = String::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| e.to_string())?;
        let chunk_str = String::from_utf8_lossy(&chunk);
        buffer.push_str(&chunk_str);

        let lines: Vec<&str> = buffer.split('\n').collect();
        // Keep the last part if it doesn't end with \n
        let last_part = if chunk_str.ends_with('\n') {
            String::new()
        } else {
            lines.last().unwrap_or(&"").to_string()
        };

        for line in lines {
            let line = line.trim();
            if line.starts_with("data: ") {
                let data = &line[6..];
                if data == "[DONE]" {
                    break;
                }

                if let Ok(stream_resp) = serde_json::from_str::<ChatStreamResponse>(data) {
                    if let Some(choice) = stream_resp.choices.first() {
                        if let Some(ref content) = choice.delta.content {
                            full_response.push_str(content);
                            on_token(content);
                        }
                    }
                }
            }
        }

        buffer = last_part;
    }

    Ok(full_response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppMode;
    use serial_test::serial;

    #[test]
    fn strips_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn endpoint_handles_trailing_slash() {
        let mut ai = AISettings::default();
        ai.api_base = "https://api.deepseek.com/v1/".to_string();
        assert_eq!(endpoint(&ai), "https://api.deepseek.com/v1/chat/completions");
    }

    #[tokio::test]
    #[serial(network_guard)]
    async fn traditional_mode_blocks_completion_before_any_request() {
        network_guard::apply_mode(AppMode::Traditional);
        let ai = AISettings {
            api_key: "test-key".to_string(),
            ..AISettings::default()
        };
        let err = chat_completion(&ai, &[], 0.2, 16).await.unwrap_err();
        assert!(err.contains("traditional mode"));
        let err = chat_completion_stream(&ai, &[], |_| {}).await.unwrap_err();
        assert!(err.contains("traditional mode"));
    }
}
