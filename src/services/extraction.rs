//! The LLM boundary: prompt in, structured JSON out.
//!
//! Everything past this module treats extraction as an opaque function.
//! Transient transport failures are retried with linearly increasing delay;
//! a missing API key is a configuration problem and is never retried.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::OpenAiConfig;
use crate::error::{AppError, AppResult};
use crate::scheduling::draft::{DraftUpdate, EventDraft};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

/// The structured result of one extraction round-trip.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtractionOutcome {
    pub message: String,
    pub updates: Option<DraftUpdate>,
    pub should_create_event: bool,
    pub should_join_event: bool,
    /// Diagnostic only; never drives control flow.
    pub analysis: Option<String>,
}

#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, messages: &[ChatMessage]) -> AppResult<ExtractionOutcome>;
}

/// Build the system message for one turn: the response contract, the current
/// draft as JSON, and today's date so relative expressions ("next week")
/// resolve against a known anchor rather than the model's own clock.
pub fn build_system_prompt(draft: &EventDraft, today: NaiveDate) -> ChatMessage {
    let draft_json = serde_json::to_string(draft).unwrap_or_else(|_| "{}".to_string());

    let mut missing = Vec::new();
    if draft.name.is_none() {
        missing.push("- Event name");
    }
    if draft.date_range.is_none() {
        missing.push("- Date range");
    }
    if draft.time_window.is_none() {
        missing.push("- Preferred times");
    }

    ChatMessage::system(format!(
        r#"You are a friendly scheduling assistant helping create an event or join existing events. You MUST respond in JSON format.
Current event info: {draft_json}
Current date: {today}

CAPABILITIES:
1. Extract ALL available information from each message
2. Process multiple pieces of information at once
3. Process natural language date/time expressions
4. Handle access code inputs for joining events

REQUIRED fields still missing:
{missing}

RESPONSE FORMAT:
{{
  "message": "Your response to the user",
  "updates": {{
    "name": "Event name or null",
    "dateRange": {{"start": "YYYY-MM-DD", "end": "YYYY-MM-DD"}} or null,
    "timesThatWork": "Time range or null",
    "description": "Event description or null",
    "allowAnonymous": boolean or null,
    "accessCode": "CODE123" or null
  }},
  "shouldCreateEvent": boolean,
  "shouldJoinEvent": boolean,
  "analysis": "What was extracted from the message"
}}

JOINING INSTRUCTIONS:
- When the user wants to join or provides a code, set shouldJoinEvent: true
- Extract any short alphanumeric code into the accessCode field
- If the user says "join" without a code, ask for the code
- If joining fails, offer to create a new event instead

CREATING INSTRUCTIONS:
- Guide the user through the missing required fields in order
- Use today's date ({today}) as the reference for relative dates
- Do not invent event links or access codes yourself"#,
        missing = missing.join("\n"),
    ))
}

// ============================================================================
// OpenAI chat-completions implementation
// ============================================================================

pub struct OpenAiExtractor {
    client: Client,
    config: OpenAiConfig,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: String,
}

impl OpenAiExtractor {
    pub fn new(config: OpenAiConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        Ok(Self { client, config })
    }

    /// POST the completion request, retrying transient failures (network
    /// errors, 429, 5xx) up to the configured attempt count with a linearly
    /// increasing delay. Client errors surface immediately.
    async fn send_with_retry(&self, body: &CompletionRequest<'_>) -> AppResult<reqwest::Response> {
        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            AppError::Config("OPENAI_API_KEY is not set; extraction is unavailable".into())
        })?;

        let max_attempts = self.config.max_retries.max(1);

        for attempt in 1..=max_attempts {
            let result = self
                .client
                .post(OPENAI_API_URL)
                .bearer_auth(api_key)
                .json(body)
                .send()
                .await;

            match result {
                Ok(resp) => {
                    let transient = resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS
                        || resp.status().is_server_error();
                    if !transient {
                        return Ok(resp);
                    }
                    if attempt == max_attempts {
                        let status = resp.status();
                        let text = resp.text().await.unwrap_or_default();
                        return Err(AppError::Extraction(format!(
                            "OpenAI request failed after {attempt} attempts (status {status}): {text}"
                        )));
                    }
                    tracing::warn!(
                        "Transient OpenAI error (status {}), attempt {}/{}",
                        resp.status(),
                        attempt,
                        max_attempts
                    );
                }
                Err(e) => {
                    if attempt == max_attempts {
                        return Err(e.into());
                    }
                    tracing::warn!(
                        "OpenAI request failed: {}, attempt {}/{}",
                        e,
                        attempt,
                        max_attempts
                    );
                }
            }

            let delay = self.config.retry_delay_ms * attempt as u64;
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }

        Err(AppError::Extraction(format!(
            "OpenAI request failed after {max_attempts} attempts"
        )))
    }
}

#[async_trait]
impl Extractor for OpenAiExtractor {
    async fn extract(&self, messages: &[ChatMessage]) -> AppResult<ExtractionOutcome> {
        let request = CompletionRequest {
            model: &self.config.model,
            messages,
            temperature: 0.7,
            max_tokens: 250,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let response = self.send_with_retry(&request).await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Extraction(format!(
                "OpenAI returned status {status}: {text}"
            )));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| AppError::Extraction(format!("Malformed completion envelope: {e}")))?;

        let content = completion
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| AppError::Extraction("Completion contained no choices".into()))?;

        parse_outcome(content)
    }
}

/// Parse the model's JSON payload. Non-conforming JSON is a recoverable
/// extraction failure, surfaced upstream as a friendly retry message.
pub fn parse_outcome(content: &str) -> AppResult<ExtractionOutcome> {
    serde_json::from_str(content)
        .map_err(|e| AppError::Extraction(format!("Model response was not valid JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_outcome() {
        let raw = r#"{
            "message": "Got it, two mornings in June.",
            "updates": {
                "name": "Team Sync",
                "dateRange": {"start": "2024-06-03", "end": "2024-06-04"},
                "timesThatWork": "9 AM - 11 AM",
                "description": null,
                "allowAnonymous": null,
                "accessCode": null
            },
            "shouldCreateEvent": false,
            "shouldJoinEvent": false,
            "analysis": "Extracted name, dates and times"
        }"#;

        let outcome = parse_outcome(raw).unwrap();
        assert!(!outcome.should_create_event);
        let updates = outcome.updates.unwrap();
        assert_eq!(updates.name.as_deref(), Some("Team Sync"));
        assert_eq!(updates.time_window.as_deref(), Some("9 AM - 11 AM"));
        let range = updates.date_range.unwrap();
        assert_eq!(range.start.to_string(), "2024-06-03");
    }

    #[test]
    fn missing_fields_default() {
        let outcome = parse_outcome(r#"{"message": "Hi!"}"#).unwrap();
        assert_eq!(outcome.message, "Hi!");
        assert!(outcome.updates.is_none());
        assert!(!outcome.should_join_event);
    }

    #[test]
    fn malformed_json_is_an_extraction_error() {
        let err = parse_outcome("sure, happy to help!").unwrap_err();
        assert!(matches!(err, AppError::Extraction(_)));
    }

    #[test]
    fn system_prompt_embeds_draft_and_date() {
        let draft = EventDraft {
            name: Some("Team Sync".into()),
            ..Default::default()
        };
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let prompt = build_system_prompt(&draft, today);
        assert_eq!(prompt.role, "system");
        assert!(prompt.content.contains("Team Sync"));
        assert!(prompt.content.contains("2024-06-01"));
        // Name is present, so only the other two fields are listed as missing.
        assert!(!prompt.content.contains("- Event name"));
        assert!(prompt.content.contains("- Date range"));
        assert!(prompt.content.contains("- Preferred times"));
    }
}
