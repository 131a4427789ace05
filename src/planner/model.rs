//! Model-backed planning strategy.
//!
//! Sends the system instruction, the serialized asset list and the recent
//! conversation to a pluggable text-completion collaborator and reduces the
//! reply to a [`PlannerOutcome`]. Responses are treated as untrusted: the
//! JSON is extracted defensively and every candidate operation goes through
//! the shape validator. A response that cannot be parsed yields a fixed
//! apologetic reply instead of an error.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::PlannerError;
use crate::ops::parse_operations;
use crate::planner::{ChatMessage, ChatRole, PlannerOutcome};
use crate::portfolio::PortfolioDocument;

/// Per-message cap applied before sending conversation history upstream.
pub const MAX_MESSAGE_CHARS: usize = 2000;

const PROVIDER: &str = "openai_compatible";

const FALLBACK_REPLY: &str = "Sorry, I couldn't understand that request. Please restate how you'd like to adjust the portfolio.";

const DEFAULT_REPLY: &str = "Let me know how else I can help with your portfolio.";

const SYSTEM_INSTRUCTION: &str = r#"You help users manage a personal investment portfolio that contains blockchain
addresses (bitcoin, ethereum, solana) and physical assets (gold, US dollars).

Return a minified JSON object with properties:
- reply: short natural language answer to the user.
- operations: array of actions to apply.

Every operation object MUST have:
- type: "add", "remove", or "update".
- For type "add":
  - target: one of "bitcoin", "ethereum", "solana", "gold", "usd".
  - address: required when the target is a blockchain asset.
  - quantity: required when the target is a physical asset.
  - label: optional friendly name.
- For type "remove":
  - identifier: required. May be an asset id, label, or address/symbol.
- For type "update":
  - identifier: required.
  - label: optional new label.
  - quantity: optional (only valid for physical assets).
  - address: optional new address (only valid for blockchain assets).

Never include explanatory text outside JSON.
Match multiple operations when the user lists several instructions.
Preserve numeric values as numbers, not strings.
When unsure about an address or quantity, omit the operation entirely."#;

/// Prompt roles accepted by the completion collaborator.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

impl From<ChatRole> for PromptRole {
    fn from(role: ChatRole) -> Self {
        match role {
            ChatRole::User => Self::User,
            ChatRole::Assistant => Self::Assistant,
        }
    }
}

/// One message in the upstream prompt.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            content: content.into(),
        }
    }
}

/// Pluggable text-completion collaborator.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, PlannerError>;
}

/// Model-backed planner over any [`TextCompletion`] collaborator.
pub struct ModelPlanner {
    client: Arc<dyn TextCompletion>,
}

impl ModelPlanner {
    pub fn new(client: Arc<dyn TextCompletion>) -> Self {
        Self { client }
    }

    /// Run one planning call. Transport failures bubble up for the stack to
    /// catch; unparseable replies degrade to the apologetic outcome.
    pub async fn plan(
        &self,
        portfolio: &PortfolioDocument,
        messages: &[ChatMessage],
    ) -> Result<PlannerOutcome, PlannerError> {
        let prompt = build_prompt(portfolio, messages)?;
        let raw = self.client.complete(&prompt).await?;
        Ok(parse_planner_response(&raw))
    }
}

fn truncate_chars(content: &str, limit: usize) -> String {
    content.chars().take(limit).collect()
}

fn build_prompt(
    portfolio: &PortfolioDocument,
    messages: &[ChatMessage],
) -> Result<Vec<PromptMessage>, PlannerError> {
    let snapshot = serde_json::to_string_pretty(&portfolio.assets)?;

    let mut prompt = vec![
        PromptMessage::system(SYSTEM_INSTRUCTION),
        PromptMessage::user(format!("Current portfolio snapshot: {snapshot}")),
    ];
    prompt.extend(messages.iter().map(|message| PromptMessage {
        role: message.role.into(),
        content: truncate_chars(&message.content, MAX_MESSAGE_CHARS),
    }));
    Ok(prompt)
}

/// Pull a JSON object out of a model reply: a bare object, else the first
/// fenced ```json block, else the whole trimmed text.
fn extract_json(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return trimmed.to_string();
    }

    if let Ok(fence) = Regex::new(r"```json([\s\S]*?)```")
        && let Some(captures) = fence.captures(trimmed)
        && let Some(block) = captures.get(1)
    {
        return block.as_str().trim().to_string();
    }

    trimmed.to_string()
}

#[derive(Debug, Deserialize)]
struct RawPlannerResponse {
    #[serde(default)]
    reply: Option<String>,
    #[serde(default)]
    operations: Option<serde_json::Value>,
}

pub(crate) fn parse_planner_response(text: &str) -> PlannerOutcome {
    let json_text = extract_json(text);
    let Ok(parsed) = serde_json::from_str::<RawPlannerResponse>(&json_text) else {
        return PlannerOutcome {
            reply: FALLBACK_REPLY.to_string(),
            operations: Vec::new(),
        };
    };

    let raw_operations = parsed
        .operations
        .as_ref()
        .and_then(serde_json::Value::as_array)
        .cloned()
        .unwrap_or_default();

    PlannerOutcome {
        reply: parsed.reply.unwrap_or_else(|| DEFAULT_REPLY.to_string()),
        operations: parse_operations(&raw_operations),
    }
}

/// Chat-completions client for any OpenAI-compatible endpoint.
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
}

impl OpenAiCompatibleClient {
    pub fn new(config: &LlmConfig) -> Result<Self, PlannerError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl TextCompletion for OpenAiCompatibleClient {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, PlannerError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self.http.post(&url).json(&serde_json::json!({
            "model": self.model,
            "messages": messages,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(PlannerError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let payload: ChatCompletionResponse = response.json().await?;
        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| PlannerError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: "response contained no completion text".to_string(),
            })
    }
}
