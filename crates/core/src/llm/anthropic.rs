use crate::config::Settings;
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::{DigestRequest, LlmClient, Provider};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const DEFAULT_MAX_TOKENS: u32 = 2048;
const DEFAULT_TIMEOUT_SECS: u64 = 90;

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_anthropic_api_key()?.to_string();
        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let max_tokens = std::env::var("ANTHROPIC_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let timeout_secs = std::env::var("ANTHROPIC_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            max_tokens,
        })
    }

    async fn create_message(&self, req: CreateMessageRequest) -> anyhow::Result<CreateMessageResponse> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(&req)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Anthropic response body")?;
        if !status.is_success() {
            return Err(LlmDiagnosticsError {
                provider: Provider::Anthropic,
                stage: "http",
                status: Some(status.as_u16()),
                detail: format!("status={status}"),
                raw_output: Some(text),
            }
            .into());
        }

        serde_json::from_str::<CreateMessageResponse>(&text)
            .with_context(|| format!("failed to decode Anthropic response: {text}"))
    }

    fn system_prompt() -> String {
        [
            "You are a long-term growth investment advisor writing a scheduled portfolio digest.",
            "The user only acts on your recommendations manually; you never execute trades.",
            "Be specific: ticker, target price or \"at market\", and a one-line rationale per call.",
            "Use the memory section to avoid repeating stale picks and to reference past calls honestly.",
            "If data for a security is missing, say so rather than guessing.",
        ]
        .join("\n")
    }

    fn response_text(res: &CreateMessageResponse) -> String {
        let mut out = String::new();
        for block in &res.content {
            if let ContentBlock::Text { text } = block {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }

    fn make_request(&self, prompt: &str, max_tokens: u32) -> CreateMessageRequest {
        CreateMessageRequest {
            model: self.model.clone(),
            max_tokens,
            system: Some(Self::system_prompt()),
            messages: vec![Message {
                role: "user",
                content: prompt.to_string(),
            }],
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for AnthropicClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn generate_digest(&self, request: DigestRequest) -> anyhow::Result<String> {
        let mut res = self
            .create_message(self.make_request(&request.prompt, self.max_tokens))
            .await?;

        // Cut off by the token ceiling: retry once with a higher one.
        if matches!(res.stop_reason.as_deref(), Some("max_tokens")) {
            let bumped = self.max_tokens.saturating_mul(2).max(4096);
            tracing::warn!(
                %request.as_of_date,
                %request.session,
                from = self.max_tokens,
                to = bumped,
                "Anthropic stop_reason=max_tokens; retrying once with higher max_tokens"
            );
            res = self
                .create_message(self.make_request(&request.prompt, bumped))
                .await?;
        }

        let text = Self::response_text(&res);
        if text.trim().is_empty() {
            return Err(LlmDiagnosticsError {
                provider: Provider::Anthropic,
                stage: "empty_response",
                status: None,
                detail: format!("no text content (stop_reason={:?})", res.stop_reason),
                raw_output: None,
            }
            .into());
        }
        Ok(text)
    }
}

#[derive(Debug, Clone, Serialize)]
struct CreateMessageRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CreateMessageResponse {
    content: Vec<ContentBlock>,

    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn joins_text_blocks_and_skips_others() {
        let raw = json!({
            "content": [
                {"type": "thinking", "thinking": "hmm", "signature": "x"},
                {"type": "text", "text": "Market Summary"},
                {"type": "tool_use", "id": "t1", "name": "noop", "input": {}},
                {"type": "text", "text": "Buy ENB.TO at market"}
            ],
            "stop_reason": "end_turn"
        });
        let res: CreateMessageResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(
            AnthropicClient::response_text(&res),
            "Market Summary\nBuy ENB.TO at market"
        );
        assert_eq!(res.stop_reason.as_deref(), Some("end_turn"));
    }

    #[test]
    fn request_serializes_without_empty_system() {
        let req = CreateMessageRequest {
            model: "m".to_string(),
            max_tokens: 10,
            system: None,
            messages: vec![Message {
                role: "user",
                content: "hi".to_string(),
            }],
        };
        let v = serde_json::to_value(&req).unwrap();
        assert!(v.get("system").is_none());
        assert_eq!(v["messages"][0]["role"], "user");
    }
}
