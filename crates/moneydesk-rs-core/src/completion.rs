//! HTTP client for OpenAI-compatible chat completion endpoints.

use async_trait::async_trait;
use log::{debug, warn};
use moneydesk_rs_config::AiConfig;
use moneydesk_rs_protocol::{
    ChatMessage, CompletionError, CompletionRequest, CompletionResponse, CompletionService,
    TokenUsage,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Completion service speaking the `/chat/completions` wire format.
pub struct OpenAiCompletionClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiCompletionClient {
    /// Build a client from config, reading the key from `api_key_env`.
    ///
    /// A missing key is reported on the first call, not here, so the router
    /// can still serve canned and KB replies.
    pub fn from_config(config: &AiConfig) -> Result<Self, CompletionError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            warn!(
                "completion api key not set; AI replies will fail (env={})",
                config.api_key_env
            );
        }
        Self::new(config, api_key)
    }

    /// Build a client with an explicit key.
    pub fn new(config: &AiConfig, api_key: Option<String>) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| CompletionError::Config(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body<'a>(&'a self, request: &'a CompletionRequest) -> WireRequest<'a> {
        WireRequest {
            model: request.model_override.as_deref().unwrap_or(&self.model),
            messages: &request.messages,
            temperature: request.temperature_override.unwrap_or(self.temperature),
            max_tokens: self.max_tokens,
        }
    }
}

#[async_trait]
impl CompletionService for OpenAiCompletionClient {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| CompletionError::Config("api key is not set".to_string()))?;
        let body = self.request_body(&request);
        debug!(
            "sending completion (model={}, messages={})",
            body.model,
            body.messages.len()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_transport)?;

        let status = response.status();
        let text = response.text().await.map_err(map_transport)?;
        if !status.is_success() {
            return Err(CompletionError::Provider(format!(
                "status {}: {}",
                status.as_u16(),
                provider_message(&text)
            )));
        }
        parse_response(&text, body.model)
    }
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: i64,
    #[serde(default)]
    completion_tokens: i64,
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: WireErrorBody,
}

#[derive(Debug, Deserialize)]
struct WireErrorBody {
    message: String,
}

fn parse_response(body: &str, requested_model: &str) -> Result<CompletionResponse, CompletionError> {
    let parsed: WireResponse = serde_json::from_str(body)
        .map_err(|err| CompletionError::InvalidResponse(err.to_string()))?;
    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| CompletionError::InvalidResponse("no completion content".to_string()))?;
    let usage = parsed
        .usage
        .map(|usage| TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        })
        .unwrap_or_default();
    Ok(CompletionResponse {
        content,
        model: parsed.model.unwrap_or_else(|| requested_model.to_string()),
        usage,
    })
}

fn provider_message(body: &str) -> String {
    match serde_json::from_str::<WireError>(body) {
        Ok(error) => error.error.message,
        Err(_) => body.chars().take(200).collect(),
    }
}

fn map_transport(err: reqwest::Error) -> CompletionError {
    if err.is_timeout() {
        CompletionError::Timeout(err.to_string())
    } else if err.is_decode() {
        CompletionError::InvalidResponse(err.to_string())
    } else {
        CompletionError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{OpenAiCompletionClient, parse_response, provider_message};
    use moneydesk_rs_config::AiConfig;
    use moneydesk_rs_protocol::{
        ChatMessage, CompletionError, CompletionRequest, CompletionService,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn config() -> AiConfig {
        AiConfig {
            base_url: "http://localhost:9/v1/".to_string(),
            ..AiConfig::default()
        }
    }

    #[test]
    fn endpoint_joins_base_url() {
        let client = OpenAiCompletionClient::new(&config(), None).expect("client");
        assert_eq!(client.endpoint(), "http://localhost:9/v1/chat/completions");
    }

    #[test]
    fn request_body_applies_overrides() {
        let client = OpenAiCompletionClient::new(&config(), Some("k".to_string())).expect("client");
        let request = CompletionRequest {
            messages: vec![ChatMessage::system("sys"), ChatMessage::user("hi")],
            model_override: Some("gpt-large".to_string()),
            temperature_override: None,
        };
        let body = serde_json::to_value(client.request_body(&request)).expect("json");
        assert_eq!(body["model"], json!("gpt-large"));
        assert_eq!(body["max_tokens"], json!(600));
        assert_eq!(body["messages"][0], json!({"role": "system", "content": "sys"}));
        assert_eq!(body["messages"][1]["role"], json!("user"));
    }

    #[test]
    fn parses_content_model_and_usage() {
        let body = json!({
            "model": "gpt-4o-mini-2024",
            "choices": [{"message": {"role": "assistant", "content": "Pay the highest APR first."}}],
            "usage": {"prompt_tokens": 312, "completion_tokens": 48, "total_tokens": 360}
        })
        .to_string();
        let response = parse_response(&body, "gpt-4o-mini").expect("response");
        assert_eq!(response.content, "Pay the highest APR first.");
        assert_eq!(response.model, "gpt-4o-mini-2024");
        assert_eq!(response.usage.total(), 360);
    }

    #[test]
    fn missing_usage_counts_as_zero() {
        let body = json!({"choices": [{"message": {"content": "ok"}}]}).to_string();
        let response = parse_response(&body, "fallback-model").expect("response");
        assert_eq!(response.model, "fallback-model");
        assert_eq!(response.usage.total(), 0);
    }

    #[test]
    fn empty_choices_are_invalid() {
        let err = parse_response(r#"{"choices": []}"#, "m").unwrap_err();
        assert!(matches!(err, CompletionError::InvalidResponse(_)));
        let err = parse_response("not json", "m").unwrap_err();
        assert!(matches!(err, CompletionError::InvalidResponse(_)));
    }

    #[test]
    fn provider_message_prefers_error_body() {
        let body = json!({"error": {"message": "Rate limit reached", "type": "requests"}});
        assert_eq!(provider_message(&body.to_string()), "Rate limit reached");
        assert_eq!(provider_message("Bad gateway"), "Bad gateway");
    }

    #[tokio::test]
    async fn missing_key_is_a_config_error() {
        let client = OpenAiCompletionClient::new(&config(), None).expect("client");
        let err = client
            .complete(CompletionRequest {
                messages: vec![ChatMessage::user("hi")],
                ..CompletionRequest::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::Config(_)));
    }
}
