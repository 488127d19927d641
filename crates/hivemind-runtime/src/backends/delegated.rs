use super::{BackendOutput, ExecutionBackend, WorkUnit};
use crate::config::BridgeConfig;
use async_trait::async_trait;
use hivemind_core::{HivemindError, HivemindResult};
use hivemind_orchestrator::ExecutionOrigin;
use serde::Serialize;
use std::time::Duration;

/// Delegated-service backend: the Anthropic Messages API.
pub struct DelegatedBackend {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model_id: String,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl DelegatedBackend {
    /// Fails with `MissingCredential` when the config carries no key.
    pub fn from_config(config: &BridgeConfig) -> HivemindResult<Self> {
        let api_key = config.credential().ok_or_else(|| {
            HivemindError::MissingCredential("no delegated-service API key configured".into())
        })?;
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| HivemindError::Http(e.to_string()))?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            model_id: config.model_id.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl ExecutionBackend for DelegatedBackend {
    fn origin(&self) -> ExecutionOrigin {
        ExecutionOrigin::Delegated
    }

    async fn run(&self, unit: &WorkUnit) -> HivemindResult<BackendOutput> {
        let url = format!("{}/v1/messages", self.base_url);

        let mut body = serde_json::json!({
            "model": self.model_id,
            "max_tokens": self.max_tokens,
            "messages": [ApiMessage { role: "user", content: &unit.objective }],
        });
        if let Some(context) = &unit.context {
            body["system"] = serde_json::json!(context);
        }

        tracing::debug!(execution_id = %unit.execution_id, model = %self.model_id, "Calling delegated service");

        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| HivemindError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            // Error bodies are not always JSON (e.g. a proxy's HTML 502).
            let text = resp.text().await.unwrap_or_default();
            return Err(HivemindError::Http(format!(
                "delegated service error {status}: {}",
                truncate(&text, 512)
            )));
        }

        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| HivemindError::Http(format!("invalid response body ({status}): {e}")))?;

        parse_messages_response(&resp_body)
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Extract the text blocks of a Messages API response.
pub fn parse_messages_response(body: &serde_json::Value) -> HivemindResult<BackendOutput> {
    let content = body["content"].as_array().ok_or_else(|| {
        HivemindError::ExecutionFailed("missing content in delegated-service response".into())
    })?;

    let text: Vec<&str> = content
        .iter()
        .filter(|block| block["type"].as_str() == Some("text"))
        .filter_map(|block| block["text"].as_str())
        .collect();

    Ok(BackendOutput {
        content: text.join("\n"),
        metadata: serde_json::json!({
            "model": body["model"],
            "stop_reason": body["stop_reason"],
            "input_tokens": body["usage"]["input_tokens"],
            "output_tokens": body["usage"]["output_tokens"],
        }),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_credential() {
        let err = DelegatedBackend::from_config(&BridgeConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, HivemindError::MissingCredential(_)));
    }

    #[test]
    fn test_parse_text_blocks() {
        let body = serde_json::json!({
            "model": "m",
            "content": [
                {"type": "text", "text": "first"},
                {"type": "tool_use", "id": "t", "name": "x", "input": {}},
                {"type": "text", "text": "second"}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 3, "output_tokens": 5}
        });
        let out = parse_messages_response(&body).unwrap();
        assert_eq!(out.content, "first\nsecond");
        assert_eq!(out.metadata["output_tokens"], 5);
    }

    #[test]
    fn test_truncate_keeps_char_boundaries() {
        assert_eq!(truncate("short", 512), "short");
        assert_eq!(truncate("héllo", 2), "hé");
    }

    #[test]
    fn test_parse_missing_content() {
        let err = parse_messages_response(&serde_json::json!({})).unwrap_err();
        assert!(matches!(err, HivemindError::ExecutionFailed(_)));
    }
}
