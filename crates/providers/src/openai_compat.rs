//! OpenAI-compatible backend.
//!
//! Works with Together, OpenAI, Ollama, vLLM and any other endpoint that
//! follows the chat completions contract. Rate-limit headers are read off
//! every response, successful or not, so the governor can pace the backend.

use std::time::Duration;

use cr_domain::config::BackendConfig;
use cr_domain::ratelimit::RateLimit;
use cr_domain::{Error, Result};
use serde_json::{json, Value};

use crate::traits::{Completion, CompletionBackend, CompletionRequest, Usage};
use crate::util::{from_reqwest, resolve_api_key};

pub struct OpenAiCompatBackend {
    id: String,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    client: reqwest::Client,
}

impl OpenAiCompatBackend {
    pub fn from_config(cfg: &BackendConfig, timeout: Duration) -> Result<Self> {
        let api_key = resolve_api_key(cfg.api_key_env.as_deref())?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: cfg.id.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_owned(),
            model: cfg.model.clone(),
            api_key,
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            client,
        })
    }

    fn build_body(&self, req: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": req.messages,
        });
        if let Some(t) = req.temperature.or(self.temperature) {
            body["temperature"] = json!(t);
        }
        if let Some(m) = req.max_tokens.or(self.max_tokens) {
            body["max_tokens"] = json!(m);
        }
        body
    }
}

#[async_trait::async_trait]
impl CompletionBackend for OpenAiCompatBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, req: &CompletionRequest) -> Result<Completion> {
        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(backend = %self.id, url = %url, "chat completion request");

        let mut request = self.client.post(&url).json(&self.build_body(req));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request.send().await.map_err(from_reqwest)?;
        let status = resp.status().as_u16();
        let limits = RateLimit::from_headers(
            resp.headers()
                .iter()
                .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v))),
        );
        let text = resp.text().await.map_err(from_reqwest)?;

        classify_status(&self.id, status, &text, limits)?;

        let json: Value = serde_json::from_str(&text)?;
        parse_completion(&self.id, &json, limits)
    }
}

/// Map a non-success status to the governor's error taxonomy.
fn classify_status(backend: &str, status: u16, body: &str, limits: RateLimit) -> Result<()> {
    match status {
        200..=299 => Ok(()),
        429 => Err(Error::RateLimited {
            backend: backend.to_owned(),
            limits,
        }),
        500..=599 => Err(Error::Unavailable {
            backend: backend.to_owned(),
            status,
            limits,
        }),
        401 | 403 => Err(Error::Auth(format!("backend {backend}: HTTP {status}"))),
        _ => Err(Error::Provider {
            backend: backend.to_owned(),
            message: format!("HTTP {status} - {body}"),
        }),
    }
}

fn parse_completion(backend: &str, json: &Value, limits: RateLimit) -> Result<Completion> {
    let content = json["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| Error::Provider {
            backend: backend.to_owned(),
            message: "response has no choices[0].message.content".into(),
        })?
        .to_owned();

    let usage = json.get("usage").and_then(|u| {
        Some(Usage {
            prompt_tokens: u.get("prompt_tokens")?.as_u64()? as u32,
            completion_tokens: u.get("completion_tokens")?.as_u64()? as u32,
            total_tokens: u.get("total_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
        })
    });

    Ok(Completion {
        content,
        usage,
        rate_limit: limits,
        backend: backend.to_owned(),
        model: json["model"].as_str().unwrap_or_default().to_owned(),
    })
}
