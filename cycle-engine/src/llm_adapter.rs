use crate::config::GenerationConfig;
use crate::types::{GenerationRequest, Result, TextGenerator};
use anyhow::{anyhow, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const XAI_BASE_URL: &str = "https://api.x.ai/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

fn http_client(config: &GenerationConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(config.timeout_seconds))
        .build()?;
    Ok(client)
}

fn api_key_from_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|k| !k.trim().is_empty())
}

/// OpenAI-compatible `/chat/completions` backend (OpenAI, xAI).
pub struct ChatCompletionsAdapter {
    http: reqwest::Client,
    provider: String,
    base_url: String,
    api_key_var: String,
    api_key: Option<String>,
}

impl ChatCompletionsAdapter {
    pub fn new(
        http: reqwest::Client,
        provider: impl Into<String>,
        base_url: impl Into<String>,
        api_key_var: impl Into<String>,
    ) -> Self {
        let api_key_var = api_key_var.into();
        Self {
            http,
            provider: provider.into(),
            base_url: base_url.into(),
            api_key: api_key_from_env(&api_key_var),
            api_key_var,
        }
    }

    pub fn openai(http: reqwest::Client) -> Self {
        Self::new(http, "openai", OPENAI_BASE_URL, "OPENAI_API_KEY")
    }

    pub fn xai(http: reqwest::Client) -> Self {
        Self::new(http, "xai", XAI_BASE_URL, "XAI_API_KEY")
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl TextGenerator for ChatCompletionsAdapter {
    fn provider_name(&self) -> String {
        self.provider.clone()
    }

    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("{} environment variable not set", self.api_key_var))?;

        let body = ChatRequest {
            model: &request.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!("Calling {} chat completions with model {}", self.provider, request.model);
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("{} API error: HTTP {}: {}", self.provider, status, text);
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("{} returned no completion", self.provider))
    }
}

/// Anthropic Messages API backend.
pub struct AnthropicAdapter {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl AnthropicAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: ANTHROPIC_BASE_URL.to_string(),
            api_key: api_key_from_env("ANTHROPIC_API_KEY"),
        }
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl TextGenerator for AnthropicAdapter {
    fn provider_name(&self) -> String {
        "anthropic".to_string()
    }

    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("ANTHROPIC_API_KEY environment variable not set"))?;

        let body = MessagesRequest {
            model: &request.model,
            system: &request.system_prompt,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.user_prompt,
            }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!("Calling anthropic messages with model {}", request.model);
        let response = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("anthropic API error: HTTP {}: {}", status, text);
        }

        let parsed: MessagesResponse = response.json().await?;
        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();
        if text.is_empty() {
            bail!("anthropic returned no text content");
        }
        Ok(text)
    }
}

/// Deterministic generator for development and tests.
pub struct MockLlmAdapter {
    name: String,
    response_delay_ms: u64,
    fixed_response: Option<String>,
    failure: Option<String>,
}

impl MockLlmAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            response_delay_ms: 0,
            fixed_response: None,
            failure: None,
        }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.response_delay_ms = delay_ms;
        self
    }

    pub fn with_response(mut self, text: impl Into<String>) -> Self {
        self.fixed_response = Some(text.into());
        self
    }

    /// Every call fails with `message`.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    fn compose(request: &GenerationRequest) -> String {
        let sources: Vec<&str> = request
            .user_prompt
            .lines()
            .filter_map(|line| line.strip_prefix("SOURCE: "))
            .collect();
        let words = request.user_prompt.split_whitespace().count();

        format!(
            "Executive Summary\nDigest of {} sources ({}) covering {} words of collected content.",
            sources.len(),
            sources.join(", "),
            words
        )
    }
}

#[async_trait]
impl TextGenerator for MockLlmAdapter {
    fn provider_name(&self) -> String {
        self.name.clone()
    }

    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<String> {
        if self.response_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.response_delay_ms)).await;
        }
        if let Some(message) = &self.failure {
            bail!("{}", message);
        }
        Ok(self
            .fixed_response
            .clone()
            .unwrap_or_else(|| Self::compose(request)))
    }
}

/// Generation backends keyed by provider name.
#[derive(Clone, Default)]
pub struct LlmAdapterRegistry {
    adapters: HashMap<String, Arc<dyn TextGenerator>>,
}

impl LlmAdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the OpenAI, xAI and Anthropic backends. API keys are read
    /// from the environment now; a missing key fails at generation time.
    pub fn with_remote_providers(config: &GenerationConfig) -> Result<Self> {
        let http = http_client(config)?;
        Ok(Self::new()
            .with(Arc::new(ChatCompletionsAdapter::openai(http.clone())))
            .with(Arc::new(ChatCompletionsAdapter::xai(http.clone())))
            .with(Arc::new(AnthropicAdapter::new(http))))
    }

    pub fn register_adapter(&mut self, adapter: Arc<dyn TextGenerator>) {
        let name = adapter.provider_name();
        info!("Registering LLM adapter: {}", name);
        self.adapters.insert(name, adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn TextGenerator>) -> Self {
        self.register_adapter(adapter);
        self
    }

    pub fn get_adapter(&self, provider: &str) -> Option<Arc<dyn TextGenerator>> {
        self.adapters.get(provider).cloned()
    }

    pub fn list_adapters(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.keys().cloned().collect();
        names.sort();
        names
    }
}
