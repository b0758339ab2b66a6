//! Generation API client.
//!
//! Two round trips per batch: list the available models and pick one, then
//! post the prompt (plus an inline photo, when the session has one) to that
//! model's content-generation endpoint. The API key travels as the `key`
//! query parameter.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capture::PhotoPayload;
use crate::messages::{Locale, Messages};
use crate::prompt::build_prompt;
use crate::types::{GlitchError, GlitchResult, SessionConfig};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Used when model discovery fails or returns nothing.
pub const DEFAULT_MODEL: &str = "models/gemini-1.5-flash";

/// Large model preferred when no fast variant is listed.
const LARGE_MODEL_HINT: &str = "gemini-1.5-pro";

const FAST_MODEL_HINT: &str = "flash";

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Anything that can produce one raw generation response for a session.
///
/// The supplier only depends on this seam, so tests can script responses.
#[async_trait]
pub trait RuleSource: Send + Sync {
    async fn fetch_raw(&self, config: &SessionConfig) -> GlitchResult<String>;
}

/// Connection settings for the generation API.
#[derive(Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout_ms: u64,
    pub fallback_model: String,
    pub locale: Locale,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout_ms", &self.timeout_ms)
            .field("fallback_model", &self.fallback_model)
            .field("locale", &self.locale)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            fallback_model: DEFAULT_MODEL.to_string(),
            locale: Locale::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

// ---- wire types ----

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    name: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

impl GenerateResponse {
    /// Text of the first part of the first candidate, or an empty array.
    fn first_text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.first())
            .and_then(|p| p.text.clone())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "[]".to_string())
    }
}

/// Pick the model to generate with.
///
/// Prefers a fast variant, then the large model, then whatever is listed
/// first, then `fallback`.
pub fn choose_model(names: &[String], fallback: &str) -> String {
    names
        .iter()
        .find(|n| n.contains(FAST_MODEL_HINT))
        .or_else(|| names.iter().find(|n| n.contains(LARGE_MODEL_HINT)))
        .or_else(|| names.first())
        .cloned()
        .unwrap_or_else(|| fallback.to_string())
}

/// HTTP client for the hosted generative-language service.
pub struct GenerationClient {
    http: reqwest::Client,
    config: ClientConfig,
    messages: Messages,
}

impl GenerationClient {
    pub fn new(config: ClientConfig) -> GlitchResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(GlitchError::MissingApiKey);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        let messages = Messages::for_locale(config.locale);

        Ok(Self {
            http,
            config,
            messages,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Names of every model the key can see.
    pub async fn list_models(&self) -> GlitchResult<Vec<String>> {
        let resp = self
            .http
            .get(self.url("models"))
            .query(&[("key", self.config.api_key.as_str())])
            .send()
            .await?;

        let list: ModelList = read_json(resp).await?;
        Ok(list.models.into_iter().map(|m| m.name).collect())
    }

    /// Discover a model, falling back to the configured default on any failure.
    pub async fn resolve_model(&self) -> String {
        match self.list_models().await {
            Ok(names) => choose_model(&names, &self.config.fallback_model),
            Err(e) => {
                tracing::warn!(
                    "Model listing failed, using {}: {e}",
                    self.config.fallback_model
                );
                self.config.fallback_model.clone()
            }
        }
    }

    /// Post a prompt and return the raw candidate text.
    pub async fn generate(
        &self,
        model: &str,
        prompt: &str,
        photo: Option<&PhotoPayload>,
    ) -> GlitchResult<String> {
        let mut parts = vec![Part {
            text: Some(prompt.to_string()),
            inline_data: None,
        }];
        if let Some(photo) = photo {
            parts.push(Part {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: photo.mime_type.clone(),
                    data: photo.data.clone(),
                }),
            });
        }
        let body = GenerateRequest {
            contents: vec![Content { parts }],
        };

        let resp = self
            .http
            .post(self.url(&format!("{model}:generateContent")))
            .query(&[("key", self.config.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let parsed: GenerateResponse = read_json(resp).await?;
        Ok(parsed.first_text())
    }
}

#[async_trait]
impl RuleSource for GenerationClient {
    async fn fetch_raw(&self, config: &SessionConfig) -> GlitchResult<String> {
        let model = self.resolve_model().await;
        tracing::info!("Using model: {model}");
        let prompt = build_prompt(config, &self.messages);
        self.generate(&model, &prompt, config.photo.as_ref()).await
    }
}

/// Decode a JSON body, surfacing the service's error envelope as `Api`.
async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> GlitchResult<T> {
    let status = resp.status();
    let text = resp.text().await?;

    let value: Value = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(e) if status.is_success() => return Err(e.into()),
        Err(_) => return Err(GlitchError::Api(format!("HTTP {status}"))),
    };

    if let Some(err) = value.get("error").filter(|e| e.is_object()) {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {status}"));
        return Err(GlitchError::Api(message));
    }
    if !status.is_success() {
        return Err(GlitchError::Api(format!("HTTP {status}")));
    }

    Ok(serde_json::from_value(value)?)
}
