//! `OpenAI`-compatible adapter for chat completions and embeddings.

use std::{env, fmt, time::Duration};

use async_trait::async_trait;
use futures::stream;
use hyper::body::to_bytes;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE};
use hyper::{Body, Request, Uri};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::debug;

use crate::http_client::{HyperClient, build_https_client};
use crate::traits::{
    AdapterError, AdapterMetadata, AdapterResult, AdapterStream, EmbeddingAdapter,
    InferenceChunk, InferenceRequest, MessageRole, ModelAdapter, PromptMessage,
};

/// Environment variable used when loading configuration automatically.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Embedding model used when none is configured.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Configuration for the `OpenAI` adapter.
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    api_key: Option<String>,
    model: String,
    embedding_model: String,
    base_url: String,
    timeout: Duration,
    default_temperature: Option<f32>,
}

impl OpenAiConfig {
    /// Creates a configuration using the supplied chat model identifier.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            api_key: None,
            model: model.into(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_owned(),
            base_url: "https://api.openai.com/".to_owned(),
            timeout: Duration::from_secs(60),
            default_temperature: None,
        }
    }

    /// Loads the API key from the `OPENAI_API_KEY` environment variable.
    #[must_use]
    pub fn from_env(model: impl Into<String>) -> Self {
        let mut cfg = Self::new(model);
        cfg.api_key = env::var(OPENAI_API_KEY_ENV).ok();
        cfg
    }

    /// Overrides the base URL used for API calls.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the supplied URL is invalid.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> AdapterResult<Self> {
        self.base_url = sanitize_base_url(base_url.as_ref())?;
        Ok(self)
    }

    /// Sets the embedding model.
    #[must_use]
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Sets the default sampling temperature used when requests omit it.
    #[must_use]
    pub fn with_default_temperature(mut self, temperature: f32) -> Self {
        self.default_temperature = Some(temperature);
        self
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Supplies an explicit API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

/// Adapter that calls an `OpenAI`-compatible API over HTTPS.
///
/// One instance serves both [`ModelAdapter`] and [`EmbeddingAdapter`].
pub struct OpenAiAdapter {
    client: HyperClient,
    chat_endpoint: Uri,
    embeddings_endpoint: Uri,
    metadata: AdapterMetadata,
    embedding_metadata: AdapterMetadata,
    api_key: String,
    timeout: Duration,
    default_temperature: Option<f32>,
}

impl fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiAdapter")
            .field("model", &self.metadata.model())
            .field("embedding_model", &self.embedding_metadata.model())
            .field("endpoint", &self.chat_endpoint)
            .finish_non_exhaustive()
    }
}

impl OpenAiAdapter {
    /// Constructs a new adapter with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the API key is missing or an
    /// endpoint cannot be derived from the base URL.
    pub fn new(config: OpenAiConfig) -> AdapterResult<Self> {
        let api_key = config
            .api_key
            .ok_or_else(|| AdapterError::configuration("OpenAI adapter requires an API key"))?;

        let chat_endpoint = endpoint(&config.base_url, "v1/chat/completions")?;
        let embeddings_endpoint = endpoint(&config.base_url, "v1/embeddings")?;

        Ok(Self {
            client: build_https_client()?,
            chat_endpoint,
            embeddings_endpoint,
            metadata: AdapterMetadata::new("openai", config.model),
            embedding_metadata: AdapterMetadata::new("openai", config.embedding_model),
            api_key,
            timeout: config.timeout,
            default_temperature: config.default_temperature,
        })
    }

    fn build_request(&self, request: &InferenceRequest) -> ChatCompletionRequest {
        let system = request
            .system_prompt()
            .map(|prompt| PromptMessage::new(MessageRole::System, prompt));
        let messages = system
            .iter()
            .chain(request.messages())
            .map(map_prompt_message)
            .collect();

        ChatCompletionRequest {
            model: self.metadata.model().to_owned(),
            messages,
            temperature: request.temperature().or(self.default_temperature),
            max_tokens: request.max_output_tokens(),
            stop: request.stop_sequences().to_vec(),
            stream: false,
        }
    }

    async fn post_json<P, R>(&self, uri: &Uri, payload: &P) -> AdapterResult<R>
    where
        P: Serialize + Sync,
        R: DeserializeOwned,
    {
        let body = serde_json::to_vec(payload).map_err(|err| {
            AdapterError::invalid_request(format!("failed to encode OpenAI request: {err}"))
        })?;

        let request = Request::post(uri.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .body(Body::from(body))
            .map_err(|err| {
                AdapterError::transport(format!("failed to build OpenAI request: {err}"))
            })?;

        let response = timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| AdapterError::Timeout(self.timeout))?
            .map_err(|err| AdapterError::transport(format!("OpenAI request failed: {err}")))?;

        let status = response.status();
        let bytes = to_bytes(response.into_body()).await.map_err(|err| {
            AdapterError::transport(format!("failed to read OpenAI response: {err}"))
        })?;

        if status.as_u16() == 429 {
            return Err(AdapterError::RateLimited { retry_after: None });
        }
        if !status.is_success() {
            let reason = String::from_utf8_lossy(&bytes);
            return Err(AdapterError::response(format!(
                "OpenAI returned {status}: {reason}"
            )));
        }

        serde_json::from_slice(&bytes).map_err(|err| {
            AdapterError::response(format!("failed to decode OpenAI response: {err}"))
        })
    }
}

#[async_trait]
impl ModelAdapter for OpenAiAdapter {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn infer(&self, request: InferenceRequest) -> AdapterResult<AdapterStream> {
        let payload = self.build_request(&request);
        let response: ChatCompletionResponse =
            self.post_json(&self.chat_endpoint, &payload).await?;

        let content = response
            .choices
            .into_iter()
            .find_map(|choice| choice.message.and_then(|message| message.content))
            .unwrap_or_default();
        debug!(model = %self.metadata.model(), chars = content.len(), "chat completion received");

        let stream = stream::once(async move { Ok(InferenceChunk::new(content, true)) });
        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl EmbeddingAdapter for OpenAiAdapter {
    fn metadata(&self) -> &AdapterMetadata {
        &self.embedding_metadata
    }

    async fn embed(&self, input: &str) -> AdapterResult<Vec<f32>> {
        if input.trim().is_empty() {
            return Err(AdapterError::invalid_request("embedding input must not be empty"));
        }
        let payload = EmbeddingRequest {
            model: self.embedding_metadata.model(),
            input,
        };
        let response: EmbeddingResponse =
            self.post_json(&self.embeddings_endpoint, &payload).await?;
        response
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| AdapterError::response("OpenAI returned no embedding data"))
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

fn map_prompt_message(message: &PromptMessage) -> OpenAiMessage {
    OpenAiMessage {
        role: message.role().to_string(),
        content: message.content().to_owned(),
    }
}

fn endpoint(base_url: &str, path: &str) -> AdapterResult<Uri> {
    format!("{base_url}{path}")
        .parse::<Uri>()
        .map_err(|err| AdapterError::configuration(format!("invalid OpenAI endpoint: {err}")))
}

fn sanitize_base_url(input: &str) -> AdapterResult<String> {
    let mut base = input.trim().to_owned();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(AdapterError::configuration(
            "OpenAI base URL must start with http:// or https://",
        ));
    }
    if !base.ends_with('/') {
        base.push('/');
    }
    base.parse::<Uri>()
        .map_err(|err| AdapterError::configuration(format!("invalid OpenAI base URL: {err}")))?;
    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> OpenAiAdapter {
        let config = OpenAiConfig::new("gpt-4o-mini")
            .with_default_temperature(0.2)
            .with_api_key("test_key");
        OpenAiAdapter::new(config).expect("adapter")
    }

    #[test]
    fn base_url_requires_scheme() {
        let err = OpenAiConfig::new("gpt-4")
            .with_base_url("api.openai.com")
            .expect_err("missing scheme should error");

        assert!(matches!(err, AdapterError::Configuration { .. }));
    }

    #[test]
    fn sanitize_appends_trailing_slash() {
        let cfg = OpenAiConfig::new("gpt-4")
            .with_base_url("https://example.com/openai")
            .expect("valid URL");
        assert_eq!(cfg.base_url, "https://example.com/openai/");
    }

    #[test]
    fn missing_api_key_is_a_configuration_error() {
        let err = OpenAiAdapter::new(OpenAiConfig::new("gpt-4")).expect_err("no key");
        assert!(matches!(err, AdapterError::Configuration { .. }));
    }

    #[test]
    fn endpoints_derive_from_base_url() {
        let adapter = adapter();
        assert_eq!(adapter.chat_endpoint.path(), "/v1/chat/completions");
        assert_eq!(adapter.embeddings_endpoint.path(), "/v1/embeddings");
        assert_eq!(
            EmbeddingAdapter::metadata(&adapter).model(),
            DEFAULT_EMBEDDING_MODEL
        );
    }

    #[test]
    fn build_request_prepends_system_prompt_and_stops() {
        let adapter = adapter();
        let request = InferenceRequest::from_prompt("hello")
            .unwrap()
            .with_system_prompt("be brief")
            .with_stop_sequences(["<end>"]);

        let chat = adapter.build_request(&request);
        assert_eq!(chat.model, "gpt-4o-mini");
        assert_eq!(chat.messages.len(), 2);
        assert_eq!(chat.messages[0].role, "system");
        assert_eq!(chat.messages[1].content, "hello");
        assert_eq!(chat.stop, vec!["<end>".to_owned()]);
        assert_eq!(chat.temperature, Some(0.2));
    }

    #[test]
    fn response_parsing_extracts_content_and_embeddings() {
        let chat: ChatCompletionResponse =
            serde_json::from_str(r#"{ "choices": [ { "message": { "content": "hi" } } ] }"#)
                .unwrap();
        let content = chat
            .choices
            .into_iter()
            .find_map(|choice| choice.message.and_then(|msg| msg.content));
        assert_eq!(content.as_deref(), Some("hi"));

        let embedding: EmbeddingResponse =
            serde_json::from_str(r#"{ "data": [ { "embedding": [0.5, -0.25] } ] }"#).unwrap();
        assert_eq!(embedding.data[0].embedding, vec![0.5, -0.25]);
    }

    #[test]
    fn empty_stop_list_is_omitted() {
        let adapter = adapter();
        let chat = adapter.build_request(&InferenceRequest::from_prompt("x").unwrap());
        let json = serde_json::to_value(&chat).unwrap();
        assert!(json.get("stop").is_none());
        assert_eq!(json["stream"], false);
    }
}
