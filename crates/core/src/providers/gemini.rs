use crate::embeddings::check_batch;
use crate::error::ServiceError;
use crate::retry::RetryPolicy;
use crate::traits::{ChatModel, Embedder};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";
pub const DEFAULT_EMBEDDING_MODEL: &str = "gemini-embedding-001";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash-lite";
pub const API_KEY_VARS: [&str; 2] = ["GOOGLE_API_KEY", "GEMINI_API_KEY"];

const SERVICE: &str = "gemini";
const MAX_BATCH: usize = 100;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub base_url: String,
    pub api_key: String,
    pub embedding_model: String,
    pub chat_model: String,
    pub embedding_dimensions: Option<usize>,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_dimensions: None,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }

    /// Reads the key from `GOOGLE_API_KEY`, then `GEMINI_API_KEY`.
    pub fn from_env() -> Option<Self> {
        let candidates = API_KEY_VARS
            .iter()
            .map(|name| std::env::var(name).ok())
            .collect::<Vec<_>>();
        first_non_empty(&candidates).map(Self::new)
    }
}

fn first_non_empty(candidates: &[Option<String>]) -> Option<String> {
    candidates
        .iter()
        .flatten()
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

/// REST client for the Gemini embedding and generation endpoints.
pub struct GeminiClient {
    config: GeminiConfig,
    base: Url,
    client: Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, ServiceError> {
        if config.api_key.trim().is_empty() {
            return Err(ServiceError::MissingCredential(API_KEY_VARS.join(" or ")));
        }

        let mut base = config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base)?;
        let client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            config,
            base,
            client,
        })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn endpoint(&self, model: &str, method: &str) -> Result<Url, ServiceError> {
        Ok(self.base.join(&format!("models/{model}:{method}"))?)
    }

    fn embed_request(&self, text: &str, task_type: &str) -> Result<Value, ServiceError> {
        if text.trim().is_empty() {
            return Err(ServiceError::InvalidInput("cannot embed empty text".to_string()));
        }

        let mut request = json!({
            "model": format!("models/{}", self.config.embedding_model),
            "content": { "parts": [{ "text": text }] },
            "taskType": task_type,
        });
        if let Some(dimensions) = self.config.embedding_dimensions {
            request["outputDimensionality"] = json!(dimensions);
        }
        Ok(request)
    }

    async fn post_json(&self, url: Url, body: &Value) -> Result<Value, ServiceError> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                service: SERVICE.to_string(),
                status: status.as_u16(),
                details,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl Embedder for GeminiClient {
    fn id(&self) -> String {
        let dimensions = self
            .config
            .embedding_dimensions
            .map(|dimensions| dimensions.to_string())
            .unwrap_or_else(|| "default".to_string());
        format!("{SERVICE}:{}:{dimensions}", self.config.embedding_model)
    }

    /// Embeds a search query (`RETRIEVAL_QUERY`).
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        let url = self.endpoint(&self.config.embedding_model, "embedContent")?;
        let body = self.embed_request(text, "RETRIEVAL_QUERY")?;
        let payload = self
            .config
            .retry
            .run("gemini.embedContent", || self.post_json(url.clone(), &body))
            .await?;
        parse_embedding(&payload)
    }

    /// Embeds document chunks (`RETRIEVAL_DOCUMENT`), at most 100 per request.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let url = self.endpoint(&self.config.embedding_model, "batchEmbedContents")?;
        let mut vectors = Vec::with_capacity(texts.len());

        for group in texts.chunks(MAX_BATCH) {
            let requests = group
                .iter()
                .map(|text| self.embed_request(text, "RETRIEVAL_DOCUMENT"))
                .collect::<Result<Vec<_>, _>>()?;
            let body = json!({ "requests": requests });

            let payload = self
                .config
                .retry
                .run("gemini.batchEmbedContents", || self.post_json(url.clone(), &body))
                .await?;
            let batch = parse_batch_embeddings(&payload)?;
            check_batch(SERVICE, group.len(), &batch)?;
            vectors.extend(batch);
        }

        Ok(vectors)
    }
}

#[async_trait]
impl ChatModel for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        let url = self.endpoint(&self.config.chat_model, "generateContent")?;
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        });

        let payload = self
            .config
            .retry
            .run("gemini.generateContent", || self.post_json(url.clone(), &body))
            .await?;
        parse_generation(&payload)
    }
}

fn malformed(details: impl Into<String>) -> ServiceError {
    ServiceError::MalformedResponse {
        service: SERVICE.to_string(),
        details: details.into(),
    }
}

fn parse_values(values: Option<&Value>) -> Result<Vec<f32>, ServiceError> {
    let values = values
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("embedding values are missing"))?;

    let vector = values
        .iter()
        .map(|value| value.as_f64().map(|number| number as f32))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| malformed("embedding contains a non-numeric value"))?;

    if vector.is_empty() {
        return Err(malformed("embedding is empty"));
    }
    Ok(vector)
}

fn parse_embedding(payload: &Value) -> Result<Vec<f32>, ServiceError> {
    parse_values(payload.pointer("/embedding/values"))
}

fn parse_batch_embeddings(payload: &Value) -> Result<Vec<Vec<f32>>, ServiceError> {
    payload
        .pointer("/embeddings")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("batch response has no embeddings"))?
        .iter()
        .map(|embedding| parse_values(embedding.pointer("/values")))
        .collect()
}

fn parse_generation(payload: &Value) -> Result<String, ServiceError> {
    let text = payload
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.pointer("/text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = payload
            .pointer("/promptFeedback/blockReason")
            .or_else(|| payload.pointer("/candidates/0/finishReason"))
            .and_then(Value::as_str)
            .unwrap_or("no candidates");
        return Err(malformed(format!("empty generation ({reason})")));
    }

    Ok(text)
}
