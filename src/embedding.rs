//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]**: returns errors; used when embeddings are not configured.
//! - **[`OpenAIProvider`]**: calls an OpenAI-compatible embeddings API with retry and backoff.
//!
//! Also provides [`chunk_to_text`], the plain-text rendering of a chunk that
//! is sent to the provider, and [`cosine_similarity`].
//!
//! Providers are constructed once and passed by reference to whatever needs
//! them, so tests can substitute their own implementation.
//!
//! # Retry Strategy
//!
//! The OpenAI provider uses exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::EmbeddingConfig;
use crate::models::{Chunk, Field};

/// A backend that turns text into embedding vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts, returning one vector per text in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Instantiate the provider named by `config.provider`.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Embed a single query text.
pub async fn embed_query(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    let results = provider.embed(&[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.")
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Calls `POST {url}/embeddings` with the configured model. The API key is
/// read from `OPENAI_API_KEY` by [`OpenAIProvider::new`].
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `model` or `dims` is not set in config,
    /// or if `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Self::with_api_key(config, api_key)
    }

    /// Create a provider with an explicit API key.
    pub fn with_api_key(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            url: config.url.trim_end_matches('/').to_string(),
            model,
            dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let endpoint = format!("{}/embeddings", self.url);

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: Value = response.json().await?;
                        let vectors = parse_openai_response(&json)?;
                        check_vectors(&vectors, texts.len(), self.dims)?;
                        return Ok(vectors);
                    }

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        warn!(%status, attempt, "embedding request failed, retrying");
                        last_err = Some(anyhow::anyhow!(
                            "OpenAI API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    warn!(error = %e, attempt, "embedding request failed, retrying");
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
    }
}

/// Parse the OpenAI embeddings API response JSON.
///
/// Extracts the `data[].embedding` arrays, ordered by each item's `index`.
fn parse_openai_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());

    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, vec));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}

/// Reject a response with the wrong number of vectors, or vectors whose
/// length is not the configured `dims`.
fn check_vectors(vectors: &[Vec<f32>], inputs: usize, dims: usize) -> Result<()> {
    if vectors.len() != inputs {
        bail!(
            "OpenAI returned {} embeddings for {} inputs",
            vectors.len(),
            inputs
        );
    }
    if let Some((i, vec)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dims) {
        bail!(
            "OpenAI returned a {}-dimensional embedding at position {}, expected {} (check embedding.dims)",
            vec.len(),
            i,
            dims
        );
    }
    Ok(())
}

// ============ Text rendering ============

/// Render a chunk as the plain text that gets embedded.
///
/// Includes the title, tags, every section with its fields, and the overlap
/// context carried over from the previous chunk.
pub fn chunk_to_text(chunk: &Chunk) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "Template section: {}", chunk.title);
    if !chunk.tags.is_empty() {
        let _ = writeln!(text, "Tags: {}", chunk.tags.join(", "));
    }

    for section in &chunk.content.sections {
        let _ = writeln!(text);
        let _ = writeln!(text, "Section: {}", section.name);
        if let Some(description) = section.description() {
            let _ = writeln!(text, "{}", description);
        }
        for field in &section.fields {
            write_field(&mut text, field);
        }
    }

    if let Some(context) = &chunk.content.context {
        let _ = writeln!(text);
        let _ = writeln!(text, "Context from {}:", context.from);
        for field in &context.fields {
            write_field(&mut text, field);
        }
    }

    text.trim_end().to_string()
}

fn write_field(text: &mut String, field: &Field) {
    let required = if field.is_required() {
        ", required"
    } else {
        ""
    };
    let _ = write!(text, "- {} ({}{})", field.label, field.field_type, required);
    if let Some(description) = field.description() {
        let _ = write!(text, ": {}", description);
    }
    let _ = writeln!(text);

    if let Some(hints) = field.ai_hints().and_then(render_hints) {
        let _ = writeln!(text, "  Hints: {}", hints);
    }
}

fn render_hints(hints: &Value) -> Option<String> {
    match hints {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) if items.is_empty() => None,
        Value::Array(items) => Some(
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join("; "),
        ),
        other => Some(other.to_string()),
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors or vectors
/// of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkContent, OverlapContext, Section};

    fn field(id: &str, label: &str) -> Field {
        Field {
            id: id.to_string(),
            label: label.to_string(),
            field_type: "text".to_string(),
            description: None,
            required: None,
            ai_hints: None,
            extra: Default::default(),
        }
    }

    #[test]
    fn test_parse_response_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_response_missing_data() {
        let err = parse_openai_response(&serde_json::json!({ "error": "nope" })).unwrap_err();
        assert!(err.to_string().contains("missing data array"));
    }

    #[test]
    fn test_check_vectors_rejects_wrong_dims() {
        let vectors = vec![vec![0.1, 0.2, 0.3], vec![0.4, 0.5]];
        let err = check_vectors(&vectors, 2, 3).unwrap_err();
        assert!(err.to_string().contains("2-dimensional embedding at position 1"));
        assert!(err.to_string().contains("expected 3"));

        assert!(check_vectors(&vectors[..1], 1, 3).is_ok());
    }

    #[test]
    fn test_check_vectors_rejects_wrong_count() {
        let err = check_vectors(&[vec![1.0]], 2, 1).unwrap_err();
        assert!(err.to_string().contains("1 embeddings for 2 inputs"));
    }

    #[test]
    fn test_chunk_to_text_skips_null_description() {
        let mut tenant = field("tenant", "Tenant");
        tenant.description = Some(None);
        tenant.required = Some(None);
        let chunk = Chunk {
            id: "chunk-001".to_string(),
            title: "Parties".to_string(),
            start_line: 1,
            end_line: 10,
            tags: vec![],
            content: ChunkContent {
                sections: vec![Section {
                    id: "parties".to_string(),
                    name: "Parties".to_string(),
                    description: Some(None),
                    tags: Some(None),
                    fields: vec![tenant],
                    extra: Default::default(),
                }],
                context: None,
            },
            embedding: None,
        };
        assert_eq!(
            chunk_to_text(&chunk),
            "Template section: Parties\n\nSection: Parties\n- Tenant (text)"
        );
    }

    #[test]
    fn test_create_provider_disabled() {
        let provider = create_provider(&EmbeddingConfig::default()).unwrap();
        assert_eq!(provider.model_name(), "disabled");
        assert_eq!(provider.dims(), 0);
    }

    #[test]
    fn test_create_provider_unknown() {
        let config = EmbeddingConfig {
            provider: "chroma".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(create_provider(&config).is_err());
    }

    #[test]
    fn test_openai_requires_model() {
        let err = OpenAIProvider::with_api_key(&EmbeddingConfig::default(), "k".to_string())
            .err()
            .unwrap();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn test_openai_trims_trailing_slash() {
        let config = EmbeddingConfig {
            provider: "openai".to_string(),
            model: Some("text-embedding-3-small".to_string()),
            dims: Some(1536),
            url: "http://localhost:9999/v1/".to_string(),
            ..EmbeddingConfig::default()
        };
        let provider = OpenAIProvider::with_api_key(&config, "k".to_string()).unwrap();
        assert_eq!(provider.url, "http://localhost:9999/v1");
        assert_eq!(provider.dims(), 1536);
    }

    #[tokio::test]
    async fn test_disabled_provider_fails() {
        let err = DisabledProvider
            .embed(&["hello".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }

    #[test]
    fn test_chunk_to_text_renders_fields_and_context() {
        let mut rent = field("rent", "Monthly rent");
        rent.field_type = "currency".to_string();
        rent.required = Some(Some(true));
        rent.description = Some(Some("Amount due each month".to_string()));
        rent.ai_hints = Some(Some(serde_json::json!(["USD", "no cents"])));

        let chunk = Chunk {
            id: "chunk-002".to_string(),
            title: "Payment".to_string(),
            start_line: 1,
            end_line: 20,
            tags: vec!["money".to_string(), "lease".to_string()],
            content: ChunkContent {
                sections: vec![Section {
                    id: "payment".to_string(),
                    name: "Payment".to_string(),
                    description: Some(Some("How rent is paid".to_string())),
                    tags: None,
                    fields: vec![rent],
                    extra: Default::default(),
                }],
                context: Some(OverlapContext {
                    from: "chunk-001".to_string(),
                    fields: vec![field("tenant", "Tenant name")],
                }),
            },
            embedding: None,
        };

        let text = chunk_to_text(&chunk);
        assert!(text.starts_with("Template section: Payment\nTags: money, lease\n"));
        assert!(text.contains("Section: Payment\nHow rent is paid\n"));
        assert!(text.contains("- Monthly rent (currency, required): Amount due each month\n"));
        assert!(text.contains("  Hints: USD; no cents"));
        assert!(text.ends_with("Context from chunk-001:\n- Tenant name (text)"));
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_different_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
