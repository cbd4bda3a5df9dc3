//! Embedding service with multi-provider fallback.
//!
//! Supports Gemini and OpenAI embedding APIs with automatic fallback
//! when rate limits are hit or providers fail. Falls back to hash-based
//! placeholders when no providers are configured.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{EmbeddingConfig, EmbeddingProvider};
use crate::error::{Error, Result};

/// Maximum retries per provider before fallback
const MAX_RETRIES: u32 = 2;

/// Delay between retries (doubles each time)
const RETRY_DELAY_MS: u64 = 500;

/// Converts text into a fixed-length numeric vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// The fixed, system-wide embedding dimension.
    fn dimension(&self) -> usize;
}

/// Service for generating text embeddings with multi-provider fallback.
///
/// Tries providers in priority order, automatically falling back on rate
/// limits or failures. Uses deterministic hash-based placeholders when no
/// providers are configured.
#[derive(Clone)]
pub struct EmbeddingService {
    inner: Arc<EmbeddingServiceInner>,
}

struct EmbeddingServiceInner {
    providers: Vec<EmbeddingProvider>,
    dimension: usize,
    client: Client,
}

/// Gemini embedding response
#[derive(Debug, Deserialize)]
struct GeminiEmbedResponse {
    embedding: Option<GeminiEmbedding>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
    code: Option<i32>,
}

/// OpenAI embedding response
#[derive(Debug, Deserialize)]
struct OpenAIEmbedResponse {
    data: Option<Vec<OpenAIEmbedding>>,
    error: Option<OpenAIError>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}

/// Get default dimension for a model
fn default_dimension(model: &str) -> usize {
    if model.contains("text-embedding-001") || model.contains("embedding-001") {
        768
    } else if model.contains("text-embedding-3-small") {
        1536
    } else if model.contains("text-embedding-3-large") {
        3072
    } else if model.contains("text-embedding-ada-002") {
        1536
    } else {
        384 // Default
    }
}

impl EmbeddingService {
    /// Create an embedding service from configuration.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        // The first provider fixes the system-wide dimension
        let dimension = config
            .providers
            .first()
            .map(|p| default_dimension(&p.model))
            .unwrap_or(config.dimension);

        if config.providers.is_empty() {
            warn!(
                dimension,
                "No embedding providers configured - using hash-based placeholders"
            );
        } else {
            info!(
                providers = ?config.providers.iter().map(|p| &p.name).collect::<Vec<_>>(),
                dimension,
                "Embedding service initialized"
            );
        }

        Ok(Self {
            inner: Arc::new(EmbeddingServiceInner {
                providers: config.providers.clone(),
                dimension,
                client,
            }),
        })
    }

    /// Check if real embedding providers are available
    pub fn has_providers(&self) -> bool {
        !self.inner.providers.is_empty()
    }

    /// Try a provider with retries.
    async fn try_provider(&self, provider: &EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
        let mut delay = Duration::from_millis(RETRY_DELAY_MS);

        for attempt in 0..MAX_RETRIES {
            match self.call_provider(provider, text).await {
                Ok(embedding) => return Ok(embedding),
                Err(e) => {
                    if Self::is_retryable(&e) && attempt < MAX_RETRIES - 1 {
                        debug!(
                            provider = %provider.name,
                            attempt,
                            delay_ms = delay.as_millis(),
                            "Retrying after error"
                        );
                        sleep(delay).await;
                        delay *= 2;
                    } else {
                        return Err(e);
                    }
                }
            }
        }

        Err(Error::Embedding("Max retries exceeded".to_string()))
    }

    /// Call the provider's embedding API
    async fn call_provider(&self, provider: &EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
        match provider.name.as_str() {
            "gemini" => self.call_gemini(provider, text).await,
            "openai" => self.call_openai(provider, text).await,
            _ => Err(Error::Embedding(format!(
                "Unknown embedding provider: {}",
                provider.name
            ))),
        }
    }

    /// Call Gemini embedding API
    async fn call_gemini(&self, provider: &EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
        let url = format!(
            "{}/models/{}:embedContent?key={}",
            provider.base_url, provider.model, provider.api_key
        );

        let body = json!({
            "model": format!("models/{}", provider.model),
            "content": {
                "parts": [{"text": text}]
            }
        });

        let response = self
            .inner
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        let resp: GeminiEmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse Gemini response: {}", e)))?;

        if let Some(error) = resp.error {
            return Err(Error::Embedding(format!(
                "Gemini error ({}): {}",
                error.code.unwrap_or(status.as_u16() as i32),
                error.message
            )));
        }

        resp.embedding
            .map(|e| e.values)
            .ok_or_else(|| Error::Embedding("No embedding in Gemini response".to_string()))
    }

    /// Call OpenAI embedding API
    async fn call_openai(&self, provider: &EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", provider.base_url);

        let body = json!({
            "model": provider.model,
            "input": text
        });

        let response = self
            .inner
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", provider.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("OpenAI request failed: {}", e)))?;

        let resp: OpenAIEmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse OpenAI response: {}", e)))?;

        if let Some(error) = resp.error {
            return Err(Error::Embedding(format!("OpenAI error: {}", error.message)));
        }

        resp.data
            .and_then(|d| d.into_iter().next())
            .map(|e| e.embedding)
            .ok_or_else(|| Error::Embedding("No embedding in OpenAI response".to_string()))
    }

    /// Check if an error is retryable (rate limit, temporary failure)
    fn is_retryable(error: &Error) -> bool {
        let msg = error.to_string().to_lowercase();
        msg.contains("rate")
            || msg.contains("limit")
            || msg.contains("429")
            || msg.contains("503")
            || msg.contains("timeout")
            || msg.contains("temporarily")
    }

    /// Generate a deterministic embedding from text using hashing.
    /// This is NOT semantic - just a fallback for development/testing.
    fn hash_embed(&self, text: &str, dim: usize) -> Vec<f32> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut embedding = vec![0.0f32; dim];

        // Use multiple hash seeds to fill the embedding
        for (i, slot) in embedding.iter_mut().enumerate() {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            (i as u64).hash(&mut hasher);
            let hash = hasher.finish();

            // Convert to float in [-1, 1] range
            *slot = ((hash as f64 / u64::MAX as f64) * 2.0 - 1.0) as f32;
        }

        // Normalize to unit length
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut embedding {
                *x /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl Embedder for EmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Err(Error::Validation("cannot embed empty text".into()));
        }

        // Use hash fallback if no providers
        if self.inner.providers.is_empty() {
            debug!("Generating hash-based placeholder embedding");
            return Ok(self.hash_embed(text, self.inner.dimension));
        }

        // Try each provider with fallback
        let mut last_error = None;

        for provider in &self.inner.providers {
            match self.try_provider(provider, text).await {
                Ok(embedding) => return Ok(embedding),
                Err(e) => {
                    warn!(
                        provider = %provider.name,
                        error = %e,
                        "Embedding provider failed, trying next"
                    );
                    last_error = Some(e);
                }
            }
        }

        // When providers are configured but ALL fail, return error (don't
        // use the hash fallback) so callers can degrade explicitly.
        Err(last_error
            .unwrap_or_else(|| Error::Embedding("All embedding providers failed".to_string())))
    }

    fn dimension(&self) -> usize {
        self.inner.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> EmbeddingConfig {
        EmbeddingConfig {
            providers: vec![],
            dimension: 384,
        }
    }

    #[test]
    fn test_hash_embed_deterministic() {
        let service = EmbeddingService::from_config(&test_config()).unwrap();

        let emb1 = service.hash_embed("test text", 384);
        let emb2 = service.hash_embed("test text", 384);

        assert_eq!(emb1, emb2);
        assert_eq!(emb1.len(), 384);
    }

    #[test]
    fn test_hash_embed_normalized() {
        let service = EmbeddingService::from_config(&test_config()).unwrap();

        let emb = service.hash_embed("test text", 384);
        let norm: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();

        // Should be approximately 1.0 (unit vector)
        assert!((norm - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_no_providers_uses_fallback() {
        let service = EmbeddingService::from_config(&test_config()).unwrap();

        assert!(!service.has_providers());
        assert_eq!(service.dimension(), 384);

        let emb = service.embed("hello").await.unwrap();
        assert_eq!(emb.len(), 384);
    }

    #[tokio::test]
    async fn test_embed_empty_rejected() {
        let service = EmbeddingService::from_config(&test_config()).unwrap();
        assert!(service.embed("").await.is_err());
    }

    #[test]
    fn test_default_dimensions() {
        assert_eq!(default_dimension("text-embedding-001"), 768);
        assert_eq!(default_dimension("text-embedding-3-small"), 1536);
        assert_eq!(default_dimension("text-embedding-3-large"), 3072);
        assert_eq!(default_dimension("unknown-model"), 384);
    }
}
