//! Language model trait.

use crate::error::ModelResult;
use async_trait::async_trait;

/// Hosted language model used for SQL generation, classification,
/// synthesis and embeddings.
///
/// Implementations wrap a provider SDK or HTTP API; see
/// [`MeteredModel`](crate::llm::MeteredModel) for the rate-limited,
/// retrying decorator every caller should go through.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Returns the model identifier (e.g., "google/gemini-2.0-flash-001").
    fn name(&self) -> &str;

    /// Generates a text completion for `prompt`.
    async fn generate_text(&self, prompt: &str) -> ModelResult<String>;

    /// Generates an embedding vector for `text`.
    async fn generate_embedding(&self, text: &str) -> ModelResult<Vec<f32>>;
}
