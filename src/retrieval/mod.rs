//! GST rule retrieval over an external vector store.
//!
//! Rule documents arrive as pre-split chunks. The retriever embeds them
//! through the metered model, stores them, and later renders the top-k
//! matches for a question as a context block for SQL generation and answer
//! synthesis.

use crate::error::{RetrievalError, RetrievalResult};
use crate::llm::LanguageModel;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Default number of chunks pulled into a context block.
pub const DEFAULT_TOP_K: usize = 5;

/// Source document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Txt,
}

/// One chunk of a rule document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    /// File name the chunk came from.
    pub source: String,
    pub kind: DocumentKind,
    pub index: usize,
    pub text: String,
}

impl DocumentChunk {
    /// Build a chunk with id `<stem>_chunk_<index>`.
    pub fn new(source: &str, kind: DocumentKind, index: usize, text: impl Into<String>) -> Self {
        let stem = source.rsplit_once('.').map_or(source, |(stem, _)| stem);
        Self {
            id: format!("{}_chunk_{}", stem, index),
            source: source.to_string(),
            kind,
            index,
            text: text.into(),
        }
    }
}

/// A stored chunk returned by a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    /// Distance to the query embedding; lower is closer.
    pub distance: f32,
}

/// Vector store holding embedded rule chunks.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Number of stored chunks.
    async fn count(&self) -> RetrievalResult<usize>;

    /// Store chunks with their embeddings, index-aligned.
    async fn add(
        &self,
        chunks: Vec<DocumentChunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> RetrievalResult<()>;

    /// Return the `k` chunks closest to `embedding`, closest first.
    async fn query(&self, embedding: &[f32], k: usize) -> RetrievalResult<Vec<ScoredChunk>>;
}

/// Retrieves GST rule context for a question.
pub struct RuleRetriever {
    store: Arc<dyn VectorStore>,
    model: Arc<dyn LanguageModel>,
}

impl RuleRetriever {
    /// `model` should be a [`MeteredModel`](crate::llm::MeteredModel) so
    /// embedding calls share the process rate limit.
    pub fn new(store: Arc<dyn VectorStore>, model: Arc<dyn LanguageModel>) -> Self {
        Self { store, model }
    }

    /// Embed and store `chunks`. Returns the number stored.
    #[instrument(skip_all, fields(chunks = chunks.len()))]
    pub async fn ingest(&self, chunks: Vec<DocumentChunk>) -> RetrievalResult<usize> {
        if chunks.is_empty() {
            warn!("No documents to ingest");
            return Ok(0);
        }

        info!("Adding {} chunks to vector store", chunks.len());
        let mut embeddings = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            embeddings.push(self.model.generate_embedding(&chunk.text).await?);
        }

        let count = chunks.len();
        self.store.add(chunks, embeddings).await?;
        info!("Ingested {} document chunks", count);
        Ok(count)
    }

    /// Render the `k` closest chunks as `[Source: <file>]` blocks.
    ///
    /// Returns an empty string when the store is empty or retrieval fails;
    /// a missing context degrades the answer but never aborts it.
    #[instrument(skip(self))]
    pub async fn retrieve_context(&self, query: &str, k: usize) -> String {
        match self.try_retrieve(query, k).await {
            Ok(context) => context,
            Err(e) => {
                error!("Failed to retrieve context: {}", e);
                String::new()
            }
        }
    }

    async fn try_retrieve(&self, query: &str, k: usize) -> RetrievalResult<String> {
        if self.store.count().await? == 0 {
            warn!("Vector store is empty, cannot retrieve context");
            return Ok(String::new());
        }

        let embedding = self.model.generate_embedding(query).await?;
        let matches = self.store.query(&embedding, k).await?;
        if matches.is_empty() {
            warn!("No relevant context found");
            return Ok(String::new());
        }

        debug!("Retrieved {} relevant chunks", matches.len());
        Ok(render_context(&matches))
    }
}

/// Join matches into a context block separated by blank lines.
pub fn render_context(matches: &[ScoredChunk]) -> String {
    matches
        .iter()
        .map(|m| format!("[Source: {}]\n{}", m.chunk.source, m.chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Check that an embedding has the dimension a store expects.
pub fn check_dimension(expected: usize, embedding: &[f32]) -> RetrievalResult<()> {
    if embedding.len() != expected {
        return Err(RetrievalError::DimensionMismatch {
            expected,
            actual: embedding.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, ScriptedModel};

    fn retriever(store: Arc<MemoryStore>, model: ScriptedModel) -> RuleRetriever {
        RuleRetriever::new(store, Arc::new(model))
    }

    fn rule_chunks() -> Vec<DocumentChunk> {
        vec![
            DocumentChunk::new(
                "rule_86b.txt",
                DocumentKind::Txt,
                0,
                "Rule 86B restricts input tax credit when monthly taxable supplies exceed fifty lakh",
            ),
            DocumentChunk::new(
                "igst_act.pdf",
                DocumentKind::Pdf,
                0,
                "Integrated tax applies to inter-state supplies",
            ),
        ]
    }

    #[test]
    fn test_chunk_id() {
        let chunk = DocumentChunk::new("gst_rules.pdf", DocumentKind::Pdf, 3, "text");
        assert_eq!(chunk.id, "gst_rules_chunk_3");
        let chunk = DocumentChunk::new("notes", DocumentKind::Txt, 0, "text");
        assert_eq!(chunk.id, "notes_chunk_0");
    }

    #[tokio::test]
    async fn test_empty_store_yields_empty_context() {
        let model = ScriptedModel::new([]);
        let retriever = retriever(Arc::new(MemoryStore::new()), model);
        assert_eq!(retriever.retrieve_context("Rule 86B", 5).await, "");
    }

    #[tokio::test]
    async fn test_ingest_and_retrieve() {
        let store = Arc::new(MemoryStore::new());
        let retriever = retriever(Arc::clone(&store), ScriptedModel::new([]));

        assert_eq!(retriever.ingest(rule_chunks()).await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 2);

        let context = retriever
            .retrieve_context("Rule 86B restricts input tax credit", 1)
            .await;
        assert_eq!(
            context,
            "[Source: rule_86b.txt]\nRule 86B restricts input tax credit when monthly taxable supplies exceed fifty lakh"
        );

        let context = retriever.retrieve_context("tax", 5).await;
        assert_eq!(context.matches("[Source: ").count(), 2);
        assert!(context.contains("\n\n"));
    }

    #[tokio::test]
    async fn test_ingest_nothing() {
        let retriever = retriever(Arc::new(MemoryStore::new()), ScriptedModel::new([]));
        assert_eq!(retriever.ingest(vec![]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades_to_empty() {
        let store = Arc::new(MemoryStore::new());
        retriever(Arc::clone(&store), ScriptedModel::new([]))
            .ingest(rule_chunks())
            .await
            .unwrap();

        let failing = retriever(store, ScriptedModel::new([]).failing_embeddings());
        assert_eq!(failing.retrieve_context("Rule 86B", 5).await, "");
    }

    #[tokio::test]
    async fn test_ingest_propagates_embedding_failure() {
        let retriever = retriever(
            Arc::new(MemoryStore::new()),
            ScriptedModel::new([]).failing_embeddings(),
        );
        let err = retriever.ingest(rule_chunks()).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Embedding(_)));
    }

    #[test]
    fn test_check_dimension() {
        assert!(check_dimension(3, &[0.0, 1.0, 2.0]).is_ok());
        assert!(matches!(
            check_dimension(3, &[0.0]),
            Err(RetrievalError::DimensionMismatch {
                expected: 3,
                actual: 1
            })
        ));
    }
}
