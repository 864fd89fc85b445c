//! In-memory test doubles for the external collaborators.

use crate::database::{QueryExecutor, QueryResult};
use crate::error::{DatabaseError, DbResult, ModelError, ModelResult, RetrievalError, RetrievalResult};
use crate::llm::LanguageModel;
use crate::retrieval::{DocumentChunk, ScoredChunk, VectorStore, check_dimension};
use crate::security::ValidatedQuery;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Letters a-z plus one bucket for digits.
pub const EMBEDDING_DIM: usize = 27;

/// Model that replays scripted text responses and embeds text as a
/// character histogram.
pub struct ScriptedModel {
    responses: Mutex<VecDeque<ModelResult<String>>>,
    prompts: Mutex<Vec<String>>,
    fail_embeddings: bool,
}

impl ScriptedModel {
    pub fn new(responses: impl IntoIterator<Item = ModelResult<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
            fail_embeddings: false,
        }
    }

    /// Replies with each string in turn.
    pub fn replying<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(replies.into_iter().map(|s| Ok(s.into())))
    }

    pub fn failing_embeddings(mut self) -> Self {
        self.fail_embeddings = true;
        self
    }

    /// Prompts received by `generate_text`, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate_text(&self, prompt: &str) -> ModelResult<String> {
        self.prompts.lock().push(prompt.to_string());
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::Request("script exhausted".into())))
    }

    async fn generate_embedding(&self, text: &str) -> ModelResult<Vec<f32>> {
        if self.fail_embeddings {
            return Err(ModelError::Request("embedding service unavailable".into()));
        }
        let mut histogram = vec![0.0f32; EMBEDDING_DIM];
        for c in text.chars().map(|c| c.to_ascii_lowercase()) {
            match c {
                'a'..='z' => histogram[(c as u8 - b'a') as usize] += 1.0,
                '0'..='9' => histogram[EMBEDDING_DIM - 1] += 1.0,
                _ => {}
            }
        }
        // Keep the vector non-zero so cosine distance stays defined.
        histogram[EMBEDDING_DIM - 1] += 0.01;
        Ok(histogram)
    }
}

/// Brute-force cosine-distance vector store.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<Vec<(DocumentChunk, Vec<f32>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn count(&self) -> RetrievalResult<usize> {
        Ok(self.entries.lock().len())
    }

    async fn add(
        &self,
        chunks: Vec<DocumentChunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> RetrievalResult<()> {
        if chunks.len() != embeddings.len() {
            return Err(RetrievalError::Store(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }
        for embedding in &embeddings {
            check_dimension(EMBEDDING_DIM, embedding)?;
        }
        self.entries.lock().extend(chunks.into_iter().zip(embeddings));
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> RetrievalResult<Vec<ScoredChunk>> {
        check_dimension(EMBEDDING_DIM, embedding)?;
        let mut scored: Vec<ScoredChunk> = self
            .entries
            .lock()
            .iter()
            .map(|(chunk, stored)| ScoredChunk {
                chunk: chunk.clone(),
                distance: cosine_distance(embedding, stored),
            })
            .collect();
        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(k);
        Ok(scored)
    }
}

/// Executor that records every query it receives.
pub struct RecordingExecutor {
    result: Mutex<Option<QueryResult>>,
    executed: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    pub fn returning(result: QueryResult) -> Self {
        Self {
            result: Mutex::new(Some(result)),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Every query fails with `QueryFailed`.
    pub fn failing() -> Self {
        Self {
            result: Mutex::new(None),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }
}

#[async_trait]
impl QueryExecutor for RecordingExecutor {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn execute_query(&self, query: &ValidatedQuery) -> DbResult<QueryResult> {
        self.executed.lock().push(query.as_str().to_string());
        self.result
            .lock()
            .clone()
            .ok_or_else(|| DatabaseError::QueryFailed("Table 'gst_db.invoices' doesn't exist".into()))
    }

    async fn health_check(&self) -> bool {
        true
    }
}
