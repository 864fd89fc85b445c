//! Classify → retrieve → query → synthesize orchestration.

use crate::agent::classifier::{QueryClassifier, QueryType};
use crate::agent::sql::{SqlAgent, format_results};
use crate::config::AssistantConfig;
use crate::database::QueryExecutor;
use crate::error::ConfigError;
use crate::llm::{LanguageModel, MeteredModel};
use crate::retrieval::{DEFAULT_TOP_K, RuleRetriever, VectorStore};
use crate::security::RateLimiter;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Signals derived from the synthesized answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ComplianceFlags {
    pub has_violations: bool,
    pub regulatory_cited: bool,
    pub data_analyzed: bool,
}

impl ComplianceFlags {
    fn derive(answer: &str, rag_context: &str, sql_result: &str) -> Self {
        let answer = answer.to_lowercase();
        Self {
            has_violations: answer.contains("violation") || answer.contains("exceed"),
            regulatory_cited: !rag_context.is_empty(),
            data_analyzed: !sql_result.is_empty(),
        }
    }
}

/// Everything produced while answering one question.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkflowOutcome {
    pub query_type: QueryType,
    pub rag_context: String,
    pub sql_query: String,
    pub sql_result: String,
    pub final_answer: String,
    /// `None` when synthesis failed.
    pub compliance_flags: Option<ComplianceFlags>,
}

/// Answers GST questions by routing them through retrieval and SQL.
pub struct Workflow {
    classifier: QueryClassifier,
    retriever: RuleRetriever,
    sql: SqlAgent,
    model: Arc<dyn LanguageModel>,
    top_k: usize,
}

impl Workflow {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        store: Arc<dyn VectorStore>,
        executor: Arc<dyn QueryExecutor>,
    ) -> Self {
        Self {
            classifier: QueryClassifier::new(Arc::clone(&model)),
            retriever: RuleRetriever::new(store, Arc::clone(&model)),
            sql: SqlAgent::new(Arc::clone(&model), executor),
            model,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn retriever(&self) -> &RuleRetriever {
        &self.retriever
    }

    pub fn sql_agent(&self) -> &SqlAgent {
        &self.sql
    }

    /// Answer `question`.
    ///
    /// Collaborator failures are folded into the outcome; this never errors.
    #[instrument(skip(self))]
    pub async fn run(&self, question: &str) -> WorkflowOutcome {
        let query_type = self.classifier.classify(question).await;
        let mut outcome = WorkflowOutcome {
            query_type,
            ..WorkflowOutcome::default()
        };

        if query_type.needs_rules() {
            info!("Retrieving GST rules context...");
            outcome.rag_context = self.retriever.retrieve_context(question, self.top_k).await;
            info!("RAG context retrieved: {} characters", outcome.rag_context.len());
        }

        if query_type.needs_data() {
            let context = Some(outcome.rag_context.as_str()).filter(|c| !c.is_empty());
            let sql = self.sql.process_query(question, context).await;
            info!("SQL execution complete. Success: {}", sql.is_success());

            outcome.sql_query = sql.sql_query.clone().unwrap_or_default();
            outcome.sql_result = match (&sql.result, &sql.error) {
                (_, Some(error)) => format!("Error: {}", error),
                (Some(result), None) => format_results(result),
                (None, None) => String::new(),
            };
        }

        self.synthesize(question, &mut outcome).await;
        outcome
    }

    async fn synthesize(&self, question: &str, outcome: &mut WorkflowOutcome) {
        let prompt = synthesis_prompt(question, outcome);
        match self.model.generate_text(&prompt).await {
            Ok(answer) => {
                outcome.compliance_flags = Some(ComplianceFlags::derive(
                    &answer,
                    &outcome.rag_context,
                    &outcome.sql_result,
                ));
                outcome.final_answer = answer;
                info!("Answer synthesized successfully");
            }
            Err(e) => {
                error!("Synthesis failed: {}", e);
                outcome.final_answer = format!("Error synthesizing answer: {}", e);
                outcome.compliance_flags = None;
            }
        }
    }
}

fn synthesis_prompt(question: &str, outcome: &WorkflowOutcome) -> String {
    let mut prompt = format!(
        "You are a GST compliance assistant. Provide a clear, direct, and actionable \
         answer to the user's question.\n\nUser Question: {}\n\n",
        question
    );

    if !outcome.rag_context.is_empty() {
        prompt.push_str(&format!("Relevant GST Rules:\n{}\n\n", outcome.rag_context));
    }

    if !outcome.sql_result.is_empty() {
        prompt.push_str(&format!(
            "Database Query Results:\n{}\n\nSQL Query Used: {}\n\n",
            outcome.sql_result, outcome.sql_query
        ));
    }

    prompt.push_str(
        "Generate a clear, direct answer following these guidelines:

1. Start with a direct answer: begin with \"Yes\" or \"No\" to the user's question
2. List violations clearly: if violations exist, list each with period, amount and threshold exceeded
3. Keep it concise
4. Focus on what the data shows, not what is missing
5. Cite rules briefly

For Rule 86B questions, monthly totals above fifty lakh rupees are violations:
state \"Yes, violations detected\", list each month with amount and excess, and
mention the input tax credit restriction (99% limit, 1% cash payment).

Answer:",
    );
    prompt
}

/// Builds a [`Workflow`] whose model calls all share one rate limiter.
pub struct WorkflowBuilder {
    config: Option<AssistantConfig>,
    model: Option<Arc<dyn LanguageModel>>,
    store: Option<Arc<dyn VectorStore>>,
    executor: Option<Arc<dyn QueryExecutor>>,
    rate_limiter: Option<Arc<RateLimiter>>,
    top_k: usize,
}

impl WorkflowBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            model: None,
            store: None,
            executor: None,
            rate_limiter: None,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn config(mut self, config: AssistantConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// The raw provider model. It is wrapped in a [`MeteredModel`] at build.
    pub fn model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn QueryExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Share an existing limiter instead of building one from config.
    pub fn rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    pub fn top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    pub fn build(self) -> Result<Workflow, ConfigError> {
        let config = self.config.unwrap_or_default();
        let model = self.model.ok_or(ConfigError::MissingField("model".into()))?;
        let store = self.store.ok_or(ConfigError::MissingField("store".into()))?;
        let executor = self
            .executor
            .ok_or(ConfigError::MissingField("executor".into()))?;

        let rate_limiter = match self.rate_limiter {
            Some(limiter) => limiter,
            None => Arc::new(RateLimiter::from_config(&config.rate_limit)?),
        };

        let metered: Arc<dyn LanguageModel> =
            Arc::new(MeteredModel::new(model, rate_limiter).with_retry(config.retry.clone()));

        let mut workflow = Workflow::new(metered, store, executor);
        workflow.top_k = self.top_k;
        Ok(workflow)
    }
}

impl Default for WorkflowBuilder {
    fn default() -> Self {
        Self::new()
    }
}
