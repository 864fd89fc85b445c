//! Guarded natural-language SQL for GST invoice data.
//!
//! Every model-generated query passes a read-only [`SqlValidator`] before it
//! can reach the database, and every call to the hosted model goes through a
//! shared token-bucket [`RateLimiter`]. Around that core sit rule retrieval,
//! SQL generation and a classify → retrieve → query → synthesize workflow.
//!
//! # Example
//!
//! ```no_run
//! use gst_sql_guard::{
//!     agent::WorkflowBuilder,
//!     config::AssistantConfig,
//!     database::QueryExecutor,
//!     llm::LanguageModel,
//!     retrieval::VectorStore,
//! };
//! use std::sync::Arc;
//!
//! async fn answer(
//!     model: Arc<dyn LanguageModel>,
//!     store: Arc<dyn VectorStore>,
//!     executor: Arc<dyn QueryExecutor>,
//! ) -> anyhow::Result<()> {
//!     let workflow = WorkflowBuilder::new()
//!         .config(AssistantConfig::from_env()?)
//!         .model(model)
//!         .store(store)
//!         .executor(executor)
//!         .build()?;
//!
//!     let outcome = workflow.run("Show invoices violating Rule 86B").await;
//!     println!("{}", outcome.final_answer);
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod config;
pub mod database;
pub mod error;
pub mod llm;
pub mod retrieval;
pub mod security;
pub mod transport;

#[cfg(test)]
mod testing;

pub use agent::{QueryType, SqlAgent, Workflow, WorkflowBuilder, WorkflowOutcome};
pub use config::{AssistantConfig, AssistantConfigBuilder, DatabaseConfig, ModelConfig};
pub use error::{AssistantError, Result};
pub use security::{RateLimiter, RejectionReason, SqlValidator, ValidatedQuery, ValidationResult};
