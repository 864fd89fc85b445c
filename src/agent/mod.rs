//! Question answering on top of the guarded SQL path.

pub mod classifier;
pub mod sql;
pub mod workflow;

pub use classifier::{QueryClassifier, QueryType};
pub use sql::{SqlAgent, SqlOutcome, clean_sql, format_results, format_rupees};
pub use workflow::{ComplianceFlags, Workflow, WorkflowBuilder, WorkflowOutcome};
