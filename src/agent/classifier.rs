//! Question routing.

use crate::llm::LanguageModel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Which collaborators a question needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    /// Invoice and vendor facts only.
    Data,
    /// GST rules only.
    Regulatory,
    /// Rules first, then data checked against them.
    #[default]
    Hybrid,
}

impl QueryType {
    /// Interpret a free-form model reply. Anything unrecognised is `Hybrid`.
    pub fn from_response(response: &str) -> Self {
        let response = response.trim().to_lowercase();
        if response.contains("data") {
            Self::Data
        } else if response.contains("regulatory") {
            Self::Regulatory
        } else {
            Self::Hybrid
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Regulatory => "regulatory",
            Self::Hybrid => "hybrid",
        }
    }

    pub fn needs_rules(&self) -> bool {
        matches!(self, Self::Regulatory | Self::Hybrid)
    }

    pub fn needs_data(&self) -> bool {
        matches!(self, Self::Data | Self::Hybrid)
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Asks the model to classify a question.
pub struct QueryClassifier {
    model: Arc<dyn LanguageModel>,
}

impl QueryClassifier {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Classify `question`. Model failures fall back to `Hybrid`.
    #[instrument(skip(self))]
    pub async fn classify(&self, question: &str) -> QueryType {
        match self.model.generate_text(&classification_prompt(question)).await {
            Ok(response) => {
                let query_type = QueryType::from_response(&response);
                info!("Query classified as: {}", query_type);
                query_type
            }
            Err(e) => {
                error!("Classification failed: {}", e);
                QueryType::Hybrid
            }
        }
    }
}

fn classification_prompt(question: &str) -> String {
    format!(
        "Analyze this user query and classify it into one of three categories:

1. \"data\" - Purely factual/data questions about invoices, vendors, amounts, etc.
   Examples: \"Show me all invoices from Karnataka\", \"What is the total tax collected?\"

2. \"regulatory\" - Purely regulatory/legal questions about GST rules.
   Examples: \"What is Rule 86B?\", \"Explain input tax credit limits\"

3. \"hybrid\" - Questions that require understanding GST rules AND querying data.
   Examples: \"Show invoices violating Rule 86B\", \"Find transactions exceeding ITC limits\"

User Query: {}

Respond with ONLY one word: data, regulatory, or hybrid",
        question
    )
}
