//! Natural-language to SQL generation and guarded execution.

use crate::database::{CellValue, QueryExecutor, QueryResult};
use crate::error::{AssistantError, ModelResult, Result, SecurityError};
use crate::llm::LanguageModel;
use crate::security::SqlValidator;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Columns rendered as rupee amounts by [`format_results`].
pub const MONETARY_COLUMNS: &[&str] = &[
    "total_amount",
    "tax_amount",
    "cgst",
    "sgst",
    "igst",
    "unit_price",
];

pub const SCHEMA_CONTEXT: &str = "\
Database Schema:

1. vendors table:
   - vendor_id (INT, PRIMARY KEY)
   - vendor_name (VARCHAR)
   - gstin (VARCHAR) - GST Identification Number
   - state (VARCHAR)
   - city (VARCHAR)

2. invoices table:
   - invoice_id (INT, PRIMARY KEY)
   - vendor_id (INT, FOREIGN KEY to vendors)
   - invoice_number (VARCHAR)
   - date (DATE)
   - total_amount (DECIMAL)
   - tax_amount (DECIMAL)
   - cgst (DECIMAL) - Central GST
   - sgst (DECIMAL) - State GST
   - igst (DECIMAL) - Integrated GST
   - status (ENUM: 'PAID', 'UNPAID', 'OVERDUE')
   - place_of_supply (VARCHAR)
   - is_reverse_charge (BOOLEAN)

3. invoice_items table:
   - item_id (INT, PRIMARY KEY)
   - invoice_id (INT, FOREIGN KEY to invoices)
   - description (VARCHAR)
   - hsn_code (VARCHAR) - Harmonized System Nomenclature
   - quantity (INT)
   - unit_price (DECIMAL)
   - tax_rate (DECIMAL)

Important Notes:
- Intra-state transactions have CGST and SGST (both are equal, each is half of total tax)
- Inter-state transactions have only IGST (no CGST/SGST)
- tax_amount = cgst + sgst + igst
- Use JOINs to combine data from multiple tables
";

const GENERATION_RULES: &str = "\
Task: Convert the following natural language query to a MySQL SELECT query.

Requirements:
- Generate ONLY the SQL query, no explanations
- Use proper JOIN syntax when querying multiple tables
- Use appropriate aggregation functions (SUM, COUNT, AVG, etc.)
- Include ORDER BY and LIMIT clauses when appropriate
- Return valid MySQL syntax

IMPORTANT PATTERNS:

1. Location-based invoice queries: \"[State] invoices\" filters on
   invoices.place_of_supply, not vendors.state, unless the question asks
   about vendors located there. IGST applies to inter-state supplies.

2. Monthly aggregation: group with DATE_FORMAT(date, '%Y-%m') and
   SUM(total_amount) AS monthly_total.

3. Rule 86B applies to MONTHLY AGGREGATE purchases above 5000000
   (fifty lakh rupees), checked with HAVING SUM(total_amount) > 5000000,
   never to individual invoices.

4. When the context mentions a limit, apply it to aggregates and include
   the supporting invoice details.
";

static FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:sql)?").expect("Invalid regex: markdown fence pattern"));

static NON_PRINTABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^\x20-\x7E\n\r\t]").expect("Invalid regex: non-printable pattern")
});

/// Result of one question → SQL → rows round trip.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SqlOutcome {
    /// Generated SQL; `None` when generation itself failed.
    pub sql_query: Option<String>,
    pub result: Option<QueryResult>,
    pub error: Option<String>,
}

impl SqlOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn row_count(&self) -> usize {
        self.result.as_ref().map_or(0, |r| r.row_count)
    }
}

/// Turns questions into SQL and runs it through the validator.
pub struct SqlAgent {
    model: Arc<dyn LanguageModel>,
    executor: Arc<dyn QueryExecutor>,
    validator: SqlValidator,
}

impl SqlAgent {
    pub fn new(model: Arc<dyn LanguageModel>, executor: Arc<dyn QueryExecutor>) -> Self {
        info!("SQL agent initialized with executor {}", executor.name());
        Self {
            model,
            executor,
            validator: SqlValidator::new(),
        }
    }

    /// Generate a SELECT for `question`, informed by optional rule context.
    #[instrument(skip(self, context), fields(has_context = context.is_some()))]
    pub async fn generate_sql(&self, question: &str, context: Option<&str>) -> ModelResult<String> {
        let prompt = build_prompt(question, context);
        let raw = self.model.generate_text(&prompt).await.inspect_err(|e| {
            error!("Failed to generate SQL: {}", e);
        })?;
        let sql = clean_sql(&raw);
        info!("Generated SQL: {}", sql);
        Ok(sql)
    }

    /// Validate `sql` and execute it when accepted.
    ///
    /// A rejected query is never handed to the executor.
    pub async fn execute_sql(&self, sql: &str) -> Result<QueryResult> {
        let query = self.validator.admit(sql).inspect_err(|e| {
            error!("SQL validation failed: {}", e);
        })?;

        let result = self.executor.execute_query(&query).await.inspect_err(|e| {
            error!("Query execution failed: {}", e);
        })?;
        info!("Query executed successfully. Returned {} rows", result.row_count);
        Ok(result)
    }

    /// Generate and execute SQL for `question`.
    #[instrument(skip(self, context))]
    pub async fn process_query(&self, question: &str, context: Option<&str>) -> SqlOutcome {
        let sql = match self.generate_sql(question, context).await {
            Ok(sql) => sql,
            Err(e) => {
                return SqlOutcome {
                    error: Some(e.to_string()),
                    ..SqlOutcome::default()
                };
            }
        };

        match self.execute_sql(&sql).await {
            Ok(result) => SqlOutcome {
                sql_query: Some(sql),
                result: Some(result),
                error: None,
            },
            Err(e) => SqlOutcome {
                sql_query: Some(sql),
                result: None,
                error: Some(describe_failure(&e)),
            },
        }
    }
}

fn describe_failure(err: &AssistantError) -> String {
    match err {
        AssistantError::Security(SecurityError::QueryRejected(reason)) => {
            format!("Security validation failed: {}", reason)
        }
        AssistantError::Database(e) => e.to_string(),
        other => other.to_string(),
    }
}

fn build_prompt(question: &str, context: Option<&str>) -> String {
    let mut prompt = format!("{}\n{}\n", SCHEMA_CONTEXT, GENERATION_RULES);
    if let Some(context) = context.filter(|c| !c.is_empty()) {
        prompt.push_str("Additional Context (GST Rules):\n");
        prompt.push_str(context);
        prompt.push_str(
            "\n\nUse this context to inform your SQL query. \
             Pay special attention to whether a rule applies to individual \
             transactions or aggregated amounts.\n\n",
        );
    }
    prompt.push_str(&format!("Natural Language Query: {}\n\nSQL Query:", question));
    prompt
}

/// Extract a single SQL statement from a model response.
pub fn clean_sql(raw: &str) -> String {
    let sql = FENCE.replace_all(raw.trim(), "");
    let sql = NON_PRINTABLE.replace_all(&sql, "");
    let sql = sql.split(';').next().unwrap_or_default();
    let sql = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    sql.replace(" FROM ", "\nFROM ")
        .replace(" WHERE ", "\nWHERE ")
        .replace(" ORDER BY ", "\nORDER BY ")
        .trim()
        .to_string()
}

/// Render rows for the synthesis prompt.
pub fn format_results(result: &QueryResult) -> String {
    if result.rows.is_empty() {
        return "No results found.".to_string();
    }

    let blocks: Vec<String> = result
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            // Declared columns first, then any extra keys in name order.
            let mut names: Vec<&str> = result.columns.iter().map(|c| c.name.as_str()).collect();
            let mut extra: Vec<&str> = row
                .keys()
                .map(String::as_str)
                .filter(|key| !names.contains(key))
                .collect();
            extra.sort_unstable();
            names.extend(extra);

            let mut block = format!("Result {}:", i + 1);
            for name in names {
                let Some(value) = row.get(name) else { continue };
                block.push_str(&format!("\n  {}: {}", name, format_cell(name, value)));
            }
            block
        })
        .collect();

    format!("Found {} result(s):\n\n{}", result.rows.len(), blocks.join("\n\n"))
}

fn format_cell(column: &str, value: &CellValue) -> String {
    if MONETARY_COLUMNS.contains(&column) {
        if let Some(amount) = value.as_decimal() {
            return format_rupees(amount);
        }
    }
    value.to_string()
}

/// Format an amount as `₹1,234.50`.
pub fn format_rupees(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let text = format!("{:.2}", rounded.abs());
    let (whole, fraction) = text.split_once('.').unwrap_or((&text, "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    format!("₹{}{}.{}", sign, grouped, fraction)
}
