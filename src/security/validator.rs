//! SQL query validator.
//!
//! Admits a query only when it is exactly one statement, of a read-only kind,
//! and free of every deny-listed keyword. The structural checks work on the
//! token stream; the keyword scan covers the whole raw text as well, so a
//! statement the tokenizer misreads is still caught.

use crate::error::{SecurityError, SecurityResult};
use crate::security::statement::{StatementKind, split_statements};
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

/// Statement kinds a query may have.
pub const ALLOWED_STATEMENT_TYPES: &[&str] = &["SELECT"];

/// Keywords that must not appear anywhere in a query, in scan order.
///
/// Matching is a case-insensitive substring test, so identifiers such as
/// `replace_date` are rejected too. That over-rejection is accepted.
pub const DANGEROUS_KEYWORDS: &[&str] = &[
    "INSERT",
    "UPDATE",
    "DELETE",
    "DROP",
    "CREATE",
    "ALTER",
    "TRUNCATE",
    "REPLACE",
    "MERGE",
    "GRANT",
    "REVOKE",
    "EXEC",
    "EXECUTE",
    "CALL",
    "LOAD",
    "INTO OUTFILE",
    "INTO DUMPFILE",
];

/// Why a candidate query was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    EmptyQuery,
    ParseFailure(String),
    NoStatement,
    MultipleStatements(usize),
    DisallowedStatement(StatementKind),
    DangerousKeyword(&'static str),
}

impl RejectionReason {
    /// Stable machine-readable code for the rejection cause.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyQuery => "empty_query",
            Self::ParseFailure(_) => "parse_failure",
            Self::NoStatement => "no_statement",
            Self::MultipleStatements(_) => "multiple_statements",
            Self::DisallowedStatement(_) => "disallowed_statement",
            Self::DangerousKeyword(_) => "dangerous_keyword",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyQuery => f.write_str("empty query"),
            Self::ParseFailure(detail) => write!(f, "parse failure: {}", detail),
            Self::NoStatement => f.write_str("no valid statement found"),
            Self::MultipleStatements(_) => f.write_str("multiple statements not allowed"),
            Self::DisallowedStatement(kind) => write!(f, "disallowed statement type: {}", kind),
            Self::DangerousKeyword(keyword) => {
                write!(f, "dangerous keyword detected: {}", keyword)
            }
        }
    }
}

/// A query that passed validation.
///
/// Only [`SqlValidator`] can construct one, and executors accept nothing
/// else, so an unvalidated string cannot reach the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedQuery {
    sql: String,
}

impl ValidatedQuery {
    pub fn as_str(&self) -> &str {
        &self.sql
    }
}

impl AsRef<str> for ValidatedQuery {
    fn as_ref(&self) -> &str {
        &self.sql
    }
}

impl fmt::Display for ValidatedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Outcome of validating one candidate query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Accepted(ValidatedQuery),
    Rejected(RejectionReason),
}

impl ValidationResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    pub fn reason(&self) -> Option<&RejectionReason> {
        match self {
            Self::Accepted(_) => None,
            Self::Rejected(reason) => Some(reason),
        }
    }

    /// Flatten into the `{accepted, reason}` shape exposed to callers.
    pub fn verdict(&self) -> Verdict {
        Verdict {
            accepted: self.is_accepted(),
            reason: self.reason().map(ToString::to_string),
        }
    }

    pub fn into_result(self) -> SecurityResult<ValidatedQuery> {
        match self {
            Self::Accepted(query) => Ok(query),
            Self::Rejected(reason) => Err(SecurityError::QueryRejected(reason)),
        }
    }
}

/// Serializable validation verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub accepted: bool,
    pub reason: Option<String>,
}

/// Read-only SQL validator.
///
/// Stateless; the allow-set and deny-list are fixed constants, so a single
/// instance can be copied freely across threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlValidator;

impl SqlValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a candidate query.
    ///
    /// Total over all inputs: every failure is reported as a rejection.
    pub fn validate(&self, query: &str) -> ValidationResult {
        match self.check(query) {
            Ok(()) => {
                debug!(query = %preview(query), "Query validation passed");
                ValidationResult::Accepted(ValidatedQuery {
                    sql: query.to_string(),
                })
            }
            Err(reason) => {
                warn!(
                    code = reason.code(),
                    query = %preview(query),
                    "Query rejected: {}",
                    reason
                );
                ValidationResult::Rejected(reason)
            }
        }
    }

    /// Validate and return the admitted query, or the rejection as an error.
    pub fn admit(&self, query: &str) -> SecurityResult<ValidatedQuery> {
        self.validate(query).into_result()
    }

    fn check(&self, query: &str) -> Result<(), RejectionReason> {
        if query.trim().is_empty() {
            return Err(RejectionReason::EmptyQuery);
        }

        let tokenized =
            split_statements(query).map_err(|e| RejectionReason::ParseFailure(e.to_string()))?;

        let statement = match tokenized.statements.as_slice() {
            [] => return Err(RejectionReason::NoStatement),
            [statement] => statement,
            many => return Err(RejectionReason::MultipleStatements(many.len())),
        };

        let kind = statement.kind();
        if !ALLOWED_STATEMENT_TYPES.contains(&kind.to_string().as_str()) {
            return Err(RejectionReason::DisallowedStatement(kind));
        }

        if let Some(keyword) = find_dangerous_keyword(query, &tokenized.normalized) {
            return Err(RejectionReason::DangerousKeyword(keyword));
        }

        Ok(())
    }
}

/// First deny-listed keyword found in the raw text or its collapsed form.
fn find_dangerous_keyword(query: &str, normalized: &str) -> Option<&'static str> {
    let raw = query.to_uppercase();
    let normalized = normalized.to_uppercase();

    DANGEROUS_KEYWORDS
        .iter()
        .copied()
        .find(|keyword| raw.contains(keyword) || normalized.contains(keyword))
}

fn preview(query: &str) -> String {
    query.chars().take(100).collect()
}
