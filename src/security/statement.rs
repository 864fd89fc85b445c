//! SQL-aware statement splitting and classification.
//!
//! Statements are recovered from the token stream produced by the
//! `sqlparser` tokenizer rather than from raw text, so semicolons inside
//! string literals, quoted identifiers and comments never split a statement.
//! Comments that MySQL reads differently from the tokenizer are refused.

use serde::{Deserialize, Serialize};
use sqlparser::dialect::MySqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer, TokenizerError, Whitespace};
use std::fmt;
use thiserror::Error;

/// Why a query could not be split into statements.
#[derive(Debug, Error)]
pub enum SplitError {
    #[error("{0}")]
    Tokenizer(#[from] TokenizerError),

    /// `/*! ... */` and `/*!50000 ... */` bodies are executed by MySQL.
    #[error("executable comment not allowed")]
    ExecutableComment,

    /// MySQL ends a comment at the first `*/`; the tokenizer nests.
    #[error("nested comment not allowed")]
    NestedComment,

    /// MySQL only treats `--` as a comment when whitespace follows.
    #[error("'--' not followed by whitespace")]
    AmbiguousDashes,
}

/// Reject comments whose extent MySQL sees differently.
fn check_comment(whitespace: &Whitespace) -> Result<(), SplitError> {
    match whitespace {
        Whitespace::MultiLineComment(body) if body.starts_with('!') => {
            Err(SplitError::ExecutableComment)
        }
        Whitespace::MultiLineComment(body) if body.contains("/*") => {
            Err(SplitError::NestedComment)
        }
        Whitespace::SingleLineComment { comment, prefix }
            if prefix == "--" && comment.chars().next().is_some_and(|c| !c.is_whitespace()) =>
        {
            Err(SplitError::AmbiguousDashes)
        }
        _ => Ok(()),
    }
}

/// Command kind of a statement, taken from its leading keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Replace,
    Merge,
    Create,
    Drop,
    Alter,
    Truncate,
    Grant,
    Revoke,
    Call,
    Execute,
    Load,
    /// Any other leading keyword, uppercased.
    Other(String),
    /// The statement does not start with a keyword.
    Unknown,
}

impl StatementKind {
    fn from_keyword(upper: &str) -> Self {
        match upper {
            "SELECT" => Self::Select,
            "INSERT" => Self::Insert,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            "REPLACE" => Self::Replace,
            "MERGE" => Self::Merge,
            "CREATE" => Self::Create,
            "DROP" => Self::Drop,
            "ALTER" => Self::Alter,
            "TRUNCATE" => Self::Truncate,
            "GRANT" => Self::Grant,
            "REVOKE" => Self::Revoke,
            "CALL" => Self::Call,
            "EXEC" | "EXECUTE" => Self::Execute,
            "LOAD" => Self::Load,
            other => Self::Other(other.to_string()),
        }
    }

    /// DML keyword that terminates a `WITH` prefix.
    fn from_cte_body(upper: &str) -> Option<Self> {
        match upper {
            "SELECT" | "INSERT" | "UPDATE" | "DELETE" | "REPLACE" | "MERGE" => {
                Some(Self::from_keyword(upper))
            }
            _ => None,
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Replace => "REPLACE",
            Self::Merge => "MERGE",
            Self::Create => "CREATE",
            Self::Drop => "DROP",
            Self::Alter => "ALTER",
            Self::Truncate => "TRUNCATE",
            Self::Grant => "GRANT",
            Self::Revoke => "REVOKE",
            Self::Call => "CALL",
            Self::Execute => "EXECUTE",
            Self::Load => "LOAD",
            Self::Other(keyword) => keyword,
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// A single statement as a run of significant tokens.
#[derive(Debug, Clone)]
pub struct ParsedStatement {
    tokens: Vec<Token>,
}

impl ParsedStatement {
    /// Classify the statement by its leading command keyword.
    ///
    /// Leading parentheses are skipped. For a `WITH` prefix the kind is the
    /// first DML keyword at parenthesis depth zero after the CTE list.
    pub fn kind(&self) -> StatementKind {
        let mut depth = 0usize;
        let mut in_cte = false;

        for token in &self.tokens {
            match token {
                Token::LParen => depth += 1,
                Token::RParen => depth = depth.saturating_sub(1),
                Token::Word(word) if word.quote_style.is_none() => {
                    let upper = word.value.to_ascii_uppercase();
                    if in_cte {
                        if depth == 0 {
                            if let Some(kind) = StatementKind::from_cte_body(&upper) {
                                return kind;
                            }
                        }
                        continue;
                    }
                    if upper == "WITH" {
                        in_cte = true;
                        continue;
                    }
                    return StatementKind::from_keyword(&upper);
                }
                _ if in_cte => {}
                _ => return StatementKind::Unknown,
            }
        }

        StatementKind::Unknown
    }
}

/// Tokenized query: statements plus a whitespace-collapsed rendering.
#[derive(Debug, Clone)]
pub struct TokenizedQuery {
    pub statements: Vec<ParsedStatement>,
    /// Query text rebuilt from tokens with every run of whitespace and
    /// comments replaced by a single space.
    pub normalized: String,
}

/// Tokenize `sql` with the MySQL dialect and split it on top-level `;`.
///
/// Segments holding only whitespace and comments are dropped, so a
/// trailing semicolon followed by a comment still yields one statement.
///
/// # Errors
///
/// Fails on tokenizer errors, and on executable (`/*!`), nested, or
/// `--x` style comments.
pub fn split_statements(sql: &str) -> Result<TokenizedQuery, SplitError> {
    let dialect = MySqlDialect {};
    let tokens = Tokenizer::new(&dialect, sql).tokenize()?;

    let mut statements = Vec::new();
    let mut current = Vec::new();
    let mut normalized = String::with_capacity(sql.len());
    let mut pending_space = false;

    for token in tokens {
        match &token {
            Token::Whitespace(whitespace) => {
                check_comment(whitespace)?;
                pending_space = true;
                continue;
            }
            Token::EOF => {
                pending_space = true;
                continue;
            }
            _ => {}
        }

        if pending_space && !normalized.is_empty() {
            normalized.push(' ');
        }
        pending_space = false;
        normalized.push_str(&token.to_string());

        if token == Token::SemiColon {
            if !current.is_empty() {
                statements.push(ParsedStatement {
                    tokens: std::mem::take(&mut current),
                });
            }
        } else {
            current.push(token);
        }
    }

    if !current.is_empty() {
        statements.push(ParsedStatement { tokens: current });
    }

    Ok(TokenizedQuery {
        statements,
        normalized,
    })
}
