//! Admission control: read-only SQL validation and rate limiting.

pub mod rate_limiter;
pub mod statement;
pub mod validator;

pub use rate_limiter::{RateLimitStatus, RateLimiter, RateLimiterBuilder};
pub use statement::{ParsedStatement, SplitError, StatementKind, TokenizedQuery, split_statements};
pub use validator::{
    ALLOWED_STATEMENT_TYPES, DANGEROUS_KEYWORDS, RejectionReason, SqlValidator, ValidatedQuery,
    ValidationResult, Verdict,
};
