//! Database executor trait.

use crate::database::result::QueryResult;
use crate::error::DbResult;
use crate::security::ValidatedQuery;
use async_trait::async_trait;

/// Async read-only query executor.
///
/// The executor only ever receives a [`ValidatedQuery`], which the
/// [`SqlValidator`](crate::security::SqlValidator) alone can produce.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Returns the executor name (e.g., "mysql").
    fn name(&self) -> &'static str;

    /// Executes a validated read-only query and returns the rows.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::QueryFailed`](crate::error::DatabaseError::QueryFailed)
    /// if execution fails, or
    /// [`DatabaseError::NotConnected`](crate::error::DatabaseError::NotConnected)
    /// when no connection is available.
    async fn execute_query(&self, query: &ValidatedQuery) -> DbResult<QueryResult>;

    /// Checks that the database answers a trivial query.
    async fn health_check(&self) -> bool;
}
