//! Database abstraction layer.
//!
//! The executor itself is an external collaborator; this module defines the
//! interface it implements and the row types it returns.

pub mod result;
pub mod traits;

pub use result::*;
pub use traits::QueryExecutor;
