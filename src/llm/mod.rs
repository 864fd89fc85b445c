//! Language model abstraction, retry policy and rate-limited access.

pub mod metered;
pub mod retry;
pub mod traits;

pub use metered::MeteredModel;
pub use retry::RetryPolicy;
pub use traits::LanguageModel;
