//! HTTP plumbing shared by lookups: error classification and the retry loop.

mod retry;

pub use retry::{FetchError, classify_error, with_retry};
