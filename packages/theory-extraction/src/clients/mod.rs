//! Completion client wrappers.

pub mod rate_limited;

pub use rate_limited::{CompletionClientExt, RateLimitedClient};
