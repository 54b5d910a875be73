//! Completion client that paces its calls with a governor quota.
//!
//! Every pipeline stage shares one client, so limiting here caps the whole
//! run: detectors, generation and repair passes draw from the same quota.

use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::error::CallResult;
use crate::traits::completion::{Completion, CompletionClient};

/// Waits for a quota cell before forwarding each call to the inner client.
///
/// Clones share the limiter.
#[derive(Clone)]
pub struct RateLimitedClient<C: CompletionClient> {
    inner: C,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl<C: CompletionClient> RateLimitedClient<C> {
    /// At most `requests_per_second`, bursting up to the same number.
    pub fn new(client: C, requests_per_second: NonZeroU32) -> Self {
        Self::with_quota(client, Quota::per_second(requests_per_second))
    }

    pub fn with_quota(client: C, quota: Quota) -> Self {
        Self {
            inner: client,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: CompletionClient> CompletionClient for RateLimitedClient<C> {
    async fn complete(&self, template_id: &str, prompt: &str) -> CallResult<Completion> {
        self.limiter.until_ready().await;
        self.inner.complete(template_id, prompt).await
    }
}

/// `client.rate_limited(n)` for any completion client.
pub trait CompletionClientExt: CompletionClient + Sized {
    fn rate_limited(self, requests_per_second: NonZeroU32) -> RateLimitedClient<Self> {
        RateLimitedClient::new(self, requests_per_second)
    }
}

impl<C: CompletionClient + Sized> CompletionClientExt for C {}
