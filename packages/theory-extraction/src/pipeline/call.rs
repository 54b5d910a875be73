//! Validated, cached, retried completion calls.
//!
//! Every phase talks to the completion service through [`CallLayer::call`]:
//! render the template, read through the cache, call with a per-call
//! timeout, validate the response, retry with exponential backoff, and
//! write the validated value back to the cache.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use schemars::JsonSchema;
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::prompts::{PromptTemplates, PromptVariables};
use crate::error::{CallError, CallResult, PipelineError, Result};
use crate::traits::completion::{Completion, CompletionClient, CompletionContent};
use crate::traits::store::{AnalysisCache, CacheKey};
use crate::types::config::RetryPolicy;

/// Semantic checks beyond what deserialization enforces.
pub trait Validate {
    /// Describe the first problem found, if any.
    fn validate(&self) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// JSON schema of `T`, pretty-printed for inclusion in a prompt.
pub fn response_schema<T: JsonSchema>() -> String {
    let schema = schemars::schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^```[a-zA-Z]*\s*\n(.*?)\n?```$").expect("static regex")
    })
}

/// Strip a surrounding markdown code fence, if present.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    match fence_regex().captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => trimmed,
    }
}

/// Deserialize and validate a completion.
pub fn parse_completion<T>(completion: &Completion) -> CallResult<T>
where
    T: DeserializeOwned + Validate,
{
    let parsed: T = match &completion.content {
        CompletionContent::Json(value) => serde_json::from_value(value.clone()),
        CompletionContent::Text(text) => serde_json::from_str(strip_code_fence(text)),
    }
    .map_err(|e| CallError::Malformed(e.to_string()))?;

    parsed.validate().map_err(CallError::Malformed)?;
    Ok(parsed)
}

/// Hash of the whitespace-normalized prompt.
pub fn input_hash(template_hash: &str, prompt: &str) -> String {
    let normalized = prompt.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut hasher = Sha256::new();
    hasher.update(template_hash.as_bytes());
    hasher.update([0]);
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Everything a phase needs to issue calls. Borrowed, cheap to copy.
#[derive(Clone, Copy)]
pub struct CallLayer<'a> {
    pub client: &'a dyn CompletionClient,
    pub cache: &'a dyn AnalysisCache,
    pub templates: &'a PromptTemplates,
    pub retry: RetryPolicy,
    pub cache_ttl: Duration,
}

impl<'a> CallLayer<'a> {
    /// Render, call and validate, going through the cache.
    ///
    /// `response_schema` is added to `variables` automatically.
    pub async fn call<T>(&self, template_id: &str, mut variables: PromptVariables) -> Result<T>
    where
        T: DeserializeOwned + Serialize + JsonSchema + Validate,
    {
        variables
            .entry("response_schema".to_string())
            .or_insert_with(response_schema::<T>);
        let prompt = self.templates.render(template_id, &variables)?;
        let key = CacheKey::new(
            template_id,
            input_hash(&self.templates.template_hash(template_id), &prompt),
        );

        if let Some(value) = self.cached::<T>(&key).await? {
            debug!(key = %key, "Cache hit");
            return Ok(value);
        }

        let value: T = self.call_with_retry(template_id, &prompt).await?;

        let inserted = self
            .cache
            .put_if_absent(&key, serde_json::to_value(&value)?, self.cache_ttl)
            .await?;
        if !inserted {
            // Another task won the write; everyone uses the first value.
            if let Some(existing) = self.cached::<T>(&key).await? {
                return Ok(existing);
            }
        }
        Ok(value)
    }

    async fn cached<T>(&self, key: &CacheKey) -> Result<Option<T>>
    where
        T: DeserializeOwned + Validate,
    {
        let Some(value) = self.cache.get_cached(key).await? else {
            return Ok(None);
        };
        match serde_json::from_value::<T>(value) {
            Ok(parsed) if parsed.validate().is_ok() => Ok(Some(parsed)),
            _ => {
                warn!(key = %key, "Ignoring unusable cache entry");
                Ok(None)
            }
        }
    }

    /// Call without the cache, retrying retryable failures.
    pub async fn call_with_retry<T>(&self, template_id: &str, prompt: &str) -> Result<T>
    where
        T: DeserializeOwned + Validate,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = match tokio::time::timeout(
                self.retry.call_timeout(),
                self.client.complete(template_id, prompt),
            )
            .await
            {
                Err(_) => Err(CallError::Timeout),
                Ok(Err(e)) => Err(e),
                Ok(Ok(completion)) => parse_completion::<T>(&completion),
            };

            match outcome {
                Ok(value) => {
                    debug!(template_id, attempt, "Completion accepted");
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let mut delay = self.retry.backoff(attempt);
                    if let CallError::RateLimited {
                        retry_after: Some(after),
                    } = &e
                    {
                        delay = delay.max(*after);
                    }
                    warn!(
                        template_id,
                        attempt,
                        kind = e.kind(),
                        delay_ms = delay.as_millis() as u64,
                        "Completion failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(template_id, attempt, error = %e, "Completion failed");
                    return Err(PipelineError::call(template_id, attempt, e));
                }
            }
        }
    }
}
