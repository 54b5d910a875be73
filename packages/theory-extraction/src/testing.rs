//! Testing utilities including a scripted completion client.
//!
//! These are useful for testing applications that use the pipeline
//! without making real completion-service calls.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{CallError, CallResult};
use crate::traits::completion::{Completion, CompletionClient};

/// Record of a call made to the scripted client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub template_id: String,
    pub prompt: String,
}

struct PromptRule {
    template_id: String,
    needle: String,
    response: CallResult<Completion>,
}

#[derive(Default)]
struct Script {
    /// One-shot responses, consumed in order before anything else
    queued: HashMap<String, VecDeque<CallResult<Completion>>>,
    /// Responses chosen by a substring of the prompt
    by_prompt: Vec<PromptRule>,
    /// Fallback response per template
    by_template: HashMap<String, CallResult<Completion>>,
}

/// A deterministic completion client for testing.
///
/// Responses are looked up in order: queued one-shot responses for the
/// template, then the first prompt rule whose needle occurs in the prompt,
/// then the template's fallback. Unscripted templates fail with a
/// non-retryable `Service` error.
#[derive(Clone, Default)]
pub struct ScriptedClient {
    script: Arc<Mutex<Script>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    latency: Option<Duration>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedClient {
    /// Create a client with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `template_id` with this completion.
    pub fn with_response(self, template_id: impl Into<String>, completion: Completion) -> Self {
        lock(&self.script)
            .by_template
            .insert(template_id.into(), Ok(completion));
        self
    }

    /// Always answer `template_id` with this JSON value.
    pub fn with_json(self, template_id: impl Into<String>, value: serde_json::Value) -> Self {
        self.with_response(template_id, Completion::json(value))
    }

    /// Always fail `template_id` with this error.
    pub fn with_failure(self, template_id: impl Into<String>, error: CallError) -> Self {
        lock(&self.script)
            .by_template
            .insert(template_id.into(), Err(error));
        self
    }

    /// Answer `template_id` with `value` when the prompt contains `needle`.
    pub fn with_json_when(
        self,
        template_id: impl Into<String>,
        needle: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        self.with_result_when(template_id, needle, Ok(Completion::json(value)))
    }

    /// Answer `template_id` with `result` when the prompt contains `needle`.
    pub fn with_result_when(
        self,
        template_id: impl Into<String>,
        needle: impl Into<String>,
        result: CallResult<Completion>,
    ) -> Self {
        lock(&self.script).by_prompt.push(PromptRule {
            template_id: template_id.into(),
            needle: needle.into(),
            response: result,
        });
        self
    }

    /// Queue one-shot results for `template_id`, used before any other rule.
    pub fn with_queued(
        self,
        template_id: impl Into<String>,
        results: impl IntoIterator<Item = CallResult<Completion>>,
    ) -> Self {
        lock(&self.script)
            .queued
            .entry(template_id.into())
            .or_default()
            .extend(results);
        self
    }

    /// Sleep this long before answering each call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Get all calls made to this client.
    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    /// Number of calls made for one template.
    pub fn call_count(&self, template_id: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| c.template_id == template_id)
            .count()
    }

    /// Clear call history.
    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    fn respond(&self, template_id: &str, prompt: &str) -> CallResult<Completion> {
        let mut script = lock(&self.script);

        if let Some(result) = script
            .queued
            .get_mut(template_id)
            .and_then(|queue| queue.pop_front())
        {
            return result;
        }

        if let Some(rule) = script
            .by_prompt
            .iter()
            .find(|r| r.template_id == template_id && prompt.contains(&r.needle))
        {
            return rule.response.clone();
        }

        script
            .by_template
            .get(template_id)
            .cloned()
            .unwrap_or_else(|| {
                Err(CallError::Service(format!(
                    "no scripted response for {template_id}"
                )))
            })
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, template_id: &str, prompt: &str) -> CallResult<Completion> {
        lock(&self.calls).push(RecordedCall {
            template_id: template_id.to_string(),
            prompt: prompt.to_string(),
        });

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.respond(template_id, prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_lookup_order() {
        let client = ScriptedClient::new()
            .with_json("t", json!("fallback"))
            .with_json_when("t", "special", json!("matched"))
            .with_queued("t", [Err(CallError::Timeout)]);

        assert_eq!(
            client.complete("t", "special prompt").await,
            Err(CallError::Timeout)
        );
        assert_eq!(
            client.complete("t", "special prompt").await,
            Ok(Completion::json(json!("matched")))
        );
        assert_eq!(
            client.complete("t", "plain").await,
            Ok(Completion::json(json!("fallback")))
        );
        assert_eq!(client.call_count("t"), 3);
    }

    #[tokio::test]
    async fn test_unscripted_template_fails() {
        let client = ScriptedClient::new();
        let result = client.complete("unknown", "prompt").await;
        assert!(matches!(result, Err(CallError::Service(_))));
        assert_eq!(client.calls().len(), 1);
    }
}
