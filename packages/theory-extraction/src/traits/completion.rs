//! The completion-service seam.
//!
//! All LLM non-determinism lives behind [`CompletionClient`]. Everything
//! downstream of it is deterministic given its outputs, so tests inject a
//! scripted client (see [`crate::testing::ScriptedClient`]).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CallResult;

/// Body of a completion: free text or already-structured JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionContent {
    Text(String),
    Json(serde_json::Value),
}

/// A successful completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub content: CompletionContent,
    #[serde(default)]
    pub usage_tokens: u32,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: CompletionContent::Text(text.into()),
            usage_tokens: 0,
        }
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self {
            content: CompletionContent::Json(value),
            usage_tokens: 0,
        }
    }

    pub fn with_usage(mut self, tokens: u32) -> Self {
        self.usage_tokens = tokens;
        self
    }
}

/// A text-completion service.
///
/// Implementations wrap a specific provider. The pipeline treats every
/// response as untrusted and validates it before use.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Complete an already-rendered prompt.
    ///
    /// `template_id` names the prompt template the text was rendered from, so
    /// providers can pick per-phase settings.
    async fn complete(&self, template_id: &str, prompt: &str) -> CallResult<Completion>;
}

#[async_trait]
impl<C: CompletionClient + ?Sized> CompletionClient for std::sync::Arc<C> {
    async fn complete(&self, template_id: &str, prompt: &str) -> CallResult<Completion> {
        (**self).complete(template_id, prompt).await
    }
}
