//! LLM access
//!
//! Stages talk to a [`LlmService`]. The production stack is
//! `CachedLlm<RetryingLlm<ChatCompletionsClient>>`: every prompt is looked up
//! in a local response cache first, so re-running a stage does not repeat
//! billed calls.

pub mod cache;
pub mod http;
pub mod retry;

pub use cache::{CachedLlm, StringCache};
pub use http::ChatCompletionsClient;
pub use retry::{with_retry, RetryPolicy, RetryingLlm};

use async_trait::async_trait;
use qdt_common::Result;
use std::path::Path;
use std::sync::Arc;

/// Prompt-in, text-out language model
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Send `prompt`, optionally with an attached image, and return the reply
    async fn send_prompt(&self, prompt: &str, image: Option<&Path>) -> Result<String>;
}

#[async_trait]
impl<T: LlmService + ?Sized> LlmService for Arc<T> {
    async fn send_prompt(&self, prompt: &str, image: Option<&Path>) -> Result<String> {
        (**self).send_prompt(prompt, image).await
    }
}

/// Strip the quoting models like to wrap short answers in
pub fn trim_response(response: &str) -> String {
    response
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '`' | '«' | '»'))
        .to_string()
}

/// Whether a checker reply means "no problem found".
///
/// Accepts `OK` alone or as the last word, ignoring quotes and punctuation.
pub fn is_ok_response(response: &str) -> bool {
    let normalized = response
        .trim_matches(|c: char| matches!(c, '\n' | '\t' | ' ' | '\'' | '`' | '"' | '«' | '»' | '.'))
        .to_uppercase();
    normalized == "OK" || normalized.ends_with(" OK") || normalized.ends_with("\nOK")
}
