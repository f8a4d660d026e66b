//! Semantic grouping client
//!
//! Sends a batch of names to a language-model provider and returns groups of
//! {canonical, variants, confidence}. The provider itself sits behind
//! [`GroupingTransport`]; this module owns rate limiting, retry with
//! exponential backoff, and response parsing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::response_parser;
use crate::utils::{retry_with_backoff, RateLimiter};

const USER_AGENT: &str = "xrf-ingest/0.1.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Grouping errors
#[derive(Debug, Error)]
pub enum GroupingError {
    /// Missing credentials or endpoint, or credentials rejected
    #[error("Grouping client not configured: {0}")]
    Configuration(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Coarse classification of a [`GroupingError`], used as a log tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupingErrorKind {
    Configuration,
    Transient,
    Permanent,
    /// Transport failure; not retried
    Network,
    Parse,
}

impl GroupingErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupingErrorKind::Configuration => "configuration",
            GroupingErrorKind::Transient => "transient",
            GroupingErrorKind::Permanent => "permanent",
            GroupingErrorKind::Network => "network",
            GroupingErrorKind::Parse => "parse",
        }
    }
}

impl GroupingError {
    pub fn kind(&self) -> GroupingErrorKind {
        match self {
            GroupingError::Configuration(_) => GroupingErrorKind::Configuration,
            GroupingError::RateLimited(_) => GroupingErrorKind::Transient,
            GroupingError::Api(..) => GroupingErrorKind::Permanent,
            GroupingError::Network(_) => GroupingErrorKind::Network,
            GroupingError::Parse(_) => GroupingErrorKind::Parse,
        }
    }

    /// Only rate-limit responses are retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, GroupingError::RateLimited(_))
    }
}

/// One group returned by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameGroup {
    pub canonical: String,
    pub variants: Vec<String>,
    pub confidence: f32,
}

/// Raw text completion provider
#[async_trait]
pub trait GroupingTransport: Send + Sync {
    /// Send one system + user message pair and return the reply text
    async fn complete(&self, system: &str, user: &str) -> Result<String, GroupingError>;
}

/// Retry and rate-limit policy for one client instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts for a rate-limited request (initial + retries)
    pub max_attempts: u32,
    /// Backoff before retry k (0-based) is `backoff_base × 2^k`
    pub backoff_base: Duration,
    /// Minimum spacing between requests
    pub min_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            min_interval: Duration::from_secs(1),
        }
    }
}

/// Rate-limited, retrying grouping client
///
/// Clones share the transport and the rate limiter, so every clone observes
/// the same minimum request interval.
#[derive(Clone)]
pub struct SemanticGroupingClient {
    transport: Arc<dyn GroupingTransport>,
    rate_limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl SemanticGroupingClient {
    pub fn new(transport: Arc<dyn GroupingTransport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            rate_limiter: Arc::new(RateLimiter::new(policy.min_interval)),
            policy,
        }
    }

    /// Group `names` under `system_instructions`
    ///
    /// An empty batch returns no groups without contacting the provider.
    ///
    /// # Errors
    /// The last error after the retry budget is spent, or the first
    /// non-retryable error.
    pub async fn group(
        &self,
        system_instructions: &str,
        names: &[String],
    ) -> Result<Vec<NameGroup>, GroupingError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let user_message = build_user_message(names)?;
        let transport = &self.transport;
        let limiter = &self.rate_limiter;
        let user_message = user_message.as_str();

        tracing::debug!(names = names.len(), "Requesting semantic grouping");

        let text = retry_with_backoff(
            "semantic grouping",
            self.policy.max_attempts,
            self.policy.backoff_base,
            GroupingError::is_retryable,
            |_attempt| async move {
                limiter
                    .run(transport.complete(system_instructions, user_message))
                    .await
            },
        )
        .await?;

        let groups = response_parser::parse_groups(&text)?;

        tracing::debug!(
            names = names.len(),
            groups = groups.len(),
            "Semantic grouping response parsed"
        );

        Ok(groups)
    }
}

fn build_user_message(names: &[String]) -> Result<String, GroupingError> {
    let list = serde_json::to_string(names)
        .map_err(|e| GroupingError::Parse(format!("encode names: {}", e)))?;
    Ok(format!(
        "Group the following {} names. Every input name must appear exactly once as a variant.\n{}",
        names.len(),
        list
    ))
}

// ============================================================================
// HTTP transport
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// OpenAI-compatible chat-completions transport
pub struct ChatCompletionsTransport {
    http_client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl ChatCompletionsTransport {
    /// Build the transport; a missing key is reported on each call, not here
    pub fn new(
        endpoint: String,
        model: String,
        api_key: Option<String>,
    ) -> Result<Self, GroupingError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GroupingError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint,
            model,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() && !self.endpoint.trim().is_empty()
    }
}

#[async_trait]
impl GroupingTransport for ChatCompletionsTransport {
    async fn complete(&self, system: &str, user: &str) -> Result<String, GroupingError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| GroupingError::Configuration("API key not configured".to_string()))?;
        if self.endpoint.trim().is_empty() {
            return Err(GroupingError::Configuration("endpoint not configured".to_string()));
        }

        let request = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            messages: [
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
        };

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GroupingError::Network(e.to_string()))?;

        let status = response.status();

        if status.as_u16() == 429 {
            let body = response.text().await.unwrap_or_default();
            return Err(GroupingError::RateLimited(body));
        }

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(GroupingError::Configuration(format!(
                "credentials rejected (HTTP {})",
                status.as_u16()
            )));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GroupingError::Api(status.as_u16(), body));
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| GroupingError::Parse(e.to_string()))?;

        reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GroupingError::Parse("response has no message content".to_string()))
    }
}
