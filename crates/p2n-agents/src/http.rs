// crates/p2n-agents/src/http.rs
// ============================================================================
// Module: HTTP LLM Provider
// Description: Streaming provider client over a server-sent event wire.
// Purpose: Stream responses with strict limits and fail-closed parsing.
// Dependencies: crate::{events, provider}, reqwest, serde_json, tokio
// ============================================================================

//! ## Overview
//! The HTTP provider posts a response request and consumes a server-sent
//! event stream, translating each `data:` frame into a [`ProviderEvent`].
//! Unknown frame kinds fail closed as protocol violations rather than being
//! skipped, so a misconfigured endpoint is caught on the first frame. The
//! whole stream runs under a hard wall-clock cap.
//!
//! Security posture: response frames are untrusted input; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;

use crate::events::ProviderEvent;
use crate::provider::AgentRequest;
use crate::provider::AgentResponse;
use crate::provider::FunctionCall;
use crate::provider::LlmError;
use crate::provider::LlmProvider;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Configuration for the HTTP provider client.
///
/// # Invariants
/// - `allow_http = false` blocks cleartext `http://` base URLs.
/// - `stream_timeout_seconds` caps the full stream lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpLlmConfig {
    /// Base URL of the provider, without a trailing slash.
    pub base_url: String,
    /// Bearer token for authentication.
    pub api_key: String,
    /// Allow cleartext HTTP (disabled by default; tests only).
    pub allow_http: bool,
    /// Hard cap on stream duration in seconds.
    pub stream_timeout_seconds: u64,
    /// User agent string for outbound requests.
    pub user_agent: String,
}

impl HttpLlmConfig {
    /// Creates a config with defaults for the given endpoint and key.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            allow_http: false,
            // Provider default plus a two-minute grace window.
            stream_timeout_seconds: 420,
            user_agent: "paper2notebook/0.1".to_string(),
        }
    }
}

// ============================================================================
// SECTION: Wire Frames
// ============================================================================

/// A single `data:` frame from the provider stream.
#[derive(Debug, Deserialize)]
struct WireFrame {
    /// Frame type label.
    #[serde(rename = "type")]
    kind: String,
    /// Text delta for output frames.
    #[serde(default)]
    delta: Option<String>,
    /// Tool or function name when present.
    #[serde(default)]
    name: Option<String>,
    /// Search query when reported.
    #[serde(default)]
    query: Option<String>,
    /// Error message for failure frames.
    #[serde(default)]
    message: Option<String>,
}

// ============================================================================
// SECTION: Provider
// ============================================================================

/// HTTP provider speaking the streaming response wire.
///
/// # Invariants
/// - Every accepted stream ends with a completion frame; anything else is a
///   protocol violation.
pub struct HttpLlmProvider {
    /// Client configuration.
    config: HttpLlmConfig,
    /// Shared HTTP client.
    client: Client,
}

impl HttpLlmProvider {
    /// Creates an HTTP provider with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Api`] when the base URL scheme is refused or the
    /// client cannot be constructed.
    pub fn new(config: HttpLlmConfig) -> Result<Self, LlmError> {
        if !config.allow_http && config.base_url.starts_with("http://") {
            return Err(LlmError::Api("cleartext http base url refused".to_string()));
        }
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|err| LlmError::Api(err.to_string()))?;
        Ok(Self {
            config,
            client,
        })
    }

    /// Builds the JSON request body for a streaming response.
    fn request_body(request: &AgentRequest) -> serde_json::Value {
        json!({
            "model": request.model,
            "instructions": request.instructions,
            "input": request.input,
            "temperature": request.temperature,
            "max_output_tokens": request.max_output_tokens,
            "tools": request.tools,
            "stream": true,
        })
    }
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    async fn stream(
        &self,
        request: &AgentRequest,
        events: mpsc::Sender<ProviderEvent>,
    ) -> Result<AgentResponse, LlmError> {
        let url = format!("{}/v1/responses", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .header("accept", "text/event-stream")
            .json(&Self::request_body(request))
            .send()
            .await
            .map_err(|err| LlmError::Api(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Api(format!("provider returned status {status}")));
        }

        let deadline = Duration::from_secs(self.config.stream_timeout_seconds);
        tokio::time::timeout(deadline, consume_stream(response, events))
            .await
            .map_err(|_| LlmError::Timeout(self.config.stream_timeout_seconds))?
    }
}

// ============================================================================
// SECTION: Stream Consumption
// ============================================================================

/// Consumes the SSE byte stream into events and a collected response.
async fn consume_stream(
    response: reqwest::Response,
    events: mpsc::Sender<ProviderEvent>,
) -> Result<AgentResponse, LlmError> {
    let mut body = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();
    let mut collector = ResponseCollector::default();
    let mut completed = false;

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|err| LlmError::Api(err.to_string()))?;
        buffer.extend_from_slice(&chunk);
        while let Some(newline) = buffer.iter().position(|&byte| byte == b'\n') {
            let line: Vec<u8> = buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data.is_empty() || data == "[DONE]" {
                continue;
            }
            let frame: WireFrame = serde_json::from_str(data)
                .map_err(|err| LlmError::Protocol(format!("bad frame: {err}")))?;
            let event = collector.absorb(frame)?;
            if let Some(event) = event {
                let is_completed = event == ProviderEvent::Completed;
                if events.send(event).await.is_err() {
                    return Err(LlmError::Cancelled);
                }
                if is_completed {
                    completed = true;
                }
            }
        }
    }

    if !completed {
        return Err(LlmError::Protocol("stream ended without completion frame".to_string()));
    }
    Ok(collector.finish())
}

/// Accumulates wire frames into the final response.
#[derive(Default)]
struct ResponseCollector {
    /// Concatenated text deltas.
    text: String,
    /// Function argument accumulators keyed by name, in arrival order.
    function_arguments: BTreeMap<String, String>,
    /// Function names in first-seen order.
    function_order: Vec<String>,
}

impl ResponseCollector {
    /// Absorbs one frame, returning the event to forward when there is one.
    fn absorb(&mut self, frame: WireFrame) -> Result<Option<ProviderEvent>, LlmError> {
        match frame.kind.as_str() {
            "response.output_text.delta" => {
                let delta = frame.delta.unwrap_or_default();
                self.text.push_str(&delta);
                Ok(Some(ProviderEvent::TextDelta {
                    delta,
                }))
            }
            "response.file_search_call" => Ok(Some(ProviderEvent::FileSearchCall {
                query: frame.query,
            })),
            "response.web_search_call" => Ok(Some(ProviderEvent::WebSearchCall {
                query: frame.query,
            })),
            "response.function_call.start" => {
                let name = frame
                    .name
                    .ok_or_else(|| LlmError::Protocol("function start without name".to_string()))?;
                if !self.function_arguments.contains_key(&name) {
                    self.function_order.push(name.clone());
                    self.function_arguments.insert(name.clone(), String::new());
                }
                Ok(Some(ProviderEvent::FunctionCallStart {
                    name,
                }))
            }
            "response.function_call_arguments.delta" => {
                let name = frame
                    .name
                    .ok_or_else(|| LlmError::Protocol("argument delta without name".to_string()))?;
                let delta = frame.delta.unwrap_or_default();
                if !self.function_arguments.contains_key(&name) {
                    self.function_order.push(name.clone());
                }
                self.function_arguments.entry(name.clone()).or_default().push_str(&delta);
                Ok(Some(ProviderEvent::FunctionArgumentsDelta {
                    name,
                    delta,
                }))
            }
            "response.completed" => Ok(Some(ProviderEvent::Completed)),
            "response.error" => {
                Err(LlmError::Api(frame.message.unwrap_or_else(|| "unspecified".to_string())))
            }
            other => Err(LlmError::Protocol(format!("unknown frame kind: {other}"))),
        }
    }

    /// Finishes collection into the final response.
    fn finish(self) -> AgentResponse {
        let mut function_arguments = self.function_arguments;
        AgentResponse {
            text: self.text,
            function_calls: self
                .function_order
                .into_iter()
                .map(|name| {
                    let arguments = function_arguments.remove(&name).unwrap_or_default();
                    FunctionCall {
                        name,
                        arguments,
                    }
                })
                .collect(),
        }
    }
}
