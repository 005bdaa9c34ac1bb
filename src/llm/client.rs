// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 SnowDev

//! HTTP transport for the completion endpoint
//!
//! Builds OpenAI-compatible chat-completion requests, attaches the bearer
//! credential and app-identifying headers, and exposes the streaming
//! response body as a raw byte stream for the SSE decoder.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::error::{ApiError, Result, SnowbrainError};
use crate::llm::message::{Message, Role};

/// Raw response body as produced by the completion endpoint, with transport
/// failures already classified (timeouts distinguished from other errors).
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Client for the OpenAI-compatible completion endpoint
#[derive(Debug)]
pub struct ChatClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    site_url: String,
    site_name: String,
}

impl ChatClient {
    /// Create a client from settings.
    ///
    /// Fails fast with a configuration error when no API key is available,
    /// so a misconfigured credential is caught at construction rather than
    /// on the first request.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = settings.get_api_key().ok_or_else(|| {
            SnowbrainError::Config(format!(
                "No API key found. Set the {} environment variable.",
                settings.api_key_env
            ))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: settings.base_url.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            site_url: settings.site_url.clone(),
            site_name: settings.site_name.clone(),
        })
    }

    /// Override the endpoint URL (used by tests against a local server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the referer header sent for app identification.
    pub fn with_site_url(mut self, site_url: impl Into<String>) -> Self {
        self.site_url = site_url.into();
        self
    }

    /// Override the title header sent for app identification.
    pub fn with_site_name(mut self, site_name: impl Into<String>) -> Self {
        self.site_name = site_name.into();
        self
    }

    /// Build the request body for the given history.
    fn build_request<'a>(&'a self, messages: &'a [Message], stream: bool) -> ChatRequest<'a> {
        debug_assert!(!messages.is_empty(), "history must be non-empty");
        debug_assert_eq!(
            messages[0].role,
            Role::System,
            "history must begin with the system directive"
        );

        ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream,
        }
    }

    async fn post(&self, messages: &[Message], stream: bool) -> Result<reqwest::Response> {
        let body = self.build_request(messages, stream);

        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", &self.api_key))
            .header("HTTP-Referer", &self.site_url)
            .header("X-Title", &self.site_name)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(parse_error(status, &body));
        }

        Ok(response)
    }

    /// Request a completion and return the response body as a byte stream.
    ///
    /// Transport errors on the body are classified here, where the reqwest
    /// error is still visible, so the decoder can tell a mid-stream timeout
    /// apart from an ordinary connection drop.
    pub async fn send_stream(&self, messages: &[Message]) -> Result<ByteStream> {
        let response = self.post(messages, true).await?;
        let stream = response
            .bytes_stream()
            .map(|item| item.map_err(map_send_error));
        Ok(Box::pin(stream))
    }

    /// Request a non-streaming completion and return the assistant text.
    pub async fn send(&self, messages: &[Message]) -> Result<String> {
        let response = self.post(messages, false).await?;
        let api_response: ChatResponse = response.json().await?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content);

        // Same fallback reply the endpoint-less path of the UI shows.
        Ok(content.unwrap_or_else(|| "Sorry, I couldn't generate a response.".to_string()))
    }
}

/// Map reqwest transport failures, distinguishing timeouts.
fn map_send_error(err: reqwest::Error) -> SnowbrainError {
    if err.is_timeout() {
        SnowbrainError::Api(ApiError::Timeout)
    } else {
        SnowbrainError::Http(err)
    }
}

/// Parse a non-success response body into a server error.
///
/// Best-effort: the endpoint usually returns `{"error": {"message": ...}}`,
/// but any unparseable body falls back to the raw text or the status reason.
fn parse_error(status: reqwest::StatusCode, body: &str) -> SnowbrainError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| {
            if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            } else {
                body.to_string()
            }
        });

    SnowbrainError::Api(ApiError::ServerError {
        status: status.as_u16(),
        message,
    })
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}
