// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 SnowDev

//! Error types for snowbrain
//!
//! This module defines all error types used throughout the application.

use thiserror::Error;

/// Main error type for snowbrain operations
#[derive(Error, Debug)]
pub enum SnowbrainError {
    /// API-related errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A turn was requested while another one is still in flight
    #[error("Session busy: a turn is already in flight")]
    SessionBusy,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(String),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// API-specific error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// The completion endpoint returned a non-success status
    #[error("API error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Invalid response from the API
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Timeout waiting for response
    #[error("Request timed out")]
    Timeout,

    /// Streaming error
    #[error("Streaming error: {0}")]
    StreamError(String),
}

/// Result type alias for snowbrain operations
pub type Result<T> = std::result::Result<T, SnowbrainError>;

impl From<toml::de::Error> for SnowbrainError {
    fn from(err: toml::de::Error) -> Self {
        SnowbrainError::Toml(err.to_string())
    }
}

impl From<toml::ser::Error> for SnowbrainError {
    fn from(err: toml::ser::Error) -> Self {
        SnowbrainError::Toml(err.to_string())
    }
}
