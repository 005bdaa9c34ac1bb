// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 SnowDev

//! Snow Brain - streaming terminal chat client.
//!
//! Core pieces:
//! - `llm`: message/history types, the HTTP transport for the completion
//!   endpoint, and the server-sent-event fragment decoder
//! - `chat`: turn orchestration (`ChatSession`) and the display-facing
//!   transcript state consumed by the REPL in `src/main.rs`
//! - `config`, `cli`, `error`: settings, argument parsing, error taxonomy

pub mod chat;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;

pub use error::{Result, SnowbrainError};
