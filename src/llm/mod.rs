// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 SnowDev

//! LLM transport for snowbrain
//!
//! Message types, the HTTP client for the completion endpoint, and the
//! server-sent-event decoder.

pub mod client;
pub mod message;
pub mod sse;

pub use client::{ByteStream, ChatClient};
pub use message::{History, Message, Role};
