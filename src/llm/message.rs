// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 SnowDev

//! Message types and conversation history
//!
//! Defines the message structures sent to the completion endpoint and the
//! bounded conversation history that backs a chat session.

use serde::{Deserialize, Serialize};

/// Role of the message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System directive
    System,
    /// User message
    User,
    /// Assistant response
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Role of the message sender
    pub role: Role,

    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Bounded conversation history.
///
/// The system directive always occupies index 0 and is never evicted. At
/// most `max_messages` non-system messages are retained; `trim` drops the
/// oldest non-system messages first, preserving the relative order of the
/// rest.
#[derive(Debug, Clone)]
pub struct History {
    messages: Vec<Message>,
    max_messages: usize,
}

impl History {
    /// Create a history seeded with the system directive.
    pub fn new(system_prompt: impl Into<String>, max_messages: usize) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
            max_messages,
        }
    }

    /// Append a message to the end of the history.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Enforce the retention limit, evicting the oldest non-system messages.
    pub fn trim(&mut self) {
        if self.messages.len() > self.max_messages + 1 {
            let keep_from = self.messages.len() - self.max_messages;
            let system = self.messages[0].clone();
            let recent = self.messages.split_off(keep_from);
            self.messages = std::iter::once(system).chain(recent).collect();
        }
    }

    /// Restore the history to just the system directive.
    pub fn reset(&mut self) {
        self.messages.truncate(1);
    }

    /// Read-only view of the full history, system directive included.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Owned copy of the full history.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Total message count, system directive included.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Number of non-system messages.
    pub fn non_system_len(&self) -> usize {
        self.messages.len() - 1
    }
}
