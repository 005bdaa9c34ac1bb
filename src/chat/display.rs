// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 SnowDev

//! Display-facing transcript state
//!
//! Pure state for the rendering side of a chat turn, kept separate from
//! terminal I/O so it can be tested directly. The transcript mirrors the
//! session history: the user message is echoed optimistically before the
//! turn starts, an empty assistant entry appears on the first fragment,
//! and an error resolves the pending state with an apology entry instead
//! of leaving the turn loading forever.

use crate::llm::message::Role;

/// User-facing reply shown when a turn fails.
pub const APOLOGY: &str = "Sorry, I couldn't process your request. Please try again.";

/// One entry in the rendered transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayEntry {
    pub role: Role,
    pub content: String,
}

/// Progress of the current turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    /// No turn in flight.
    #[default]
    Idle,
    /// Request sent, no fragment received yet.
    Loading,
    /// Fragments arriving.
    Streaming,
}

/// Rendering-facing mirror of the message list.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<DisplayEntry>,
    phase: TurnPhase,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rendered entries, oldest first.
    pub fn entries(&self) -> &[DisplayEntry] {
        &self.entries
    }

    /// Current turn phase.
    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Echo the user message and mark the turn as loading.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.entries.push(DisplayEntry {
            role: Role::User,
            content: content.into(),
        });
        self.phase = TurnPhase::Loading;
    }

    /// Append a fragment to the in-progress assistant entry.
    ///
    /// The first fragment of a turn creates the (initially empty) entry.
    pub fn append_fragment(&mut self, fragment: &str) {
        if self.phase != TurnPhase::Streaming {
            self.entries.push(DisplayEntry {
                role: Role::Assistant,
                content: String::new(),
            });
            self.phase = TurnPhase::Streaming;
        }
        if let Some(last) = self.entries.last_mut() {
            last.content.push_str(fragment);
        }
    }

    /// Mark the turn complete.
    pub fn finish(&mut self) {
        self.phase = TurnPhase::Idle;
    }

    /// Resolve a failed turn with a user-facing apology entry.
    ///
    /// Any fragments already shown stay in the transcript; only the
    /// session history is protected from partial replies.
    pub fn fail(&mut self) {
        self.entries.push(DisplayEntry {
            role: Role::System,
            content: APOLOGY.to_string(),
        });
        self.phase = TurnPhase::Idle;
    }
}
