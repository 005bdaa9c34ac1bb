// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 SnowDev

//! Chat session management
//!
//! Turn orchestration (`session`) and the display-facing transcript state
//! consumed by the terminal frontend (`display`).

pub mod display;
pub mod session;

pub use display::{DisplayEntry, Transcript, TurnPhase, APOLOGY};
pub use session::{ChatSession, TurnStream};
