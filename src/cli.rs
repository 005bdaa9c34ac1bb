// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 SnowDev

//! CLI argument definitions using Clap

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Snow Brain - streaming AI chat for your terminal
#[derive(Parser, Debug)]
#[command(name = "snowbrain")]
#[command(version, about = "Streaming AI chat for your terminal")]
pub struct Cli {
    /// Model identifier (overrides settings)
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// System directive (overrides settings)
    #[arg(long, global = true)]
    pub system: Option<String>,

    /// Maximum non-system messages retained in history
    #[arg(long, global = true)]
    pub max_messages: Option<usize>,

    /// Settings file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask a single question (non-interactive, non-streaming)
    Ask(AskArgs),
}

/// Arguments for the ask subcommand
#[derive(clap::Args, Debug)]
pub struct AskArgs {
    /// The question to ask
    #[arg(required = true)]
    pub prompt: Vec<String>,
}
