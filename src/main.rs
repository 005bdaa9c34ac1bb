// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 SnowDev

//! Snow Brain - streaming AI chat for your terminal
//!
//! Entry point for the snowbrain CLI application.

use std::io::{self, Write};

use clap::Parser;
use crossterm::{
    style::{Color, ResetColor, SetForegroundColor},
    ExecutableCommand,
};
use futures::StreamExt;

use snowbrain::chat::{ChatSession, Transcript, APOLOGY};
use snowbrain::cli::{Cli, Commands};
use snowbrain::config::Settings;
use snowbrain::error::Result;
use snowbrain::llm::message::Role;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing. Default WARN; `-v` enables crate diagnostics
    // without requiring target names up front. `RUST_LOG` still wins.
    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::WARN.into());
    if cli.verbose > 0 {
        if let Ok(directive) = "snowbrain=debug".parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    // Load settings and apply CLI overrides.
    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    if let Some(model) = cli.model {
        settings.model = model;
    }
    if let Some(system) = cli.system {
        settings.system_prompt = system;
    }
    if let Some(max) = cli.max_messages {
        settings.max_messages = max;
    }

    let mut session = ChatSession::new(&settings)?;

    match cli.command {
        Some(Commands::Ask(args)) => run_ask(&mut session, &args.prompt.join(" ")).await,
        None => run_chat(&mut session, &settings).await,
    }
}

/// One-shot question, non-streaming.
async fn run_ask(session: &mut ChatSession, prompt: &str) -> Result<()> {
    let reply = session.ask(prompt).await?;
    println!("{reply}");
    Ok(())
}

/// Interactive chat REPL.
async fn run_chat(session: &mut ChatSession, settings: &Settings) -> Result<()> {
    let mut transcript = Transcript::new();

    println!("Snow Brain AI ({})", settings.model);
    println!("Type /help for commands, /quit to exit.\n");

    loop {
        let input = match read_user_input()? {
            Some(line) => line,
            None => break, // EOF
        };
        let input = input.trim().to_string();

        if input.is_empty() {
            continue;
        }

        match input.as_str() {
            "/quit" | "/exit" => break,
            "/help" => {
                print_help();
                continue;
            }
            "/clear" => {
                session.reset().await;
                transcript = Transcript::new();
                println!("History cleared.\n");
                continue;
            }
            "/history" => {
                print_history(&transcript);
                continue;
            }
            _ => {}
        }

        run_one_turn(session, &mut transcript, &input).await?;
    }

    Ok(())
}

/// Drive a single streaming turn, printing fragments as they arrive.
///
/// Ctrl-C cancels the turn: the partial text stays on screen but is not
/// committed to the session history.
async fn run_one_turn(
    session: &mut ChatSession,
    transcript: &mut Transcript,
    input: &str,
) -> Result<()> {
    transcript.push_user(input);

    let mut stream = match session.run_turn(input) {
        Ok(stream) => stream,
        Err(err) => {
            tracing::error!(%err, "failed to start turn");
            transcript.fail();
            print_system_line(APOLOGY)?;
            return Ok(());
        }
    };

    print_prefix("snow>", Color::Cyan)?;

    loop {
        tokio::select! {
            item = stream.next() => match item {
                Some(Ok(fragment)) => {
                    transcript.append_fragment(&fragment);
                    print!("{fragment}");
                    io::stdout().flush()?;
                }
                Some(Err(err)) => {
                    tracing::error!(%err, "turn failed");
                    transcript.fail();
                    println!();
                    print_system_line(APOLOGY)?;
                    return Ok(());
                }
                None => {
                    transcript.finish();
                    println!("\n");
                    return Ok(());
                }
            },
            _ = tokio::signal::ctrl_c() => {
                session.stop().await;
                transcript.finish();
                println!("\n[stopped]\n");
                return Ok(());
            }
        }
    }
}

/// Read one line of user input behind a colored prompt. `None` on EOF.
fn read_user_input() -> Result<Option<String>> {
    print_prefix("you>", Color::Green)?;

    let mut line = String::new();
    let read = io::stdin().read_line(&mut line)?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line))
}

fn print_prefix(label: &str, color: Color) -> Result<()> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(color))?;
    print!("{label} ");
    stdout.execute(ResetColor)?;
    stdout.flush()?;
    Ok(())
}

fn print_system_line(message: &str) -> Result<()> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(Color::Yellow))?;
    println!("{message}\n");
    stdout.execute(ResetColor)?;
    Ok(())
}

fn print_help() {
    println!("Commands:");
    println!("  /clear    Clear conversation history");
    println!("  /history  Show the transcript so far");
    println!("  /quit     Exit");
    println!();
}

fn print_history(transcript: &Transcript) {
    if transcript.entries().is_empty() {
        println!("(no messages yet)\n");
        return;
    }
    for entry in transcript.entries() {
        let label = match entry.role {
            Role::User => "you",
            Role::Assistant => "snow",
            Role::System => "system",
        };
        println!("{label}: {}", entry.content);
    }
    println!();
}
