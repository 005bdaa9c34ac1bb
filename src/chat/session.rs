// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 SnowDev

//! Chat session management
//!
//! `ChatSession` orchestrates one turn at a time: it appends the user
//! message to the owned history, issues the streaming request, re-emits
//! decoded fragments to the caller in order, and commits the accumulated
//! assistant message exactly once when the stream completes cleanly. A
//! failed or cancelled turn commits nothing, so the history never carries
//! half-replies into future prompts.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::Settings;
use crate::error::{Result, SnowbrainError};
use crate::llm::client::ChatClient;
use crate::llm::message::{History, Message};
use crate::llm::sse;

/// A streaming chat session with bounded history.
pub struct ChatSession {
    client: Arc<ChatClient>,
    history: Arc<Mutex<History>>,
    in_flight: Arc<AtomicBool>,
    turn_task: Option<JoinHandle<()>>,
}

/// Lazy sequence of assistant text fragments for one turn.
///
/// Backed by a channel of capacity one: the producing task suspends until
/// the consumer polls the next fragment, so backpressure applies naturally
/// and fragments arrive strictly in decode order.
#[derive(Debug)]
pub struct TurnStream {
    inner: ReceiverStream<Result<String>>,
}

impl Stream for TurnStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl ChatSession {
    /// Create a session from settings.
    ///
    /// Fails with a configuration error when the API credential is absent.
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = ChatClient::from_settings(settings)?;
        Ok(Self::with_client(
            client,
            &settings.system_prompt,
            settings.max_messages,
        ))
    }

    /// Create a session around an existing client.
    pub fn with_client(client: ChatClient, system_prompt: &str, max_messages: usize) -> Self {
        Self {
            client: Arc::new(client),
            history: Arc::new(Mutex::new(History::new(system_prompt, max_messages))),
            in_flight: Arc::new(AtomicBool::new(false)),
            turn_task: None,
        }
    }

    /// Whether a turn is currently in flight.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Number of non-system messages in history.
    pub fn history_len(&self) -> usize {
        self.history.lock().unwrap().non_system_len()
    }

    /// Read-only copy of the full history, system directive included.
    pub fn snapshot(&self) -> Vec<Message> {
        self.history.lock().unwrap().snapshot()
    }

    /// Clear the history back to just the system directive.
    ///
    /// Cancels any in-flight turn first so a late commit cannot land in the
    /// freshly cleared history.
    pub async fn reset(&mut self) {
        self.stop().await;
        self.history.lock().unwrap().reset();
    }

    /// Cancel the in-flight turn, if any.
    ///
    /// The partially accumulated assistant text is discarded without being
    /// committed, the underlying stream reader is dropped, and the session
    /// becomes available for a new turn. Waits for the turn task to finish
    /// unwinding, so a task already past cancellation cannot commit after
    /// this returns.
    pub async fn stop(&mut self) {
        if let Some(task) = self.turn_task.take() {
            task.abort();
            let _ = task.await;
        }
        self.in_flight.store(false, Ordering::SeqCst);
    }

    /// Run one chat turn, returning the fragment stream.
    ///
    /// The user message is appended (and the history trimmed) before the
    /// request is sent; on any failure it remains in history while no
    /// assistant message is committed. Rejects with `SessionBusy` while a
    /// previous turn is still in flight.
    pub fn run_turn(&mut self, user_text: &str) -> Result<TurnStream> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(SnowbrainError::SessionBusy);
        }

        let request_messages = {
            let mut history = self.history.lock().unwrap();
            history.push(Message::user(user_text));
            history.trim();
            history.snapshot()
        };

        let (tx, rx) = mpsc::channel::<Result<String>>(1);
        let client = Arc::clone(&self.client);
        let history = Arc::clone(&self.history);
        let in_flight = Arc::clone(&self.in_flight);

        self.turn_task = Some(tokio::spawn(async move {
            run_turn_task(client, history, in_flight, request_messages, tx).await;
        }));

        Ok(TurnStream {
            inner: ReceiverStream::new(rx),
        })
    }

    /// Run one non-streaming turn and return the full assistant reply.
    pub async fn ask(&mut self, user_text: &str) -> Result<String> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(SnowbrainError::SessionBusy);
        }

        let request_messages = {
            let mut history = self.history.lock().unwrap();
            history.push(Message::user(user_text));
            history.trim();
            history.snapshot()
        };

        let result = self.client.send(&request_messages).await;
        if let Ok(ref reply) = result {
            self.history
                .lock()
                .unwrap()
                .push(Message::assistant(reply.clone()));
        }
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if let Some(task) = self.turn_task.take() {
            task.abort();
        }
    }
}

/// Body of the spawned turn task.
///
/// Commits the accumulated assistant text only when the fragment stream
/// ends cleanly; a transport error, a decode error, or a consumer that
/// dropped the stream (cancellation) all leave the history untouched.
async fn run_turn_task(
    client: Arc<ChatClient>,
    history: Arc<Mutex<History>>,
    in_flight: Arc<AtomicBool>,
    request_messages: Vec<Message>,
    tx: mpsc::Sender<Result<String>>,
) {
    let byte_stream = match client.send_stream(&request_messages).await {
        Ok(stream) => stream,
        Err(err) => {
            tracing::debug!(%err, "completion request failed");
            let _ = tx.send(Err(err)).await;
            in_flight.store(false, Ordering::SeqCst);
            return;
        }
    };

    let mut fragments = std::pin::pin!(sse::fragments(byte_stream));
    let mut accumulated = String::new();
    let mut clean = true;

    while let Some(item) = fragments.next().await {
        match item {
            Ok(fragment) => {
                accumulated.push_str(&fragment);
                if tx.send(Ok(fragment)).await.is_err() {
                    // Consumer dropped the stream mid-turn. Treat as a
                    // cancellation: no commit.
                    clean = false;
                    break;
                }
            }
            Err(err) => {
                let _ = tx.send(Err(err)).await;
                clean = false;
                break;
            }
        }
    }

    if clean {
        history.lock().unwrap().push(Message::assistant(accumulated));
    }
    in_flight.store(false, Ordering::SeqCst);
}
