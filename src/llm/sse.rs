// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 SnowDev

//! Server-sent-event stream decoding
//!
//! Turns the raw byte stream of a streaming completion response into a lazy
//! sequence of assistant text fragments. Framing is newline-delimited
//! `data: ` lines carrying JSON delta chunks, terminated by the `[DONE]`
//! sentinel.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;

use crate::error::{ApiError, Result, SnowbrainError};

/// Guard against unbounded buffer growth (e.g. a malformed stream that
/// never contains a newline).
const MAX_LINE_BUF: usize = 1024 * 1024;

/// Outcome of inspecting one complete line of the event stream.
#[derive(Debug, PartialEq, Eq)]
enum LineEvent {
    /// Comment, keep-alive, metadata-only frame, or malformed payload.
    Ignore,
    /// The `[DONE]` sentinel: the server has no more data for this turn.
    Done,
    /// A non-empty content delta.
    Fragment(String),
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

/// Inspect one complete line of the event stream.
///
/// Lines without the `data: ` marker are comments or keep-alives. A payload
/// that fails to parse is a transient malformed frame and is skipped rather
/// than aborting the whole stream.
fn parse_line(line: &str) -> LineEvent {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return LineEvent::Ignore;
    }

    let Some(data) = line.strip_prefix("data: ") else {
        return LineEvent::Ignore;
    };

    if data == "[DONE]" {
        return LineEvent::Done;
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => {
            let content = chunk
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta.content);
            match content {
                Some(text) if !text.is_empty() => LineEvent::Fragment(text),
                _ => LineEvent::Ignore,
            }
        }
        Err(err) => {
            tracing::debug!(%err, "skipping malformed stream line");
            LineEvent::Ignore
        }
    }
}

/// Decode a byte stream into a lazy sequence of text fragments.
///
/// Bytes are buffered and split on newline boundaries only, so multi-byte
/// characters arriving split across chunks are never decoded partially.
/// A stream that ends without the `[DONE]` sentinel terminates cleanly;
/// servers may close the connection without sending it. A timeout firing
/// mid-stream is fatal: it is yielded as an error so the turn fails rather
/// than committing whatever arrived before the deadline.
pub fn fragments<S>(byte_stream: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = Result<Bytes>> + Send + 'static,
{
    async_stream::stream! {
        let mut byte_stream = std::pin::pin!(byte_stream);
        let mut buf: Vec<u8> = Vec::new();
        let mut saw_done = false;

        'outer: while let Some(next) = byte_stream.next().await {
            let chunk = match next {
                Ok(bytes) => bytes,
                Err(err @ SnowbrainError::Api(ApiError::Timeout)) => {
                    yield Err(err);
                    return;
                }
                Err(err) => {
                    // Connection dropped mid-stream. Policy: favor the
                    // partial output already delivered over surfacing an
                    // error the caller cannot act on.
                    tracing::warn!(%err, "stream interrupted; treating as end of turn");
                    break;
                }
            };

            buf.extend_from_slice(&chunk);
            if buf.len() > MAX_LINE_BUF {
                yield Err(SnowbrainError::Api(ApiError::StreamError(format!(
                    "stream line buffer exceeded {MAX_LINE_BUF} bytes"
                ))));
                return;
            }

            // Split off complete lines; a trailing partial line stays
            // buffered for the next chunk.
            while let Some(newline) = buf.iter().position(|&b| b == b'\n') {
                let line_bytes: Vec<u8> = buf.drain(..=newline).collect();
                let line = String::from_utf8_lossy(&line_bytes);

                match parse_line(&line) {
                    LineEvent::Ignore => {}
                    LineEvent::Done => {
                        saw_done = true;
                        break 'outer;
                    }
                    LineEvent::Fragment(text) => yield Ok(text),
                }
            }
        }

        if !saw_done {
            tracing::warn!("stream ended without [DONE] sentinel; treating as complete");
        }
    }
}
