//! Decoding of Gemini `streamGenerateContent?alt=sse` bodies into text fragments.

use std::collections::VecDeque;

use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};

use super::{FragmentStream, GenerateContentResponse, LlmError};

/// Incremental line decoder for a server-sent-event body.
///
/// Buffers raw bytes so multi-byte characters split across network chunks
/// are reassembled before decoding.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feeds one chunk and returns the fragments of every complete line.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<String, LlmError>> {
        self.buffer.extend_from_slice(chunk);

        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(item) = decode_line(&line) {
                out.push(item);
            }
        }
        out
    }

    /// Flushes a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<Result<String, LlmError>> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest)
    }
}

fn decode_line(raw: &[u8]) -> Option<Result<String, LlmError>> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches(|c| c == '\r' || c == '\n');
    let payload = line.strip_prefix("data:")?.trim_start();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }

    let event: GenerateContentResponse = match serde_json::from_str(payload) {
        Ok(event) => event,
        Err(e) => return Some(Err(LlmError::Parse(e))),
    };

    if let Some(error) = event.error {
        return Some(Err(LlmError::Api {
            status: error.code.unwrap_or(500),
            message: error.message,
        }));
    }

    let text = event.text();
    if text.is_empty() {
        None
    } else {
        Some(Ok(text))
    }
}

/// Turns a raw SSE byte stream into a stream of text fragments.
///
/// The stream is finite: it ends when the body ends, or right after the
/// first error item.
pub fn fragments<S, E>(bytes: S) -> FragmentStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: 'static,
    LlmError: From<E>,
{
    let inner = bytes.map_err(LlmError::from).boxed();
    let state = (inner, SseDecoder::default(), VecDeque::new(), false);

    futures::stream::unfold(
        state,
        |(mut inner, mut decoder, mut pending, mut finished)| async move {
            loop {
                if let Some(item) = pending.pop_front() {
                    if matches!(item, Err(_)) {
                        pending.clear();
                        finished = true;
                    }
                    return Some((item, (inner, decoder, pending, finished)));
                }
                if finished {
                    return None;
                }
                match inner.next().await {
                    Some(Ok(chunk)) => pending.extend(decoder.feed(&chunk)),
                    Some(Err(e)) => {
                        finished = true;
                        pending.push_back(Err(e));
                    }
                    None => {
                        finished = true;
                        pending.extend(decoder.finish());
                    }
                }
            }
        },
    )
    .boxed()
}
