//! SSE plumbing for streamed chat completions.
//!
//! The response body is buffered, split into `\n\n`-delimited events and the
//! `data:` payload of each event is handed to a parser that turns it into
//! zero or more [`StreamEvent`]s.

use crate::util::from_reqwest;
use tb_domain::error::Result;
use tb_domain::stream::{BoxStream, StreamEvent};

/// Extract complete `data:` payloads from an SSE buffer.
///
/// `\r\n` line endings are normalized first. Multiple `data:` lines in one
/// event are joined with `\n`; `event:`, `id:`, `retry:` and comment lines
/// are ignored. Consumed bytes are removed from `buffer`; a trailing partial
/// event stays for the next call.
pub(crate) fn drain_data_lines(buffer: &mut String) -> Vec<String> {
    if buffer.contains('\r') {
        *buffer = buffer.replace("\r\n", "\n");
    }

    let mut payloads = Vec::new();
    while let Some(pos) = buffer.find("\n\n") {
        let block: String = buffer.drain(..pos + 2).collect();

        let data: Vec<&str> = block
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(str::trim)
            .collect();
        let joined = data.join("\n");
        if !joined.trim().is_empty() {
            payloads.push(joined);
        }
    }
    payloads
}

/// Decode a body chunk, carrying an incomplete trailing UTF-8 sequence in
/// `pending` until the next chunk completes it.
pub(crate) fn decode_chunk(pending: &mut Vec<u8>, chunk: &[u8]) -> String {
    pending.extend_from_slice(chunk);
    match std::str::from_utf8(pending) {
        Ok(text) => {
            let text = text.to_owned();
            pending.clear();
            text
        }
        Err(e) if e.error_len().is_none() => {
            let tail = pending.split_off(e.valid_up_to());
            let text = String::from_utf8_lossy(pending).into_owned();
            *pending = tail;
            text
        }
        Err(_) => String::from_utf8_lossy(&std::mem::take(pending)).into_owned(),
    }
}

/// Build a [`BoxStream`] from an SSE `reqwest::Response` and a parser
/// closure.
///
/// The stream flushes a trailing unterminated event when the body closes and
/// emits a fallback `Done` if the parser never produced one.
pub(crate) fn sse_response_stream<F>(
    response: reqwest::Response,
    mut parse_data: F,
) -> BoxStream<'static, Result<StreamEvent>>
where
    F: FnMut(&str) -> Vec<Result<StreamEvent>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = String::new();
        let mut pending = Vec::new();
        let mut done_emitted = false;

        loop {
            let chunk = response.chunk().await;
            let finished = match chunk {
                Ok(Some(bytes)) => {
                    buffer.push_str(&decode_chunk(&mut pending, &bytes));
                    false
                }
                Ok(None) => {
                    buffer.push_str(&String::from_utf8_lossy(&pending));
                    if !buffer.trim().is_empty() {
                        buffer.push_str("\n\n");
                    }
                    true
                }
                Err(e) => {
                    yield Err(from_reqwest(e));
                    return;
                }
            };

            for data in drain_data_lines(&mut buffer) {
                for event in parse_data(&data) {
                    if matches!(&event, Ok(StreamEvent::Done { .. })) {
                        done_emitted = true;
                    }
                    yield event;
                }
            }

            if finished {
                break;
            }
        }

        if !done_emitted {
            yield Ok(StreamEvent::Done {
                usage: None,
                finish_reason: Some("stop".into()),
            });
        }
    };

    Box::pin(stream)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
