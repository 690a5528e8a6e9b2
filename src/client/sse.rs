//! Server-sent events decoding for run streams.

use futures::{Stream, StreamExt};
use serde_json::Value;

use super::types::StreamEvent;
use crate::core::{Error, Result};

/// Parse a single SSE event from the buffer.
///
/// Returns the parsed event (if any) and the remaining buffer content, or
/// `None` when the buffer does not hold a complete event yet.
pub(crate) fn parse_sse_event(buffer: &str) -> Option<(Option<StreamEvent>, String)> {
    let end = buffer.find("\n\n")?;
    let event_str = &buffer[..end];
    let remainder = buffer[end + 2..].to_string();

    let mut name = None;
    let mut data_lines = Vec::new();

    for line in event_str.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            name = Some(rest.trim_start().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    // Comments and keep-alives carry no data
    if data_lines.is_empty() && name.is_none() {
        return Some((None, remainder));
    }

    let name = name.unwrap_or_else(|| "message".to_string());
    let data = data_lines.join("\n");
    if data.is_empty() {
        return Some((Some(StreamEvent::from_parts(&name, Value::Null)), remainder));
    }

    match serde_json::from_str::<Value>(&data) {
        Ok(value) => Some((Some(StreamEvent::from_parts(&name, value)), remainder)),
        Err(e) => {
            tracing::debug!(event = %name, data = %data, error = %e, "failed to parse event");
            Some((None, remainder))
        }
    }
}

/// Turn a byte stream into run events.
pub(crate) fn decode_events<S, B, E>(bytes: S) -> impl Stream<Item = Result<StreamEvent>> + Send
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<Error> + Send,
{
    async_stream::stream! {
        let mut buffer = String::new();
        // Bytes of a character split across chunks.
        let mut pending: Vec<u8> = Vec::new();
        futures::pin_mut!(bytes);

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(e.into());
                    return;
                }
            };
            pending.extend_from_slice(chunk.as_ref());
            let complete = match std::str::from_utf8(&pending) {
                Err(e) if e.error_len().is_none() => e.valid_up_to(),
                _ => pending.len(),
            };
            let tail = pending.split_off(complete);
            buffer.push_str(&String::from_utf8_lossy(&pending));
            pending = tail;
            if buffer.contains('\r') {
                buffer = buffer.replace("\r\n", "\n");
            }

            while let Some((event, remainder)) = parse_sse_event(&buffer) {
                buffer = remainder;
                if let Some(event) = event {
                    yield Ok(event);
                }
            }
        }

        buffer.push_str(&String::from_utf8_lossy(&pending));

        // Servers may omit the blank line after the last event
        if !buffer.trim().is_empty() {
            buffer.push_str("\n\n");
            if let Some((Some(event), _)) = parse_sse_event(&buffer) {
                yield Ok(event);
            }
        }
    }
}
