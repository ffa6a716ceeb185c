use serde_json::Value;

use super::gateway::{ModelDelta, ModelError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StreamEvent {
    Delta(ModelDelta),
    Stop,
    Failed(ModelError),
}

/// Incremental decoder for Messages API server-sent events. Bytes are
/// buffered until a full line is available so multi-byte characters split
/// across chunks decode intact.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(line_end) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line = self.pending.drain(..=line_end).collect::<Vec<_>>();
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = parse_line(line.trim()) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes a trailing line that arrived without a newline.
    pub(crate) fn finish(&mut self) -> Vec<StreamEvent> {
        if self.pending.is_empty() {
            return Vec::new();
        }
        let line = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&line);
        parse_line(line.trim()).into_iter().collect()
    }
}

fn parse_line(line: &str) -> Option<StreamEvent> {
    let data = line.strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
        return Some(StreamEvent::Stop);
    }
    parse_event(data)
}

fn parse_event(data: &str) -> Option<StreamEvent> {
    let event: Value = serde_json::from_str(data).ok()?;

    match event.get("type").and_then(Value::as_str)? {
        "content_block_delta" => {
            let delta = event.get("delta")?;
            match delta.get("type").and_then(Value::as_str)? {
                "text_delta" => delta
                    .get("text")
                    .and_then(Value::as_str)
                    .filter(|text| !text.is_empty())
                    .map(|text| StreamEvent::Delta(ModelDelta::Text(text.to_string()))),
                "thinking_delta" => delta
                    .get("thinking")
                    .and_then(Value::as_str)
                    .filter(|text| !text.is_empty())
                    .map(|text| StreamEvent::Delta(ModelDelta::Reasoning(text.to_string()))),
                _ => None,
            }
        }
        "message_stop" => Some(StreamEvent::Stop),
        "error" => {
            let error = event.get("error");
            let kind = error
                .and_then(|error| error.get("type"))
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            let message = error
                .and_then(|error| error.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("no message");
            let detail = format!("{kind}: {message}");
            Some(StreamEvent::Failed(match kind {
                "overloaded_error" | "rate_limit_error" => ModelError::Throttled(detail),
                "invalid_request_error" => ModelError::InvalidRequest(detail),
                _ => ModelError::Stream(detail),
            }))
        }
        _ => None,
    }
}
