//! Streaming transport for ALIS chat turns.
//!
//! The chat proxy answers with newline-delimited Server-Sent-Events frames
//! (`data: <json>`) terminated by a literal `data: [DONE]`. Network reads
//! can split frames at arbitrary byte offsets, so [`SseLineAssembler`]
//! buffers incomplete lines across reads; rendering always replaces the
//! in-progress message with the full accumulated buffer, which keeps the
//! final content equal to the server's concatenation no matter how the
//! stream was chunked.

use futures_util::StreamExt;
use memchr::memchr;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::api::{ChatMessage, ChatResponse};
use crate::utils::url::construct_endpoint_url;

#[derive(Clone, Debug)]
pub enum StreamMessage {
    Chunk(String),
    Error(String),
    End,
}

/// One parsed SSE frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SseEvent {
    /// The payload of a `data:` line that is not the terminator.
    Data(String),
    /// The literal `data: [DONE]` terminator.
    Done,
}

/// Incremental SSE line parser.
///
/// Feed it raw body bytes as they arrive; it emits one event per complete
/// `data:` line and holds incomplete trailing bytes until the next read.
/// Lines that are not `data:` frames (comments, blank keep-alives) are
/// skipped. A line is never emitted twice.
#[derive(Default)]
pub struct SseLineAssembler {
    buffer: Vec<u8>,
}

impl SseLineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline_pos) = memchr(b'\n', &self.buffer) {
            let line = match std::str::from_utf8(&self.buffer[..newline_pos]) {
                Ok(s) => s.trim().to_string(),
                Err(e) => {
                    tracing::warn!(error = %e, "invalid UTF-8 in stream; dropping line");
                    self.buffer.drain(..=newline_pos);
                    continue;
                }
            };
            self.buffer.drain(..=newline_pos);

            if let Some(payload) = extract_data_payload(&line) {
                if payload == "[DONE]" {
                    events.push(SseEvent::Done);
                } else if !payload.is_empty() {
                    events.push(SseEvent::Data(payload.to_string()));
                }
            }
        }
        events
    }

    /// Bytes still waiting for a terminating newline.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Pull a human-readable summary out of a JSON error body, looking in the
/// places gateways actually put it.
fn extract_error_summary(value: &Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                Value::String(s) => Some(s.to_string()),
                Value::Object(map) => map
                    .get("message")
                    .and_then(|message| message.as_str().map(str::to_owned)),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.trim().to_string()
    })
}

/// Map a non-2xx response body to the message shown in the transcript:
/// the JSON error summary when one parses, otherwise a generic status
/// line.
pub fn format_request_failure(status: u16, body: &str) -> String {
    let trimmed = body.trim();
    if !trimmed.is_empty() {
        if let Ok(json_value) = serde_json::from_str::<Value>(trimmed) {
            if let Some(summary) = extract_error_summary(&json_value) {
                if !summary.is_empty() {
                    return summary;
                }
            }
        }
    }
    format!("Request failed: {status}")
}

/// Body for `POST /functions/v1/alis-chat`.
#[derive(Serialize, Debug)]
pub struct AlisChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(rename = "patientContext", skip_serializing_if = "Option::is_none")]
    pub patient_context: Option<Value>,
}

pub struct StreamParams {
    pub client: reqwest::Client,
    pub functions_url: String,
    pub access_token: String,
    pub api_messages: Vec<ChatMessage>,
    pub patient_context: Option<Value>,
    pub cancel_token: tokio_util::sync::CancellationToken,
    pub stream_id: u64,
}

/// Owns the channel that delivers stream events back to the conversation.
/// Each `spawn_stream` call runs one exchange on its own task; events are
/// tagged with the stream id so a cancelled turn's stragglers can be
/// ignored.
#[derive(Clone)]
pub struct ChatStreamService {
    tx: mpsc::UnboundedSender<(StreamMessage, u64)>,
}

impl ChatStreamService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(StreamMessage, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn spawn_stream(&self, params: StreamParams) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let StreamParams {
                client,
                functions_url,
                access_token,
                api_messages,
                patient_context,
                cancel_token,
                stream_id,
            } = params;

            let request = AlisChatRequest {
                messages: api_messages,
                patient_context,
            };

            tokio::select! {
                _ = run_exchange(client, functions_url, access_token, request, &tx, stream_id, &cancel_token) => {}
                _ = cancel_token.cancelled() => {}
            }
        });
    }

}

async fn run_exchange(
    client: reqwest::Client,
    functions_url: String,
    access_token: String,
    request: AlisChatRequest,
    tx: &mpsc::UnboundedSender<(StreamMessage, u64)>,
    stream_id: u64,
    cancel_token: &tokio_util::sync::CancellationToken,
) {
    let chat_url = construct_endpoint_url(&functions_url, "alis-chat");
    let response = client
        .post(chat_url)
        .header("Content-Type", "application/json")
        .bearer_auth(&access_token)
        .json(&request)
        .send()
        .await;

    let response = match response {
        Ok(response) => response,
        Err(e) => {
            let _ = tx.send((StreamMessage::Error(e.to_string()), stream_id));
            let _ = tx.send((StreamMessage::End, stream_id));
            return;
        }
    };

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let _ = tx.send((
            StreamMessage::Error(format_request_failure(status, &body)),
            stream_id,
        ));
        let _ = tx.send((StreamMessage::End, stream_id));
        return;
    }

    let mut stream = response.bytes_stream();
    let mut assembler = SseLineAssembler::new();

    while let Some(chunk) = stream.next().await {
        if cancel_token.is_cancelled() {
            return;
        }

        let chunk_bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tx.send((StreamMessage::Error(e.to_string()), stream_id));
                let _ = tx.send((StreamMessage::End, stream_id));
                return;
            }
        };

        for event in assembler.push(&chunk_bytes) {
            match event {
                SseEvent::Done => {
                    let _ = tx.send((StreamMessage::End, stream_id));
                    return;
                }
                SseEvent::Data(payload) => {
                    if process_data_payload(&payload, tx, stream_id) {
                        return;
                    }
                }
            }
        }
    }

    // Upstream closed without [DONE]; end the turn rather than leaving the
    // console stuck in a typing state.
    let _ = tx.send((StreamMessage::End, stream_id));
}

/// Handle one frame payload. Returns true when the stream should stop.
fn process_data_payload(
    payload: &str,
    tx: &mpsc::UnboundedSender<(StreamMessage, u64)>,
    stream_id: u64,
) -> bool {
    match serde_json::from_str::<ChatResponse>(payload) {
        Ok(response) => {
            if let Some(choice) = response.choices.first() {
                if let Some(content) = &choice.delta.content {
                    let _ = tx.send((StreamMessage::Chunk(content.clone()), stream_id));
                }
            }
            false
        }
        Err(_) => {
            // An unparseable frame mid-stream is an error payload from the
            // proxy, not a partial line (the assembler holds those back).
            let message = serde_json::from_str::<Value>(payload)
                .ok()
                .as_ref()
                .and_then(extract_error_summary)
                .unwrap_or_else(|| format!("Unexpected stream payload: {payload}"));
            let _ = tx.send((StreamMessage::Error(message), stream_id));
            let _ = tx.send((StreamMessage::End, stream_id));
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(content: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":\"{content}\"}}}}]}}\n\n"
        )
    }

    fn collect_deltas(events: &[SseEvent]) -> String {
        events
            .iter()
            .filter_map(|event| match event {
                SseEvent::Data(payload) => serde_json::from_str::<ChatResponse>(payload)
                    .ok()
                    .and_then(|r| r.choices.first().and_then(|c| c.delta.content.clone())),
                SseEvent::Done => None,
            })
            .collect()
    }

    #[test]
    fn one_frame_per_read_concatenates() {
        let mut assembler = SseLineAssembler::new();
        let mut events = Vec::new();
        for content in ["Order ", "staged ", "for review."] {
            events.extend(assembler.push(frame(content).as_bytes()));
        }
        events.extend(assembler.push(b"data: [DONE]\n\n"));

        assert_eq!(collect_deltas(&events), "Order staged for review.");
        assert_eq!(events.last(), Some(&SseEvent::Done));
    }

    #[test]
    fn arbitrary_byte_splits_converge_to_same_string() {
        let body: String = [frame("Hel"), frame("lo, "), frame("clinician.")]
            .concat()
            + "data: [DONE]\n\n";
        let expected = "Hello, clinician.";

        // Split the byte stream at every possible offset, including
        // mid-JSON-object, and verify the reassembled deltas never change.
        let bytes = body.as_bytes();
        for split in 0..bytes.len() {
            let mut assembler = SseLineAssembler::new();
            let mut events = assembler.push(&bytes[..split]);
            events.extend(assembler.push(&bytes[split..]));
            assert_eq!(collect_deltas(&events), expected, "split at {split}");
        }

        // One byte at a time.
        let mut assembler = SseLineAssembler::new();
        let mut events = Vec::new();
        for byte in bytes {
            events.extend(assembler.push(std::slice::from_ref(byte)));
        }
        assert_eq!(collect_deltas(&events), expected);
    }

    #[test]
    fn partial_lines_are_buffered_not_dropped() {
        let mut assembler = SseLineAssembler::new();
        let events = assembler.push(b"data: {\"choices\":[{\"delta\":{\"con");
        assert!(events.is_empty());
        assert!(assembler.pending_bytes() > 0);

        let events = assembler.push(b"tent\":\"hi\"}}]}\n");
        assert_eq!(collect_deltas(&events), "hi");
        assert_eq!(assembler.pending_bytes(), 0);
    }

    #[test]
    fn no_event_is_emitted_twice() {
        let body = frame("once") + "data: [DONE]\n\n";
        let bytes = body.as_bytes();
        let mut assembler = SseLineAssembler::new();
        let mut events = Vec::new();
        for chunk in bytes.chunks(3) {
            events.extend(assembler.push(chunk));
        }
        let data_count = events
            .iter()
            .filter(|event| matches!(event, SseEvent::Data(_)))
            .count();
        assert_eq!(data_count, 1);
        assert_eq!(
            events.iter().filter(|e| **e == SseEvent::Done).count(),
            1
        );
    }

    #[test]
    fn done_without_space_is_recognized() {
        let mut assembler = SseLineAssembler::new();
        let events = assembler.push(b"data:[DONE]\n");
        assert_eq!(events, vec![SseEvent::Done]);
    }

    #[test]
    fn non_data_lines_are_skipped() {
        let mut assembler = SseLineAssembler::new();
        let events = assembler.push(b": keep-alive\n\nevent: ping\n");
        assert!(events.is_empty());
    }

    #[test]
    fn format_request_failure_prefers_json_summary() {
        assert_eq!(
            format_request_failure(429, r#"{"error":"Rate limit exceeded. Try again shortly."}"#),
            "Rate limit exceeded. Try again shortly."
        );
        assert_eq!(
            format_request_failure(502, r#"{"error":{"message":"upstream  timed\nout"}}"#),
            "upstream timed out"
        );
    }

    #[test]
    fn format_request_failure_falls_back_to_status() {
        assert_eq!(format_request_failure(500, "<html>oops</html>"), "Request failed: 500");
        assert_eq!(format_request_failure(503, ""), "Request failed: 503");
    }

    #[test]
    fn process_data_payload_routes_stream_errors() {
        let (service, mut rx) = ChatStreamService::new();
        let stream_id = 7;
        assert!(process_data_payload(
            r#"{"error":{"message":"internal server error"}}"#,
            &service.tx,
            stream_id,
        ));

        let (message, received_id) = rx.try_recv().expect("expected error message");
        assert_eq!(received_id, stream_id);
        match message {
            StreamMessage::Error(text) => assert_eq!(text, "internal server error"),
            other => panic!("expected error message, got {:?}", other),
        }
        let (message, _) = rx.try_recv().expect("expected end message");
        assert!(matches!(message, StreamMessage::End));
    }
}
