//! `POST /functions/v1/alis-chat`
//!
//! Streams a conversation through the model gateway with the ALIS
//! persona and the four clinical tools declared up front. Frames from
//! the gateway are forwarded to the client as they arrive; alongside the
//! passthrough, a relay accumulates tool-call fragments, and when a turn
//! finishes with `finish_reason: "tool_calls"` the completed calls are
//! executed and a follow-up gateway turn carrying their results is
//! streamed into the same response body. The client sees one SSE stream
//! ending in a single `data: [DONE]`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::Response;
use axum::Json;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::api::{ChatMessage, ChatRequest, ChatResponse, ChatToolCall, ToolCallAccumulator};
use crate::core::chat_stream::{SseEvent, SseLineAssembler};
use crate::utils::url::construct_endpoint_url;

use super::error::FunctionError;
use super::state::{require_session, AppState};
use super::store::{CareStore, VerifiedUser};
use super::tools::{execute_tool, tool_definitions, ClinicalTool, ToolContext, ToolOutcome};

/// The assistant persona and its capability description, prepended to
/// every gateway conversation.
const SYSTEM_PROMPT: &str = "You are ALIS, the clinical assistant embedded in the Virtualis \
hospital dashboard. You help clinicians review patient data, stage orders for signature, \
coordinate the care team, and draft documentation. Be concise and clinically precise. You can \
stage orders (never activate them — a clinician must sign), invite providers, list the care \
team, and create team channels using the tools provided. When a tool fails, explain what \
happened and what the clinician can do instead. Never fabricate patient data: if something is \
not in the provided context, say so.";

/// Upper bound on model turns per request. Each tool round is one extra
/// gateway exchange; past this the stream is closed with an error frame.
const MAX_TOOL_ROUNDS: usize = 3;

const RATE_LIMIT_MESSAGE: &str =
    "ALIS is receiving too many requests right now. Please try again in a moment.";
const CREDITS_MESSAGE: &str =
    "AI credits for this workspace are exhausted. Please contact your administrator.";
const UNAVAILABLE_MESSAGE: &str = "AI service temporarily unavailable";

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatProxyRequest {
    pub messages: Vec<IncomingMessage>,
    #[serde(rename = "patientContext", default)]
    pub patient_context: Option<Value>,
}

pub async fn alis_chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChatProxyRequest>,
) -> Result<Response, FunctionError> {
    let user = require_session(&state, &headers).await?;

    if request.messages.is_empty() {
        return Err(FunctionError::BadRequest("messages must not be empty".to_string()));
    }
    for message in &request.messages {
        if !matches!(message.role.as_str(), "user" | "assistant") {
            return Err(FunctionError::BadRequest(format!(
                "unsupported message role: {}",
                message.role
            )));
        }
    }

    let context = tool_context_from(&user, request.patient_context.as_ref());
    let messages = build_gateway_messages(&request);
    debug!(
        user = %user.user_id,
        turns = messages.len(),
        has_patient = context.patient_id.is_some(),
        "alis-chat exchange"
    );

    // The first gateway round happens before the response starts so quota
    // failures map onto real HTTP statuses; later rounds can only report
    // errors in-stream.
    let first_round = gateway_request(&state, &messages).await?;

    let (tx, rx) = mpsc::unbounded_channel::<Result<Bytes, Infallible>>();
    tokio::spawn(pump_rounds(state, messages, context, first_round, tx));

    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });

    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
        .map_err(|e| FunctionError::Internal(e.to_string()))
}

/// System prompt first, then the optional patient context as trailing
/// system content, then the transcript.
fn build_gateway_messages(request: &ChatProxyRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(request.messages.len() + 2);
    messages.push(ChatMessage::text("system", SYSTEM_PROMPT));
    if let Some(context) = &request.patient_context {
        messages.push(ChatMessage::text(
            "system",
            format!("Current patient context:\n{context}"),
        ));
    }
    for message in &request.messages {
        messages.push(ChatMessage::text(message.role.clone(), message.content.clone()));
    }
    messages
}

/// Conversation-scoped tool facts, drawn from the patient context the
/// client sent. Absent ids make the corresponding tools fail softly.
fn tool_context_from(user: &VerifiedUser, patient_context: Option<&Value>) -> ToolContext {
    let string_field = |key: &str| {
        patient_context
            .and_then(|v| v.get(key))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    ToolContext {
        user_id: user.user_id.clone(),
        hospital_id: string_field("hospital_id"),
        patient_id: string_field("patient_id"),
    }
}

async fn gateway_request(
    state: &AppState,
    messages: &[ChatMessage],
) -> Result<reqwest::Response, FunctionError> {
    let request = ChatRequest {
        model: state.gateway.model.clone(),
        messages: messages.to_vec(),
        stream: true,
        tools: Some(tool_definitions()),
    };
    let url = construct_endpoint_url(&state.gateway.url, "chat/completions");
    let response = state
        .http
        .post(url)
        .bearer_auth(&state.gateway.api_key)
        .header("Content-Type", "application/json")
        .json(&request)
        .send()
        .await
        .map_err(|e| {
            error!(error = %e, "gateway unreachable");
            FunctionError::Upstream(UNAVAILABLE_MESSAGE.to_string())
        })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    match status.as_u16() {
        429 => Err(FunctionError::RateLimited(RATE_LIMIT_MESSAGE.to_string())),
        402 => Err(FunctionError::CreditsExhausted(CREDITS_MESSAGE.to_string())),
        code => {
            error!(status = code, %body, "gateway error");
            Err(FunctionError::Upstream(UNAVAILABLE_MESSAGE.to_string()))
        }
    }
}

/// Relay state for one gateway round: forwards data frames (but not the
/// terminator) while accumulating content, tool-call fragments, and the
/// finish reason.
struct RoundRelay {
    assembler: SseLineAssembler,
    tools: ToolCallAccumulator,
    content: String,
    finish_reason: Option<String>,
    done: bool,
}

struct RoundResult {
    content: String,
    tool_calls: Vec<ChatToolCall>,
}

impl RoundRelay {
    fn new() -> Self {
        Self {
            assembler: SseLineAssembler::new(),
            tools: ToolCallAccumulator::new(),
            content: String::new(),
            finish_reason: None,
            done: false,
        }
    }

    /// Absorb raw body bytes; returns the frames to forward downstream.
    fn absorb(&mut self, bytes: &[u8]) -> Vec<Bytes> {
        let mut forwarded = Vec::new();
        for event in self.assembler.push(bytes) {
            match event {
                SseEvent::Done => {
                    self.done = true;
                    break;
                }
                SseEvent::Data(payload) => {
                    if let Ok(parsed) = serde_json::from_str::<ChatResponse>(&payload) {
                        if let Some(choice) = parsed.choices.first() {
                            if let Some(content) = &choice.delta.content {
                                self.content.push_str(content);
                            }
                            if let Some(tool_calls) = &choice.delta.tool_calls {
                                self.tools.absorb(tool_calls);
                            }
                            if let Some(reason) = &choice.finish_reason {
                                self.finish_reason = Some(reason.clone());
                            }
                        }
                    }
                    forwarded.push(Bytes::from(format!("data: {payload}\n\n")));
                }
            }
        }
        forwarded
    }

    fn finish(self) -> RoundResult {
        let wants_tools = self.finish_reason.as_deref() == Some("tool_calls");
        let tool_calls = if wants_tools || !self.tools.is_empty() {
            self.tools.finish()
        } else {
            Vec::new()
        };
        RoundResult {
            content: self.content,
            tool_calls,
        }
    }
}

fn error_frame(message: &str) -> Bytes {
    Bytes::from(format!("data: {}\n\n", json!({ "error": message })))
}

fn done_frame() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}

/// Drive the gateway rounds until the model stops asking for tools, the
/// round budget runs out, or the client goes away.
async fn pump_rounds(
    state: Arc<AppState>,
    mut messages: Vec<ChatMessage>,
    context: ToolContext,
    first_round: reqwest::Response,
    tx: mpsc::UnboundedSender<Result<Bytes, Infallible>>,
) {
    let mut response = first_round;
    for round in 0.. {
        let mut relay = RoundRelay::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    for frame in relay.absorb(&bytes) {
                        if tx.send(Ok(frame)).is_err() {
                            // Client disconnected; stop burning gateway tokens.
                            return;
                        }
                    }
                    if relay.done {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "gateway stream interrupted");
                    let _ = tx.send(Ok(error_frame(UNAVAILABLE_MESSAGE)));
                    let _ = tx.send(Ok(done_frame()));
                    return;
                }
            }
        }

        let result = relay.finish();
        if result.tool_calls.is_empty() {
            let _ = tx.send(Ok(done_frame()));
            return;
        }

        apply_tool_calls(
            &mut messages,
            result.content,
            result.tool_calls,
            &context,
            state.store.as_ref(),
        )
        .await;

        if round + 1 >= MAX_TOOL_ROUNDS {
            warn!(rounds = MAX_TOOL_ROUNDS, "tool round budget exhausted");
            let _ = tx.send(Ok(error_frame(
                "ALIS stopped after too many consecutive tool calls.",
            )));
            let _ = tx.send(Ok(done_frame()));
            return;
        }

        match gateway_request(&state, &messages).await {
            Ok(next) => response = next,
            Err(e) => {
                let _ = tx.send(Ok(error_frame(&e.to_string())));
                let _ = tx.send(Ok(done_frame()));
                return;
            }
        }
    }
}

/// Execute each completed call and extend the conversation with the
/// assistant's tool-call turn plus one tool-result message per call, the
/// shape the gateway expects for the follow-up round.
async fn apply_tool_calls(
    messages: &mut Vec<ChatMessage>,
    content: String,
    tool_calls: Vec<ChatToolCall>,
    context: &ToolContext,
    store: &dyn CareStore,
) {
    messages.push(ChatMessage {
        role: "assistant".to_string(),
        content,
        name: None,
        tool_call_id: None,
        tool_calls: Some(tool_calls.clone()),
    });

    for call in tool_calls {
        let outcome = match ClinicalTool::parse(&call.function.name, &call.function.arguments) {
            Ok(tool) => execute_tool(tool, context, store).await,
            Err(e) => {
                warn!(tool = %call.function.name, error = %e, "tool call rejected");
                ToolOutcome::failed(e.to_string())
            }
        };
        messages.push(ChatMessage::tool_result(
            call.id,
            outcome.to_json().to_string(),
        ));
    }
}
