//! Wire payloads shared by the console client, the function server, and the
//! model gateway. All chat traffic is OpenAI-compatible chat-completion
//! shapes; streamed responses arrive as chunk objects whose deltas are
//! accumulated by the caller.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ChatToolCall>>,
}

impl ChatMessage {
    pub fn text(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            name: None,
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: content.into(),
            name: None,
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: None,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ChatToolDefinition>>,
}

#[derive(Deserialize, Debug)]
pub struct ChatResponseDelta {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ChatToolCallDelta>>,
}

#[derive(Deserialize, Debug)]
pub struct ChatResponseChoice {
    pub delta: ChatResponseDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ChatResponse {
    pub choices: Vec<ChatResponseChoice>,
}

#[derive(Deserialize, Debug)]
pub struct ChatToolCallFunctionDelta {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ChatToolCallDelta {
    pub index: Option<u32>,
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub function: Option<ChatToolCallFunctionDelta>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChatToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ChatToolCallFunction,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChatToolCallFunction {
    pub name: String,
    pub arguments: String,
}

#[derive(Serialize, Clone, Debug)]
pub struct ChatToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ChatToolFunction,
}

impl ChatToolDefinition {
    pub fn function(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            kind: "function".to_string(),
            function: ChatToolFunction {
                name: name.to_string(),
                description: Some(description.to_string()),
                parameters,
            },
        }
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct ChatToolFunction {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

/// Merges streamed tool-call fragments back into complete calls.
///
/// The gateway splits each tool call across many chunks: the first fragment
/// for an index carries the id and function name, later fragments append to
/// the JSON-encoded argument string. Fragments without an index extend the
/// most recently started call.
#[derive(Default)]
pub struct ToolCallAccumulator {
    calls: Vec<PartialToolCall>,
}

#[derive(Default)]
struct PartialToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn absorb(&mut self, deltas: &[ChatToolCallDelta]) {
        for delta in deltas {
            let slot = match delta.index {
                Some(index) => {
                    let index = index as usize;
                    while self.calls.len() <= index {
                        self.calls.push(PartialToolCall::default());
                    }
                    &mut self.calls[index]
                }
                None => {
                    if self.calls.is_empty() {
                        self.calls.push(PartialToolCall::default());
                    }
                    self.calls.last_mut().expect("non-empty after push")
                }
            };

            if let Some(id) = &delta.id {
                slot.id = Some(id.clone());
            }
            if let Some(function) = &delta.function {
                if let Some(name) = &function.name {
                    slot.name = Some(name.clone());
                }
                if let Some(fragment) = &function.arguments {
                    slot.arguments.push_str(fragment);
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Completed calls, in index order. Fragments that never received a
    /// function name are dropped rather than dispatched blind.
    pub fn finish(self) -> Vec<ChatToolCall> {
        self.calls
            .into_iter()
            .enumerate()
            .filter_map(|(index, call)| {
                let name = call.name?;
                Some(ChatToolCall {
                    id: call.id.unwrap_or_else(|| format!("call_{index}")),
                    kind: "function".to_string(),
                    function: ChatToolCallFunction {
                        name,
                        arguments: if call.arguments.is_empty() {
                            "{}".to_string()
                        } else {
                            call.arguments
                        },
                    },
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(
        index: Option<u32>,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
    ) -> ChatToolCallDelta {
        ChatToolCallDelta {
            index,
            id: id.map(str::to_string),
            kind: Some("function".to_string()),
            function: Some(ChatToolCallFunctionDelta {
                name: name.map(str::to_string),
                arguments: arguments.map(str::to_string),
            }),
        }
    }

    #[test]
    fn accumulates_split_arguments() {
        let mut acc = ToolCallAccumulator::new();
        acc.absorb(&[delta(Some(0), Some("call_a"), Some("stage_order"), None)]);
        acc.absorb(&[delta(Some(0), None, None, Some(r#"{"order_type":"#))]);
        acc.absorb(&[delta(Some(0), None, None, Some(r#""lab"}"#))]);

        let calls = acc.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].function.name, "stage_order");
        assert_eq!(calls[0].function.arguments, r#"{"order_type":"lab"}"#);
    }

    #[test]
    fn indexless_fragments_extend_last_call() {
        let mut acc = ToolCallAccumulator::new();
        acc.absorb(&[delta(None, Some("call_b"), Some("list_providers"), None)]);
        acc.absorb(&[delta(None, None, None, Some("{}"))]);

        let calls = acc.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.arguments, "{}");
    }

    #[test]
    fn interleaved_indices_stay_separate() {
        let mut acc = ToolCallAccumulator::new();
        acc.absorb(&[
            delta(Some(0), Some("a"), Some("list_providers"), Some("{")),
            delta(Some(1), Some("b"), Some("create_team_channel"), Some(r#"{"name":"#)),
        ]);
        acc.absorb(&[
            delta(Some(0), None, None, Some("}")),
            delta(Some(1), None, None, Some(r#""icu"}"#)),
        ]);

        let calls = acc.finish();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].function.arguments, "{}");
        assert_eq!(calls[1].function.arguments, r#"{"name":"icu"}"#);
    }

    #[test]
    fn nameless_fragments_are_dropped() {
        let mut acc = ToolCallAccumulator::new();
        acc.absorb(&[delta(Some(0), Some("x"), None, Some("{}"))]);
        assert!(acc.finish().is_empty());
    }

    #[test]
    fn empty_arguments_default_to_empty_object() {
        let mut acc = ToolCallAccumulator::new();
        acc.absorb(&[delta(Some(0), None, Some("list_providers"), None)]);
        let calls = acc.finish();
        assert_eq!(calls[0].function.arguments, "{}");
        assert_eq!(calls[0].id, "call_0");
    }
}
