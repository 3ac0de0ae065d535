//! Conversation state for the live ALIS exchange.
//!
//! One conversation owns its transcript and a single streaming flag. A
//! send appends the user message synchronously, then the turn's deltas
//! arrive through [`StreamMessage`] events tagged with the turn's stream
//! id; events from a superseded turn are discarded.

use serde_json::Value;

use crate::api;
use crate::core::chat_stream::StreamMessage;
use crate::core::message::{ChatAction, ChatMessage, TranscriptRole};

/// Everything the transport needs to run one turn.
pub struct TurnRequest {
    pub stream_id: u64,
    pub api_messages: Vec<api::ChatMessage>,
    pub patient_context: Option<Value>,
}

pub struct Conversation {
    messages: Vec<ChatMessage>,
    next_message_id: u64,
    next_stream_id: u64,
    active_stream_id: u64,
    streaming: bool,
    in_progress_id: Option<u64>,
    buffer: String,
    patient_context: Option<Value>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            next_message_id: 0,
            next_stream_id: 0,
            active_stream_id: 0,
            streaming: false,
            in_progress_id: None,
            buffer: String::new(),
            patient_context: None,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Attach the selected patient's context object; it rides along with
    /// every subsequent turn.
    pub fn set_patient_context(&mut self, context: Option<Value>) {
        self.patient_context = context;
    }

    /// Start a turn: append the user message and return the request for
    /// the transport. Returns `None` (and changes nothing) when the input
    /// is empty after trimming or another turn is still streaming.
    pub fn begin_turn(&mut self, content: &str) -> Option<TurnRequest> {
        let content = content.trim();
        if content.is_empty() || self.streaming {
            return None;
        }

        let id = self.allocate_message_id();
        self.messages
            .push(ChatMessage::new(id, TranscriptRole::User, content));

        self.next_stream_id += 1;
        self.active_stream_id = self.next_stream_id;
        self.streaming = true;
        self.in_progress_id = None;
        self.buffer.clear();

        Some(TurnRequest {
            stream_id: self.active_stream_id,
            api_messages: self.api_messages(),
            patient_context: self.patient_context.clone(),
        })
    }

    /// Apply one stream event. Events tagged with a stream id other than
    /// the active turn's are ignored.
    pub fn apply(&mut self, message: StreamMessage, stream_id: u64) {
        if stream_id != self.active_stream_id {
            return;
        }

        match message {
            StreamMessage::Chunk(content) => {
                self.buffer.push_str(&content);
                match self.in_progress_id {
                    None => {
                        let id = self.allocate_message_id();
                        self.messages.push(ChatMessage::new(
                            id,
                            TranscriptRole::Alis,
                            self.buffer.clone(),
                        ));
                        self.in_progress_id = Some(id);
                    }
                    Some(id) => {
                        // Replace wholesale with the accumulated buffer so a
                        // reprocessed frame cannot drift the displayed text.
                        if let Some(msg) = self.messages.iter_mut().find(|m| m.id == id) {
                            msg.content = self.buffer.clone();
                        }
                    }
                }
            }
            StreamMessage::Error(text) => {
                let id = self.allocate_message_id();
                self.messages
                    .push(ChatMessage::new(id, TranscriptRole::AppError, text));
            }
            StreamMessage::End => {
                self.streaming = false;
                self.in_progress_id = None;
            }
        }
    }

    /// Close out the active turn after a local cancellation. Whatever
    /// content already rendered stays; stragglers from the cancelled
    /// stream are ignored because the stream id no longer matches.
    pub fn cancel_active_turn(&mut self) {
        if self.streaming {
            self.streaming = false;
            self.in_progress_id = None;
            self.active_stream_id = 0;
        }
    }

    /// Append a scripted ALIS message (demo playback path).
    pub fn push_alis(&mut self, content: impl Into<String>, actions: Vec<ChatAction>) -> u64 {
        let id = self.allocate_message_id();
        self.messages.push(
            ChatMessage::new(id, TranscriptRole::Alis, content).with_actions(actions),
        );
        id
    }

    /// Append a scripted user message (demo playback path).
    pub fn push_user(&mut self, content: impl Into<String>) -> u64 {
        let id = self.allocate_message_id();
        self.messages
            .push(ChatMessage::new(id, TranscriptRole::User, content));
        id
    }

    /// Append a local notice that is never transmitted to the proxy.
    pub fn push_notice(&mut self, role: TranscriptRole, content: impl Into<String>) -> u64 {
        debug_assert!(role.is_app());
        let id = self.allocate_message_id();
        self.messages.push(ChatMessage::new(id, role, content));
        id
    }

    fn allocate_message_id(&mut self) -> u64 {
        let id = self.next_message_id;
        self.next_message_id += 1;
        id
    }

    /// Transcript as proxy payload: user/alis turns only, in order,
    /// including the just-appended user message.
    fn api_messages(&self) -> Vec<api::ChatMessage> {
        self.messages
            .iter()
            .filter_map(|msg| {
                msg.role
                    .to_api_role()
                    .map(|role| api::ChatMessage::text(role, msg.content.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_appends_user_message_optimistically() {
        let mut conversation = Conversation::new();
        let turn = conversation.begin_turn("Show me the morning labs").unwrap();

        assert_eq!(conversation.messages().len(), 1);
        assert!(conversation.messages()[0].is_user());
        assert!(conversation.is_streaming());
        assert_eq!(turn.api_messages.len(), 1);
        assert_eq!(turn.api_messages[0].role, "user");
    }

    #[test]
    fn empty_input_is_rejected() {
        let mut conversation = Conversation::new();
        assert!(conversation.begin_turn("   \n ").is_none());
        assert!(conversation.messages().is_empty());
        assert!(!conversation.is_streaming());
    }

    #[test]
    fn second_send_while_streaming_is_a_noop() {
        let mut conversation = Conversation::new();
        let first = conversation.begin_turn("first");
        assert!(first.is_some());

        let second = conversation.begin_turn("second");
        assert!(second.is_none());
        // No second user message and no placeholder appeared.
        assert_eq!(conversation.messages().len(), 1);
    }

    #[test]
    fn first_delta_creates_message_later_deltas_replace() {
        let mut conversation = Conversation::new();
        let turn = conversation.begin_turn("hello").unwrap();
        let sid = turn.stream_id;

        conversation.apply(StreamMessage::Chunk("The ".into()), sid);
        assert_eq!(conversation.messages().len(), 2);
        assert_eq!(conversation.messages()[1].content, "The ");

        conversation.apply(StreamMessage::Chunk("patient ".into()), sid);
        conversation.apply(StreamMessage::Chunk("is stable.".into()), sid);
        assert_eq!(conversation.messages().len(), 2);
        assert_eq!(conversation.messages()[1].content, "The patient is stable.");

        conversation.apply(StreamMessage::End, sid);
        assert!(!conversation.is_streaming());
    }

    #[test]
    fn stale_stream_events_are_discarded() {
        let mut conversation = Conversation::new();
        let turn = conversation.begin_turn("hello").unwrap();
        let sid = turn.stream_id;

        conversation.apply(StreamMessage::Chunk("late".into()), sid + 10);
        assert_eq!(conversation.messages().len(), 1);

        conversation.apply(StreamMessage::End, sid);
        assert!(!conversation.is_streaming());
    }

    #[test]
    fn error_surfaces_as_notice_and_end_clears_flag() {
        let mut conversation = Conversation::new();
        let turn = conversation.begin_turn("hello").unwrap();
        let sid = turn.stream_id;

        conversation.apply(StreamMessage::Error("Request failed: 502".into()), sid);
        conversation.apply(StreamMessage::End, sid);

        let last = conversation.messages().last().unwrap();
        assert_eq!(last.role, TranscriptRole::AppError);
        assert_eq!(last.content, "Request failed: 502");
        assert!(!conversation.is_streaming());
    }

    #[test]
    fn cancelled_turn_keeps_partial_content_and_frees_the_input() {
        let mut conversation = Conversation::new();
        let turn = conversation.begin_turn("hello").unwrap();
        let sid = turn.stream_id;
        conversation.apply(StreamMessage::Chunk("partial ans".into()), sid);

        conversation.cancel_active_turn();
        assert!(!conversation.is_streaming());
        assert_eq!(conversation.messages()[1].content, "partial ans");

        // A straggler delta from the cancelled stream changes nothing.
        conversation.apply(StreamMessage::Chunk("wer".into()), sid);
        assert_eq!(conversation.messages()[1].content, "partial ans");

        // And a new turn can start immediately.
        assert!(conversation.begin_turn("again").is_some());
    }

    #[test]
    fn next_turn_replays_full_transcript() {
        let mut conversation = Conversation::new();
        let turn = conversation.begin_turn("first question").unwrap();
        let sid = turn.stream_id;
        conversation.apply(StreamMessage::Chunk("first answer".into()), sid);
        conversation.apply(StreamMessage::End, sid);

        // A stream error notice must not leak into the replayed transcript.
        conversation.push_notice(TranscriptRole::AppInfo, "demo mode off");

        let turn = conversation.begin_turn("second question").unwrap();
        let roles: Vec<&str> = turn
            .api_messages
            .iter()
            .map(|m| m.role.as_str())
            .collect();
        assert_eq!(roles, vec!["user", "assistant", "user"]);
    }

    #[test]
    fn patient_context_rides_along() {
        let mut conversation = Conversation::new();
        conversation.set_patient_context(Some(serde_json::json!({"patient_id": "p-1"})));
        let turn = conversation.begin_turn("context?").unwrap();
        assert_eq!(
            turn.patient_context.unwrap()["patient_id"],
            serde_json::json!("p-1")
        );
    }
}
