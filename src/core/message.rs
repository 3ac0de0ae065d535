use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TranscriptRole {
    User,
    Alis,
    AppInfo,
    AppWarning,
    AppError,
}

impl TranscriptRole {
    pub fn as_str(self) -> &'static str {
        match self {
            TranscriptRole::User => "user",
            TranscriptRole::Alis => "alis",
            TranscriptRole::AppInfo => "app/info",
            TranscriptRole::AppWarning => "app/warning",
            TranscriptRole::AppError => "app/error",
        }
    }

    /// Role string used when replaying the transcript to the chat proxy.
    /// App notices are local-only and never transmitted.
    pub fn to_api_role(self) -> Option<&'static str> {
        match self {
            TranscriptRole::User => Some("user"),
            TranscriptRole::Alis => Some("assistant"),
            _ => None,
        }
    }

    pub fn is_user(self) -> bool {
        self == TranscriptRole::User
    }

    pub fn is_alis(self) -> bool {
        self == TranscriptRole::Alis
    }

    pub fn is_app(self) -> bool {
        matches!(
            self,
            TranscriptRole::AppInfo | TranscriptRole::AppWarning | TranscriptRole::AppError
        )
    }
}

impl TryFrom<&str> for TranscriptRole {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, String> {
        match value {
            "user" => Ok(TranscriptRole::User),
            "alis" | "assistant" => Ok(TranscriptRole::Alis),
            "app/info" => Ok(TranscriptRole::AppInfo),
            "app/warning" => Ok(TranscriptRole::AppWarning),
            "app/error" => Ok(TranscriptRole::AppError),
            _ => Err(format!("invalid transcript role: {value}")),
        }
    }
}

impl TryFrom<String> for TranscriptRole {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        Self::try_from(value.as_str())
    }
}

impl From<TranscriptRole> for String {
    fn from(value: TranscriptRole) -> Self {
        value.as_str().to_string()
    }
}

/// A declarative affordance attached to a message. The console renders it
/// as a button that re-enters the conversation handler with the named
/// action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatAction {
    pub label: String,
    pub action: String,
    #[serde(default)]
    pub primary: bool,
}

impl ChatAction {
    pub fn new(label: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: action.into(),
            primary: false,
        }
    }

    pub fn primary(label: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: action.into(),
            primary: true,
        }
    }
}

/// One transcript entry. While an ALIS reply streams, exactly one message
/// (identified by `id`) is mutable; its content is replaced wholesale with
/// the accumulated buffer on each delta and frozen once the stream ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: u64,
    pub role: TranscriptRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ChatAction>,
}

impl ChatMessage {
    pub fn new(id: u64, role: TranscriptRole, content: impl Into<String>) -> Self {
        Self {
            id,
            role,
            content: content.into(),
            timestamp: Utc::now(),
            actions: Vec::new(),
        }
    }

    pub fn with_actions(mut self, actions: Vec<ChatAction>) -> Self {
        self.actions = actions;
        self
    }

    pub fn is_user(&self) -> bool {
        self.role.is_user()
    }

    pub fn is_alis(&self) -> bool {
        self.role.is_alis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_notices_have_no_api_role() {
        assert_eq!(TranscriptRole::AppError.to_api_role(), None);
        assert_eq!(TranscriptRole::User.to_api_role(), Some("user"));
        assert_eq!(TranscriptRole::Alis.to_api_role(), Some("assistant"));
    }

    #[test]
    fn assistant_parses_as_alis() {
        assert_eq!(
            TranscriptRole::try_from("assistant").unwrap(),
            TranscriptRole::Alis
        );
    }

    #[test]
    fn invalid_role_strings_are_rejected() {
        assert!(TranscriptRole::try_from("app/unknown").is_err());
    }
}
