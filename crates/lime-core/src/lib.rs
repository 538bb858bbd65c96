use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[cfg(any(test, feature = "mock"))]
use mockall::automock;

/// Seed message every conversation starts with.
pub const DEFAULT_GREETING: &str = "Hello! I'm lime.ai. Ask me anything.";

/// Author of a chat message. Serialized with the provider's role names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Model => write!(f, "model"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            content: content.into(),
        }
    }

    /// Wraps the message in the provider's `{role, parts: [{text}]}` shape.
    pub fn to_history_entry(&self) -> HistoryEntry {
        HistoryEntry {
            role: self.role,
            parts: vec![Part {
                text: self.content.clone(),
            }],
        }
    }
}

/// One turn of context handed to the assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    Sending,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Loading,
    Anonymous,
    Authenticated { username: String },
}

impl SessionState {
    pub fn username(&self) -> Option<&str> {
        match self {
            SessionState::Authenticated { username } => Some(username),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated { .. })
    }
}

#[derive(Error, Debug)]
pub enum LimeError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Assistant service error: {0}")]
    ServiceError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LimeError>;

/// Synchronous string key-value medium backing credentials and the session marker.
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    /// Removing a key that does not exist is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Remote model that answers a prompt given the prior conversation.
///
/// Every failure (transport, quota, malformed response) is reported as
/// [`LimeError::ServiceError`]; callers do not distinguish the cause.
#[cfg_attr(any(test, feature = "mock"), automock)]
#[async_trait::async_trait]
pub trait AssistantClient: Send + Sync {
    async fn generate_answer(&self, prompt: &str, history: &[HistoryEntry]) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_entry_wire_shape() {
        let entry = Message::model("Hello!").to_history_entry();
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"role": "model", "parts": [{"text": "Hello!"}]})
        );
    }

    #[test]
    fn test_session_state_username() {
        assert_eq!(SessionState::Loading.username(), None);
        assert_eq!(SessionState::Anonymous.username(), None);
        let state = SessionState::Authenticated {
            username: "bob".to_string(),
        };
        assert_eq!(state.username(), Some("bob"));
        assert!(state.is_authenticated());
    }

    #[tokio::test]
    async fn test_mock_assistant_client() {
        let mut mock = MockAssistantClient::new();
        mock.expect_generate_answer()
            .withf(|prompt, history| prompt == "Hi" && history.is_empty())
            .times(1)
            .returning(|_, _| Ok("Hello!".to_string()));

        let answer = mock.generate_answer("Hi", &[]).await.unwrap();
        assert_eq!(answer, "Hello!");
    }
}
