//! Message value types.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(CoreError::InvalidRole(other.to_string())),
        }
    }
}

/// Content type of a message.
///
/// The five built-in kinds cover what clients send today. `Custom` carries
/// any other well-formed name so servers can register handlers for
/// application-specific types; a name is well-formed when it is non-empty
/// and made of lowercase ASCII letters, digits, `-`, `_` or `.`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Audio,
    Video,
    File,
    Custom(String),
}

impl MessageType {
    /// Wire name of the type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::File => "file",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "text" => Self::Text,
            "image" => Self::Image,
            "audio" => Self::Audio,
            "video" => Self::Video,
            "file" => Self::File,
            other => {
                let well_formed = !other.is_empty()
                    && other.bytes().all(|b| {
                        b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'-' | b'_' | b'.')
                    });
                if !well_formed {
                    return Err(CoreError::InvalidMessageType(other.to_string()));
                }
                Self::Custom(other.to_string())
            }
        })
    }
}

impl TryFrom<String> for MessageType {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MessageType> for String {
    fn from(value: MessageType) -> Self {
        match value {
            MessageType::Custom(name) => name,
            builtin => builtin.as_str().to_string(),
        }
    }
}

/// Immutable unit of conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
    #[serde(rename = "type", default)]
    kind: MessageType,
}

impl Message {
    /// Create a message.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>, kind: MessageType) -> Self {
        Self {
            role,
            content: content.into(),
            kind,
        }
    }

    /// Create a user text message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, MessageType::Text)
    }

    /// Create an assistant text message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content, MessageType::Text)
    }

    /// Create a system text message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content, MessageType::Text)
    }

    /// Copy of this message with a different type.
    #[must_use]
    pub fn with_type(self, kind: MessageType) -> Self {
        Self { kind, ..self }
    }

    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub const fn kind(&self) -> &MessageType {
        &self.kind
    }

    /// JSON form: `{"role", "content", "type"}`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "role": self.role.as_str(),
            "content": self.content,
            "type": self.kind.as_str(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serialization() {
        let msg = Message::user("Hello, relay!");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"role": "user", "content": "Hello, relay!", "type": "text"})
        );
        assert_eq!(json, msg.to_json());
    }

    #[test]
    fn test_type_defaults_to_text() {
        let msg: Message = serde_json::from_str(r#"{"role":"system","content":"boot"}"#).unwrap();
        assert_eq!(msg.kind(), &MessageType::Text);
        assert_eq!(msg.role(), Role::System);
    }

    #[test]
    fn test_custom_types() {
        assert_eq!(
            "unknown".parse::<MessageType>().unwrap(),
            MessageType::Custom("unknown".into())
        );
        assert_eq!("video".parse::<MessageType>().unwrap(), MessageType::Video);
        assert!("".parse::<MessageType>().is_err());
        assert!("Not Valid".parse::<MessageType>().is_err());

        let msg: Message =
            serde_json::from_str(r#"{"role":"user","content":"x","type":"tool.call"}"#).unwrap();
        assert_eq!(msg.kind().as_str(), "tool.call");
    }

    #[test]
    fn test_invalid_role() {
        assert_eq!(
            "robot".parse::<Role>(),
            Err(CoreError::InvalidRole("robot".into()))
        );
        assert!(serde_json::from_str::<Message>(r#"{"role":"robot","content":"x"}"#).is_err());
    }

    #[test]
    fn test_value_equality() {
        assert_eq!(Message::assistant("hi"), Message::assistant("hi"));
        assert_ne!(
            Message::assistant("hi"),
            Message::assistant("hi").with_type(MessageType::File)
        );
    }
}
