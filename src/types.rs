//! Canonical message model
//!
//! The provider-agnostic request shape every transformer consumes. `Role` is
//! a closed set: an unknown role fails deserialization outright rather than
//! being passed through to an upstream that may interpret it.

use serde::{Deserialize, Serialize};

/// Conversation role. Closed enum; serde rejects anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One conversation turn. Unknown fields in the incoming JSON are dropped at
/// parse time; transformers rebuild wire bodies from role/content only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// The caller's chat request
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
}

impl ChatRequest {
    /// Structural validation beyond what serde enforces. Runs before any
    /// provider is resolved; failures surface as a 400.
    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("model must not be empty".to_string());
        }
        if self.messages.is_empty() {
            return Err("messages must not be empty".to_string());
        }
        if let Some(idx) = self.messages.iter().position(|m| m.content.is_empty()) {
            return Err(format!("messages[{}].content must not be empty", idx));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(model: &str, messages: Vec<Message>) -> ChatRequest {
        ChatRequest {
            model: model.to_string(),
            messages,
        }
    }

    fn msg(role: Role, content: &str) -> Message {
        Message {
            role,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_role_round_trip_is_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        let role: Role = serde_json::from_str("\"system\"").unwrap();
        assert_eq!(role, Role::System);
        assert_eq!(role.as_str(), "system");
    }

    #[test]
    fn test_unknown_role_fails_deserialization() {
        let result = serde_json::from_str::<Message>(r#"{"role":"function","content":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_message_fields_are_dropped() {
        let parsed: Message =
            serde_json::from_str(r#"{"role":"user","content":"hi","name":"alice"}"#).unwrap();
        assert_eq!(parsed.role, Role::User);
        assert_eq!(parsed.content, "hi");
    }

    #[test]
    fn test_validate_accepts_well_formed_request() {
        let req = request("gpt-4o", vec![msg(Role::User, "hello")]);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_model() {
        let req = request("  ", vec![msg(Role::User, "hello")]);
        assert!(req.validate().unwrap_err().contains("model"));
    }

    #[test]
    fn test_validate_rejects_empty_messages() {
        let req = request("gpt-4o", vec![]);
        assert!(req.validate().unwrap_err().contains("messages"));
    }

    #[test]
    fn test_validate_rejects_empty_content_and_names_position() {
        let req = request(
            "gpt-4o",
            vec![msg(Role::User, "hello"), msg(Role::Assistant, "")],
        );
        assert_eq!(
            req.validate().unwrap_err(),
            "messages[1].content must not be empty"
        );
    }
}
