//! JSON message envelope carried over WebSocket.
//!
//! ```text
//! {"t":<0..4>,"u":"<unique id>","a":"<action>","c":<code>,"m":"<message>","p":<payload>}
//! ```

use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Bytes of randomness in a generated unique id (hex doubles it).
const UNIQUE_ID_BYTES: usize = 21;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown message type {0}")]
    UnknownType(u8),
    #[error("random source unavailable")]
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MessageType {
    Open = 0,
    Close = 1,
    Call = 2,
    CallResult = 3,
    CallError = 4,
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageType::Open),
            1 => Ok(MessageType::Close),
            2 => Ok(MessageType::Call),
            3 => Ok(MessageType::CallResult),
            4 => Ok(MessageType::CallError),
            other => Err(ProtocolError::UnknownType(other)),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        value as u8
    }
}

/// One protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "t")]
    pub message_type: MessageType,
    #[serde(rename = "u", default)]
    pub unique_id: String,
    #[serde(rename = "a", default)]
    pub action: String,
    #[serde(rename = "c", default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i32>,
    #[serde(rename = "m", default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(rename = "p", default)]
    pub payload: Value,
}

/// 42 lowercase hex characters from 21 secure random bytes.
pub fn generate_unique_id() -> Result<String, ProtocolError> {
    let mut bytes = [0u8; UNIQUE_ID_BYTES];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| ProtocolError::Random)?;
    Ok(hex::encode(bytes))
}

impl Message {
    pub fn new(message_type: MessageType, action: impl Into<String>, payload: Value) -> Result<Self, ProtocolError> {
        let mut message = Self {
            message_type,
            unique_id: generate_unique_id()?,
            action: action.into(),
            error_code: None,
            error_message: None,
            payload,
        };
        message.normalize_payload();
        Ok(message)
    }

    /// Parses a message, generating a unique id when absent and defaulting
    /// the payload to `{}`.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        let mut message: Message = serde_json::from_str(text)?;
        if message.unique_id.is_empty() {
            message.unique_id = generate_unique_id()?;
        }
        message.normalize_payload();
        Ok(message)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Successful answer to a `Call`, echoing its id and action.
    pub fn call_result(&self, payload: Value) -> Self {
        let mut reply = Self {
            message_type: MessageType::CallResult,
            unique_id: self.unique_id.clone(),
            action: self.action.clone(),
            error_code: None,
            error_message: None,
            payload,
        };
        reply.normalize_payload();
        reply
    }

    /// Failed answer to a `Call`.
    pub fn call_error(&self, code: i32, message: impl Into<String>) -> Self {
        Self {
            message_type: MessageType::CallError,
            unique_id: self.unique_id.clone(),
            action: self.action.clone(),
            error_code: Some(code),
            error_message: Some(message.into()),
            payload: Value::Object(Default::default()),
        }
    }

    fn normalize_payload(&mut self) {
        let empty = match &self.payload {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            _ => false,
        };
        if empty {
            self.payload = Value::Object(Default::default());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_id_is_42_hex_chars() {
        let id = generate_unique_id().unwrap();
        assert_eq!(id.len(), 42);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
