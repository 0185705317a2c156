use rampart::websocket::protocol::{generate_unique_id, ProtocolError};
use rampart::websocket::{Message, MessageType};
use serde_json::json;

#[test]
fn test_unique_id_shape() {
    let id = generate_unique_id().unwrap();

    assert_eq!(id.len(), 42);
    assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    assert_ne!(id, generate_unique_id().unwrap());
}

#[test]
fn test_parse_call_message() {
    let text = r#"{"t":2,"u":"abc","a":"ping","p":{"n":1}}"#;
    let message = Message::from_json(text).unwrap();

    assert_eq!(message.message_type, MessageType::Call);
    assert_eq!(message.unique_id, "abc");
    assert_eq!(message.action, "ping");
    assert_eq!(message.payload, json!({"n": 1}));
    assert_eq!(message.error_code, None);
}

#[test]
fn test_missing_fields_are_filled() {
    let message = Message::from_json(r#"{"t":0}"#).unwrap();

    assert_eq!(message.message_type, MessageType::Open);
    assert_eq!(message.unique_id.len(), 42);
    assert_eq!(message.action, "");
    assert_eq!(message.payload, json!({}));
}

#[test]
fn test_unknown_type_is_rejected() {
    let err = Message::from_json(r#"{"t":9,"u":"x"}"#).unwrap_err();
    assert!(matches!(err, ProtocolError::Json(_)));
}

#[test]
fn test_call_result_echoes_id_and_action() {
    let call = Message::from_json(r#"{"t":2,"u":"id-1","a":"sum","p":[1,2]}"#).unwrap();
    let result = call.call_result(json!(3));

    assert_eq!(result.message_type, MessageType::CallResult);
    assert_eq!(result.unique_id, "id-1");
    assert_eq!(result.action, "sum");
    assert_eq!(result.payload, json!(3));

    let encoded: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
    assert_eq!(encoded["t"], 3);
    assert_eq!(encoded["u"], "id-1");
    assert!(encoded.get("c").is_none());
    assert!(encoded.get("m").is_none());
}

#[test]
fn test_call_error_carries_code_and_message() {
    let call = Message::new(MessageType::Call, "boot", json!(null)).unwrap();
    assert_eq!(call.payload, json!({}));

    let error = call.call_error(404, "no such action");
    let encoded: serde_json::Value = serde_json::from_str(&error.to_json().unwrap()).unwrap();

    assert_eq!(encoded["t"], 4);
    assert_eq!(encoded["u"], call.unique_id.as_str());
    assert_eq!(encoded["c"], 404);
    assert_eq!(encoded["m"], "no such action");
    assert_eq!(encoded["p"], json!({}));
}
