use super::*;
use serde_json::json;

#[test]
fn test_scope_parse() {
    assert_eq!("global".parse::<Scope>().unwrap(), Scope::Global);
    assert_eq!(
        "group:room1".parse::<Scope>().unwrap(),
        Scope::Group("room1".to_string())
    );
    assert_eq!(
        "direct:client-a".parse::<Scope>().unwrap(),
        Scope::Direct("client-a".to_string())
    );
}

#[test]
fn test_scope_ids_may_contain_colons() {
    assert_eq!(
        "group:a:b".parse::<Scope>().unwrap(),
        Scope::Group("a:b".to_string())
    );
}

#[test]
fn test_scope_rejects_malformed() {
    assert!("".parse::<Scope>().is_err());
    assert!("everyone".parse::<Scope>().is_err());
    assert!("group:".parse::<Scope>().is_err());
    assert!("room:1".parse::<Scope>().is_err());
}

#[test]
fn test_scope_display_matches_wire_form() {
    assert_eq!(Scope::Global.to_string(), "global");
    assert_eq!(Scope::Group("g".into()).to_string(), "group:g");
    assert_eq!(Scope::Direct("c".into()).to_string(), "direct:c");
}

#[test]
fn test_decode_minimal_chat_frame() {
    let frame = InboundFrame::decode(r#"{"type":"chat","scope":"global","body":"hi"}"#).unwrap();
    assert_eq!(frame.kind, EnvelopeKind::Chat);
    assert_eq!(frame.scope, Scope::Global);
    assert_eq!(frame.body, json!("hi"));
    assert!(frame.id.is_none());
    assert!(frame.timestamp.is_none());
}

#[test]
fn test_decode_defaults_scope_to_global() {
    let frame = InboundFrame::decode(r#"{"type":"chat","body":{"text":"x"}}"#).unwrap();
    assert_eq!(frame.scope, Scope::Global);
}

#[test]
fn test_decode_rejects_garbage_and_unknown_types() {
    assert!(InboundFrame::decode("not json").is_err());
    assert!(InboundFrame::decode(r#"{"type":"shout","scope":"global"}"#).is_err());
    assert!(InboundFrame::decode(r#"{"type":"chat","scope":"nowhere"}"#).is_err());
}

#[test]
fn test_decode_rejects_server_only_types() {
    let err = InboundFrame::decode(r#"{"type":"welcome","scope":"global"}"#).unwrap_err();
    assert!(matches!(err, crate::utils::HubError::Decode(_)));
    assert!(InboundFrame::decode(r#"{"type":"rejected"}"#).is_err());
}

#[test]
fn test_decode_join_requires_group_scope() {
    assert!(InboundFrame::decode(r#"{"type":"join","scope":"global"}"#).is_err());
    assert!(InboundFrame::decode(r#"{"type":"leave","scope":"direct:x"}"#).is_err());
    assert!(InboundFrame::decode(r#"{"type":"join","scope":"group:g"}"#).is_ok());
}

#[test]
fn test_into_envelope_stamps_sender_and_origin() {
    let frame = InboundFrame::decode(
        r#"{"type":"chat","scope":"global","body":"hi","senderID":"spoofed","originNode":"elsewhere"}"#,
    )
    .unwrap();
    let env = frame.into_envelope("client-a", "node-1");
    assert_eq!(env.sender_id, "client-a");
    assert_eq!(env.origin_node, "node-1");
    assert!(!env.id.is_empty());
    assert!(env.timestamp > 0);
}

#[test]
fn test_into_envelope_keeps_client_id_and_timestamp() {
    let frame =
        InboundFrame::decode(r#"{"id":"m1","type":"chat","timestamp":42,"body":"x"}"#).unwrap();
    let env = frame.into_envelope("a", "n");
    assert_eq!(env.id, "m1");
    assert_eq!(env.timestamp, 42);
}

#[test]
fn test_envelope_wire_field_names() {
    let env = Envelope::new(
        EnvelopeKind::Chat,
        Scope::Group("room".into()),
        "client-a",
        "node-1",
        json!("hi"),
    );
    let value: serde_json::Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();
    assert_eq!(value["type"], "chat");
    assert_eq!(value["scope"], "group:room");
    assert_eq!(value["senderID"], "client-a");
    assert_eq!(value["originNode"], "node-1");
    assert_eq!(value["body"], "hi");
    assert!(value["timestamp"].is_i64());

    let back: Envelope = serde_json::from_value(value).unwrap();
    assert_eq!(back, env);
}

#[test]
fn test_system_envelope_is_direct_from_hub() {
    let env = Envelope::system(EnvelopeKind::Welcome, "client-a", "node-1", json!({}));
    assert_eq!(env.scope, Scope::Direct("client-a".into()));
    assert_eq!(env.sender_id, SYSTEM_SENDER);
}
