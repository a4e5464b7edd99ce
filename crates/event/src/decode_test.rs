use serde_json::json;

use super::*;

#[test]
fn json_decodes_objects() {
    let tree = Decoder::Json.decode(br#"{"level":"info","x":1}"#).unwrap();
    assert_eq!(tree, json!({"level": "info", "x": 1}));
}

#[test]
fn auto_resolves_to_json() {
    let tree = Decoder::Auto.decode(br#"{"a":1}"#).unwrap();
    assert_eq!(tree, json!({"a": 1}));
}

#[test]
fn json_rejects_garbage() {
    assert!(Decoder::Json.decode(b"not json at all").is_err());
}

#[test]
fn raw_wraps_payload_as_message() {
    let tree = Decoder::Raw.decode(b"plain log line\n").unwrap();
    assert_eq!(tree, json!({"message": "plain log line"}));
}

#[test]
fn raw_accepts_invalid_utf8() {
    let tree = Decoder::Raw.decode(&[0xff, 0xfe, b'a']).unwrap();
    assert!(tree["message"].is_string());
}

#[test]
fn decoder_parses_from_config_strings() {
    let d: Decoder = serde_json::from_str(r#""raw""#).unwrap();
    assert_eq!(d, Decoder::Raw);
    let d: Decoder = serde_json::from_str(r#""auto""#).unwrap();
    assert_eq!(d, Decoder::Auto);
}
