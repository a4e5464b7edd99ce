use std::sync::Arc;

use serde_json::json;

use super::*;

fn sample() -> Event {
    let mut e = Event::blank();
    e.assign(1, 7, Arc::from("stdout"), 100, 42);
    e.set_root(json!({"a": {"b": 1}, "msg": "hello"}));
    e
}

#[test]
fn assign_sets_metadata() {
    let e = sample();
    assert_eq!(e.seq(), 1);
    assert_eq!(e.source_id(), 7);
    assert_eq!(e.source_name().as_ref(), "stdout");
    assert_eq!(e.offset(), 100);
    assert_eq!(e.size(), 42);
    assert_eq!(e.stage(), EventStage::Input);
}

#[test]
fn reset_clears_and_bumps_generation() {
    let mut e = sample();
    let gen = e.generation();
    e.reset();
    assert_eq!(e.stage(), EventStage::Free);
    assert_eq!(e.offset(), 0);
    assert!(e.root().is_null());
    assert_eq!(e.generation(), gen + 1);
}

#[test]
fn get_path_resolves_nested_fields() {
    let e = sample();
    let selector = FieldSelector::parse("a.b");
    assert_eq!(e.get_path(&selector), Some(&json!(1)));

    let missing = FieldSelector::parse("a.c");
    assert_eq!(e.get_path(&missing), None);
}

#[test]
fn set_field_creates_object_root() {
    let mut e = Event::blank();
    e.set_field("k", json!("v"));
    assert_eq!(e.root()["k"], json!("v"));
}

#[test]
fn encode_preserves_field_order() {
    let mut e = Event::blank();
    e.set_root(serde_json::from_str(r#"{"z":1,"a":2,"m":3}"#).unwrap());
    assert_eq!(e.encode(), r#"{"z":1,"a":2,"m":3}"#);
}

#[test]
fn encode_round_trips_canonical_json() {
    let input = r#"{ "field1" : "5408-7430-0756-2004" , "n" : [1, 2] }"#;
    let canonical = serde_json::from_str::<serde_json::Value>(input)
        .unwrap()
        .to_string();

    let mut e = Event::blank();
    e.set_root(serde_json::from_str(input).unwrap());
    assert_eq!(e.encode(), canonical);
}
