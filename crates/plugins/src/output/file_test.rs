use serde_json::json;

use super::*;

fn params() -> OutputParams {
    OutputParams {
        pipeline: "test".into(),
    }
}

async fn event_with(root: serde_json::Value, pool: &sluice_event::EventPool) -> Box<Event> {
    let mut e = pool.acquire().await.unwrap();
    e.set_root(root);
    e
}

#[tokio::test]
async fn writes_one_json_line_per_event() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out.log");

    let output = FileOutput::new();
    output
        .start(&json!({"target_file": target.to_str().unwrap()}), params())
        .await
        .unwrap();

    let pool = sluice_event::EventPool::new(4);
    let events = vec![
        event_with(json!({"a": 1}), &pool).await,
        event_with(json!({"b": 2}), &pool).await,
    ];
    output.out(&events).await.unwrap();
    output.stop().await;

    let contents = std::fs::read_to_string(&target).unwrap();
    assert_eq!(contents, "{\"a\":1}\n{\"b\":2}\n");
}

#[tokio::test]
async fn appends_across_batches() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out.log");

    let output = FileOutput::new();
    let config = json!({"target_file": target.to_str().unwrap()});
    output.start(&config, params()).await.unwrap();

    let pool = sluice_event::EventPool::new(4);
    output
        .out(&[event_with(json!({"n": 1}), &pool).await])
        .await
        .unwrap();
    output
        .out(&[event_with(json!({"n": 2}), &pool).await])
        .await
        .unwrap();
    output.stop().await;

    let contents = std::fs::read_to_string(&target).unwrap();
    assert_eq!(contents.lines().count(), 2);
}

#[tokio::test]
async fn creates_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("nested/deep/out.log");

    let output = FileOutput::new();
    output
        .start(&json!({"target_file": target.to_str().unwrap()}), params())
        .await
        .unwrap();
    output.stop().await;

    assert!(target.exists());
}

#[tokio::test]
async fn out_before_start_fails() {
    let output = FileOutput::new();
    let pool = sluice_event::EventPool::new(1);
    let events = vec![event_with(json!({}), &pool).await];
    assert!(output.out(&events).await.is_err());
}
