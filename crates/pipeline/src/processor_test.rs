use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use sluice_event::EventPool;
use sluice_plugin::{InputParams, InputPlugin, MatchMode, PluginConfig, PluginError};

use super::*;
use crate::matcher::Condition;

#[derive(Default)]
struct RecordingInput {
    commits: Mutex<Vec<(String, i64)>>,
}

#[async_trait]
impl InputPlugin for RecordingInput {
    async fn start(&self, _: &PluginConfig, _: InputParams) -> Result<(), PluginError> {
        Ok(())
    }

    fn commit(&self, _source_id: u64, source_name: &str, offset: i64) {
        self.commits.lock().push((source_name.to_string(), offset));
    }

    async fn stop(&self) {}
}

struct DiscardAction;

impl ActionPlugin for DiscardAction {
    fn apply(&mut self, event: Box<Event>) -> ActionResult {
        ActionResult::Discard(event)
    }
}

struct PanicAction;

impl ActionPlugin for PanicAction {
    fn apply(&mut self, _event: Box<Event>) -> ActionResult {
        panic!("injected action panic");
    }
}

struct SlowAction;

impl ActionPlugin for SlowAction {
    fn apply(&mut self, event: Box<Event>) -> ActionResult {
        std::thread::sleep(Duration::from_millis(30));
        ActionResult::Pass(event)
    }
}

#[derive(Default)]
struct HoldAction {
    parked: Vec<Box<Event>>,
}

impl ActionPlugin for HoldAction {
    fn apply(&mut self, event: Box<Event>) -> ActionResult {
        self.parked.push(event);
        ActionResult::Hold
    }

    fn stop(&mut self) -> Vec<Box<Event>> {
        std::mem::take(&mut self.parked)
    }
}

struct Rig {
    pool: Arc<EventPool>,
    streams: Arc<StreamPool>,
    commits: Arc<CommitFanIn>,
    input: Arc<RecordingInput>,
    metrics: PipelineMetrics,
    cancel: CancellationToken,
}

impl Rig {
    fn new(capacity: usize) -> Self {
        let pool = Arc::new(EventPool::new(capacity));
        let streams = Arc::new(StreamPool::new());
        let metrics = PipelineMetrics::new();
        let commits = Arc::new(CommitFanIn::new(
            Arc::clone(&pool),
            Arc::clone(&streams),
            metrics.clone(),
        ));
        let input = Arc::new(RecordingInput::default());
        commits.set_input(Arc::clone(&input) as Arc<dyn InputPlugin>);
        Self {
            pool,
            streams,
            commits,
            input,
            metrics,
            cancel: CancellationToken::new(),
        }
    }

    fn spawn_workers(
        &self,
        count: usize,
        chain: impl Fn() -> (Arc<Vec<ActionSpec>>, Vec<Box<dyn ActionPlugin>>),
        timeout: Duration,
    ) -> (
        crossfire::AsyncRx<Box<Event>>,
        Vec<tokio::task::JoinHandle<()>>,
    ) {
        let (tx, rx) = crossfire::mpsc::bounded_async::<Box<Event>>(64);
        let mut tasks = Vec::new();
        for id in 0..count {
            let (specs, actions) = chain();
            let processor = Processor {
                id,
                pipeline: "test".into(),
                specs,
                actions,
                streams: Arc::clone(&self.streams),
                commits: Arc::clone(&self.commits),
                out_tx: tx.clone(),
                metrics: self.metrics.clone(),
                cancel: self.cancel.clone(),
                event_timeout: timeout,
            };
            tasks.push(tokio::spawn(processor.run()));
        }
        (rx, tasks)
    }

    async fn admit(&self, name: &str, offset: i64, root: serde_json::Value) {
        let mut e = self.pool.acquire().await.unwrap();
        e.assign(offset as u64, 1, Arc::from(name), offset, 10);
        e.set_root(root);
        self.streams.push(e);
    }

    fn commits_for(&self, name: &str) -> Vec<i64> {
        self.input
            .commits
            .lock()
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, o)| *o)
            .collect()
    }

    async fn shutdown(&self, tasks: Vec<tokio::task::JoinHandle<()>>) {
        self.cancel.cancel();
        for t in tasks {
            t.await.unwrap();
        }
    }
}

fn empty_chain() -> (Arc<Vec<ActionSpec>>, Vec<Box<dyn ActionPlugin>>) {
    (Arc::new(Vec::new()), Vec::new())
}

fn single_action(
    name: &str,
    matcher: Matcher,
    action: Box<dyn ActionPlugin>,
) -> (Arc<Vec<ActionSpec>>, Vec<Box<dyn ActionPlugin>>) {
    let specs = vec![ActionSpec {
        name: name.to_string(),
        matcher,
        config: json!({}),
    }];
    (Arc::new(specs), vec![action])
}

#[tokio::test]
async fn empty_chain_forwards_events_byte_identical() {
    let rig = Rig::new(4);
    let (out_rx, tasks) = rig.spawn_workers(1, empty_chain, Duration::from_secs(30));

    let input_json = r#"{"field1":"5408-7430-0756-2004","n":1}"#;
    rig.admit("a", 10, serde_json::from_str(input_json).unwrap())
        .await;

    let event = out_rx.recv().await.unwrap();
    assert_eq!(event.encode(), input_json);
    assert_eq!(event.offset(), 10);

    rig.commits.commit(event);
    assert_eq!(rig.commits_for("a"), vec![10]);
    assert!(rig.pool.is_full());

    rig.shutdown(tasks).await;
}

#[tokio::test]
async fn discard_action_drops_matching_events_only() {
    let rig = Rig::new(4);
    let matcher = Matcher::new(
        vec![Condition::new("should_drop", "ok").unwrap()],
        MatchMode::Or,
        false,
    );
    let (out_rx, tasks) = rig.spawn_workers(
        1,
        move || single_action("discard", matcher.clone(), Box::new(DiscardAction)),
        Duration::from_secs(30),
    );

    rig.admit("a", 10, json!({"should_drop": "ok", "x": 1})).await;
    rig.admit("a", 20, json!({"x": 1})).await;

    // Only the second event survives the chain.
    let event = out_rx.recv().await.unwrap();
    assert_eq!(event.offset(), 20);
    assert_eq!(event.root()["x"], json!(1));

    // The discarded event was still acknowledged, before the survivor.
    assert_eq!(rig.commits_for("a"), vec![10]);
    assert_eq!(rig.metrics.snapshot().events_discarded, 1);

    rig.commits.commit(event);
    assert_eq!(rig.commits_for("a"), vec![10, 20]);

    rig.shutdown(tasks).await;
}

#[tokio::test]
async fn prefix_rejection_terminates_the_chain() {
    let rig = Rig::new(4);
    let chain = || {
        let gate = Matcher::new(
            vec![Condition::new("a", "1").unwrap()],
            MatchMode::AndPrefix,
            false,
        );
        let specs = vec![
            ActionSpec {
                name: "gated".into(),
                matcher: gate,
                config: json!({}),
            },
            ActionSpec {
                name: "discard_all".into(),
                matcher: Matcher::always(),
                config: json!({}),
            },
        ];
        let actions: Vec<Box<dyn ActionPlugin>> =
            vec![Box::new(DiscardAction), Box::new(DiscardAction)];
        (Arc::new(specs), actions)
    };
    let (out_rx, tasks) = rig.spawn_workers(1, chain, Duration::from_secs(30));

    // Rejected by the and-prefix matcher: chain ends, the later
    // discard never runs, the event reaches the output.
    rig.admit("a", 10, json!({"b": 2})).await;
    let event = out_rx.recv().await.unwrap();
    assert_eq!(event.offset(), 10);
    rig.commits.commit(event);

    // Accepted by the matcher: the first discard consumes it.
    rig.admit("a", 20, json!({"a": "1"})).await;
    tokio::time::timeout(Duration::from_millis(500), async {
        while rig.commits_for("a").len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("discarded event should be acknowledged");

    rig.shutdown(tasks).await;
}

#[tokio::test]
async fn panicking_action_dead_letters_and_stream_advances() {
    let rig = Rig::new(4);
    let (out_rx, tasks) = rig.spawn_workers(
        1,
        || single_action("boom", Matcher::always(), Box::new(PanicAction)),
        Duration::from_secs(30),
    );

    rig.admit("a", 10, json!({"x": 1})).await;
    rig.admit("a", 20, json!({"x": 2})).await;

    // Both events hit the panicking action; both offsets must still be
    // acknowledged in order and the pool must recover its capacity.
    tokio::time::timeout(Duration::from_secs(2), async {
        while rig.commits_for("a").len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("dead-lettered offsets should be acknowledged");

    assert_eq!(rig.commits_for("a"), vec![10, 20]);
    assert_eq!(rig.metrics.snapshot().events_dead_lettered, 2);
    assert!(rig.pool.is_full());
    drop(out_rx);

    rig.shutdown(tasks).await;
}

#[tokio::test]
async fn deadline_overrun_dead_letters_the_event() {
    let rig = Rig::new(4);
    let (_out_rx, tasks) = rig.spawn_workers(
        1,
        || single_action("slow", Matcher::always(), Box::new(SlowAction)),
        Duration::from_millis(1),
    );

    rig.admit("a", 10, json!({"x": 1})).await;

    tokio::time::timeout(Duration::from_secs(2), async {
        while rig.commits_for("a").is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("slow event should be dead-lettered and acknowledged");

    assert_eq!(rig.metrics.snapshot().events_dead_lettered, 1);
    assert!(rig.pool.is_full());

    rig.shutdown(tasks).await;
}

#[tokio::test]
async fn held_events_are_settled_on_stop() {
    let rig = Rig::new(4);
    let (_out_rx, tasks) = rig.spawn_workers(
        1,
        || single_action("hold", Matcher::always(), Box::<HoldAction>::default()),
        Duration::from_secs(30),
    );

    rig.admit("a", 10, json!({"x": 1})).await;
    rig.admit("a", 20, json!({"x": 2})).await;

    // Held: nothing is acknowledged while the worker runs.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rig.commits_for("a").is_empty());
    assert!(!rig.pool.is_full());

    // Stop drains the action's internal state.
    rig.shutdown(tasks).await;
    assert_eq!(rig.commits_for("a"), vec![10, 20]);
    assert!(rig.pool.is_full());
}

#[tokio::test]
async fn per_stream_order_survives_parallel_workers() {
    let rig = Rig::new(16);
    let (out_rx, tasks) = rig.spawn_workers(4, empty_chain, Duration::from_secs(30));

    rig.admit("a", 10, json!({"s": "a"})).await;
    rig.admit("b", 15, json!({"s": "b"})).await;
    rig.admit("a", 20, json!({"s": "a"})).await;
    rig.admit("b", 25, json!({"s": "b"})).await;
    rig.admit("a", 30, json!({"s": "a"})).await;

    // Commit in arrival order at the output stage.
    for _ in 0..5 {
        let event = out_rx.recv().await.unwrap();
        rig.commits.commit(event);
    }

    assert_eq!(rig.commits_for("a"), vec![10, 20, 30]);
    assert_eq!(rig.commits_for("b"), vec![15, 25]);

    rig.shutdown(tasks).await;
}
