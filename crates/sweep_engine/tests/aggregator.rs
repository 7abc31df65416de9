use std::sync::{Arc, Once};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use pretty_assertions::assert_eq;
use serde_json::Value;
use sweep_core::{ExtractedRecord, Message, Phase, Reply, WorkTicket};
use sweep_engine::{Aggregator, KeyValueStore, MemoryStore, MessageHandler, ProgressStore, StoreError};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(sweep_logging::initialize_for_tests);
}

/// Memory backend whose writes take as long as a slow disk.
struct SlowDisk {
    inner: MemoryStore,
    write_time: Duration,
}

impl KeyValueStore for SlowDisk {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get(key)
    }

    fn set(&mut self, entries: Vec<(&str, Value)>) -> Result<(), StoreError> {
        thread::sleep(self.write_time);
        self.inner.set(entries)
    }

    fn remove(&mut self, keys: &[&str]) -> Result<(), StoreError> {
        self.inner.remove(keys)
    }
}

fn report(run: u64) -> Message {
    Message::ReportRecord {
        ticket: WorkTicket { run, item: 0 },
        data: ExtractedRecord::placeholder("https://tracker.test/browse/PRJ-0", Utc::now()),
    }
}

// Single-threaded runtime: a blocking write inside the handler would freeze
// every other task until it finished.
#[tokio::test(flavor = "current_thread")]
async fn slow_writes_leave_other_tasks_running() {
    init_logging();
    let store = Arc::new(ProgressStore::new(SlowDisk {
        inner: MemoryStore::new(),
        write_time: Duration::from_millis(200),
    }));
    let run = store.begin_run(1).unwrap();
    let aggregator = Aggregator::new(store.clone());

    let ticker = tokio::spawn(async {
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Instant::now()
    });
    tokio::task::yield_now().await;

    let reply = aggregator.handle(report(run)).await;
    let reported = Instant::now();
    let ticked = ticker.await.unwrap();

    assert_eq!(reply, Reply::Recorded { accepted: true });
    assert!(ticked < reported, "ticker was held up by the store write");
}

#[tokio::test]
async fn status_query_answers_the_merged_snapshot() {
    init_logging();
    let store = Arc::new(ProgressStore::new(MemoryStore::new()));
    let run = store.begin_run(2).unwrap();
    let aggregator = Aggregator::new(store);

    assert_eq!(
        aggregator.handle(report(run)).await,
        Reply::Recorded { accepted: true }
    );
    // Same item again.
    assert_eq!(
        aggregator.handle(report(run)).await,
        Reply::Recorded { accepted: false }
    );

    let Reply::Status(status) = aggregator.handle(Message::QueryStatus).await else {
        panic!("expected a status reply");
    };
    assert_eq!(status.run.phase, Phase::Running);
    assert_eq!(status.run.processed_count, 1);
    assert_eq!(status.record_count, 1);
}

#[tokio::test]
async fn page_messages_are_refused() {
    init_logging();
    let aggregator = Aggregator::new(Arc::new(ProgressStore::new(MemoryStore::new())));

    let reply = aggregator.handle(Message::GetLinkCount).await;
    assert!(matches!(reply, Reply::Failed { .. }), "got {reply:?}");
}
