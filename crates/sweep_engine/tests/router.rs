use std::collections::HashSet;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use chrono::Utc;
use pretty_assertions::assert_eq;
use sweep_core::{ExtractedRecord, Message, Reply, WorkTicket};
use sweep_engine::{
    Aggregator, ContextHost, ContextId, DeliveryError, DetachedHost, HostError, MemoryStore,
    MessageHandler, MessageRouter, OpenReason, ProgressStore, RetryPolicy, RouterError,
};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(sweep_logging::initialize_for_tests);
}

#[derive(Default)]
struct Counters {
    installed: HashSet<ContextId>,
    injections: usize,
    attempts: usize,
    delivered: usize,
}

/// Contexts start without a handler; `inject` installs one that forwards to
/// an aggregator. `hang_first` makes the first attempt never answer.
struct ScriptedHost {
    handler: Aggregator,
    counters: Mutex<Counters>,
    refuse_injection: bool,
    hang_first: bool,
}

impl ScriptedHost {
    fn new(store: Arc<ProgressStore>) -> Self {
        Self {
            handler: Aggregator::new(store),
            counters: Mutex::new(Counters::default()),
            refuse_injection: false,
            hang_first: false,
        }
    }

    fn injections(&self) -> usize {
        self.counters.lock().unwrap().injections
    }

    fn attempts(&self) -> usize {
        self.counters.lock().unwrap().attempts
    }

    fn delivered(&self) -> usize {
        self.counters.lock().unwrap().delivered
    }
}

#[async_trait::async_trait]
impl ContextHost for ScriptedHost {
    fn supports_contexts(&self) -> bool {
        true
    }

    async fn open_context(&self, _address: &str, _reason: OpenReason) -> Result<ContextId, HostError> {
        Ok(1)
    }

    async fn inject(&self, context: ContextId) -> Result<(), HostError> {
        let mut counters = self.counters.lock().unwrap();
        counters.injections += 1;
        if !self.refuse_injection {
            counters.installed.insert(context);
        }
        Ok(())
    }

    async fn deliver(&self, target: ContextId, message: Message) -> Result<Reply, DeliveryError> {
        let (attempt, ready) = {
            let mut counters = self.counters.lock().unwrap();
            counters.attempts += 1;
            (counters.attempts, counters.installed.contains(&target))
        };
        if self.hang_first && attempt == 1 {
            std::future::pending::<()>().await;
        }
        if !ready {
            return Err(DeliveryError::NotReady);
        }
        self.counters.lock().unwrap().delivered += 1;
        Ok(self.handler.handle(message).await)
    }

    async fn close_context(&self, _context: ContextId) -> Result<(), HostError> {
        Ok(())
    }
}

fn report(run: u64, item: u64) -> Message {
    Message::ReportRecord {
        ticket: WorkTicket { run, item },
        data: ExtractedRecord::placeholder("https://tracker.test/browse/PRJ-1", Utc::now()),
    }
}

fn policy() -> RetryPolicy {
    RetryPolicy {
        reply_timeout: Duration::from_secs(5),
        retry_delay: Duration::from_millis(500),
    }
}

#[tokio::test(start_paused = true)]
async fn unready_recipient_recovers_after_one_injection() {
    init_logging();
    let store = Arc::new(ProgressStore::new(MemoryStore::new()));
    let run = store.begin_run(2).unwrap();
    let host = Arc::new(ScriptedHost::new(store.clone()));
    let router = MessageRouter::new(host.clone(), policy());

    let reply = router.send(7, report(run, 0)).await.unwrap();

    assert_eq!(reply, Reply::Recorded { accepted: true });
    assert_eq!(host.injections(), 1);
    assert_eq!(host.attempts(), 2);
    assert_eq!(host.delivered(), 1);
    assert_eq!(store.read_status().unwrap().record_count, 1);
}

#[tokio::test(start_paused = true)]
async fn ready_recipient_is_not_reinjected() {
    init_logging();
    let store = Arc::new(ProgressStore::new(MemoryStore::new()));
    let run = store.begin_run(1).unwrap();
    let host = Arc::new(ScriptedHost::new(store.clone()));
    host.inject(3).await.unwrap();
    let router = MessageRouter::new(host.clone(), policy());

    router.send(3, report(run, 0)).await.unwrap();
    assert_eq!(host.injections(), 1);
    assert_eq!(host.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn silent_recipient_times_out_then_retries() {
    init_logging();
    let store = Arc::new(ProgressStore::new(MemoryStore::new()));
    let run = store.begin_run(1).unwrap();
    let host = Arc::new(ScriptedHost {
        hang_first: true,
        ..ScriptedHost::new(store.clone())
    });
    let router = MessageRouter::new(host.clone(), policy());

    let reply = router.send(4, report(run, 0)).await.unwrap();
    assert_eq!(reply, Reply::Recorded { accepted: true });
    assert_eq!(host.injections(), 1);
    assert_eq!(store.read_status().unwrap().run.processed_count, 1);
}

#[tokio::test(start_paused = true)]
async fn second_failure_is_surfaced_as_recipient_unavailable() {
    init_logging();
    let store = Arc::new(ProgressStore::new(MemoryStore::new()));
    let host = Arc::new(ScriptedHost {
        refuse_injection: true,
        ..ScriptedHost::new(store.clone())
    });
    let router = MessageRouter::new(host.clone(), policy());

    let err = router.send(9, Message::GetLinkCount).await.unwrap_err();
    assert_eq!(
        err,
        RouterError::RecipientUnavailable {
            target: 9,
            message: "getLinkCount",
            cause: DeliveryError::NotReady,
        }
    );
    assert_eq!(host.injections(), 1);
    assert_eq!(host.attempts(), 2);
    assert!(err.to_string().contains("reload the page"));
}

#[tokio::test]
async fn detached_host_fails_fast_without_retry() {
    init_logging();
    let router = MessageRouter::new(Arc::new(DetachedHost), policy());
    let err = router.send(1, Message::QueryStatus).await.unwrap_err();
    assert_eq!(err, RouterError::UnsupportedEnvironment);
}
