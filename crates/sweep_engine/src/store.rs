use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sweep_core::{
    ExtractedRecord, Phase, RecordOutcome, RejectReason, RunId, RunState, StatusSnapshot, WorkItem,
    WorkLedger, WorkTicket,
};
use sweep_logging::{sweep_debug, sweep_info, sweep_warn};

use crate::kv::{KeyValueStore, StoreError};

pub const STATUS_KEY: &str = "sweep.status";
pub const RECORDS_KEY: &str = "sweep.records";
pub const WORK_ITEMS_KEY: &str = "sweep.work_items";
/// Survives `clear()` so run ids are never reused.
pub const RUN_SEQ_KEY: &str = "sweep.run_seq";

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Process-wide progress of the current run.
///
/// The store is the only writer of run state and of the record collection.
/// Every operation holds the backend lock, and the backend's process lock
/// when it has one, for its whole read-modify-write. Concurrent completions
/// are serialized across threads and across processes sharing a data
/// directory, so none is lost and a `clear()` is never undone.
///
/// Operations block on file IO. Async callers go through [`Self::run_blocking`].
pub struct ProgressStore {
    backend: RwLock<Box<dyn KeyValueStore>>,
    clock: Clock,
    work_allowance: chrono::Duration,
}

impl std::fmt::Debug for ProgressStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressStore")
            .field("work_allowance", &self.work_allowance)
            .finish_non_exhaustive()
    }
}

impl ProgressStore {
    pub fn new(backend: impl KeyValueStore + 'static) -> Self {
        Self {
            backend: RwLock::new(Box::new(backend)),
            clock: system_clock(),
            work_allowance: chrono::Duration::seconds(120),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// How long an opened context may take to report before it counts as stalled.
    pub fn with_work_allowance(mut self, allowance: std::time::Duration) -> Self {
        self.work_allowance =
            chrono::Duration::from_std(allowance).unwrap_or(chrono::Duration::MAX);
        self
    }

    /// Runs `op` on the blocking pool so file IO never stalls an async worker.
    pub async fn run_blocking<T, F>(self: &Arc<Self>, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&ProgressStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(self);
        tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|err| StoreError::Worker(err.to_string()))?
    }

    /// Starts a new run of `total` items, replacing any previous run and
    /// emptying the record collection in the same locked update.
    pub fn begin_run(&self, total: usize) -> Result<RunId, StoreError> {
        if total == 0 {
            return Err(StoreError::EmptyRun);
        }
        let now = self.now();
        self.with_write(|kv| {
            let run_id = load::<RunId>(kv, RUN_SEQ_KEY)?.unwrap_or(0) + 1;
            let state = RunState::begin(run_id, total, now);

            kv.set(vec![
                (RUN_SEQ_KEY, to_value(&run_id)?),
                (RECORDS_KEY, to_value(&Vec::<ExtractedRecord>::new())?),
                (WORK_ITEMS_KEY, to_value(&WorkLedger::new())?),
                (STATUS_KEY, to_value(&state)?),
            ])?;
            sweep_info!("run {} started with {} items", run_id, total);
            Ok(run_id)
        })
    }

    /// Remembers that a context was opened for `ticket`, with its deadline.
    pub fn register_work(&self, ticket: WorkTicket, address: &str) -> Result<(), StoreError> {
        let now = self.now();
        self.with_write(|kv| {
            let status = load_status(kv)?;
            if status.run_id != ticket.run || status.phase == Phase::Idle {
                sweep_debug!("not registering {}: run is no longer current", ticket);
                return Ok(());
            }
            let mut ledger = load::<WorkLedger>(kv, WORK_ITEMS_KEY)?.unwrap_or_default();
            ledger.register(ticket, address, now, self.work_allowance);
            kv.set(vec![(WORK_ITEMS_KEY, to_value(&ledger)?)])
        })
    }

    /// Appends `record` and counts it toward the current run. Reports from
    /// another run or for an already-reported work item are rejected and
    /// leave the store untouched.
    pub fn record_completion(
        &self,
        ticket: WorkTicket,
        record: ExtractedRecord,
    ) -> Result<RecordOutcome, StoreError> {
        let now = self.now();
        self.with_write(|kv| {
            let mut status = load_status(kv)?;
            let mut ledger = load::<WorkLedger>(kv, WORK_ITEMS_KEY)?.unwrap_or_default();

            let outcome = match self.admit(&mut status, &mut ledger, ticket, &record, now) {
                Ok(outcome) => outcome,
                Err(reason) => {
                    sweep_warn!("rejected report for {} ({}): {}", ticket, record.address, reason);
                    return Ok(RecordOutcome::Rejected(reason));
                }
            };

            let mut records = load::<Vec<ExtractedRecord>>(kv, RECORDS_KEY)?.unwrap_or_default();
            records.push(record);

            kv.set(vec![
                (RECORDS_KEY, to_value(&records)?),
                (WORK_ITEMS_KEY, to_value(&ledger)?),
                (STATUS_KEY, to_value(&status)?),
            ])?;
            sweep_debug!(
                "run {}: {}/{} processed",
                status.run_id,
                status.processed_count,
                status.total_expected
            );
            if status.phase == Phase::Completed {
                sweep_info!("run {} completed with {} records", status.run_id, records.len());
            }
            Ok(outcome)
        })
    }

    /// Applies a report to local copies of the run state and ledger. Nothing
    /// is persisted unless this returns `Ok`.
    fn admit(
        &self,
        status: &mut RunState,
        ledger: &mut WorkLedger,
        ticket: WorkTicket,
        record: &ExtractedRecord,
        now: DateTime<Utc>,
    ) -> Result<RecordOutcome, RejectReason> {
        if status.phase != Phase::Idle && status.run_id == ticket.run {
            // Unregistered items are entered here so a repeat report is caught.
            if !ledger.contains(ticket) {
                ledger.register(ticket, record.address.as_str(), now, self.work_allowance);
            }
            ledger.complete(ticket, now)?;
        }
        status.accept_completion(ticket, now)
    }

    /// Current run state merged with the record and work-item counts.
    pub fn read_status(&self) -> Result<StatusSnapshot, StoreError> {
        let now = self.now();
        self.with_read(|kv| {
            let run = load_status(kv)?;
            let record_count = load::<Vec<ExtractedRecord>>(kv, RECORDS_KEY)?
                .map(|records| records.len())
                .unwrap_or(0);
            let ledger = load::<WorkLedger>(kv, WORK_ITEMS_KEY)?.unwrap_or_default();
            Ok(StatusSnapshot {
                run,
                record_count,
                pending: ledger.pending(),
                stalled: ledger.stalled(now),
            })
        })
    }

    pub fn records(&self) -> Result<Vec<ExtractedRecord>, StoreError> {
        self.with_read(|kv| Ok(load(kv, RECORDS_KEY)?.unwrap_or_default()))
    }

    /// Work items past their deadline that never reported.
    pub fn stalled_work(&self) -> Result<Vec<WorkItem>, StoreError> {
        let now = self.now();
        self.with_read(|kv| {
            let ledger = load::<WorkLedger>(kv, WORK_ITEMS_KEY)?.unwrap_or_default();
            Ok(ledger.stalled_items(now).cloned().collect())
        })
    }

    /// Flags the given run as failed if it is still the running one.
    pub fn mark_error(&self, run_id: RunId) -> Result<(), StoreError> {
        let now = self.now();
        self.with_write(|kv| {
            let mut status = load_status(kv)?;
            if status.run_id != run_id {
                return Ok(());
            }
            status.mark_error(now);
            kv.set(vec![(STATUS_KEY, to_value(&status)?)])?;
            sweep_warn!("run {} marked as failed", run_id);
            Ok(())
        })
    }

    /// Erases run state, records and work items, returning to `Idle`.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.with_write(|kv| {
            kv.remove(&[STATUS_KEY, RECORDS_KEY, WORK_ITEMS_KEY])?;
            sweep_info!("progress cleared");
            Ok(())
        })
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn with_write<T>(
        &self,
        op: impl FnOnce(&mut dyn KeyValueStore) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut kv = self.backend.write().map_err(|_| StoreError::Poisoned)?;
        let mut file_lock = kv.process_lock()?;
        let _held = match file_lock.as_mut() {
            Some(lock) => Some(lock.write().map_err(StoreError::Lock)?),
            None => None,
        };
        op(&mut **kv)
    }

    fn with_read<T>(
        &self,
        op: impl FnOnce(&dyn KeyValueStore) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let kv = self.backend.read().map_err(|_| StoreError::Poisoned)?;
        let file_lock = kv.process_lock()?;
        let _held = match file_lock.as_ref() {
            Some(lock) => Some(lock.read().map_err(StoreError::Lock)?),
            None => None,
        };
        op(&**kv)
    }
}

fn load_status(kv: &dyn KeyValueStore) -> Result<RunState, StoreError> {
    Ok(load(kv, STATUS_KEY)?.unwrap_or_else(RunState::idle))
}

fn load<T: DeserializeOwned>(kv: &dyn KeyValueStore, key: &str) -> Result<Option<T>, StoreError> {
    match kv.get(key)? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|source| StoreError::Malformed {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, StoreError> {
    Ok(serde_json::to_value(value)?)
}
