use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type RunId = u64;
pub type WorkItemId = u64;

/// Identity handed to every orchestrator-opened context. Completions are only
/// counted when the ticket belongs to the run currently stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkTicket {
    pub run: RunId,
    pub item: WorkItemId,
}

impl fmt::Display for WorkTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run {} item {}", self.run, self.item)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
}

/// Progress of the single current run.
///
/// Invariants: `processed_count <= total_expected`, and `phase` is
/// `Completed` exactly when `processed_count == total_expected > 0`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunState {
    #[serde(rename = "runId", default)]
    pub run_id: RunId,
    #[serde(rename = "total")]
    pub total_expected: usize,
    #[serde(rename = "processed")]
    pub processed_count: usize,
    pub phase: Phase,
    #[serde(rename = "lastUpdate", default)]
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The report belongs to a run that is no longer the stored one
    /// (cleared or replaced).
    StaleRun { current: Option<RunId>, reported: RunId },
    /// The stored run does not accept completions in this phase.
    NotRunning(Phase),
    /// The work item already reported once.
    Duplicate(WorkItemId),
    /// Counting this report would exceed the expected total.
    Overflow,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::StaleRun { current, reported } => {
                write!(f, "stale run {reported} (current {current:?})")
            }
            RejectReason::NotRunning(phase) => write!(f, "run not accepting records ({phase:?})"),
            RejectReason::Duplicate(item) => write!(f, "duplicate report for work item {item}"),
            RejectReason::Overflow => write!(f, "processed count would exceed total"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Accepted {
        processed: usize,
        total: usize,
        completed: bool,
    },
    Rejected(RejectReason),
}

impl RecordOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, RecordOutcome::Accepted { .. })
    }
}

impl RunState {
    pub fn idle() -> Self {
        Self::default()
    }

    /// Fresh running state for `total` items. `total` must be non-zero;
    /// callers treat an empty run as "nothing to do" before getting here.
    pub fn begin(run_id: RunId, total: usize, now: DateTime<Utc>) -> Self {
        debug_assert!(total > 0, "a run needs at least one item");
        Self {
            run_id,
            total_expected: total,
            processed_count: 0,
            phase: Phase::Running,
            last_update: Some(now),
        }
    }

    /// Counts one completion for `ticket`.
    pub fn accept_completion(
        &mut self,
        ticket: WorkTicket,
        now: DateTime<Utc>,
    ) -> Result<RecordOutcome, RejectReason> {
        if self.phase == Phase::Idle || ticket.run != self.run_id {
            return Err(RejectReason::StaleRun {
                current: (self.phase != Phase::Idle).then_some(self.run_id),
                reported: ticket.run,
            });
        }
        if self.phase != Phase::Running {
            return Err(RejectReason::NotRunning(self.phase));
        }
        if self.processed_count >= self.total_expected {
            return Err(RejectReason::Overflow);
        }

        self.processed_count += 1;
        self.last_update = Some(now);
        let completed = self.processed_count == self.total_expected;
        if completed {
            self.phase = Phase::Completed;
        }
        Ok(RecordOutcome::Accepted {
            processed: self.processed_count,
            total: self.total_expected,
            completed,
        })
    }

    /// Moves a running run into `Error`. Terminal phases are left alone.
    pub fn mark_error(&mut self, now: DateTime<Utc>) {
        if self.phase == Phase::Running {
            self.phase = Phase::Error;
            self.last_update = Some(now);
        }
    }
}

/// Run state merged with collection and work-item counters, as answered to
/// `queryStatus`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    #[serde(flatten)]
    pub run: RunState,
    #[serde(rename = "dataCount")]
    pub record_count: usize,
    #[serde(default)]
    pub pending: usize,
    #[serde(default)]
    pub stalled: usize,
}

impl StatusSnapshot {
    /// True when nothing more is expected to change without operator action:
    /// the run reached a terminal phase, or every outstanding item is past
    /// its deadline.
    pub fn is_settled(&self) -> bool {
        match self.run.phase {
            Phase::Idle | Phase::Completed | Phase::Error => true,
            Phase::Running => self.pending > 0 && self.pending == self.stalled,
        }
    }
}
