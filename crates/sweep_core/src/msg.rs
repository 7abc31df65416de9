use serde::{Deserialize, Serialize};

use crate::{ExtractedRecord, RecordOutcome, StatusSnapshot, WorkTicket};

/// Cross-context command vocabulary. The router forwards these untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Message {
    /// Panel -> listing page: discover links and dispatch them.
    #[serde(rename_all = "camelCase")]
    StartRun { batch_size: usize },
    /// Panel -> listing page: how many detail links are on this page.
    GetLinkCount,
    /// Detail page -> aggregator: one extracted record.
    ReportRecord {
        ticket: WorkTicket,
        data: ExtractedRecord,
    },
    /// Panel -> aggregator: current merged run state.
    QueryStatus,
}

impl Message {
    /// Name used in logs; never inspects the payload.
    pub fn name(&self) -> &'static str {
        match self {
            Message::StartRun { .. } => "startRun",
            Message::GetLinkCount => "getLinkCount",
            Message::ReportRecord { .. } => "reportRecord",
            Message::QueryStatus => "queryStatus",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "camelCase")]
pub enum Reply {
    /// The run was initialized and dispatch is under way.
    #[serde(rename_all = "camelCase")]
    RunStarted { total: usize, batch_size: usize },
    /// The listing page has no qualifying links; no run was started.
    NothingFound,
    LinkCount { count: usize },
    Status(StatusSnapshot),
    Recorded { accepted: bool },
    /// The recipient handled the message but could not act on it.
    Failed { message: String },
}

impl Reply {
    pub fn recorded(outcome: &RecordOutcome) -> Self {
        Reply::Recorded {
            accepted: outcome.is_accepted(),
        }
    }
}
