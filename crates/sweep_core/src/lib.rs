//! Sweep core: record types, run state transitions, batching arithmetic and
//! the cross-context message vocabulary. No IO lives here.
mod batch;
mod msg;
mod period;
mod record;
mod run;
mod view_model;
mod work;

pub use batch::{
    batch_count, clamp_batch_size, partition, Pacing, DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE,
    MIN_BATCH_SIZE,
};
pub use msg::{Message, Reply};
pub use period::{
    month_range, relative_offset, PeriodError, PeriodQuery, DEFAULT_LISTING_BASE,
    DEFAULT_QUERY_PARAM, DEFAULT_QUERY_TEMPLATE,
};
pub use record::{or_sentinel, ExtractedRecord, LinkRecord, MISSING_FIELD, MISSING_TITLE};
pub use run::{
    Phase, RecordOutcome, RejectReason, RunId, RunState, StatusSnapshot, WorkItemId, WorkTicket,
};
pub use view_model::StatusView;
pub use work::{WorkItem, WorkLedger};
