use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{RejectReason, WorkItemId, WorkTicket};

/// One opened context's unit of work, tracked so that contexts that never
/// report become visible as stalled instead of silently missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub ticket: WorkTicket,
    pub address: String,
    pub dispatched_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    pub fn is_stalled(&self, now: DateTime<Utc>) -> bool {
        self.completed_at.is_none() && now > self.deadline
    }
}

/// Work items of the current run, keyed by item id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkLedger {
    items: BTreeMap<WorkItemId, WorkItem>,
}

impl WorkLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        ticket: WorkTicket,
        address: impl Into<String>,
        now: DateTime<Utc>,
        allowance: Duration,
    ) {
        self.items.insert(
            ticket.item,
            WorkItem {
                ticket,
                address: address.into(),
                dispatched_at: now,
                deadline: now.checked_add_signed(allowance).unwrap_or(DateTime::<Utc>::MAX_UTC),
                completed_at: None,
            },
        );
    }

    /// Marks the item done. Items the ledger never saw are accepted so that a
    /// lost registration does not drop data; a second completion is rejected.
    pub fn complete(&mut self, ticket: WorkTicket, now: DateTime<Utc>) -> Result<(), RejectReason> {
        match self.items.get_mut(&ticket.item) {
            Some(item) if item.completed_at.is_some() => Err(RejectReason::Duplicate(ticket.item)),
            Some(item) => {
                item.completed_at = Some(now);
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub fn contains(&self, ticket: WorkTicket) -> bool {
        self.items.contains_key(&ticket.item)
    }

    pub fn pending(&self) -> usize {
        self.items
            .values()
            .filter(|item| item.completed_at.is_none())
            .count()
    }

    pub fn stalled(&self, now: DateTime<Utc>) -> usize {
        self.items.values().filter(|item| item.is_stalled(now)).count()
    }

    pub fn stalled_items(&self, now: DateTime<Utc>) -> impl Iterator<Item = &WorkItem> {
        self.items.values().filter(move |item| item.is_stalled(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(item: WorkItemId) -> WorkTicket {
        WorkTicket { run: 1, item }
    }

    #[test]
    fn second_completion_is_a_duplicate() {
        let now = Utc::now();
        let mut ledger = WorkLedger::new();
        ledger.register(ticket(1), "a", now, Duration::seconds(10));

        assert_eq!(ledger.complete(ticket(1), now), Ok(()));
        assert_eq!(
            ledger.complete(ticket(1), now),
            Err(RejectReason::Duplicate(1))
        );
    }

    #[test]
    fn overdue_items_count_as_stalled() {
        let now = Utc::now();
        let mut ledger = WorkLedger::new();
        ledger.register(ticket(1), "a", now, Duration::seconds(10));
        ledger.register(ticket(2), "b", now, Duration::seconds(10));
        ledger.complete(ticket(2), now).unwrap();

        assert_eq!(ledger.pending(), 1);
        assert_eq!(ledger.stalled(now), 0);
        assert_eq!(ledger.stalled(now + Duration::seconds(11)), 1);
    }

    #[test]
    fn unbounded_allowance_never_stalls() {
        let now = Utc::now();
        let mut ledger = WorkLedger::new();
        ledger.register(ticket(1), "a", now, Duration::MAX);

        assert_eq!(ledger.stalled(now + Duration::days(365 * 100)), 0);
    }
}
