use crate::{Phase, StatusSnapshot};

/// What the control surface shows for a status snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusView {
    pub phase: Phase,
    pub headline: String,
    pub percent: u8,
    pub record_count: usize,
    pub stalled: usize,
}

impl From<&StatusSnapshot> for StatusView {
    fn from(status: &StatusSnapshot) -> Self {
        let run = &status.run;
        let headline = match run.phase {
            Phase::Running => format!("Running: {}/{}", run.processed_count, run.total_expected),
            Phase::Completed => format!("Completed: {} records", run.processed_count),
            Phase::Error => "Error".to_string(),
            Phase::Idle => "Idle".to_string(),
        };
        let percent = if run.total_expected == 0 {
            0
        } else {
            // processed <= total, so this never exceeds 100
            (run.processed_count * 100 / run.total_expected) as u8
        };
        Self {
            phase: run.phase,
            headline,
            percent,
            record_count: status.record_count,
            stalled: status.stalled,
        }
    }
}
