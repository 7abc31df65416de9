use std::time::Duration;

use sweep_core::{clamp_batch_size, Pacing, DEFAULT_BATCH_SIZE};

use crate::{DiscoverySettings, FieldSelectors, LoadSettings};

/// Delivery retry behaviour of the message router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// How long one delivery attempt may wait for a reply.
    pub reply_timeout: Duration,
    /// Pause between re-injecting the recipient and the single retry.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            reply_timeout: Duration::from_secs(5),
            retry_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SweepSettings {
    pub batch_size: usize,
    pub pacing: Pacing,
    /// Wait after a detail page loads before reading it.
    pub settle_delay: Duration,
    /// Wait after the report is acknowledged before closing the context.
    pub close_delay: Duration,
    pub retry: RetryPolicy,
    /// Time an opened context gets to report before it counts as stalled.
    pub work_deadline: Duration,
    pub poll_interval: Duration,
    /// Install the page script as soon as an operator-opened page loads.
    pub auto_inject: bool,
    pub load: LoadSettings,
    pub discovery: DiscoverySettings,
    pub fields: FieldSelectors,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            pacing: Pacing::default(),
            settle_delay: Duration::from_millis(2_000),
            close_delay: Duration::from_millis(500),
            retry: RetryPolicy::default(),
            work_deadline: Duration::from_secs(120),
            poll_interval: Duration::from_millis(2_000),
            auto_inject: true,
            load: LoadSettings::default(),
            discovery: DiscoverySettings::default(),
            fields: FieldSelectors::default(),
        }
    }
}

impl SweepSettings {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = clamp_batch_size(batch_size);
        self
    }
}
