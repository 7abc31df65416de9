use std::time::Duration;

use crate::LinkRecord;

pub const MIN_BATCH_SIZE: usize = 1;
pub const MAX_BATCH_SIZE: usize = 20;
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Clamps a requested batch size into `[MIN_BATCH_SIZE, MAX_BATCH_SIZE]`.
pub fn clamp_batch_size(requested: usize) -> usize {
    requested.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE)
}

/// Contiguous batches in discovery order; every batch has `batch_size`
/// links except possibly the last.
pub fn partition(links: &[LinkRecord], batch_size: usize) -> Vec<&[LinkRecord]> {
    links.chunks(clamp_batch_size(batch_size)).collect()
}

/// Number of batches `len` links produce at `batch_size`.
pub fn batch_count(len: usize, batch_size: usize) -> usize {
    len.div_ceil(clamp_batch_size(batch_size))
}

/// Rate limiting between batches: the pause after a batch of `n` links is
/// `base_delay + n * per_item_overhead`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub base_delay: Duration,
    pub per_item_overhead: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(2_000),
            per_item_overhead: Duration::from_millis(3_000),
        }
    }
}

impl Pacing {
    pub fn delay_after(&self, batch_len: usize) -> Duration {
        let items = u32::try_from(batch_len).unwrap_or(u32::MAX);
        self.base_delay + self.per_item_overhead.saturating_mul(items)
    }
}
