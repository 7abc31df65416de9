use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::join_all;
use sweep_core::{clamp_batch_size, partition, LinkRecord, Pacing, RunId, WorkTicket};
use sweep_logging::{sweep_debug, sweep_info, sweep_warn};
use thiserror::Error;

use crate::host::{ContextHost, HostError};
use crate::kv::StoreError;
use crate::store::ProgressStore;
use crate::OpenReason;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no links to process")]
    NothingToDo,
    #[error("not running inside a host that can open page contexts")]
    UnsupportedEnvironment,
    #[error("could not initialize the run: {0}")]
    Store(#[from] StoreError),
}

/// A run whose state is already stored as `Running`, ready to be dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreparedRun {
    pub run_id: RunId,
    pub total: usize,
    pub batch_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DispatchSummary {
    pub run_id: RunId,
    pub batches: usize,
    pub opened: usize,
    pub failed: usize,
    /// The run's links in discovery order, `visited` where a context opened.
    pub links: Vec<LinkRecord>,
}

/// Opens one orchestrator context per link, a batch at a time, pausing
/// between batches. The run itself completes later as reports arrive.
pub struct BatchDispatcher {
    host: Arc<dyn ContextHost>,
    store: Arc<ProgressStore>,
    pacing: Pacing,
}

impl BatchDispatcher {
    pub fn new(host: Arc<dyn ContextHost>, store: Arc<ProgressStore>, pacing: Pacing) -> Self {
        Self {
            host,
            store,
            pacing,
        }
    }

    /// `begin` followed by `dispatch`.
    pub async fn start_run(
        &self,
        links: Vec<LinkRecord>,
        batch_size: usize,
    ) -> Result<DispatchSummary, DispatchError> {
        let run = self.begin(&links, batch_size).await?;
        Ok(self.dispatch(run, links).await)
    }

    /// Validates the request and stores the fresh run state. Nothing is
    /// opened yet, so the store never shows a stale phase during dispatch.
    pub async fn begin(
        &self,
        links: &[LinkRecord],
        batch_size: usize,
    ) -> Result<PreparedRun, DispatchError> {
        if !self.host.supports_contexts() {
            return Err(DispatchError::UnsupportedEnvironment);
        }
        if links.is_empty() {
            return Err(DispatchError::NothingToDo);
        }
        let batch_size = clamp_batch_size(batch_size);
        let total = links.len();
        let run_id = self
            .store
            .run_blocking(move |store| store.begin_run(total))
            .await?;
        Ok(PreparedRun {
            run_id,
            total: links.len(),
            batch_size,
        })
    }

    pub async fn dispatch(&self, run: PreparedRun, links: Vec<LinkRecord>) -> DispatchSummary {
        let batches = partition(&links, run.batch_size);
        let batch_total = batches.len();
        let mut summary = DispatchSummary {
            run_id: run.run_id,
            batches: batch_total,
            ..DispatchSummary::default()
        };
        let mut visited = HashSet::new();

        for (index, batch) in batches.into_iter().enumerate() {
            sweep_info!(
                "run {}: opening batch {}/{} ({} links)",
                run.run_id,
                index + 1,
                batch_total,
                batch.len()
            );
            let opens = batch.iter().map(|link| self.open_one(run.run_id, link));
            for result in join_all(opens).await {
                match result {
                    Ok(sequence_index) => {
                        visited.insert(sequence_index);
                        summary.opened += 1;
                    }
                    Err(HostError::Unsupported) => {
                        sweep_warn!("run {}: host lost context support", run.run_id);
                        summary.failed += 1;
                    }
                    Err(_) => summary.failed += 1,
                }
            }

            if index + 1 < batch_total {
                let delay = self.pacing.delay_after(batch.len());
                sweep_debug!("run {}: waiting {:?} before next batch", run.run_id, delay);
                tokio::time::sleep(delay).await;
            }
        }

        summary.links = links
            .into_iter()
            .map(|link| {
                if visited.contains(&link.sequence_index) {
                    link.into_visited()
                } else {
                    link
                }
            })
            .collect();

        if summary.opened == 0 {
            let run_id = run.run_id;
            let marked = self
                .store
                .run_blocking(move |store| store.mark_error(run_id))
                .await;
            if let Err(err) = marked {
                sweep_warn!("run {}: could not record failure: {}", run_id, err);
            }
        }
        sweep_info!(
            "run {}: dispatch finished, {} opened, {} failed",
            run.run_id,
            summary.opened,
            summary.failed
        );
        summary
    }

    /// Opens a context for `link`, answering its sequence index on success.
    async fn open_one(&self, run_id: RunId, link: &LinkRecord) -> Result<usize, HostError> {
        let ticket = WorkTicket {
            run: run_id,
            item: link.sequence_index as u64,
        };
        let address = link.address.clone();
        let registered = self
            .store
            .run_blocking(move |store| store.register_work(ticket, &address))
            .await;
        if let Err(err) = registered {
            sweep_warn!("could not register {}: {}", ticket, err);
        }
        match self
            .host
            .open_context(&link.address, OpenReason::OrchestratorInitiated { ticket })
            .await
        {
            Ok(context) => {
                sweep_debug!("{} opened as context {}: {}", ticket, context, link.address);
                Ok(link.sequence_index)
            }
            Err(err) => {
                sweep_warn!("{} failed to open {}: {}", ticket, link.address, err);
                Err(err)
            }
        }
    }
}
