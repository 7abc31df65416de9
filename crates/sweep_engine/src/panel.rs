use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use sweep_core::{Message, Reply, StatusSnapshot};
use sweep_logging::sweep_info;
use thiserror::Error;

use crate::export::{export_records, ExportError, ExportOptions, ExportSummary};
use crate::host::{ContextHost, HostError};
use crate::kv::StoreError;
use crate::router::{MessageRouter, RouterError};
use crate::store::ProgressStore;
use crate::{ContextId, OpenReason, SweepSettings, BACKGROUND};

#[derive(Debug, Error)]
pub enum PanelError {
    #[error("not running inside a host that provides page contexts")]
    UnsupportedEnvironment,
    #[error(transparent)]
    Router(RouterError),
    #[error(transparent)]
    Host(HostError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Rejected(String),
    #[error("unexpected reply to {message}: {reply:?}")]
    UnexpectedReply { message: &'static str, reply: Reply },
}

impl From<RouterError> for PanelError {
    fn from(err: RouterError) -> Self {
        match err {
            RouterError::UnsupportedEnvironment => PanelError::UnsupportedEnvironment,
            other => PanelError::Router(other),
        }
    }
}

impl From<HostError> for PanelError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::Unsupported => PanelError::UnsupportedEnvironment,
            other => PanelError::Host(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started { total: usize, batch_size: usize },
    /// The listing had no detail links; nothing was stored.
    NothingFound,
}

/// Operator-facing operations. Everything goes through the router or the
/// store; the panel never talks to page contexts directly.
#[derive(Clone)]
pub struct ControlPanel {
    host: Arc<dyn ContextHost>,
    router: MessageRouter,
    store: Arc<ProgressStore>,
    settings: SweepSettings,
}

impl ControlPanel {
    pub fn new(host: Arc<dyn ContextHost>, store: Arc<ProgressStore>, settings: SweepSettings) -> Self {
        Self {
            router: MessageRouter::new(host.clone(), settings.retry),
            host,
            store,
            settings,
        }
    }

    /// Opens `address` as an operator-initiated listing context.
    /// Opens `address` as an operator page and returns once it has loaded,
    /// so the first message normally finds the page script in place.
    pub async fn open_listing(&self, address: &str) -> Result<ContextId, PanelError> {
        let listing = self.host.open_context(address, OpenReason::UserInitiated).await?;
        self.host.wait_until_loaded(listing).await?;
        Ok(listing)
    }

    pub async fn link_count(&self, listing: ContextId) -> Result<usize, PanelError> {
        match self.router.send(listing, Message::GetLinkCount).await? {
            Reply::LinkCount { count } => Ok(count),
            reply => Err(unexpected("getLinkCount", reply)),
        }
    }

    pub async fn start(&self, listing: ContextId, batch_size: usize) -> Result<StartOutcome, PanelError> {
        match self.router.send(listing, Message::StartRun { batch_size }).await? {
            Reply::RunStarted { total, batch_size } => {
                sweep_info!("run started: {} links, batches of {}", total, batch_size);
                Ok(StartOutcome::Started { total, batch_size })
            }
            Reply::NothingFound => Ok(StartOutcome::NothingFound),
            reply => Err(unexpected("startRun", reply)),
        }
    }

    pub async fn status(&self) -> Result<StatusSnapshot, PanelError> {
        match self.router.send(BACKGROUND, Message::QueryStatus).await? {
            Reply::Status(status) => Ok(status),
            reply => Err(unexpected("queryStatus", reply)),
        }
    }

    /// Polls status every `poll_interval` until the run is settled,
    /// handing each snapshot to `on_poll`.
    pub async fn wait_until_settled(
        &self,
        mut on_poll: impl FnMut(&StatusSnapshot) + Send,
    ) -> Result<StatusSnapshot, PanelError> {
        loop {
            let status = self.status().await?;
            on_poll(&status);
            if status.is_settled() {
                return Ok(status);
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    pub fn export(&self, dir: &Path, options: &ExportOptions, date: NaiveDate) -> Result<ExportSummary, ExportError> {
        export_records(&self.store, dir, options, date)
    }

    pub async fn clear(&self) -> Result<(), PanelError> {
        Ok(self.store.run_blocking(|store| store.clear()).await?)
    }
}

fn unexpected(action: &'static str, reply: Reply) -> PanelError {
    match reply {
        Reply::Failed { message } => PanelError::Rejected(message),
        reply => PanelError::UnexpectedReply {
            message: action,
            reply,
        },
    }
}
