use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sweep_core::{ExtractedRecord, LinkRecord, Message, Reply, WorkTicket};
use sweep_logging::{sweep_info, sweep_warn};

use crate::dispatcher::{BatchDispatcher, DispatchError};
use crate::host::MessageHandler;
use crate::router::{MessageRouter, RouterError};
use crate::{DetailExtractor, LinkDiscovery, LoadError, LoadedPage, BACKGROUND};

/// Page script in its listing role: answers the panel's `startRun` and
/// `getLinkCount` for the document it was installed into.
pub struct ListingScript {
    page: Arc<LoadedPage>,
    discovery: Arc<LinkDiscovery>,
    dispatcher: Arc<BatchDispatcher>,
}

impl ListingScript {
    pub fn new(
        page: Arc<LoadedPage>,
        discovery: Arc<LinkDiscovery>,
        dispatcher: Arc<BatchDispatcher>,
    ) -> Self {
        Self {
            page,
            discovery,
            dispatcher,
        }
    }

    fn links(&self) -> Vec<LinkRecord> {
        self.discovery
            .discover_in(&self.page.html, Some(&self.page.address))
    }

    async fn start_run(&self, batch_size: usize) -> Reply {
        let links = self.links();
        if links.is_empty() {
            sweep_info!("no detail links found on {}", self.page.address);
            return Reply::NothingFound;
        }

        let run = match self.dispatcher.begin(&links, batch_size).await {
            Ok(run) => run,
            Err(DispatchError::NothingToDo) => return Reply::NothingFound,
            Err(err) => {
                return Reply::Failed {
                    message: err.to_string(),
                }
            }
        };

        // Reply now; contexts keep opening in the background.
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            dispatcher.dispatch(run, links).await;
        });
        Reply::RunStarted {
            total: run.total,
            batch_size: run.batch_size,
        }
    }
}

#[async_trait::async_trait]
impl MessageHandler for ListingScript {
    async fn handle(&self, message: Message) -> Reply {
        match message {
            Message::StartRun { batch_size } => self.start_run(batch_size).await,
            Message::GetLinkCount => Reply::LinkCount {
                count: self.links().len(),
            },
            other => Reply::Failed {
                message: format!("{} is not handled by a page context", other.name()),
            },
        }
    }
}

/// Page script in its detail role: runs once in an orchestrator-opened
/// context, reads the page and reports exactly one record.
pub struct DetailScript {
    extractor: Arc<DetailExtractor>,
    router: MessageRouter,
    settle_delay: Duration,
}

impl DetailScript {
    pub fn new(extractor: Arc<DetailExtractor>, router: MessageRouter, settle_delay: Duration) -> Self {
        Self {
            extractor,
            router,
            settle_delay,
        }
    }

    /// Waits for the page to settle, extracts and reports. A page that
    /// failed to load still yields a record of sentinels so the run keeps
    /// moving.
    pub async fn run(
        &self,
        ticket: WorkTicket,
        address: &str,
        page: Result<Arc<LoadedPage>, LoadError>,
    ) -> Result<Reply, RouterError> {
        tokio::time::sleep(self.settle_delay).await;
        let record = self.read(ticket, address, page);
        self.router
            .send(BACKGROUND, Message::ReportRecord { ticket, data: record })
            .await
    }

    fn read(
        &self,
        ticket: WorkTicket,
        address: &str,
        page: Result<Arc<LoadedPage>, LoadError>,
    ) -> ExtractedRecord {
        let captured_at = Utc::now();
        match page {
            Ok(page) => {
                let record = self.extractor.extract(&page.html, page.address.as_str(), captured_at);
                if record.is_placeholder() {
                    sweep_warn!("{}: nothing recognizable on {}", ticket, page.address);
                }
                record
            }
            Err(err) => {
                sweep_warn!("{}: {} failed to load: {}", ticket, address, err);
                ExtractedRecord::placeholder(address, captured_at)
            }
        }
    }
}
