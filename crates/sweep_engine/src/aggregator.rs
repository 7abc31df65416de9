use std::sync::Arc;

use sweep_core::{Message, Reply};
use sweep_logging::sweep_error;

use crate::host::MessageHandler;
use crate::store::ProgressStore;

/// Background-context handler: turns detail reports into store completions
/// and answers status queries. Store work runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct Aggregator {
    store: Arc<ProgressStore>,
}

impl Aggregator {
    pub fn new(store: Arc<ProgressStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl MessageHandler for Aggregator {
    async fn handle(&self, message: Message) -> Reply {
        match message {
            Message::ReportRecord { ticket, data } => {
                let stored = self
                    .store
                    .run_blocking(move |store| store.record_completion(ticket, data))
                    .await;
                match stored {
                    Ok(outcome) => Reply::recorded(&outcome),
                    Err(err) => {
                        sweep_error!("failed to store report for {}: {}", ticket, err);
                        Reply::Failed {
                            message: err.to_string(),
                        }
                    }
                }
            }
            Message::QueryStatus => match self.store.run_blocking(|store| store.read_status()).await {
                Ok(status) => Reply::Status(status),
                Err(err) => Reply::Failed {
                    message: err.to_string(),
                },
            },
            other => Reply::Failed {
                message: format!("{} is not handled by the background context", other.name()),
            },
        }
    }
}
