use sweep_core::{Message, Reply};
use thiserror::Error;

use crate::{ContextId, OpenReason};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("this environment cannot open page contexts")]
    Unsupported,
    #[error("no such context {0}")]
    NoSuchContext(ContextId),
    #[error("context {context} failed to load: {message}")]
    LoadFailed { context: ContextId, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("recipient has no message handler installed")]
    NotReady,
    #[error("no reply within the reply window")]
    TimedOut,
    #[error("no such context {0}")]
    NoSuchContext(ContextId),
    #[error("this environment cannot deliver messages")]
    Unsupported,
}

impl DeliveryError {
    /// Failures that installing the recipient script may fix.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DeliveryError::NotReady | DeliveryError::TimedOut)
    }
}

/// Something that answers messages inside a context.
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Message) -> Reply;
}

/// The runtime that owns page contexts: opening them, installing the page
/// script into them and delivering messages to whatever handler they run.
#[async_trait::async_trait]
pub trait ContextHost: Send + Sync {
    /// False when running outside a runtime that can open contexts.
    fn supports_contexts(&self) -> bool;

    async fn open_context(&self, address: &str, reason: OpenReason) -> Result<ContextId, HostError>;

    /// (Re-)installs the page script into `context`.
    async fn inject(&self, context: ContextId) -> Result<(), HostError>;

    /// Resolves once `context` has finished loading its document, with the
    /// page script already installed where the host installs it on its own.
    async fn wait_until_loaded(&self, _context: ContextId) -> Result<(), HostError> {
        Ok(())
    }

    /// One delivery attempt; no retries at this level.
    async fn deliver(&self, target: ContextId, message: Message) -> Result<Reply, DeliveryError>;

    async fn close_context(&self, context: ContextId) -> Result<(), HostError>;
}

/// Host used when no context runtime is available. Every operation reports
/// `Unsupported`, which callers surface immediately instead of retrying.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedHost;

#[async_trait::async_trait]
impl ContextHost for DetachedHost {
    fn supports_contexts(&self) -> bool {
        false
    }

    async fn open_context(&self, _address: &str, _reason: OpenReason) -> Result<ContextId, HostError> {
        Err(HostError::Unsupported)
    }

    async fn inject(&self, _context: ContextId) -> Result<(), HostError> {
        Err(HostError::Unsupported)
    }

    async fn wait_until_loaded(&self, _context: ContextId) -> Result<(), HostError> {
        Err(HostError::Unsupported)
    }

    async fn deliver(&self, _target: ContextId, _message: Message) -> Result<Reply, DeliveryError> {
        Err(DeliveryError::Unsupported)
    }

    async fn close_context(&self, _context: ContextId) -> Result<(), HostError> {
        Err(HostError::Unsupported)
    }
}
