use std::fmt;

use sweep_core::WorkTicket;

/// Identifies one page context opened through a host.
pub type ContextId = u64;

/// The long-lived background context; it always has its handler installed.
pub const BACKGROUND: ContextId = 0;

/// Why a context is being opened. Orchestrator-opened contexts run the
/// detail extractor for their ticket; operator-opened ones never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenReason {
    UserInitiated,
    OrchestratorInitiated { ticket: WorkTicket },
}

/// Why a context could not produce a document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct LoadError {
    pub kind: LoadFailure,
    pub message: String,
}

impl LoadError {
    pub(crate) fn new(kind: LoadFailure, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadFailure {
    InvalidAddress,
    HttpStatus(u16),
    Timeout,
    TooManyRedirects,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    NotAPage { content_type: String },
    Decode { encoding: String },
    Network,
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadFailure::InvalidAddress => f.write_str("invalid address"),
            LoadFailure::HttpStatus(code) => write!(f, "server answered {code}"),
            LoadFailure::Timeout => f.write_str("timed out"),
            LoadFailure::TooManyRedirects => f.write_str("too many redirects"),
            LoadFailure::TooLarge { max_bytes, actual } => match actual {
                Some(actual) => write!(f, "page of {actual} bytes exceeds {max_bytes}"),
                None => write!(f, "page exceeds {max_bytes} bytes"),
            },
            LoadFailure::NotAPage { content_type } => write!(f, "{content_type} is not a page"),
            LoadFailure::Decode { encoding } => write!(f, "could not decode as {encoding}"),
            LoadFailure::Network => f.write_str("network error"),
        }
    }
}
