//! Sweep engine: page contexts, discovery and extraction, batch dispatch,
//! the durable progress store and the router that connects them.
mod aggregator;
mod discovery;
mod dispatcher;
mod engine;
mod export;
mod extract;
mod host;
mod kv;
mod local_host;
mod page;
mod panel;
mod persist;
mod router;
mod script;
mod settings;
mod store;
mod types;

pub use aggregator::Aggregator;
pub use discovery::{
    DiscoverySettings, LinkDiscovery, SelectorError, DEFAULT_LINK_SELECTORS, DETAIL_PATH_MARKER,
};
pub use dispatcher::{BatchDispatcher, DispatchError, DispatchSummary, PreparedRun};
pub use engine::{EngineError, SweepEngine};
pub use export::{export_records, ExportError, ExportOptions, ExportSummary, DEFAULT_EXPORT_PREFIX};
pub use extract::{DetailExtractor, FieldSelectors};
pub use host::{ContextHost, DeliveryError, DetachedHost, HostError, MessageHandler};
pub use kv::{FileStore, KeyValueStore, MemoryStore, StoreError, LOCK_FILE};
pub use local_host::LocalHost;
pub use page::{
    decode_html, load_page, HttpSource, LoadSettings, LoadedPage, PageSource, RawPage,
};
pub use panel::{ControlPanel, PanelError, StartOutcome};
pub use persist::{ensure_dir, AtomicFileWriter, PersistError};
pub use router::{MessageRouter, RouterError};
pub use script::{DetailScript, ListingScript};
pub use settings::{RetryPolicy, SweepSettings};
pub use store::{
    system_clock, Clock, ProgressStore, RECORDS_KEY, RUN_SEQ_KEY, STATUS_KEY, WORK_ITEMS_KEY,
};
pub use types::{ContextId, LoadError, LoadFailure, OpenReason, BACKGROUND};
