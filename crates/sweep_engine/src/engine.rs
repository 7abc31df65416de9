use std::sync::Arc;

use thiserror::Error;

use crate::discovery::SelectorError;
use crate::kv::KeyValueStore;
use crate::local_host::LocalHost;
use crate::panel::ControlPanel;
use crate::store::ProgressStore;
use crate::{DetailExtractor, HttpSource, LinkDiscovery, LoadError, PageSource, SweepSettings};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid selector configuration: {0}")]
    Selector(#[from] SelectorError),
    #[error("could not set up page loading: {0}")]
    Client(#[from] LoadError),
}

/// Everything one process needs: the durable store, the local host with its
/// background aggregator, and the operator panel on top.
pub struct SweepEngine {
    store: Arc<ProgressStore>,
    host: Arc<LocalHost>,
    panel: ControlPanel,
}

impl SweepEngine {
    pub fn new(
        settings: SweepSettings,
        backend: impl KeyValueStore + 'static,
    ) -> Result<Self, EngineError> {
        let source = Arc::new(HttpSource::new(settings.load.clone())?);
        Self::with_source(settings, backend, source)
    }

    pub fn with_source(
        settings: SweepSettings,
        backend: impl KeyValueStore + 'static,
        source: Arc<dyn PageSource>,
    ) -> Result<Self, EngineError> {
        let discovery = Arc::new(LinkDiscovery::new(&settings.discovery)?);
        let extractor = Arc::new(DetailExtractor::new(&settings.fields)?);
        let store = Arc::new(
            ProgressStore::new(backend).with_work_allowance(settings.work_deadline),
        );
        let host = LocalHost::new(
            settings.clone(),
            store.clone(),
            source,
            discovery,
            extractor,
        );
        let panel = ControlPanel::new(host.clone(), store.clone(), settings);
        Ok(Self { store, host, panel })
    }

    pub fn panel(&self) -> &ControlPanel {
        &self.panel
    }

    pub fn store(&self) -> &Arc<ProgressStore> {
        &self.store
    }

    pub fn host(&self) -> &Arc<LocalHost> {
        &self.host
    }
}
