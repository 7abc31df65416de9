use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use sweep_core::{Message, Reply};
use sweep_logging::{sweep_debug, sweep_info, sweep_warn};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::aggregator::Aggregator;
use crate::dispatcher::BatchDispatcher;
use crate::host::{ContextHost, DeliveryError, HostError, MessageHandler};
use crate::page::{load_page, PageSource};
use crate::router::MessageRouter;
use crate::script::{DetailScript, ListingScript};
use crate::store::ProgressStore;
use crate::{
    ContextId, DetailExtractor, LinkDiscovery, LoadedPage, OpenReason, SweepSettings, BACKGROUND,
};

#[derive(Debug, Clone)]
enum PageState {
    Loading,
    Ready(Arc<LoadedPage>),
    Failed(String),
}

struct ContextSlot {
    address: String,
    page: watch::Sender<PageState>,
    script: Option<Arc<dyn MessageHandler>>,
    cancel: CancellationToken,
}

/// In-process host: every context is a tokio task that loads its address
/// from the page source and then runs the page script for its role.
/// Context 0 is the background aggregator.
pub struct LocalHost {
    me: Weak<LocalHost>,
    source: Arc<dyn PageSource>,
    discovery: Arc<LinkDiscovery>,
    extractor: Arc<DetailExtractor>,
    store: Arc<ProgressStore>,
    background: Arc<dyn MessageHandler>,
    settings: SweepSettings,
    contexts: Mutex<HashMap<ContextId, ContextSlot>>,
    next_id: AtomicU64,
}

impl LocalHost {
    pub fn new(
        settings: SweepSettings,
        store: Arc<ProgressStore>,
        source: Arc<dyn PageSource>,
        discovery: Arc<LinkDiscovery>,
        extractor: Arc<DetailExtractor>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            source,
            discovery,
            extractor,
            background: Arc::new(Aggregator::new(store.clone())),
            store,
            settings,
            contexts: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(BACKGROUND + 1),
        })
    }

    /// Number of page contexts currently open (the background is not counted).
    pub fn open_count(&self) -> usize {
        self.slots().len()
    }

    pub fn is_script_installed(&self, context: ContextId) -> bool {
        context == BACKGROUND
            || self
                .slots()
                .get(&context)
                .is_some_and(|slot| slot.script.is_some())
    }

    /// A handle that does not keep the host alive; given to everything the
    /// host itself owns.
    fn handle(&self) -> Arc<dyn ContextHost> {
        Arc::new(WeakHost(self.me.clone()))
    }

    fn router(&self) -> MessageRouter {
        MessageRouter::new(self.handle(), self.settings.retry)
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<ContextId, ContextSlot>> {
        self.contexts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_page(&self, context: ContextId, state: PageState) {
        if let Some(slot) = self.slots().get(&context) {
            slot.page.send_replace(state);
        }
    }

    /// Waits for `context` to leave `Loading` and answers its document.
    async fn loaded_page(&self, context: ContextId) -> Result<Arc<LoadedPage>, HostError> {
        let mut page = {
            let slots = self.slots();
            let slot = slots.get(&context).ok_or(HostError::NoSuchContext(context))?;
            slot.page.subscribe()
        };
        let state = match page.wait_for(|state| !matches!(state, PageState::Loading)).await {
            Ok(state) => state.clone(),
            Err(_) => return Err(HostError::NoSuchContext(context)),
        };
        match state {
            PageState::Ready(loaded) => Ok(loaded),
            PageState::Failed(message) => Err(HostError::LoadFailed { context, message }),
            PageState::Loading => Err(HostError::LoadFailed {
                context,
                message: "page never finished loading".to_string(),
            }),
        }
    }

    fn install_listing_script(&self, context: ContextId, page: Arc<LoadedPage>) {
        let dispatcher = Arc::new(BatchDispatcher::new(
            self.handle(),
            self.store.clone(),
            self.settings.pacing,
        ));
        let script = ListingScript::new(page, self.discovery.clone(), dispatcher);
        if let Some(slot) = self.slots().get_mut(&context) {
            slot.script = Some(Arc::new(script));
            sweep_debug!("page script installed in context {}", context);
        }
    }

    async fn run_context(
        self: Arc<Self>,
        context: ContextId,
        address: String,
        reason: OpenReason,
        cancel: CancellationToken,
    ) {
        let loaded = tokio::select! {
            _ = cancel.cancelled() => return,
            loaded = load_page(self.source.as_ref(), &address) => loaded,
        };
        let page = loaded.map(Arc::new);
        // Script first, then `Ready`: load waiters find it installed.
        if let (OpenReason::UserInitiated, Ok(page)) = (reason, &page) {
            if self.settings.auto_inject {
                self.install_listing_script(context, page.clone());
            }
        }
        self.set_page(
            context,
            match &page {
                Ok(page) => PageState::Ready(page.clone()),
                Err(err) => PageState::Failed(err.to_string()),
            },
        );

        match reason {
            OpenReason::UserInitiated => {
                if let Err(err) = &page {
                    sweep_warn!("context {} failed to load {}: {}", context, address, err);
                }
            }
            OpenReason::OrchestratorInitiated { ticket } => {
                let script = DetailScript::new(
                    self.extractor.clone(),
                    self.router(),
                    self.settings.settle_delay,
                );
                let reported = tokio::select! {
                    _ = cancel.cancelled() => return,
                    reported = script.run(ticket, &address, page) => reported,
                };
                match reported {
                    Ok(reply) => sweep_debug!("{} reported: {:?}", ticket, reply),
                    Err(err) => sweep_warn!("{} could not report: {}", ticket, err),
                }
                tokio::time::sleep(self.settings.close_delay).await;
                if let Err(err) = self.close_context(context).await {
                    sweep_warn!("{}: context {} did not close: {}", ticket, context, err);
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl ContextHost for LocalHost {
    fn supports_contexts(&self) -> bool {
        true
    }

    async fn open_context(&self, address: &str, reason: OpenReason) -> Result<ContextId, HostError> {
        let host = self.me.upgrade().ok_or(HostError::Unsupported)?;
        let context = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let (page, _) = watch::channel(PageState::Loading);

        self.slots().insert(
            context,
            ContextSlot {
                address: address.to_string(),
                page,
                script: None,
                cancel: cancel.clone(),
            },
        );
        sweep_debug!("context {} opening {} ({:?})", context, address, reason);
        tokio::spawn(host.run_context(context, address.to_string(), reason, cancel));
        Ok(context)
    }

    async fn inject(&self, context: ContextId) -> Result<(), HostError> {
        if context == BACKGROUND {
            return Ok(());
        }
        let loaded = self.loaded_page(context).await?;
        self.install_listing_script(context, loaded);
        sweep_info!("page script injected into context {}", context);
        Ok(())
    }

    async fn wait_until_loaded(&self, context: ContextId) -> Result<(), HostError> {
        if context == BACKGROUND {
            return Ok(());
        }
        self.loaded_page(context).await.map(|_| ())
    }

    async fn deliver(&self, target: ContextId, message: Message) -> Result<Reply, DeliveryError> {
        if target == BACKGROUND {
            return Ok(self.background.handle(message).await);
        }
        let handler = {
            let slots = self.slots();
            let slot = slots.get(&target).ok_or(DeliveryError::NoSuchContext(target))?;
            slot.script.clone().ok_or(DeliveryError::NotReady)?
        };
        Ok(handler.handle(message).await)
    }

    async fn close_context(&self, context: ContextId) -> Result<(), HostError> {
        if context == BACKGROUND {
            return Ok(());
        }
        let slot = self
            .slots()
            .remove(&context)
            .ok_or(HostError::NoSuchContext(context))?;
        slot.cancel.cancel();
        sweep_debug!("context {} closed ({})", context, slot.address);
        Ok(())
    }
}

/// Non-owning view of a [`LocalHost`]; behaves as unsupported once the host
/// is gone.
struct WeakHost(Weak<LocalHost>);

impl WeakHost {
    fn upgrade(&self) -> Option<Arc<LocalHost>> {
        self.0.upgrade()
    }
}

#[async_trait::async_trait]
impl ContextHost for WeakHost {
    fn supports_contexts(&self) -> bool {
        self.0.strong_count() > 0
    }

    async fn open_context(&self, address: &str, reason: OpenReason) -> Result<ContextId, HostError> {
        match self.upgrade() {
            Some(host) => host.open_context(address, reason).await,
            None => Err(HostError::Unsupported),
        }
    }

    async fn inject(&self, context: ContextId) -> Result<(), HostError> {
        match self.upgrade() {
            Some(host) => host.inject(context).await,
            None => Err(HostError::Unsupported),
        }
    }

    async fn wait_until_loaded(&self, context: ContextId) -> Result<(), HostError> {
        match self.upgrade() {
            Some(host) => host.wait_until_loaded(context).await,
            None => Err(HostError::Unsupported),
        }
    }

    async fn deliver(&self, target: ContextId, message: Message) -> Result<Reply, DeliveryError> {
        match self.upgrade() {
            Some(host) => host.deliver(target, message).await,
            None => Err(DeliveryError::Unsupported),
        }
    }

    async fn close_context(&self, context: ContextId) -> Result<(), HostError> {
        match self.upgrade() {
            Some(host) => host.close_context(context).await,
            None => Err(HostError::Unsupported),
        }
    }
}
