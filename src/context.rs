use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::cache::{CacheImage, UnitCache};
use crate::config::BotConfig;
use crate::cooldown::CooldownScheduler;
use crate::events::EventRouter;
use crate::handler::HandlerCatalog;
use crate::interaction::SubInteractionBroker;
use crate::invocation::FlowTimeouts;
use crate::registry::CommandRegistry;
use crate::store::JsonStore;

/// Process-wide bot state shared by the loader, the dispatcher and the
/// synchronizer.
///
/// The registry, the unit cache and the event router are replaced wholesale
/// by a load pass ([`BotContext::install`]); dispatch only ever reads them.
/// The cooldown table is the one structure mutated per event.
pub struct BotContext {
    config: BotConfig,
    catalog: Arc<HandlerCatalog>,
    registry: RwLock<Arc<CommandRegistry>>,
    cache: RwLock<UnitCache>,
    events: RwLock<Arc<EventRouter>>,
    cooldowns: CooldownScheduler,
    broker: Arc<SubInteractionBroker>,
}

impl BotContext {
    pub fn new(config: BotConfig, catalog: HandlerCatalog) -> Self {
        let registry = CommandRegistry::new(config.prefix.clone());
        Self {
            config,
            catalog: Arc::new(catalog),
            registry: RwLock::new(Arc::new(registry)),
            cache: RwLock::new(UnitCache::new()),
            events: RwLock::new(Arc::new(EventRouter::new())),
            cooldowns: CooldownScheduler::new(),
            broker: Arc::new(SubInteractionBroker::new()),
        }
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn catalog(&self) -> &HandlerCatalog {
        &self.catalog
    }

    pub fn cooldowns(&self) -> &CooldownScheduler {
        &self.cooldowns
    }

    pub fn broker(&self) -> Arc<SubInteractionBroker> {
        self.broker.clone()
    }

    pub fn cache_store(&self) -> JsonStore {
        JsonStore::new(&self.config.unit_cache_path)
    }

    pub fn flow_timeouts(&self) -> FlowTimeouts {
        FlowTimeouts {
            component: self.config.component_timeout,
            modal: self.config.modal_timeout,
        }
    }

    // 前回の起動時に保存したキャッシュイメージを読み込む
    pub async fn restore_cache(&self) -> usize {
        let image: CacheImage = self.cache_store().load_or_default().await;
        let restored = UnitCache::from_image(image, &self.catalog);
        let count = restored.len();
        *self.cache.write().await = restored;
        debug!("Unit cache restored with {} entries", count);
        count
    }

    /// Current registry snapshot; cheap to clone and safe to hold across awaits.
    pub async fn registry(&self) -> Arc<CommandRegistry> {
        self.registry.read().await.clone()
    }

    pub async fn events(&self) -> Arc<EventRouter> {
        self.events.read().await.clone()
    }

    /// Read access to the cache of the last installed load pass.
    pub async fn with_cache<R>(&self, f: impl FnOnce(&UnitCache) -> R) -> R {
        let cache = self.cache.read().await;
        f(&cache)
    }

    pub async fn cache_image(&self) -> CacheImage {
        self.cache.read().await.to_image()
    }

    /// Replaces the registry, the cache and the event router in one step.
    pub async fn install(&self, registry: CommandRegistry, cache: UnitCache, events: EventRouter) {
        let mut registry_slot = self.registry.write().await;
        let mut cache_slot = self.cache.write().await;
        let mut events_slot = self.events.write().await;
        *registry_slot = Arc::new(registry);
        *cache_slot = cache;
        *events_slot = Arc::new(events);
    }

    /// Fans a platform event out to its listeners.
    pub async fn emit(&self, event: &str, payload: &Value) -> usize {
        self.events().await.emit(event, payload).await
    }

    pub fn shutdown(&self) {
        let cancelled = self.broker.cancel_all();
        self.cooldowns.shutdown();
        info!(
            "Shutdown complete: {} pending interactions cancelled",
            cancelled
        );
    }
}
