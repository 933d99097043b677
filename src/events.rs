//! Event-listener units routed by platform event name.
//!
//! A listener bound with `once` runs for the first matching event only;
//! the flag is flipped before the listener is awaited, so concurrent emits
//! cannot both run it.

use serde_json::Value;
use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tracing::{debug, error};

use crate::handler::{BindError, EventListener, HandlerCatalog};
use crate::unit::EventDefinition;

pub struct ListenerBinding {
    event: String,
    handler_id: String,
    once: bool,
    fired: AtomicBool,
    listener: Arc<dyn EventListener>,
}

impl ListenerBinding {
    pub fn bind(definition: &EventDefinition, catalog: &HandlerCatalog) -> Result<Self, BindError> {
        if definition.name.trim().is_empty() {
            return Err(BindError::EmptyName);
        }
        let listener = catalog
            .listener(&definition.handler)
            .ok_or_else(|| BindError::UnknownListener(definition.handler.clone()))?;
        Ok(Self {
            event: definition.name.clone(),
            handler_id: definition.handler.clone(),
            once: definition.once,
            fired: AtomicBool::new(false),
            listener,
        })
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn once(&self) -> bool {
        self.once
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Runs the listener. Returns `false` when a `once` listener already ran.
    /// Listener failures are logged here and never propagate.
    pub async fn fire(&self, payload: &Value) -> bool {
        if self.once && self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Err(e) = self.listener.handle(&self.event, payload).await {
            error!(
                "Event listener {} failed on {}: {}",
                self.handler_id, self.event, e
            );
        }
        true
    }
}

impl fmt::Debug for ListenerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerBinding")
            .field("event", &self.event)
            .field("handler", &self.handler_id)
            .field("once", &self.once)
            .field("fired", &self.has_fired())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct EventRouter {
    listeners: HashMap<String, Vec<Arc<ListenerBinding>>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, binding: ListenerBinding) {
        self.listeners
            .entry(binding.event.clone())
            .or_default()
            .push(Arc::new(binding));
    }

    pub fn listeners_for(&self, event: &str) -> Vec<Arc<ListenerBinding>> {
        self.listeners.get(event).cloned().unwrap_or_default()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }

    /// Delivers `payload` to every listener of `event` in registration order.
    /// Returns how many listeners ran.
    pub async fn emit(&self, event: &str, payload: &Value) -> usize {
        let mut fired = 0;
        for binding in self.listeners_for(event) {
            if binding.fire(payload).await {
                fired += 1;
            }
        }
        debug!("Event {} delivered to {} listeners", event, fired);
        fired
    }
}
