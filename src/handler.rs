//! # Handlers
//!
//! Compiled behaviour behind units. A unit record on disk names a handler id;
//! the [`HandlerCatalog`] resolves that id to one of three capabilities:
//!
//! - [`SlashHandler`] - structured invocations
//! - [`MessageHandler`] - prefixed free-text invocations
//! - [`EventListener`] - platform events (`ready`, ...)
//!
//! Handler failures are opaque [`anyhow::Error`]s; the dispatcher funnels them
//! to a single error-reporting path.

use async_trait::async_trait;
use std::{collections::HashMap, fmt, sync::Arc, time::Duration};
use thiserror::Error;

use crate::cooldown::MAX_COOLDOWN;
use crate::invocation::{InteractionContext, MessageContext};
use crate::unit::{InvocationKind, Unit, UnitDefinition, UnitHandler};

pub type HandlerResult = anyhow::Result<()>;

#[async_trait]
pub trait SlashHandler: Send + Sync {
    async fn invoke(&self, ctx: &InteractionContext) -> HandlerResult;
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn invoke(&self, ctx: &MessageContext, args: &[String]) -> HandlerResult;
}

#[async_trait]
pub trait EventListener: Send + Sync {
    async fn handle(&self, event: &str, payload: &serde_json::Value) -> HandlerResult;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BindError {
    #[error("unit name must not be empty")]
    EmptyName,
    #[error("alias must not be empty")]
    EmptyAlias,
    #[error("no {kind} handler registered under '{handler}'")]
    UnknownHandler {
        kind: InvocationKind,
        handler: String,
    },
    #[error("cooldown of {0} seconds is out of range")]
    InvalidCooldown(String),
    #[error("no event listener registered under '{0}'")]
    UnknownListener(String),
}

/// Handler ids to compiled handlers, one table per capability.
#[derive(Default, Clone)]
pub struct HandlerCatalog {
    slash: HashMap<String, Arc<dyn SlashHandler>>,
    message: HashMap<String, Arc<dyn MessageHandler>>,
    listeners: HashMap<String, Arc<dyn EventListener>>,
}

impl HandlerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_slash<H>(&mut self, id: impl Into<String>, handler: H) -> &mut Self
    where
        H: SlashHandler + 'static,
    {
        self.slash.insert(id.into(), Arc::new(handler));
        self
    }

    pub fn register_message<H>(&mut self, id: impl Into<String>, handler: H) -> &mut Self
    where
        H: MessageHandler + 'static,
    {
        self.message.insert(id.into(), Arc::new(handler));
        self
    }

    pub fn register_listener<H>(&mut self, id: impl Into<String>, listener: H) -> &mut Self
    where
        H: EventListener + 'static,
    {
        self.listeners.insert(id.into(), Arc::new(listener));
        self
    }

    pub fn slash(&self, id: &str) -> Option<Arc<dyn SlashHandler>> {
        self.slash.get(id).cloned()
    }

    pub fn message(&self, id: &str) -> Option<Arc<dyn MessageHandler>> {
        self.message.get(id).cloned()
    }

    pub fn listener(&self, id: &str) -> Option<Arc<dyn EventListener>> {
        self.listeners.get(id).cloned()
    }

    /// Validates a record's shape and pairs it with its handler.
    pub fn bind(&self, definition: UnitDefinition) -> Result<Unit, BindError> {
        if definition.name().trim().is_empty() {
            return Err(BindError::EmptyName);
        }
        if let Some(secs) = definition.cooldown_secs() {
            let in_range = Duration::try_from_secs_f64(secs)
                .map(|cooldown| cooldown <= MAX_COOLDOWN)
                .unwrap_or(false);
            // zero and negative values mean "use the default"
            if secs > 0.0 && !in_range {
                return Err(BindError::InvalidCooldown(secs.to_string()));
            }
        }

        let handler = match &definition {
            UnitDefinition::Structured(def) => self
                .slash(&def.handler)
                .map(UnitHandler::Structured),
            UnitDefinition::Prefixed(def) => {
                if def.aliases.iter().any(|alias| alias.trim().is_empty()) {
                    return Err(BindError::EmptyAlias);
                }
                self.message(&def.handler).map(UnitHandler::Prefixed)
            }
        }
        .ok_or_else(|| BindError::UnknownHandler {
            kind: definition.kind(),
            handler: definition.handler_id().to_string(),
        })?;

        Ok(Unit::new(definition, handler))
    }
}

impl fmt::Debug for HandlerCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut slash: Vec<_> = self.slash.keys().collect();
        let mut message: Vec<_> = self.message.keys().collect();
        let mut listeners: Vec<_> = self.listeners.keys().collect();
        slash.sort();
        message.sort();
        listeners.sort();
        f.debug_struct("HandlerCatalog")
            .field("slash", &slash)
            .field("message", &message)
            .field("listeners", &listeners)
            .finish()
    }
}
