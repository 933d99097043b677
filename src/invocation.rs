//! Per-invocation contexts handed to handlers.
//!
//! [`InteractionContext`] tracks whether the interaction has been replied to
//! or deferred, which decides how a failure is reported: a follow-up when the
//! interaction is already acknowledged, a direct reply otherwise.

use serde_json::Value;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::interaction::{InteractionResult, SubInteractionBroker};
use crate::platform::{
    ComponentInteraction, IncomingMessage, Messenger, PlatformError, PlatformResult, Reply,
    SlashInvocation, User,
};

/// Bounded waits for multi-step flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowTimeouts {
    pub component: Duration,
    pub modal: Duration,
}

pub struct InteractionContext {
    invocation: SlashInvocation,
    messenger: Arc<dyn Messenger>,
    broker: Arc<SubInteractionBroker>,
    timeouts: FlowTimeouts,
    replied: AtomicBool,
    deferred: AtomicBool,
}

impl InteractionContext {
    pub fn new(
        invocation: SlashInvocation,
        messenger: Arc<dyn Messenger>,
        broker: Arc<SubInteractionBroker>,
        timeouts: FlowTimeouts,
    ) -> Self {
        Self {
            invocation,
            messenger,
            broker,
            timeouts,
            replied: AtomicBool::new(false),
            deferred: AtomicBool::new(false),
        }
    }

    pub fn invocation(&self) -> &SlashInvocation {
        &self.invocation
    }

    pub fn user(&self) -> &User {
        &self.invocation.user
    }

    pub fn timeouts(&self) -> FlowTimeouts {
        self.timeouts
    }

    pub fn replied(&self) -> bool {
        self.replied.load(Ordering::SeqCst)
    }

    pub fn deferred(&self) -> bool {
        self.deferred.load(Ordering::SeqCst)
    }

    pub fn is_acknowledged(&self) -> bool {
        self.replied() || self.deferred()
    }

    /// Scope id for a sub-interaction of this invocation, see
    /// [`SubInteractionBroker::scope_id`].
    pub fn scoped_id(&self, scope: &str) -> String {
        SubInteractionBroker::scope_id(scope, &self.invocation.id)
    }

    /// Sends the initial reply. An interaction can be answered only once.
    pub async fn reply(&self, reply: Reply) -> PlatformResult<()> {
        if self.is_acknowledged() {
            return Err(PlatformError::AlreadyAcknowledged(self.invocation.id.clone()));
        }
        self.messenger
            .reply_interaction(&self.invocation.id, &reply)
            .await?;
        self.replied.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn defer(&self, ephemeral: bool) -> PlatformResult<()> {
        if self.is_acknowledged() {
            return Err(PlatformError::AlreadyAcknowledged(self.invocation.id.clone()));
        }
        self.messenger
            .defer_interaction(&self.invocation.id, ephemeral)
            .await?;
        self.deferred.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn follow_up(&self, reply: Reply) -> PlatformResult<()> {
        self.messenger.follow_up(&self.invocation.id, &reply).await
    }

    pub async fn edit_reply(&self, reply: Reply) -> PlatformResult<()> {
        self.messenger.edit_reply(&self.invocation.id, &reply).await
    }

    /// Replies to a component or modal interaction belonging to this flow.
    pub async fn respond_to(
        &self,
        component: &ComponentInteraction,
        reply: Reply,
    ) -> PlatformResult<()> {
        self.messenger.reply_interaction(&component.id, &reply).await
    }

    /// Opens a modal in response to a component interaction.
    pub async fn show_modal(
        &self,
        component: &ComponentInteraction,
        modal: &Value,
    ) -> PlatformResult<()> {
        self.messenger.show_modal(&component.id, modal).await
    }

    /// Waits for a component event under `scope_id` from the invoking user.
    pub async fn await_component(
        &self,
        scope_id: &str,
        timeout: Duration,
    ) -> InteractionResult<ComponentInteraction> {
        self.broker
            .wait_for(scope_id, &self.invocation.user.id, timeout)
            .await
    }
}

pub struct MessageContext {
    message: IncomingMessage,
    messenger: Arc<dyn Messenger>,
}

impl MessageContext {
    pub fn new(message: IncomingMessage, messenger: Arc<dyn Messenger>) -> Self {
        Self { message, messenger }
    }

    pub fn message(&self) -> &IncomingMessage {
        &self.message
    }

    pub fn author(&self) -> &User {
        &self.message.author
    }

    pub async fn reply(&self, content: &str) -> PlatformResult<()> {
        self.messenger
            .reply_message(&self.message.channel_id, &self.message.id, content)
            .await
    }
}
