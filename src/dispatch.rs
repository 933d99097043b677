//! # Dispatch Engine
//!
//! Routes inbound events to units. Structured invocations and prefixed
//! messages share one gate sequence, always applied in this order:
//!
//! 1. ownership (`ownerOnly` units answer the configured owner only)
//! 2. permissions (the member must hold every listed permission)
//! 3. cooldown (consumes a slot only when the first two gates pass)
//!
//! A denial is answered to the user and is not an error. A unit failure,
//! including a panic inside the handler, is logged and answered with exactly
//! one error message: a follow-up when the interaction was already replied to
//! or deferred, a direct reply otherwise.

use futures::FutureExt;
use std::{any::Any, fmt, future::Future, panic::AssertUnwindSafe, sync::Arc, time::Duration};
use tracing::{debug, error, instrument, warn};

use crate::context::BotContext;
use crate::cooldown::{format_remaining, CooldownDecision};
use crate::handler::HandlerResult;
use crate::invocation::{InteractionContext, MessageContext};
use crate::platform::{
    ComponentInteraction, InboundEvent, IncomingMessage, Messenger, Reply, SlashInvocation,
};
use crate::unit::{PermissionSet, Unit, UnitHandler};

pub const ERROR_REPLY: &str = "There was an error while executing this command!";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    OwnerOnly,
    MissingPermissions,
    Cooldown { remaining: Duration, command: String },
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Denial::OwnerOnly => write!(f, "This command is restricted to the bot owner."),
            Denial::MissingPermissions => {
                write!(f, "You do not have permission to use this command.")
            }
            Denial::Cooldown { remaining, command } => write!(
                f,
                "Please wait {} seconds before reusing `{}`.",
                format_remaining(*remaining),
                command
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not addressed to any unit (bot author, plain chat, stale component).
    Ignored,
    /// A structured invocation named no registered unit.
    Unresolved,
    Denied(Denial),
    Completed,
    Failed,
}

#[derive(Clone)]
pub struct Dispatcher {
    context: Arc<BotContext>,
    messenger: Arc<dyn Messenger>,
}

impl Dispatcher {
    pub fn new(context: Arc<BotContext>, messenger: Arc<dyn Messenger>) -> Self {
        Self { context, messenger }
    }

    pub fn context(&self) -> &Arc<BotContext> {
        &self.context
    }

    pub async fn dispatch(&self, event: InboundEvent) -> DispatchOutcome {
        match event {
            InboundEvent::Slash(invocation) => self.handle_slash(invocation).await,
            InboundEvent::Message(message) => self.handle_message(message).await,
            InboundEvent::Component(component) => self.handle_component(component),
            InboundEvent::Event { name, payload } => {
                self.context.emit(&name, &payload).await;
                DispatchOutcome::Completed
            }
        }
    }

    /// Applies the gates in their fixed order.
    pub fn check_gates(
        &self,
        unit: &Unit,
        user_id: &str,
        member_permissions: Option<&PermissionSet>,
    ) -> Result<(), Denial> {
        let config = self.context.config();

        if unit.owner_only() && !config.is_owner(user_id) {
            return Err(Denial::OwnerOnly);
        }

        let required = unit.permissions();
        if !required.is_empty()
            && !member_permissions.is_some_and(|held| held.contains_all(required))
        {
            return Err(Denial::MissingPermissions);
        }

        let cooldown = unit.cooldown(config.default_cooldown);
        match self
            .context
            .cooldowns()
            .try_acquire(unit.name(), user_id, cooldown)
        {
            CooldownDecision::Allowed => Ok(()),
            CooldownDecision::Denied { remaining } => Err(Denial::Cooldown {
                remaining,
                command: unit.name().to_string(),
            }),
        }
    }

    #[instrument(skip_all, fields(command = %invocation.command_name, user = %invocation.user.id))]
    pub async fn handle_slash(&self, invocation: SlashInvocation) -> DispatchOutcome {
        let registry = self.context.registry().await;
        let Some(unit) = registry.resolve_structured(&invocation.command_name) else {
            error!("Command {} not found.", invocation.command_name);
            return DispatchOutcome::Unresolved;
        };
        let UnitHandler::Structured(handler) = unit.handler() else {
            error!("Command {} is not a structured command.", unit.name());
            return DispatchOutcome::Unresolved;
        };

        let ctx = InteractionContext::new(
            invocation,
            self.messenger.clone(),
            self.context.broker(),
            self.context.flow_timeouts(),
        );

        let gate = self.check_gates(
            &unit,
            &ctx.invocation().user.id,
            ctx.invocation().member_permissions.as_ref(),
        );
        if let Err(denial) = gate {
            debug!("{} denied: {:?}", unit.name(), denial);
            if let Err(e) = ctx.reply(Reply::ephemeral(denial.to_string())).await {
                warn!("Failed to send denial for {}: {}", unit.name(), e);
            }
            return DispatchOutcome::Denied(denial);
        }

        match guarded(handler.invoke(&ctx)).await {
            Ok(()) => DispatchOutcome::Completed,
            Err(e) => {
                error!("Error executing command {}: {:#}", unit.name(), e);
                let reply = Reply::ephemeral(ERROR_REPLY);
                let sent = if ctx.is_acknowledged() {
                    ctx.follow_up(reply).await
                } else {
                    ctx.reply(reply).await
                };
                if let Err(e) = sent {
                    error!("Failed to report error for {}: {}", unit.name(), e);
                }
                DispatchOutcome::Failed
            }
        }
    }

    #[instrument(skip_all, fields(author = %message.author.id))]
    pub async fn handle_message(&self, message: IncomingMessage) -> DispatchOutcome {
        if message.author.bot {
            return DispatchOutcome::Ignored;
        }

        let registry = self.context.registry().await;
        let Some(matched) = registry.resolve_prefixed(&message.content) else {
            return DispatchOutcome::Ignored;
        };
        let unit = matched.unit;
        let UnitHandler::Prefixed(handler) = unit.handler() else {
            return DispatchOutcome::Ignored;
        };

        let ctx = MessageContext::new(message, self.messenger.clone());
        let gate = self.check_gates(
            &unit,
            &ctx.author().id,
            ctx.message().member_permissions.as_ref(),
        );
        if let Err(denial) = gate {
            debug!("{} denied: {:?}", unit.name(), denial);
            if let Err(e) = ctx.reply(&denial.to_string()).await {
                warn!("Failed to send denial for {}: {}", unit.name(), e);
            }
            return DispatchOutcome::Denied(denial);
        }

        match guarded(handler.invoke(&ctx, &matched.args)).await {
            Ok(()) => DispatchOutcome::Completed,
            Err(e) => {
                error!("Error executing command {}: {:#}", unit.name(), e);
                if let Err(e) = ctx.reply(ERROR_REPLY).await {
                    error!("Failed to report error for {}: {}", unit.name(), e);
                }
                DispatchOutcome::Failed
            }
        }
    }

    /// Hands a component event to the flow waiting for it, if any.
    pub fn handle_component(&self, component: ComponentInteraction) -> DispatchOutcome {
        let custom_id = component.custom_id.clone();
        if self.context.broker().resolve(component) {
            DispatchOutcome::Completed
        } else {
            debug!("Component {} has no waiting flow", custom_id);
            DispatchOutcome::Ignored
        }
    }
}

/// Runs a handler future, turning a panic into an ordinary failure.
async fn guarded<F>(future: F) -> HandlerResult
where
    F: Future<Output = HandlerResult>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(anyhow::anyhow!(
            "handler panicked: {}",
            panic_message(panic.as_ref())
        )),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
