//! Built-in handlers shipped with the bot.
//!
//! | id           | capability | behaviour                                   |
//! |--------------|------------|---------------------------------------------|
//! | `ping`       | message    | replies `Pong!`                             |
//! | `owner-test` | slash      | ephemeral confirmation for the owner        |
//! | `test`       | slash      | embed + button/select, button opens a modal |
//! | `log-ready`  | listener   | logs the ready event                        |

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{error, info};

use crate::handler::{EventListener, HandlerCatalog, HandlerResult, MessageHandler, SlashHandler};
use crate::interaction::InteractionError;
use crate::invocation::{InteractionContext, MessageContext};
use crate::platform::{ComponentInteraction, Reply};

pub const MODAL_TIMEOUT_REPLY: &str = "Modal submission timed out or failed.";
const COMPONENT_ERROR_REPLY: &str = "An error occurred while processing your interaction.";

/// Catalog with every built-in handler registered under its id.
pub fn catalog() -> HandlerCatalog {
    let mut catalog = HandlerCatalog::new();
    catalog
        .register_message("ping", Ping)
        .register_slash("owner-test", OwnerTest)
        .register_slash("test", TestFlow)
        .register_listener("log-ready", LogReady);
    catalog
}

pub struct Ping;

#[async_trait]
impl MessageHandler for Ping {
    async fn invoke(&self, ctx: &MessageContext, _args: &[String]) -> HandlerResult {
        ctx.reply("Pong!").await?;
        Ok(())
    }
}

pub struct OwnerTest;

#[async_trait]
impl SlashHandler for OwnerTest {
    async fn invoke(&self, ctx: &InteractionContext) -> HandlerResult {
        ctx.reply(Reply::ephemeral("This is an owner-only command!"))
            .await?;
        Ok(())
    }
}

/// Interactive demo: a select menu answers directly, the button opens a
/// modal whose submission is echoed back. Open modals are awaited alongside
/// further clicks. Components are disabled once the component window closes.
pub struct TestFlow;

impl TestFlow {
    fn embed() -> Value {
        json!({
            "title": "Test Command",
            "description": "Interact with the button or select menu below!",
            "color": 0x0099ff,
            "fields": [{
                "name": "Instructions",
                "value": "Click the button to open a modal or choose an option from the menu."
            }]
        })
    }

    fn components(scope_id: &str, disabled: bool) -> Vec<Value> {
        vec![
            json!({
                "type": 1,
                "components": [{
                    "type": 2,
                    "style": 1,
                    "label": "Open Modal",
                    "custom_id": format!("{}:button", scope_id),
                    "disabled": disabled
                }]
            }),
            json!({
                "type": 1,
                "components": [{
                    "type": 3,
                    "custom_id": format!("{}:select", scope_id),
                    "placeholder": "Choose an option",
                    "disabled": disabled,
                    "options": [
                        { "label": "Option 1", "description": "First test option", "value": "option1" },
                        { "label": "Option 2", "description": "Second test option", "value": "option2" }
                    ]
                }]
            }),
        ]
    }

    fn modal(modal_id: &str) -> Value {
        json!({
            "custom_id": modal_id,
            "title": "Test Modal",
            "components": [{
                "type": 1,
                "components": [{
                    "type": 4,
                    "custom_id": "test_input",
                    "label": "Enter some text",
                    "style": 1,
                    "required": true
                }]
            }]
        })
    }

    /// Answers one click. A button press returns the id of the modal it opened.
    async fn on_component(
        &self,
        ctx: &InteractionContext,
        component: &ComponentInteraction,
    ) -> anyhow::Result<Option<String>> {
        if component.custom_id.ends_with(":select") {
            let selected = component.values.first().map(String::as_str).unwrap_or("");
            ctx.respond_to(component, Reply::ephemeral(format!("You selected: {}", selected)))
                .await?;
            return Ok(None);
        }

        if component.custom_id.ends_with(":button") {
            let modal_id = ctx.scoped_id("test_modal");
            ctx.show_modal(component, &Self::modal(&modal_id)).await?;
            return Ok(Some(modal_id));
        }
        Ok(None)
    }

    /// Waits for one modal submission. The opening click is already answered,
    /// so failures here are only logged.
    async fn await_modal(ctx: &InteractionContext, modal_id: String) {
        match ctx.await_component(&modal_id, ctx.timeouts().modal).await {
            Ok(submission) => {
                let input = submission
                    .fields
                    .get("test_input")
                    .map(String::as_str)
                    .unwrap_or("");
                let reply = Reply::ephemeral(format!("You submitted: {}", input));
                if let Err(e) = ctx.respond_to(&submission, reply).await {
                    error!("Failed to answer modal submission: {}", e);
                }
            }
            Err(InteractionError::Cancelled(_)) => {}
            Err(e) => {
                error!("Modal submission failed: {}", e);
                if let Err(e) = ctx.follow_up(Reply::ephemeral(MODAL_TIMEOUT_REPLY)).await {
                    error!("Failed to report modal timeout: {}", e);
                }
            }
        }
    }
}

#[async_trait]
impl SlashHandler for TestFlow {
    async fn invoke(&self, ctx: &InteractionContext) -> HandlerResult {
        let scope_id = ctx.scoped_id("test");
        ctx.reply(
            Reply {
                ephemeral: true,
                ..Reply::default()
            }
            .with_embeds(vec![Self::embed()])
            .with_components(Self::components(&scope_id, false)),
        )
        .await?;

        let deadline = Instant::now() + ctx.timeouts().component;
        let waiting = ctx.await_component(&scope_id, ctx.timeouts().component);
        tokio::pin!(waiting);
        let mut modals = FuturesUnordered::new();

        loop {
            tokio::select! {
                result = &mut waiting => {
                    let component = match result {
                        Ok(component) => component,
                        Err(InteractionError::Timeout(_)) => break,
                        Err(InteractionError::Cancelled(_)) => return Ok(()),
                    };
                    match self.on_component(ctx, &component).await {
                        Ok(Some(modal_id)) => modals.push(Self::await_modal(ctx, modal_id)),
                        Ok(None) => {}
                        Err(e) => {
                            error!("Interaction handling failed: {}", e);
                            if let Err(e) = ctx
                                .respond_to(&component, Reply::ephemeral(COMPONENT_ERROR_REPLY))
                                .await
                            {
                                error!("Failed to report interaction error: {}", e);
                            }
                        }
                    }

                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        break;
                    }
                    waiting.set(ctx.await_component(&scope_id, remaining));
                }
                Some(()) = modals.next(), if !modals.is_empty() => {}
            }
        }

        let disabled = Reply::default()
            .with_embeds(vec![Self::embed()])
            .with_components(Self::components(&scope_id, true));
        if let Err(e) = ctx.edit_reply(disabled).await {
            error!("Failed to disable components: {}", e);
        }

        // modals opened near the end of the window still get their answer
        while modals.next().await.is_some() {}
        Ok(())
    }
}

pub struct LogReady;

#[async_trait]
impl EventListener for LogReady {
    async fn handle(&self, _event: &str, payload: &Value) -> HandlerResult {
        let user = payload
            .get("user")
            .and_then(Value::as_str)
            .unwrap_or("unknown user");
        info!("Ready! Logged in as {}", user);
        Ok(())
    }
}
