//! # Platform Interface
//!
//! Everything the dispatch core needs from the remote chat platform, and
//! nothing more. The gateway connection, rich UI rendering and REST plumbing
//! live behind two traits:
//!
//! - [`Messenger`] - replies, deferrals, follow-ups and modals
//! - [`CommandPublisher`] - full-overwrite registration of structured commands
//!
//! Inbound events ([`SlashInvocation`], [`IncomingMessage`],
//! [`ComponentInteraction`]) are plain serde records so they can be fed from
//! any transport, including the JSON-lines console used by the binary.

pub mod console;
pub mod rest;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::HashMap, fmt, time::Duration};
use thiserror::Error;

use crate::unit::PermissionSet;

pub use console::ConsoleMessenger;
pub use rest::RestPublisher;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    /// Automated authors are never dispatched.
    #[serde(default)]
    pub bot: bool,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            bot: false,
        }
    }
}

/// Opaque reply payload. Embeds and components are passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub ephemeral: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Value>,
}

impl Reply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn ephemeral(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ephemeral: true,
            ..Default::default()
        }
    }

    pub fn with_embeds(mut self, embeds: Vec<Value>) -> Self {
        self.embeds = embeds;
        self
    }

    pub fn with_components(mut self, components: Vec<Value>) -> Self {
        self.components = components;
        self
    }
}

/// A structured (slash) command invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlashInvocation {
    /// Unique interaction id; sub-interaction ids are derived from it.
    pub id: String,
    pub command_name: String,
    pub user: User,
    /// Absent for direct-message invocations.
    #[serde(default)]
    pub member_permissions: Option<PermissionSet>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub options: Value,
}

/// A free-text message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: String,
    pub channel_id: String,
    pub content: String,
    pub author: User,
    #[serde(default)]
    pub member_permissions: Option<PermissionSet>,
}

/// A button press, menu selection or modal submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentInteraction {
    pub id: String,
    pub custom_id: String,
    pub user: User,
    /// Selected menu values.
    #[serde(default)]
    pub values: Vec<String>,
    /// Modal text inputs by input id.
    #[serde(default)]
    pub fields: HashMap<String, String>,
}

/// Everything the dispatcher accepts from the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    Slash(SlashInvocation),
    Message(IncomingMessage),
    Component(ComponentInteraction),
    /// Any other named platform event, routed to event listeners.
    Event {
        name: String,
        #[serde(default)]
        payload: Value,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationScope {
    Global,
    Guild(String),
}

impl fmt::Display for RegistrationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "globally"),
            Self::Guild(guild_id) => write!(f, "for guild {}", guild_id),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlatformError {
    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Interaction {0} was already acknowledged")]
    AlreadyAcknowledged(String),
}

pub type PlatformResult<T> = Result<T, PlatformError>;

#[async_trait]
pub trait Messenger: Send + Sync {
    async fn reply_interaction(&self, interaction_id: &str, reply: &Reply) -> PlatformResult<()>;

    async fn defer_interaction(
        &self,
        interaction_id: &str,
        ephemeral: bool,
    ) -> PlatformResult<()>;

    async fn follow_up(&self, interaction_id: &str, reply: &Reply) -> PlatformResult<()>;

    async fn edit_reply(&self, interaction_id: &str, reply: &Reply) -> PlatformResult<()>;

    async fn show_modal(&self, interaction_id: &str, modal: &Value) -> PlatformResult<()>;

    async fn reply_message(
        &self,
        channel_id: &str,
        message_id: &str,
        content: &str,
    ) -> PlatformResult<()>;
}

/// Remote command registration. Each call replaces the whole command set of
/// the given scope.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandPublisher: Send + Sync {
    async fn put_commands(
        &self,
        scope: &RegistrationScope,
        commands: &[Value],
    ) -> PlatformResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inbound_event_tagging() {
        let event: InboundEvent = serde_json::from_value(json!({
            "type": "message",
            "id": "m1",
            "channel_id": "c1",
            "content": "!ping",
            "author": { "id": "u1" }
        }))
        .unwrap();
        match event {
            InboundEvent::Message(message) => {
                assert_eq!(message.content, "!ping");
                assert!(!message.author.bot);
                assert!(message.member_permissions.is_none());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(RegistrationScope::Global.to_string(), "globally");
        assert_eq!(
            RegistrationScope::Guild("42".to_string()).to_string(),
            "for guild 42"
        );
    }
}
