//! # Herald: plugin-style command dispatch for chat bots
//!
//! Herald discovers command units from a file tree, registers the structured
//! ones with the remote chat platform, and routes inbound events to the
//! matching unit under ownership, permission and rate-limit gates.
//!
//! ## Pipeline
//!
//! ```text
//! unit files → Loader ─┬→ CommandRegistry → Dispatcher ← inbound events
//!                      │        │
//!                      │        └→ RegistrationSynchronizer → remote platform
//!                      └→ UnitCache (persisted, mtime keyed)
//! ```
//!
//! ### Units
//! A unit is a JSON record naming a compiled handler ([`unit`], [`handler`]).
//! Structured units are platform-native slash commands; prefixed units are
//! recognised in free text by `prefix + name` ([`registry`]).
//!
//! ### Loading
//! The [`loader`] walks the unit roots and reuses unchanged units from the
//! [`cache`]. The result of a pass is swapped into the [`context`] at once.
//!
//! ### Dispatch
//! The [`dispatch`] engine applies ownership, permission and [`cooldown`]
//! gates in that order, invokes the unit, and reports failures exactly once.
//! Multi-step flows wait on follow-up components through [`interaction`].
//!
//! ### Registration
//! The [`sync`] module publishes structured commands only when their content
//! hash changed, retrying once when rate limited.

pub mod builtin;
pub mod cache;
pub mod config;
pub mod context;
pub mod cooldown;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod handler;
pub mod interaction;
pub mod invocation;
pub mod loader;
pub mod platform;
pub mod registry;
pub mod store;
pub mod sync;
pub mod unit;

// Re-exports
pub use config::BotConfig;
pub use context::BotContext;
pub use dispatch::{Denial, DispatchOutcome, Dispatcher};
pub use error::*;
pub use handler::{EventListener, HandlerCatalog, HandlerResult, MessageHandler, SlashHandler};
pub use invocation::{InteractionContext, MessageContext};
pub use loader::{LoadReport, UnitLoader};
pub use registry::CommandRegistry;
pub use sync::{RegistrationSynchronizer, SyncOutcome};
pub use unit::{InvocationKind, PermissionSet, Unit};
