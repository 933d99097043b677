//! # Units
//!
//! A unit is a named, invocable command discovered from a JSON record on disk.
//! The record ([`UnitDefinition`]) carries the metadata the dispatcher gates on;
//! the behaviour comes from a compiled handler looked up by id in the
//! [`HandlerCatalog`](crate::handler::HandlerCatalog).
//!
//! Two invocation kinds exist:
//! - [`InvocationKind::Structured`] - platform-native slash commands, published remotely
//! - [`InvocationKind::Prefixed`] - free-text messages matched by `prefix + name`

use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, sync::Arc, time::Duration};

use crate::cooldown::MAX_COOLDOWN;
use crate::handler::{MessageHandler, SlashHandler};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InvocationKind {
    Structured,
    Prefixed,
}

/// Set of permission tokens (e.g. `ManageMessages`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<String>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, permission: impl Into<String>) -> bool {
        self.0.insert(permission.into())
    }

    pub fn contains(&self, permission: &str) -> bool {
        self.0.contains(permission)
    }

    /// True when every permission in `required` is held.
    pub fn contains_all(&self, required: &PermissionSet) -> bool {
        required.0.is_subset(&self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// The name-bearing descriptor of a structured command.
///
/// This is exactly what gets published to the platform. Fields other than
/// `name` and `description` (options, localizations, ...) are kept verbatim;
/// they serialize with sorted keys so the published form is canonical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CommandDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            extra: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredDefinition {
    pub data: CommandDescriptor,
    pub handler: String,
    #[serde(default)]
    pub owner_only: bool,
    #[serde(default)]
    pub permissions: PermissionSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefixedDefinition {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    pub handler: String,
    #[serde(default)]
    pub owner_only: bool,
    #[serde(default)]
    pub permissions: PermissionSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown: Option<f64>,
}

/// Binds a named platform event (`ready`, `guildCreate`, ...) to a listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDefinition {
    pub name: String,
    #[serde(default)]
    pub once: bool,
    pub handler: String,
}

/// A unit record as read from disk, and as stored in the cache image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum UnitDefinition {
    Structured(StructuredDefinition),
    Prefixed(PrefixedDefinition),
}

impl UnitDefinition {
    pub fn kind(&self) -> InvocationKind {
        match self {
            Self::Structured(_) => InvocationKind::Structured,
            Self::Prefixed(_) => InvocationKind::Prefixed,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Structured(def) => &def.data.name,
            Self::Prefixed(def) => &def.name,
        }
    }

    pub fn handler_id(&self) -> &str {
        match self {
            Self::Structured(def) => &def.handler,
            Self::Prefixed(def) => &def.handler,
        }
    }

    fn owner_only(&self) -> bool {
        match self {
            Self::Structured(def) => def.owner_only,
            Self::Prefixed(def) => def.owner_only,
        }
    }

    fn permissions(&self) -> &PermissionSet {
        match self {
            Self::Structured(def) => &def.permissions,
            Self::Prefixed(def) => &def.permissions,
        }
    }

    pub(crate) fn cooldown_secs(&self) -> Option<f64> {
        match self {
            Self::Structured(def) => def.cooldown,
            Self::Prefixed(def) => def.cooldown,
        }
    }
}

/// The compiled capability a unit dispatches to.
#[derive(Clone)]
pub enum UnitHandler {
    Structured(Arc<dyn SlashHandler>),
    Prefixed(Arc<dyn MessageHandler>),
}

impl UnitHandler {
    pub fn kind(&self) -> InvocationKind {
        match self {
            Self::Structured(_) => InvocationKind::Structured,
            Self::Prefixed(_) => InvocationKind::Prefixed,
        }
    }
}

/// A loaded unit. Immutable once built; a reload produces a new `Unit`.
pub struct Unit {
    definition: UnitDefinition,
    handler: UnitHandler,
}

impl Unit {
    /// Pairs a record with its handler. The caller guarantees the kinds agree
    /// (see [`HandlerCatalog::bind`](crate::handler::HandlerCatalog::bind)).
    pub(crate) fn new(definition: UnitDefinition, handler: UnitHandler) -> Self {
        debug_assert_eq!(definition.kind(), handler.kind());
        Self {
            definition,
            handler,
        }
    }

    pub fn name(&self) -> &str {
        self.definition.name()
    }

    pub fn kind(&self) -> InvocationKind {
        self.definition.kind()
    }

    pub fn aliases(&self) -> &[String] {
        match &self.definition {
            UnitDefinition::Prefixed(def) => &def.aliases,
            UnitDefinition::Structured(_) => &[],
        }
    }

    /// The unit's own prefix, if it overrides the process default.
    pub fn prefix(&self) -> Option<&str> {
        match &self.definition {
            UnitDefinition::Prefixed(def) => def.prefix.as_deref(),
            UnitDefinition::Structured(_) => None,
        }
    }

    pub fn owner_only(&self) -> bool {
        self.definition.owner_only()
    }

    pub fn permissions(&self) -> &PermissionSet {
        self.definition.permissions()
    }

    /// Cooldown for this unit; missing, zero, negative or non-finite values
    /// fall back to `default`.
    pub fn cooldown(&self, default: Duration) -> Duration {
        match self.definition.cooldown_secs() {
            Some(secs) if secs > 0.0 => Duration::try_from_secs_f64(secs)
                .map(|cooldown| cooldown.min(MAX_COOLDOWN))
                .unwrap_or(default),
            _ => default,
        }
    }

    pub fn descriptor(&self) -> Option<&CommandDescriptor> {
        match &self.definition {
            UnitDefinition::Structured(def) => Some(&def.data),
            UnitDefinition::Prefixed(_) => None,
        }
    }

    pub fn handler(&self) -> &UnitHandler {
        &self.handler
    }

    pub fn definition(&self) -> &UnitDefinition {
        &self.definition
    }
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unit")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("handler", &self.definition.handler_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_structured_definition_defaults() {
        let def: StructuredDefinition = serde_json::from_value(json!({
            "data": { "name": "owner-test", "description": "Owner only." },
            "handler": "owner-test",
            "ownerOnly": true
        }))
        .unwrap();
        assert!(def.owner_only);
        assert!(def.permissions.is_empty());
        assert_eq!(def.cooldown, None);
        assert!(def.data.extra.is_empty());
    }

    #[test]
    fn test_descriptor_keeps_extra_fields_sorted() {
        let descriptor: CommandDescriptor = serde_json::from_value(json!({
            "name": "test",
            "options": [],
            "description": "A test command.",
            "dm_permission": false
        }))
        .unwrap();
        let text = serde_json::to_string(&descriptor).unwrap();
        assert_eq!(
            text,
            r#"{"name":"test","description":"A test command.","dm_permission":false,"options":[]}"#
        );
    }

    #[test]
    fn test_unit_definition_is_tagged_by_kind() {
        let def = UnitDefinition::Prefixed(PrefixedDefinition {
            name: "ping".to_string(),
            aliases: vec!["p".to_string()],
            prefix: None,
            handler: "ping".to_string(),
            owner_only: false,
            permissions: PermissionSet::new(),
            cooldown: Some(2.5),
        });
        let value = serde_json::to_value(&def).unwrap();
        assert_eq!(value["kind"], "prefixed");
        assert_eq!(value["aliases"], json!(["p"]));
        assert_eq!(def.kind(), InvocationKind::Prefixed);
        assert_eq!(def.name(), "ping");
    }

    #[test]
    fn test_permission_set_contains_all() {
        let held: PermissionSet = ["ManageMessages", "SendMessages"].into_iter().collect();
        let required: PermissionSet = ["ManageMessages"].into_iter().collect();
        let stricter: PermissionSet = ["ManageMessages", "BanMembers"].into_iter().collect();
        assert!(held.contains_all(&required));
        assert!(!held.contains_all(&stricter));
        assert!(held.contains_all(&PermissionSet::new()));
    }
}
