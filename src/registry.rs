//! # Command Registry
//!
//! In-memory lookup tables built by one load pass and then swapped in whole:
//!
//! - structured table: `name -> unit`, ordered by name (this order is the
//!   registration serialization order)
//! - prefixed table: `name | alias -> unit`
//! - prefix-key table: `(prefix, name | alias) -> unit`, used to recognise
//!   commands in free text
//!
//! Aliases share the same `Arc<Unit>` as the primary name.
//!
//! ## Prefix resolution
//!
//! When several registered `prefix + name` triggers are literal prefixes of a
//! message (`!p` and `!ping` for `"!ping x"`), the longest trigger wins. Equal
//! lengths are broken by `(prefix, name)` order.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use tracing::warn;

use crate::unit::{InvocationKind, Unit};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PrefixKey {
    pub prefix: String,
    pub name: String,
}

impl PrefixKey {
    pub fn new(prefix: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            name: name.into(),
        }
    }

    fn trigger_len(&self) -> usize {
        self.prefix.len() + self.name.len()
    }

    fn matches(&self, text: &str) -> bool {
        text.strip_prefix(self.prefix.as_str())
            .is_some_and(|rest| rest.starts_with(self.name.as_str()))
    }
}

/// A free-text message recognised as a prefixed command.
#[derive(Debug, Clone)]
pub struct PrefixMatch {
    pub unit: Arc<Unit>,
    /// The name or alias that matched.
    pub invoked_as: String,
    pub args: Vec<String>,
}

/// Splits the text after a trigger into argument tokens.
pub fn tokenize_args(remainder: &str) -> Vec<String> {
    remainder.split_whitespace().map(str::to_string).collect()
}

#[derive(Debug, Default)]
pub struct CommandRegistry {
    default_prefix: String,
    structured: BTreeMap<String, Arc<Unit>>,
    prefixed: HashMap<String, Arc<Unit>>,
    prefix_keys: BTreeMap<PrefixKey, Arc<Unit>>,
}

impl CommandRegistry {
    pub fn new(default_prefix: impl Into<String>) -> Self {
        Self {
            default_prefix: default_prefix.into(),
            ..Default::default()
        }
    }

    pub fn default_prefix(&self) -> &str {
        &self.default_prefix
    }

    /// Inserts a unit into the table of its kind. A later unit with the same
    /// name replaces the earlier one.
    pub fn register(&mut self, unit: Arc<Unit>) {
        match unit.kind() {
            InvocationKind::Structured => {
                if let Some(previous) = self
                    .structured
                    .insert(unit.name().to_string(), unit.clone())
                {
                    warn!("Structured command {} registered twice", previous.name());
                }
            }
            InvocationKind::Prefixed => {
                let prefix = unit
                    .prefix()
                    .unwrap_or(self.default_prefix.as_str())
                    .to_string();
                let names = std::iter::once(unit.name())
                    .chain(unit.aliases().iter().map(String::as_str));
                for name in names {
                    if self
                        .prefixed
                        .insert(name.to_string(), unit.clone())
                        .is_some()
                    {
                        warn!("Message command name {} registered twice", name);
                    }
                    self.prefix_keys
                        .insert(PrefixKey::new(prefix.clone(), name), unit.clone());
                }
            }
        }
    }

    pub fn resolve_structured(&self, name: &str) -> Option<Arc<Unit>> {
        self.structured.get(name).cloned()
    }

    /// Looks up a prefixed unit by name or alias, ignoring prefixes.
    pub fn resolve_prefixed_name(&self, name: &str) -> Option<Arc<Unit>> {
        self.prefixed.get(name).cloned()
    }

    /// Recognises a command at the start of `text`.
    pub fn resolve_prefixed(&self, text: &str) -> Option<PrefixMatch> {
        let (key, unit) = self
            .prefix_keys
            .iter()
            .filter(|(key, _)| key.matches(text))
            .fold(None::<(&PrefixKey, &Arc<Unit>)>, |best, candidate| match best {
                Some(current) if current.0.trigger_len() >= candidate.0.trigger_len() => {
                    Some(current)
                }
                _ => Some(candidate),
            })?;

        Some(PrefixMatch {
            unit: unit.clone(),
            invoked_as: key.name.clone(),
            args: tokenize_args(&text[key.trigger_len()..]),
        })
    }

    /// Structured units in serialization order.
    pub fn structured_units(&self) -> impl Iterator<Item = &Arc<Unit>> {
        self.structured.values()
    }

    pub fn structured_len(&self) -> usize {
        self.structured.len()
    }

    /// Number of distinct prefixed units (aliases not counted).
    pub fn prefixed_len(&self) -> usize {
        let mut seen: Vec<*const Unit> = self.prefixed.values().map(Arc::as_ptr).collect();
        seen.sort();
        seen.dedup();
        seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structured.is_empty() && self.prefixed.is_empty()
    }
}
