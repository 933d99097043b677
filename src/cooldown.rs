//! # Cooldown Scheduler
//!
//! Enforces a minimum interval between successive invocations of one unit by
//! one user. Every granted slot stores an absolute expiry and schedules its own
//! eviction task, so entries disappear on time even if the key is never
//! touched again. Re-granting a key aborts the previous eviction task.
//!
//! The check-and-set in [`CooldownScheduler::try_acquire`] runs under the
//! shard lock of the entry and never awaits, so two concurrent invocations from
//! the same user cannot both pass.

use dashmap::{mapref::entry::Entry, DashMap};
use std::{fmt, sync::Arc, time::Duration};
use tokio::{task::AbortHandle, time::Instant};
use tracing::{trace, warn};

/// Upper bound on a single cooldown. Longer records fail validation.
pub const MAX_COOLDOWN: Duration = Duration::from_secs(366 * 24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CooldownKey {
    pub unit: String,
    pub user: String,
}

impl CooldownKey {
    pub fn new(unit: &str, user: &str) -> Self {
        Self {
            unit: unit.to_string(),
            user: user.to_string(),
        }
    }
}

impl fmt::Display for CooldownKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.unit, self.user)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownDecision {
    Allowed,
    Denied { remaining: Duration },
}

impl CooldownDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Formats a remaining cooldown the way users see it (`"2.9"`).
pub fn format_remaining(remaining: Duration) -> String {
    format!("{:.1}", remaining.as_secs_f64())
}

#[derive(Default)]
pub struct CooldownScheduler {
    entries: Arc<DashMap<CooldownKey, Instant>>,
    timers: Arc<DashMap<CooldownKey, (Instant, AbortHandle)>>,
}

impl CooldownScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants a slot for `(unit, user)` unless one is still live.
    ///
    /// Must be called from within a Tokio runtime (eviction is a spawned task).
    pub fn try_acquire(&self, unit: &str, user: &str, cooldown: Duration) -> CooldownDecision {
        let key = CooldownKey::new(unit, user);
        let now = Instant::now();
        let Some(expiry) = now.checked_add(cooldown.min(MAX_COOLDOWN)) else {
            warn!("cooldown {:?} for {} is out of range, not applied", cooldown, key);
            return CooldownDecision::Allowed;
        };

        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let current = *entry.get();
                if current > now {
                    return CooldownDecision::Denied {
                        remaining: current - now,
                    };
                }
                entry.insert(expiry);
            }
            Entry::Vacant(entry) => {
                entry.insert(expiry);
            }
        }

        self.schedule_eviction(key, expiry);
        CooldownDecision::Allowed
    }

    fn schedule_eviction(&self, key: CooldownKey, expiry: Instant) {
        let entries = Arc::clone(&self.entries);
        let timers = Arc::clone(&self.timers);
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(expiry).await;
            entries.remove_if(&task_key, |_, stored| *stored == expiry);
            timers.remove_if(&task_key, |_, (scheduled, _)| *scheduled == expiry);
            trace!("cooldown {} evicted", task_key);
        });

        if let Some((_, previous)) = self.timers.insert(key, (expiry, handle.abort_handle())) {
            previous.abort();
        }
    }

    /// Time left on a live entry, if any.
    pub fn remaining(&self, unit: &str, user: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(&CooldownKey::new(unit, user))
            .map(|expiry| *expiry)
            .filter(|expiry| *expiry > now)
            .map(|expiry| expiry - now)
    }

    /// Number of stored entries, including ones whose eviction is due but has
    /// not run yet.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Aborts every pending eviction and forgets all entries.
    pub fn shutdown(&self) {
        for timer in self.timers.iter() {
            timer.value().1.abort();
        }
        self.timers.clear();
        self.entries.clear();
    }
}
