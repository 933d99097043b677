//! # Registration Synchronizer
//!
//! Publishes the structured commands to the remote platform only when they
//! changed since the last acknowledged publish.
//!
//! The snapshot is the list of command descriptors, sorted by name, with
//! object keys in sorted order. Its SHA-256 over the compact JSON encoding is
//! compared to the hash stored in the registration state file. Equal hashes
//! skip the remote call entirely.
//!
//! A rate-limited publish is retried once after the configured backoff. The
//! acknowledged state changes only after a publish succeeds.

use ring::digest::{digest, SHA256};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::context::BotContext;
use crate::platform::{CommandPublisher, PlatformError, PlatformResult, RegistrationScope};
use crate::registry::CommandRegistry;
use crate::store::{JsonStore, StoreError, StoreResult};

/// Last acknowledged registration, persisted across restarts. The default
/// (empty hash) means "never registered".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrationState {
    pub hash: String,
    pub commands: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationSnapshot {
    pub commands: Vec<Value>,
    pub hash: String,
}

impl RegistrationSnapshot {
    pub fn capture(registry: &CommandRegistry) -> StoreResult<Self> {
        let commands = registry
            .structured_units()
            .filter_map(|unit| unit.descriptor())
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let hash = content_hash(&commands)?;
        Ok(Self { commands, hash })
    }
}

/// Hex SHA-256 of the compact JSON encoding of `commands`.
pub fn content_hash(commands: &[Value]) -> StoreResult<String> {
    let bytes =
        serde_json::to_vec(commands).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(hex::encode(digest(&SHA256, &bytes)))
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Unchanged,
    Published {
        scope: RegistrationScope,
        attempts: u32,
    },
    Failed {
        reason: String,
    },
}

pub struct RegistrationSynchronizer {
    context: Arc<BotContext>,
    publisher: Arc<dyn CommandPublisher>,
    store: JsonStore,
    state: Mutex<RegistrationState>,
}

impl RegistrationSynchronizer {
    /// Creates a synchronizer, reading the last acknowledged state from disk.
    pub async fn new(context: Arc<BotContext>, publisher: Arc<dyn CommandPublisher>) -> Self {
        let store = JsonStore::new(&context.config().registration_state_path);
        let state: RegistrationState = store.load_or_default().await;
        Self {
            context,
            publisher,
            store,
            state: Mutex::new(state),
        }
    }

    pub async fn acknowledged_hash(&self) -> String {
        self.state.lock().await.hash.clone()
    }

    #[instrument(skip(self))]
    pub async fn sync(&self) -> SyncOutcome {
        // 同時に二回公開しないよう、状態のロックを最後まで保持する
        let mut state = self.state.lock().await;

        let registry = self.context.registry().await;
        let snapshot = match RegistrationSnapshot::capture(&registry) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Failed to serialize commands: {}", e);
                return SyncOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        if snapshot.hash == state.hash {
            info!("Slash commands unchanged; skipping registration.");
            return SyncOutcome::Unchanged;
        }

        let scope = self.context.config().registration_scope();
        info!(
            "Registering {} slash commands {}",
            snapshot.commands.len(),
            scope
        );

        match self.publish_with_retry(&scope, &snapshot.commands).await {
            Ok(attempts) => {
                let acknowledged = RegistrationState {
                    hash: snapshot.hash,
                    commands: snapshot.commands,
                };
                if let Err(e) = self.store.save(&acknowledged).await {
                    error!("Failed to persist registration state: {}", e);
                }
                *state = acknowledged;
                info!("Successfully registered slash commands {}", scope);
                SyncOutcome::Published { scope, attempts }
            }
            Err(e) => {
                error!("Failed to register slash commands {}: {}", scope, e);
                SyncOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Publishes once, and once more after the backoff if rate-limited.
    /// Returns the number of attempts made.
    async fn publish_with_retry(
        &self,
        scope: &RegistrationScope,
        commands: &[Value],
    ) -> PlatformResult<u32> {
        match self.publisher.put_commands(scope, commands).await {
            Ok(()) => Ok(1),
            Err(PlatformError::RateLimited { retry_after }) => {
                let backoff = self.context.config().rate_limit_backoff;
                warn!(
                    "Rate limited (retry after {:?}); retrying in {:?}",
                    retry_after, backoff
                );
                tokio::time::sleep(backoff).await;
                self.publisher.put_commands(scope, commands).await?;
                Ok(2)
            }
            Err(e) => Err(e),
        }
    }
}
