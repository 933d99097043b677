//! # Sub-interaction Broker
//!
//! Multi-step flows (a button that opens a modal, a select menu, ...) need to
//! wait for a follow-up component event that arrives through the normal
//! inbound stream. The broker correlates the two: a flow registers a waiter
//! under a scoped id and awaits it with a bounded timeout; the dispatcher
//! hands every inbound component event to [`SubInteractionBroker::resolve`].
//!
//! ## Scoped ids
//!
//! Waiters are keyed by a scope id derived from the originating interaction,
//! `"{scope}_{interaction_id}"`. A component's `custom_id` matches a waiter
//! when it equals the scope id or starts with `"{scope_id}:"`, so one waiter
//! covers several components (`test_42:button`, `test_42:select`).
//!
//! Only the user who started the flow can satisfy its waiter.

use dashmap::DashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, instrument};

use crate::platform::ComponentInteraction;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InteractionError {
    #[error("Sub-interaction timed out: {0}")]
    Timeout(String),
    #[error("Sub-interaction cancelled: {0}")]
    Cancelled(String),
}

pub type InteractionResult<T> = Result<T, InteractionError>;

struct PendingComponent {
    user_id: String,
    sender: oneshot::Sender<ComponentInteraction>,
}

#[derive(Default)]
pub struct SubInteractionBroker {
    pending: DashMap<String, PendingComponent>,
}

impl SubInteractionBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives the scope id for a flow step of the given interaction.
    pub fn scope_id(scope: &str, interaction_id: &str) -> String {
        format!("{}_{}", scope, interaction_id)
    }

    /// Waits for a component event under `scope_id` from `user_id`.
    ///
    /// Registering a second waiter under the same id cancels the first one.
    #[instrument(skip(self))]
    pub async fn wait_for(
        &self,
        scope_id: &str,
        user_id: &str,
        timeout: Duration,
    ) -> InteractionResult<ComponentInteraction> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            scope_id.to_string(),
            PendingComponent {
                user_id: user_id.to_string(),
                sender: tx,
            },
        );

        let outcome = tokio::time::timeout(timeout, rx).await;
        match outcome {
            Ok(Ok(component)) => Ok(component),
            Ok(Err(_)) => Err(InteractionError::Cancelled(scope_id.to_string())),
            Err(_) => {
                // the receiver is gone, so only our own entry reports closed
                self.pending
                    .remove_if(scope_id, |_, pending| pending.sender.is_closed());
                Err(InteractionError::Timeout(scope_id.to_string()))
            }
        }
    }

    /// Delivers a component event to its waiter. Returns `false` when nobody
    /// was waiting for it (expired flow, foreign user, unknown id).
    pub fn resolve(&self, component: ComponentInteraction) -> bool {
        let scope_id = component
            .custom_id
            .split_once(':')
            .map(|(scope_id, _)| scope_id)
            .unwrap_or(&component.custom_id)
            .to_string();

        match self
            .pending
            .remove_if(&scope_id, |_, pending| pending.user_id == component.user.id)
        {
            Some((_, pending)) => pending.sender.send(component).is_ok(),
            None => {
                debug!("No pending sub-interaction for {}", scope_id);
                false
            }
        }
    }

    /// Cancels every waiter; each resolves with [`InteractionError::Cancelled`].
    pub fn cancel_all(&self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::User;
    use std::sync::Arc;

    fn component(custom_id: &str, user: &str) -> ComponentInteraction {
        ComponentInteraction {
            id: format!("{}-event", custom_id),
            custom_id: custom_id.to_string(),
            user: User::new(user),
            values: vec!["option1".to_string()],
            fields: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_resolves_component_under_scope() {
        let broker = Arc::new(SubInteractionBroker::new());
        let scope_id = SubInteractionBroker::scope_id("test", "42");
        assert_eq!(scope_id, "test_42");

        let waiter = tokio::spawn({
            let broker = broker.clone();
            async move {
                broker
                    .wait_for("test_42", "u1", Duration::from_secs(5))
                    .await
            }
        });
        tokio::task::yield_now().await;
        while broker.pending_count() == 0 {
            tokio::task::yield_now().await;
        }

        assert!(broker.resolve(component("test_42:select", "u1")));
        let received = waiter.await.unwrap().unwrap();
        assert_eq!(received.custom_id, "test_42:select");
        assert_eq!(broker.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_foreign_user_cannot_resolve() {
        let broker = Arc::new(SubInteractionBroker::new());
        let waiter = tokio::spawn({
            let broker = broker.clone();
            async move {
                broker
                    .wait_for("test_7", "owner", Duration::from_millis(100))
                    .await
            }
        });
        while broker.pending_count() == 0 {
            tokio::task::yield_now().await;
        }

        assert!(!broker.resolve(component("test_7:button", "intruder")));
        let result = waiter.await.unwrap();
        assert_eq!(result, Err(InteractionError::Timeout("test_7".to_string())));
        assert_eq!(broker.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let broker = SubInteractionBroker::new();
        let result = broker
            .wait_for("test_modal_1", "u1", Duration::from_secs(30))
            .await;
        assert_eq!(
            result,
            Err(InteractionError::Timeout("test_modal_1".to_string()))
        );
        assert!(!broker.resolve(component("test_modal_1", "u1")));
    }

    #[tokio::test]
    async fn test_cancel_all_wakes_waiters() {
        let broker = Arc::new(SubInteractionBroker::new());
        let waiter = tokio::spawn({
            let broker = broker.clone();
            async move { broker.wait_for("flow_1", "u1", Duration::from_secs(60)).await }
        });
        while broker.pending_count() == 0 {
            tokio::task::yield_now().await;
        }

        assert_eq!(broker.cancel_all(), 1);
        assert_eq!(
            waiter.await.unwrap(),
            Err(InteractionError::Cancelled("flow_1".to_string()))
        );
    }
}
