#![allow(dead_code)]

use async_trait::async_trait;
use herald::{
    platform::{
        CommandPublisher, Messenger, PlatformError, PlatformResult, RegistrationScope, Reply,
    },
    BotConfig, BotContext, HandlerCatalog, UnitLoader,
};
use serde_json::Value;
use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tempfile::TempDir;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[ctor::ctor]
fn init_tests() {
    // テストの前に一度だけ実行したい処理
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// One outbound action captured by [`RecordingMessenger`].
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Reply { id: String, reply: Reply },
    Defer { id: String, ephemeral: bool },
    FollowUp { id: String, reply: Reply },
    EditReply { id: String, reply: Reply },
    Modal { id: String, modal: Value },
    Message { channel: String, content: String },
}

#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingMessenger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn record(&self, sent: Sent) -> PlatformResult<()> {
        self.sent.lock().unwrap().push(sent);
        Ok(())
    }

    /// Contents of every direct reply to `id`.
    pub fn replies_to(&self, id: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Reply { id: target, reply } if target == id => {
                    Some(reply.content.unwrap_or_default())
                }
                _ => None,
            })
            .collect()
    }

    pub fn follow_ups_to(&self, id: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::FollowUp { id: target, reply } if target == id => {
                    Some(reply.content.unwrap_or_default())
                }
                _ => None,
            })
            .collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Message { content, .. } => Some(content),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn reply_interaction(&self, interaction_id: &str, reply: &Reply) -> PlatformResult<()> {
        self.record(Sent::Reply {
            id: interaction_id.to_string(),
            reply: reply.clone(),
        })
    }

    async fn defer_interaction(
        &self,
        interaction_id: &str,
        ephemeral: bool,
    ) -> PlatformResult<()> {
        self.record(Sent::Defer {
            id: interaction_id.to_string(),
            ephemeral,
        })
    }

    async fn follow_up(&self, interaction_id: &str, reply: &Reply) -> PlatformResult<()> {
        self.record(Sent::FollowUp {
            id: interaction_id.to_string(),
            reply: reply.clone(),
        })
    }

    async fn edit_reply(&self, interaction_id: &str, reply: &Reply) -> PlatformResult<()> {
        self.record(Sent::EditReply {
            id: interaction_id.to_string(),
            reply: reply.clone(),
        })
    }

    async fn show_modal(&self, interaction_id: &str, modal: &Value) -> PlatformResult<()> {
        self.record(Sent::Modal {
            id: interaction_id.to_string(),
            modal: modal.clone(),
        })
    }

    async fn reply_message(
        &self,
        channel_id: &str,
        _message_id: &str,
        content: &str,
    ) -> PlatformResult<()> {
        self.record(Sent::Message {
            channel: channel_id.to_string(),
            content: content.to_string(),
        })
    }
}

/// Publisher that counts calls and fails the first `rate_limited` of them
/// with a rate limit.
#[derive(Default)]
pub struct CountingPublisher {
    calls: AtomicUsize,
    rate_limited: usize,
    pub published: Mutex<Vec<(RegistrationScope, Vec<Value>)>>,
}

impl CountingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn rate_limited(times: usize) -> Arc<Self> {
        Arc::new(Self {
            rate_limited: times,
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandPublisher for CountingPublisher {
    async fn put_commands(
        &self,
        scope: &RegistrationScope,
        commands: &[Value],
    ) -> PlatformResult<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.rate_limited {
            return Err(PlatformError::RateLimited {
                retry_after: Some(Duration::from_millis(100)),
            });
        }
        self.published
            .lock()
            .unwrap()
            .push((scope.clone(), commands.to_vec()));
        Ok(())
    }
}

/// A temporary unit tree plus a context loaded from it.
pub struct Harness {
    pub dir: TempDir,
    pub context: Arc<BotContext>,
}

impl Harness {
    pub fn config(dir: &Path) -> BotConfig {
        BotConfig {
            owner_id: Some("owner".to_string()),
            slash_dir: dir.join("slash"),
            message_dir: dir.join("message"),
            events_dir: Some(dir.join("events")),
            unit_cache_path: dir.join("command-cache.json"),
            registration_state_path: dir.join("commands-cache.json"),
            rate_limit_backoff: Duration::from_millis(50),
            ..BotConfig::default()
        }
    }

    /// Writes `files` (relative path, contents) and runs one load pass.
    pub async fn load(files: &[(&str, &str)], catalog: HandlerCatalog) -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("slash")).unwrap();
        std::fs::create_dir_all(dir.path().join("message")).unwrap();
        for (relative, contents) in files {
            let path = dir.path().join(relative);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, contents).unwrap();
        }

        let context = Arc::new(BotContext::new(Self::config(dir.path()), catalog));
        UnitLoader::new(context.clone()).load_all().await.unwrap();
        Self { dir, context }
    }
}

pub async fn wait_for_pending(context: &BotContext, count: usize) {
    while context.broker().pending_count() != count {
        tokio::task::yield_now().await;
    }
}
