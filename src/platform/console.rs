use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Messenger, PlatformResult, Reply};

/// Writes every outbound action as one JSON line on stdout.
///
/// Pairs with the JSON-lines inbound reader of the `herald run` command.
#[derive(Debug, Default)]
pub struct ConsoleMessenger;

impl ConsoleMessenger {
    pub fn new() -> Self {
        Self
    }

    fn emit(&self, line: Value) -> PlatformResult<()> {
        println!("{}", line);
        Ok(())
    }
}

#[async_trait]
impl Messenger for ConsoleMessenger {
    async fn reply_interaction(&self, interaction_id: &str, reply: &Reply) -> PlatformResult<()> {
        self.emit(json!({ "action": "reply", "interaction_id": interaction_id, "reply": reply }))
    }

    async fn defer_interaction(
        &self,
        interaction_id: &str,
        ephemeral: bool,
    ) -> PlatformResult<()> {
        self.emit(json!({ "action": "defer", "interaction_id": interaction_id, "ephemeral": ephemeral }))
    }

    async fn follow_up(&self, interaction_id: &str, reply: &Reply) -> PlatformResult<()> {
        self.emit(json!({ "action": "follow_up", "interaction_id": interaction_id, "reply": reply }))
    }

    async fn edit_reply(&self, interaction_id: &str, reply: &Reply) -> PlatformResult<()> {
        self.emit(json!({ "action": "edit_reply", "interaction_id": interaction_id, "reply": reply }))
    }

    async fn show_modal(&self, interaction_id: &str, modal: &Value) -> PlatformResult<()> {
        self.emit(json!({ "action": "show_modal", "interaction_id": interaction_id, "modal": modal }))
    }

    async fn reply_message(
        &self,
        channel_id: &str,
        message_id: &str,
        content: &str,
    ) -> PlatformResult<()> {
        self.emit(json!({
            "action": "reply_message",
            "channel_id": channel_id,
            "message_id": message_id,
            "content": content
        }))
    }
}
