mod common;

use async_trait::async_trait;
use common::{Harness, RecordingMessenger, Sent};
use herald::{
    dispatch::ERROR_REPLY,
    platform::{InboundEvent, IncomingMessage, Reply, SlashInvocation, User},
    Denial, DispatchOutcome, Dispatcher, EventListener, HandlerCatalog, HandlerResult,
    InteractionContext, MessageContext, MessageHandler, PermissionSet, SlashHandler,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

struct Echo;

#[async_trait]
impl MessageHandler for Echo {
    async fn invoke(&self, ctx: &MessageContext, args: &[String]) -> HandlerResult {
        ctx.reply(&format!("echo: {}", args.join(","))).await?;
        Ok(())
    }
}

struct Acknowledge;

#[async_trait]
impl SlashHandler for Acknowledge {
    async fn invoke(&self, ctx: &InteractionContext) -> HandlerResult {
        ctx.reply(Reply::ephemeral("ok")).await?;
        Ok(())
    }
}

struct FailAfterReply;

#[async_trait]
impl SlashHandler for FailAfterReply {
    async fn invoke(&self, ctx: &InteractionContext) -> HandlerResult {
        ctx.reply(Reply::text("working on it")).await?;
        anyhow::bail!("database unavailable")
    }
}

struct FailAfterDefer;

#[async_trait]
impl SlashHandler for FailAfterDefer {
    async fn invoke(&self, ctx: &InteractionContext) -> HandlerResult {
        ctx.defer(true).await?;
        anyhow::bail!("upstream timed out")
    }
}

struct FailImmediately;

#[async_trait]
impl SlashHandler for FailImmediately {
    async fn invoke(&self, _ctx: &InteractionContext) -> HandlerResult {
        anyhow::bail!("nothing works")
    }
}

struct Panics;

#[async_trait]
impl SlashHandler for Panics {
    async fn invoke(&self, ctx: &InteractionContext) -> HandlerResult {
        if ctx.user().id.is_empty() {
            return Ok(());
        }
        panic!("handler bug");
    }
}

#[derive(Default)]
struct CountEvents(Arc<AtomicUsize>);

#[async_trait]
impl EventListener for CountEvents {
    async fn handle(&self, _event: &str, _payload: &Value) -> HandlerResult {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn catalog(events: CountEvents) -> HandlerCatalog {
    let mut catalog = HandlerCatalog::new();
    catalog
        .register_message("echo", Echo)
        .register_slash("ack", Acknowledge)
        .register_slash("fail-after-reply", FailAfterReply)
        .register_slash("fail-after-defer", FailAfterDefer)
        .register_slash("fail", FailImmediately)
        .register_slash("panic", Panics)
        .register_listener("count", events);
    catalog
}

fn slash_record(name: &str, handler: &str, extra: Value) -> String {
    let mut record = json!({
        "data": { "name": name, "description": format!("{} command", name) },
        "handler": handler
    });
    if let (Some(record), Some(extra)) = (record.as_object_mut(), extra.as_object()) {
        record.extend(extra.clone());
    }
    record.to_string()
}

async fn harness() -> (Harness, Arc<AtomicUsize>) {
    let events = Arc::new(AtomicUsize::new(0));
    let files = vec![
        (
            "message/echo.json".to_string(),
            json!({ "name": "echo", "aliases": ["e"], "handler": "echo" }).to_string(),
        ),
        (
            "slash/admin.json".to_string(),
            slash_record(
                "admin",
                "ack",
                json!({ "ownerOnly": true, "permissions": ["ManageGuild"] }),
            ),
        ),
        (
            "slash/moderate.json".to_string(),
            slash_record("moderate", "ack", json!({ "permissions": ["KickMembers"] })),
        ),
        (
            "slash/report.json".to_string(),
            slash_record("report", "fail-after-reply", json!({})),
        ),
        (
            "slash/deferred.json".to_string(),
            slash_record("deferred", "fail-after-defer", json!({})),
        ),
        (
            "slash/broken.json".to_string(),
            slash_record("broken", "fail", json!({})),
        ),
        (
            "slash/crash.json".to_string(),
            slash_record("crash", "panic", json!({})),
        ),
        (
            "events/ready.json".to_string(),
            json!({ "name": "ready", "once": true, "handler": "count" }).to_string(),
        ),
    ];
    let files: Vec<(&str, &str)> = files
        .iter()
        .map(|(path, contents)| (path.as_str(), contents.as_str()))
        .collect();
    (
        Harness::load(&files, catalog(CountEvents(events.clone()))).await,
        events,
    )
}

fn slash(id: &str, command: &str, user: &str, permissions: Option<&[&str]>) -> SlashInvocation {
    SlashInvocation {
        id: id.to_string(),
        command_name: command.to_string(),
        user: User::new(user),
        member_permissions: permissions.map(|p| p.iter().copied().collect::<PermissionSet>()),
        channel_id: Some("general".to_string()),
        options: Value::Null,
    }
}

fn message(content: &str, author: User) -> IncomingMessage {
    IncomingMessage {
        id: "m1".to_string(),
        channel_id: "general".to_string(),
        content: content.to_string(),
        author,
        member_permissions: None,
    }
}

#[tokio::test]
async fn test_ownership_denial_precedes_permission_denial() {
    let (harness, _) = harness().await;
    let messenger = RecordingMessenger::new();
    let dispatcher = Dispatcher::new(harness.context.clone(), messenger.clone());

    let outcome = dispatcher
        .handle_slash(slash("i1", "admin", "stranger", None))
        .await;
    assert_eq!(outcome, DispatchOutcome::Denied(Denial::OwnerOnly));
    assert_eq!(
        messenger.sent(),
        vec![Sent::Reply {
            id: "i1".to_string(),
            reply: Reply::ephemeral("This command is restricted to the bot owner."),
        }]
    );
    assert!(harness.context.cooldowns().is_empty());
}

#[tokio::test]
async fn test_permission_gate() {
    let (harness, _) = harness().await;
    let messenger = RecordingMessenger::new();
    let dispatcher = Dispatcher::new(harness.context.clone(), messenger.clone());

    let outcome = dispatcher
        .handle_slash(slash("i1", "moderate", "u1", Some(&["SendMessages"])))
        .await;
    assert_eq!(outcome, DispatchOutcome::Denied(Denial::MissingPermissions));

    let outcome = dispatcher
        .handle_slash(slash("i2", "moderate", "u1", None))
        .await;
    assert_eq!(outcome, DispatchOutcome::Denied(Denial::MissingPermissions));

    let outcome = dispatcher
        .handle_slash(slash("i3", "moderate", "u1", Some(&["KickMembers"])))
        .await;
    assert_eq!(outcome, DispatchOutcome::Completed);
    assert_eq!(
        messenger.replies_to("i1"),
        vec!["You do not have permission to use this command.".to_string()]
    );
    assert_eq!(messenger.replies_to("i3"), vec!["ok".to_string()]);
}

#[tokio::test]
async fn test_owner_passes_all_gates() {
    let (harness, _) = harness().await;
    let messenger = RecordingMessenger::new();
    let dispatcher = Dispatcher::new(harness.context.clone(), messenger.clone());

    let outcome = dispatcher
        .handle_slash(slash("i1", "admin", "owner", Some(&["ManageGuild"])))
        .await;
    assert_eq!(outcome, DispatchOutcome::Completed);
    assert_eq!(messenger.replies_to("i1"), vec!["ok".to_string()]);
}

#[tokio::test]
async fn test_prefixed_cooldown_is_shared_by_aliases() {
    let (harness, _) = harness().await;
    let messenger = RecordingMessenger::new();
    let dispatcher = Dispatcher::new(harness.context.clone(), messenger.clone());

    let first = dispatcher
        .handle_message(message("!e extra  args", User::new("u1")))
        .await;
    assert_eq!(first, DispatchOutcome::Completed);

    let second = dispatcher
        .handle_message(message("!echo again", User::new("u1")))
        .await;
    assert!(matches!(
        second,
        DispatchOutcome::Denied(Denial::Cooldown { .. })
    ));

    let other_user = dispatcher
        .handle_message(message("!echo hi", User::new("u2")))
        .await;
    assert_eq!(other_user, DispatchOutcome::Completed);

    assert_eq!(
        messenger.messages(),
        vec![
            "echo: extra,args".to_string(),
            "Please wait 3.0 seconds before reusing `echo`.".to_string(),
            "echo: hi".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_messages_that_are_not_commands_are_ignored() {
    let (harness, _) = harness().await;
    let messenger = RecordingMessenger::new();
    let dispatcher = Dispatcher::new(harness.context.clone(), messenger.clone());

    let bot = User {
        id: "bot".to_string(),
        bot: true,
    };
    assert_eq!(
        dispatcher.handle_message(message("!echo hi", bot)).await,
        DispatchOutcome::Ignored
    );
    assert_eq!(
        dispatcher
            .handle_message(message("good morning", User::new("u1")))
            .await,
        DispatchOutcome::Ignored
    );
    assert!(messenger.sent().is_empty());
    assert!(harness.context.cooldowns().is_empty());
}

#[tokio::test]
async fn test_unknown_structured_command_has_no_reply() {
    let (harness, _) = harness().await;
    let messenger = RecordingMessenger::new();
    let dispatcher = Dispatcher::new(harness.context.clone(), messenger.clone());

    let outcome = dispatcher
        .handle_slash(slash("i1", "vanished", "u1", None))
        .await;
    assert_eq!(outcome, DispatchOutcome::Unresolved);
    assert!(messenger.sent().is_empty());
}

#[tokio::test]
async fn test_failure_after_reply_sends_one_follow_up() {
    let (harness, _) = harness().await;
    let messenger = RecordingMessenger::new();
    let dispatcher = Dispatcher::new(harness.context.clone(), messenger.clone());

    let outcome = dispatcher
        .handle_slash(slash("i1", "report", "u1", None))
        .await;
    assert_eq!(outcome, DispatchOutcome::Failed);
    assert_eq!(messenger.replies_to("i1"), vec!["working on it".to_string()]);
    assert_eq!(messenger.follow_ups_to("i1"), vec![ERROR_REPLY.to_string()]);
    assert_eq!(messenger.sent().len(), 2);
}

#[tokio::test]
async fn test_failure_after_defer_sends_one_follow_up() {
    let (harness, _) = harness().await;
    let messenger = RecordingMessenger::new();
    let dispatcher = Dispatcher::new(harness.context.clone(), messenger.clone());

    let outcome = dispatcher
        .handle_slash(slash("i1", "deferred", "u1", None))
        .await;
    assert_eq!(outcome, DispatchOutcome::Failed);
    assert!(messenger.replies_to("i1").is_empty());
    assert_eq!(messenger.follow_ups_to("i1"), vec![ERROR_REPLY.to_string()]);
}

#[tokio::test]
async fn test_failure_before_reply_sends_one_reply() {
    let (harness, _) = harness().await;
    let messenger = RecordingMessenger::new();
    let dispatcher = Dispatcher::new(harness.context.clone(), messenger.clone());

    let outcome = dispatcher
        .handle_slash(slash("i1", "broken", "u1", None))
        .await;
    assert_eq!(outcome, DispatchOutcome::Failed);
    assert_eq!(
        messenger.sent(),
        vec![Sent::Reply {
            id: "i1".to_string(),
            reply: Reply::ephemeral(ERROR_REPLY),
        }]
    );
}

#[tokio::test]
async fn test_panicking_handler_is_contained() {
    let (harness, _) = harness().await;
    let messenger = RecordingMessenger::new();
    let dispatcher = Dispatcher::new(harness.context.clone(), messenger.clone());

    let outcome = dispatcher
        .handle_slash(slash("i1", "crash", "u1", None))
        .await;
    assert_eq!(outcome, DispatchOutcome::Failed);
    assert_eq!(messenger.replies_to("i1"), vec![ERROR_REPLY.to_string()]);
}

#[tokio::test]
async fn test_platform_events_reach_listeners() {
    let (harness, events) = harness().await;
    let dispatcher = Dispatcher::new(harness.context.clone(), RecordingMessenger::new());

    for _ in 0..3 {
        let event: InboundEvent =
            serde_json::from_value(json!({ "type": "event", "name": "ready" })).unwrap();
        assert_eq!(dispatcher.dispatch(event).await, DispatchOutcome::Completed);
    }
    assert_eq!(events.load(Ordering::SeqCst), 1);
}
