//! Lifecycle Integration Tests
//!
//! These tests drive the orchestrator against a recording gateway and verify
//! the startup ordering, fault isolation and run-once guarantees.
//!
//! Run with: `cargo test --test lifecycle_tests`

use serenity::async_trait;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io::Write;

use strp_bot::commands::CommandSpec;
use strp_bot::config::{Config, Credential};
use strp_bot::error::{ExtensionError, GatewayError, StartupError};
use strp_bot::extensions::{Extension, ExtensionContext, ExtensionLoader, HandleTable};
use strp_bot::gateway::{
    CommandInvocation, CommandScope, ConnectionState, EventKind, GatewayClient, GatewayEvent,
    IncomingMessage, Notification, Presence, ReadyInfo, Reply,
};
use strp_bot::lifecycle::{LifecycleState, Orchestrator, StartupReport, Termination};

const TOKEN_VAR: &str = "STRP_LIFECYCLE_TEST_TOKEN";

// ============================================================================
// Journal
// ============================================================================

// Each #[tokio::test] runs a current-thread runtime on its own test thread,
// so a thread-local journal keeps tests apart.
thread_local! {
    static JOURNAL: RefCell<Vec<String>> = RefCell::new(Vec::new());
}

fn record(entry: impl Into<String>) {
    JOURNAL.with(|j| j.borrow_mut().push(entry.into()));
}

fn journal() -> Vec<String> {
    JOURNAL.with(|j| j.borrow().clone())
}

fn position(entry_prefix: &str) -> usize {
    journal()
        .iter()
        .position(|e| e.starts_with(entry_prefix))
        .unwrap_or_else(|| panic!("no journal entry starting with '{entry_prefix}': {:?}", journal()))
}

// ============================================================================
// Recording Gateway
// ============================================================================

struct MockGateway {
    connect_error: Option<GatewayError>,
    sync_error: Option<GatewayError>,
    presence_error: Option<GatewayError>,
    notifications: VecDeque<Notification>,
    hang_when_drained: bool,
    state: ConnectionState,
}

impl MockGateway {
    fn new() -> Self {
        Self {
            connect_error: None,
            sync_error: None,
            presence_error: None,
            notifications: VecDeque::new(),
            hang_when_drained: false,
            state: ConnectionState::Disconnected,
        }
    }

    fn failing_connect(mut self, error: GatewayError) -> Self {
        self.connect_error = Some(error);
        self
    }

    fn failing_sync(mut self, error: GatewayError) -> Self {
        self.sync_error = Some(error);
        self
    }

    fn failing_presence(mut self, error: GatewayError) -> Self {
        self.presence_error = Some(error);
        self
    }

    fn with_notifications(mut self, notifications: Vec<Notification>) -> Self {
        self.notifications = notifications.into();
        self
    }

    fn hanging(mut self) -> Self {
        self.hang_when_drained = true;
        self
    }
}

fn ready_info() -> ReadyInfo {
    ReadyInfo {
        user_name: "Space Cadet#0001".to_string(),
        guild_count: 2,
    }
}

#[async_trait]
impl GatewayClient for MockGateway {
    async fn connect(&mut self, _credential: Credential) -> Result<ReadyInfo, GatewayError> {
        record("connect");
        if let Some(error) = self.connect_error.clone() {
            self.state = ConnectionState::Failed(error.clone());
            return Err(error);
        }
        self.state = ConnectionState::Ready;
        Ok(ready_info())
    }

    async fn next_notification(&mut self) -> Notification {
        match self.notifications.pop_front() {
            Some(notification) => notification,
            None if self.hang_when_drained => std::future::pending().await,
            None => Notification::Closed(None),
        }
    }

    fn state(&self) -> ConnectionState {
        self.state.clone()
    }

    async fn sync_commands(
        &mut self,
        commands: &[CommandSpec],
        scope: CommandScope,
    ) -> Result<usize, GatewayError> {
        let names: Vec<_> = commands.iter().map(|c| c.name.as_str()).collect();
        record(format!("sync:{:?}:{}", scope, names.join(",")));
        match &self.sync_error {
            Some(error) => Err(error.clone()),
            None => Ok(commands.len()),
        }
    }

    async fn set_presence(&mut self, presence: &Presence) -> Result<(), GatewayError> {
        record(format!("presence:{}", presence.text));
        match &self.presence_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn reply(&mut self, _event: &GatewayEvent, reply: Reply) -> Result<(), GatewayError> {
        record(format!("reply:{}", reply.content));
        Ok(())
    }

    async fn send_startup_report(
        &mut self,
        channel_id: u64,
        report: &StartupReport,
    ) -> Result<(), GatewayError> {
        record(format!(
            "report:{}:{}:{}",
            channel_id,
            report.loaded().len(),
            report.failed().len()
        ));
        Ok(())
    }

    async fn disconnect(&mut self) {
        record("disconnect");
        self.state = ConnectionState::Disconnected;
    }
}

// ============================================================================
// Test Extensions
// ============================================================================

struct Echo;

#[async_trait]
impl Extension for Echo {
    async fn setup(&self, ctx: &mut ExtensionContext) -> anyhow::Result<()> {
        record(format!("load:{}", ctx.id()));
        let command = format!("echo-{}", ctx.id());
        ctx.command(CommandSpec::new(command, "Echo the command name"), echo);
        ctx.register(EventKind::Message, echo);
        Ok(())
    }
}

async fn echo(event: GatewayEvent) -> anyhow::Result<Option<Reply>> {
    let content = match event {
        GatewayEvent::Command(command) => command.name,
        GatewayEvent::Message(message) => message.content,
        GatewayEvent::Ready(_) => return Ok(None),
    };
    Ok(Some(Reply::text(content)))
}

struct Broken;

#[async_trait]
impl Extension for Broken {
    async fn setup(&self, ctx: &mut ExtensionContext) -> anyhow::Result<()> {
        record(format!("load:{}", ctx.id()));
        anyhow::bail!("points database unavailable")
    }
}

/// Subscribes to Ready and records every delivery
struct Watcher;

#[async_trait]
impl Extension for Watcher {
    async fn setup(&self, ctx: &mut ExtensionContext) -> anyhow::Result<()> {
        record(format!("load:{}", ctx.id()));
        ctx.register(EventKind::Ready, watch_ready);
        Ok(())
    }
}

async fn watch_ready(event: GatewayEvent) -> anyhow::Result<Option<Reply>> {
    if let GatewayEvent::Ready(ready) = event {
        record(format!("ready-callback:{}", ready.user_name));
    }
    Ok(Some(Reply::text("nobody to tell")))
}

/// Answers every command, not just its own
struct Chatty;

#[async_trait]
impl Extension for Chatty {
    async fn setup(&self, ctx: &mut ExtensionContext) -> anyhow::Result<()> {
        ctx.register(EventKind::Command, |_| async {
            Ok::<_, anyhow::Error>(Some(Reply::text("me too")))
        });
        Ok(())
    }
}

/// Declares a command whose callback never replies
struct Silent;

#[async_trait]
impl Extension for Silent {
    async fn setup(&self, ctx: &mut ExtensionContext) -> anyhow::Result<()> {
        ctx.command(CommandSpec::new("silent", "Says nothing"), |_| async {
            Ok::<Option<Reply>, anyhow::Error>(None)
        });
        Ok(())
    }
}

fn loader() -> ExtensionLoader {
    let mut loader = ExtensionLoader::new();
    loader
        .register("a", || Box::new(Echo))
        .register("b", || Box::new(Broken))
        .register("c", || Box::new(Echo))
        .register("watcher", || Box::new(Watcher))
        .register("chatty", || Box::new(Chatty))
        .register("silent", || Box::new(Silent));
    loader
}

fn count(entry: &str) -> usize {
    journal().iter().filter(|e| e.as_str() == entry).count()
}

// ============================================================================
// Helpers
// ============================================================================

fn config(extra: &str) -> Config {
    std::env::set_var(TOKEN_VAR, "test-token");
    Config::from_json(&format!(
        r#"{{ "status_message": "the stars", "token_env": "{TOKEN_VAR}" {extra} }}"#
    ))
    .unwrap()
}

fn orchestrator(gateway: MockGateway, descriptors: &[&str]) -> Orchestrator<MockGateway> {
    Orchestrator::new(config(""), gateway, loader(), descriptors)
}

fn message(content: &str) -> GatewayEvent {
    GatewayEvent::Message(IncomingMessage {
        message_id: 1,
        channel_id: 2,
        guild_id: Some(3),
        author_id: 4,
        author_name: "cadet".to_string(),
        content: content.to_string(),
    })
}

fn command(name: &str) -> GatewayEvent {
    GatewayEvent::Command(CommandInvocation {
        interaction_id: 10,
        token: "interaction-token".to_string(),
        name: name.to_string(),
        channel_id: 2,
        guild_id: Some(3),
        user_id: 4,
        user_name: "cadet".to_string(),
        options: HashMap::new(),
    })
}

// ============================================================================
// Configuration Failures
// ============================================================================

/// A missing config file fails before the gateway is touched
#[tokio::test]
async fn test_missing_config_never_connects() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");

    let result = Orchestrator::load(&path, MockGateway::new(), loader(), &["a"]);

    assert!(matches!(result, Err(StartupError::ConfigMissing { .. })));
    assert!(journal().is_empty(), "journal: {:?}", journal());
}

/// A malformed config reports the parse error and never connects
#[tokio::test]
async fn test_malformed_config_reports_parse_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"{ \"status_message\": \"the stars\" ,, }").unwrap();

    let result = Orchestrator::load(file.path(), MockGateway::new(), loader(), &["a"]);

    match result {
        Err(StartupError::ConfigMalformed { detail, .. }) => {
            assert!(detail.contains("line 1"), "detail was: {detail}");
        }
        Err(other) => panic!("expected ConfigMalformed, got {other:?}"),
        Ok(_) => panic!("expected ConfigMalformed, got a running orchestrator"),
    }
    assert!(!journal().contains(&"connect".to_string()));
}

/// A valid config file produces an orchestrator waiting to connect
#[tokio::test]
async fn test_load_valid_config() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(br#"{ "status_message": "the stars" }"#).unwrap();

    let orchestrator = Orchestrator::load(file.path(), MockGateway::new(), loader(), &["a"]).unwrap();

    assert_eq!(orchestrator.state(), LifecycleState::ConnectionPending);
    assert_eq!(orchestrator.config().status_message, "the stars");
}

// ============================================================================
// Connection Failures
// ============================================================================

/// connect() failing terminates the lifecycle without loading extensions
#[tokio::test]
async fn test_connect_failure_skips_extension_loading() {
    let gateway =
        MockGateway::new().failing_connect(GatewayError::Connect("invalid token".to_string()));
    let mut orchestrator = orchestrator(gateway, &["a", "b", "c"]);

    let err = orchestrator.connect().await.unwrap_err();

    assert!(matches!(err, StartupError::Connection(GatewayError::Connect(_))));
    assert_eq!(orchestrator.state(), LifecycleState::Terminated);
    assert_eq!(journal(), vec!["connect".to_string()]);
    assert!(orchestrator.table().extensions().is_empty());
    assert!(orchestrator.report().is_none());

    // Terminated is final: a late Ready does not start anything
    assert!(!orchestrator.start(ready_info()).await);
    assert!(!journal().iter().any(|e| e.starts_with("load:")));
}

/// run() surfaces the connection error as fatal
#[tokio::test]
async fn test_run_connect_failure_is_fatal() {
    let gateway =
        MockGateway::new().failing_connect(GatewayError::Connect("gateway unreachable".into()));

    let result = orchestrator(gateway, &["a"]).run(std::future::pending()).await;

    assert!(matches!(result, Err(StartupError::Connection(_))));
    assert!(!journal().iter().any(|e| e.starts_with("sync:")));
    assert!(!journal().iter().any(|e| e.starts_with("presence:")));
}

/// A missing credential fails the connection without calling the gateway
#[tokio::test]
async fn test_missing_credential_fails_connect() {
    std::env::remove_var("STRP_LIFECYCLE_TEST_UNSET_TOKEN");
    let config = Config::from_json(
        r#"{ "status_message": "x", "token_env": "STRP_LIFECYCLE_TEST_UNSET_TOKEN" }"#,
    )
    .unwrap();
    let mut orchestrator = Orchestrator::new(config, MockGateway::new(), loader(), &["a"]);

    let err = orchestrator.connect().await.unwrap_err();

    assert!(matches!(
        err,
        StartupError::Connection(GatewayError::MissingCredential(ref var))
            if var == "STRP_LIFECYCLE_TEST_UNSET_TOKEN"
    ));
    assert!(journal().is_empty());
    assert_eq!(orchestrator.state(), LifecycleState::Terminated);
}

// ============================================================================
// Startup Sequence
// ============================================================================

/// [A, B, C] with B failing → [Loaded(A), Failed(B), Loaded(C)] and Running
#[tokio::test]
async fn test_failing_extension_is_isolated() {
    let mut orchestrator = orchestrator(MockGateway::new(), &["a", "b", "c"]);

    let ready = orchestrator.connect().await.unwrap();
    assert_eq!(orchestrator.state(), LifecycleState::Starting);
    assert!(orchestrator.start(ready).await);

    let report = orchestrator.report().unwrap();
    let ids: Vec<_> = report.extensions.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert!(report.extensions[0].is_loaded());
    match report.extensions[1].failure() {
        Some(ExtensionError::Setup { id, source }) => {
            assert_eq!(id, "b");
            assert!(source.to_string().contains("points database unavailable"));
        }
        other => panic!("expected setup failure for b, got {other:?}"),
    }
    assert!(report.extensions[2].is_loaded());

    assert_eq!(orchestrator.state(), LifecycleState::Running);
    assert!(position("load:a") < position("load:b"));
    assert!(position("load:b") < position("load:c"));
}

/// Presence is only set after extension loading and command sync
#[tokio::test]
async fn test_startup_order() {
    let mut orchestrator = orchestrator(MockGateway::new(), &["a", "b", "c"]);

    let ready = orchestrator.connect().await.unwrap();
    orchestrator.start(ready).await;

    assert!(position("load:c") < position("sync:"));
    assert!(position("sync:") < position("presence:"));

    // The synced registry contains the commands of every loaded extension
    assert!(journal().contains(&"sync:Global:echo-a,echo-c".to_string()));
    assert!(journal().contains(&"presence:the stars".to_string()));
    assert_eq!(*orchestrator.report().unwrap().synced_commands.as_ref().unwrap(), 2);
}

/// Sync and presence failures are reported but Running is still reached
#[tokio::test]
async fn test_sync_and_presence_failures_are_not_fatal() {
    let gateway = MockGateway::new()
        .failing_sync(GatewayError::Sync("rate limited".into()))
        .failing_presence(GatewayError::Presence("shard not ready".into()));
    let mut orchestrator = orchestrator(gateway, &["a"]);

    let ready = orchestrator.connect().await.unwrap();
    orchestrator.start(ready).await;

    let report = orchestrator.report().unwrap();
    assert!(report.synced_commands.is_err());
    assert!(report.presence.is_err());
    assert_eq!(orchestrator.state(), LifecycleState::Running);

    // Presence is still attempted after a failed sync
    assert!(position("sync:") < position("presence:"));
}

/// Dev mode guild scopes the command registry
#[tokio::test]
async fn test_guild_scoped_sync() {
    let config = config(r#", "guild_id": "1234""#);
    let mut orchestrator = Orchestrator::new(config, MockGateway::new(), loader(), &["a"]);

    let ready = orchestrator.connect().await.unwrap();
    orchestrator.start(ready).await;

    assert!(journal().contains(&"sync:Guild(1234):echo-a".to_string()));
}

/// The startup report goes to the configured channel after presence
#[tokio::test]
async fn test_startup_report_sent_when_configured() {
    let config = config(r#", "startup_channel_id": "42""#);
    let mut orchestrator = Orchestrator::new(config, MockGateway::new(), loader(), &["a", "b"]);

    let ready = orchestrator.connect().await.unwrap();
    orchestrator.start(ready).await;

    assert!(journal().contains(&"report:42:1:1".to_string()));
    assert!(position("presence:") < position("report:"));
}

/// Without a startup channel no report is sent
#[tokio::test]
async fn test_no_startup_report_by_default() {
    let mut orchestrator = orchestrator(MockGateway::new(), &["a"]);

    let ready = orchestrator.connect().await.unwrap();
    orchestrator.start(ready).await;

    assert!(!journal().iter().any(|e| e.starts_with("report:")));
}

/// Every descriptor list yields one result per entry, in order
#[tokio::test]
async fn test_results_match_descriptors() {
    let lists: Vec<Vec<&str>> = vec![
        vec![],
        vec!["b"],
        vec!["missing", "a"],
        vec!["c", "b", "a", "missing"],
        vec!["a", "a", "b"],
    ];

    for descriptors in lists {
        let mut table = HandleTable::new();
        let results = loader().load_all(descriptors.as_slice(), &mut table).await;

        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, descriptors);
    }
}

// ============================================================================
// Re-entrancy
// ============================================================================

/// A second Ready never re-runs the startup sequence
#[tokio::test]
async fn test_second_ready_does_not_double_register() {
    let mut orchestrator = orchestrator(MockGateway::new(), &["a", "c"]);

    let ready = orchestrator.connect().await.unwrap();
    assert!(orchestrator.start(ready.clone()).await);
    let handles = orchestrator.table().len();

    assert!(!orchestrator.start(ready).await);

    assert_eq!(orchestrator.table().len(), handles);
    assert_eq!(orchestrator.table().handles_owned_by("a"), 2);
    assert_eq!(journal().iter().filter(|e| e.starts_with("load:")).count(), 2);
    assert_eq!(journal().iter().filter(|e| e.starts_with("sync:")).count(), 1);
}

/// A reconnect during run() neither reloads extensions nor duplicates replies
#[tokio::test]
async fn test_reconnect_during_run() {
    let gateway = MockGateway::new().with_notifications(vec![
        Notification::Ready(ready_info()),
        Notification::Event(command("echo-a")),
        Notification::Closed(None),
    ]);

    let termination = orchestrator(gateway, &["a", "c"])
        .run(std::future::pending())
        .await
        .unwrap();

    assert_eq!(termination, Termination::Disconnected);
    assert_eq!(journal().iter().filter(|e| e.starts_with("load:")).count(), 2);
    assert_eq!(journal().iter().filter(|e| e.starts_with("presence:")).count(), 1);
    assert_eq!(
        journal().iter().filter(|e| e.as_str() == "reply:echo-a").count(),
        1
    );
}

// ============================================================================
// Running
// ============================================================================

/// Events reach every subscribed extension, replies go back through the gateway
#[tokio::test]
async fn test_events_dispatched_while_running() {
    let gateway = MockGateway::new().with_notifications(vec![
        Notification::Event(message("hello")),
        Notification::Event(command("echo-c")),
        Notification::Event(command("unknown")),
    ]);

    let termination = orchestrator(gateway, &["a", "b", "c"])
        .run(std::future::pending())
        .await
        .unwrap();

    assert_eq!(termination, Termination::Disconnected);
    // Both echo extensions answer the message, only c answers its command
    assert_eq!(
        journal().iter().filter(|e| e.as_str() == "reply:hello").count(),
        2
    );
    assert_eq!(
        journal().iter().filter(|e| e.as_str() == "reply:echo-c").count(),
        1
    );
    assert!(!journal().iter().any(|e| e.as_str() == "reply:unknown"));
    assert_eq!(
        count("reply:Sorry, /unknown failed to respond. Please try again later."),
        1
    );
}

/// Ready reaches extensions after startup and again on every reconnect
#[tokio::test]
async fn test_ready_callbacks_fire_after_start_and_on_reconnect() {
    let gateway = MockGateway::new().with_notifications(vec![
        Notification::Ready(ready_info()),
        Notification::Ready(ready_info()),
    ]);

    let termination = orchestrator(gateway, &["watcher", "a"])
        .run(std::future::pending())
        .await
        .unwrap();

    assert_eq!(termination, Termination::Disconnected);
    assert_eq!(count("load:watcher"), 1);
    assert_eq!(count("ready-callback:Space Cadet#0001"), 3);
    assert!(position("presence:") < position("ready-callback:"));
    // Ready has no channel, replies to it are dropped
    assert!(!journal().iter().any(|e| e.starts_with("reply:")));
}

/// Ready callbacks are registered once and fire once per Ready
#[tokio::test]
async fn test_ready_callback_not_reregistered() {
    let mut orchestrator = orchestrator(MockGateway::new(), &["watcher"]);

    let ready = orchestrator.connect().await.unwrap();
    assert!(orchestrator.start(ready.clone()).await);
    assert_eq!(count("ready-callback:Space Cadet#0001"), 1);

    // A skipped start does not deliver the Ready by itself
    assert!(!orchestrator.start(ready.clone()).await);
    assert_eq!(count("ready-callback:Space Cadet#0001"), 1);

    orchestrator.dispatch(GatewayEvent::Ready(ready)).await;
    assert_eq!(count("ready-callback:Space Cadet#0001"), 2);
    assert_eq!(orchestrator.table().handles_owned_by("watcher"), 1);
}

/// A command answered by several callbacks gets a single response
#[tokio::test]
async fn test_command_gets_only_first_reply() {
    let mut orchestrator = orchestrator(MockGateway::new(), &["a", "chatty"]);

    let ready = orchestrator.connect().await.unwrap();
    orchestrator.start(ready).await;
    orchestrator.dispatch(command("echo-a")).await;

    let replies: Vec<_> = journal()
        .into_iter()
        .filter(|e| e.starts_with("reply:"))
        .collect();
    assert_eq!(replies, vec!["reply:echo-a".to_string()]);

    // Messages are not interactions, every reply is delivered
    orchestrator.dispatch(message("hello")).await;
    assert_eq!(count("reply:hello"), 1);
}

/// A command nobody answered still gets a response
#[tokio::test]
async fn test_unanswered_command_gets_error_reply() {
    let mut orchestrator = orchestrator(MockGateway::new(), &["silent"]);

    let ready = orchestrator.connect().await.unwrap();
    orchestrator.start(ready).await;
    orchestrator.dispatch(command("silent")).await;

    assert_eq!(
        count("reply:Sorry, /silent failed to respond. Please try again later."),
        1
    );
}

/// Nothing is dispatched before the startup sequence finished
#[tokio::test]
async fn test_no_dispatch_before_running() {
    let mut orchestrator = orchestrator(MockGateway::new(), &["a"]);

    orchestrator.dispatch(message("too early")).await;
    let ready = orchestrator.connect().await.unwrap();
    orchestrator.dispatch(message("still too early")).await;
    orchestrator.start(ready).await;
    orchestrator.dispatch(message("on time")).await;

    let replies: Vec<_> = journal()
        .into_iter()
        .filter(|e| e.starts_with("reply:"))
        .collect();
    assert_eq!(replies, vec!["reply:on time".to_string()]);
}

/// An external shutdown disconnects and terminates
#[tokio::test]
async fn test_shutdown_signal_terminates() {
    let gateway = MockGateway::new().hanging();

    let termination = orchestrator(gateway, &["a"]).run(async {}).await.unwrap();

    assert_eq!(termination, Termination::Shutdown);
    assert_eq!(journal().last().map(String::as_str), Some("disconnect"));
}

/// An unrecoverable connection error terminates the lifecycle
#[tokio::test]
async fn test_connection_lost_terminates() {
    let error = GatewayError::Closed("invalid session".to_string());
    let gateway = MockGateway::new().with_notifications(vec![
        Notification::Closed(Some(error.clone())),
        Notification::Event(message("never delivered")),
    ]);

    let termination = orchestrator(gateway, &["a"])
        .run(std::future::pending())
        .await
        .unwrap();

    assert_eq!(termination, Termination::ConnectionLost(error));
    assert!(!journal().iter().any(|e| e.starts_with("reply:")));
}
