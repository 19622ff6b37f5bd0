//! End-to-end tests for registration, dispatch and readiness.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use courier_core::{
    ApiError, ApiResult, BotInfo, BoxedClient, BoxedEvent, Client, CommandRegistry, CommandsInfo,
    MessageCreated, MessageTarget, RawUpdate, Subscription, UpdateType,
};
use courier_framework::{
    Command, Data, DispatchError, Dispatcher, FilterResult, Next, Outcome, ReadyError, Router,
    Routing, filter_async, filter_fn, middleware_fn,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio_test::{assert_err, assert_ok};

// ============================================================================
// Test doubles
// ============================================================================

#[derive(Default)]
struct MockClient {
    commands: CommandRegistry,
    subscriptions: Vec<Subscription>,
    fail_subscriptions: bool,
    fail_me: bool,
    auto_check: bool,
    me_calls: AtomicUsize,
    subscription_calls: AtomicUsize,
    sent: Mutex<Vec<(MessageTarget, String)>>,
}

impl MockClient {
    fn new() -> Self {
        Self {
            auto_check: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl Client for MockClient {
    async fn get_me(&self) -> ApiResult<BotInfo> {
        self.me_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_me {
            return Err(ApiError::Platform {
                code: 401,
                message: "invalid token".into(),
            });
        }
        Ok(BotInfo {
            user_id: 42,
            name: "courier".into(),
            username: Some("courier_bot".into()),
        })
    }

    async fn get_subscriptions(&self) -> ApiResult<Vec<Subscription>> {
        self.subscription_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_subscriptions {
            return Err(ApiError::Timeout);
        }
        Ok(self.subscriptions.clone())
    }

    async fn send_message(&self, target: MessageTarget, text: &str) -> ApiResult<Value> {
        self.sent.lock().push((target, text.to_string()));
        Ok(json!({"ok": true}))
    }

    async fn call_api(&self, _method: &str, _params: Value) -> ApiResult<Value> {
        Err(ApiError::NotConnected)
    }

    fn auto_check_subscriptions(&self) -> bool {
        self.auto_check
    }

    fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

fn message(text: &str) -> BoxedEvent {
    BoxedEvent::new(MessageCreated::text(100, 7, text))
}

fn tagged(tag: &'static str) -> impl Fn() -> std::future::Ready<&'static str> + Clone + Send + Sync {
    move || std::future::ready(tag)
}

// ============================================================================
// Dispatch order
// ============================================================================

#[tokio::test]
async fn test_dispatcher_handlers_come_before_child_routers() {
    let mut r1 = Router::with_id("r1");
    r1.message_created().handler(tagged("r1"));
    let mut r2 = Router::with_id("r2");
    r2.message_created().handler(tagged("r2"));

    let mut dp = Dispatcher::new();
    dp.include_routers([r1, r2]);
    // Registered after the include: still tried first.
    dp.message_created()
        .filter(filter_fn(|e| e.text() == Some("root")))
        .handler(tagged("root"));

    assert_eq!(dp.dispatch(message("root")).await.unwrap(), Outcome::Handled(json!("root")));
    assert_eq!(dp.dispatch(message("other")).await.unwrap(), Outcome::Handled(json!("r1")));
    assert_eq!(dp.router_count(), 3);
}

#[tokio::test]
async fn test_routers_are_tried_in_include_order() {
    let mut first = Router::with_id("first");
    first
        .message_created()
        .filter(filter_fn(|e| e.text() == Some("a")))
        .handler(tagged("first"));
    let mut second = Router::with_id("second");
    second.message_created().handler(tagged("second:1"));
    second.message_created().handler(tagged("second:2"));

    let mut dp = Dispatcher::new();
    dp.include_router(first).include_router(second);

    assert_eq!(dp.dispatch(message("a")).await.unwrap(), Outcome::Handled(json!("first")));
    assert_eq!(dp.dispatch(message("b")).await.unwrap(), Outcome::Handled(json!("second:1")));
}

#[tokio::test]
async fn test_unmatched_kind_is_a_no_op() {
    let mut dp = Dispatcher::new();
    dp.message_created().handler(tagged("message"));

    let outcome = dp
        .dispatch(BoxedEvent::new(RawUpdate::new(UpdateType::ChatTitleChanged)))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Unhandled);
}

// ============================================================================
// Filters
// ============================================================================

#[tokio::test]
async fn test_rejecting_base_filter_preempts_handler_filters() {
    let handler_filter_calls = Arc::new(AtomicUsize::new(0));
    let calls = Arc::clone(&handler_filter_calls);

    let mut gated = Router::with_id("gated");
    gated.filter(filter_fn(|_| false));
    gated
        .message_created()
        .filter(filter_fn(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            true
        }))
        .handler(tagged("gated"));

    let mut open = Router::with_id("open");
    open.message_created().handler(tagged("open"));

    let mut dp = Dispatcher::new();
    dp.include_routers([gated, open]);

    assert_eq!(dp.dispatch(message("x")).await.unwrap(), Outcome::Handled(json!("open")));
    assert_eq!(handler_filter_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_rejecting_handler_filter_skips_only_that_handler() {
    let mut router = Router::new();
    router
        .message_created()
        .filter(filter_fn(|_| false))
        .handler(tagged("skipped"));
    router.message_created().handler(tagged("sibling"));

    let mut dp = Dispatcher::new();
    dp.include_router(router);

    assert_eq!(dp.dispatch(message("x")).await.unwrap(), Outcome::Handled(json!("sibling")));
}

#[tokio::test]
async fn test_filter_data_merges_last_write_wins() {
    let mut dp = Dispatcher::new();
    dp.filter(filter_async(|_| async {
        let mut map = serde_json::Map::new();
        map.insert("who".into(), json!("base"));
        map.insert("base_only".into(), json!(1));
        Ok(FilterResult::Match(map))
    }));
    dp.message_created()
        .filter(filter_async(|_| async { Ok(FilterResult::with("who", "handler")) }))
        .handler(|data: Data| async move {
            json!([data.get_str("who"), data.get_as::<i64>("base_only")])
        });

    assert_eq!(
        dp.dispatch(message("x")).await.unwrap(),
        Outcome::Handled(json!(["handler", 1]))
    );
}

// ============================================================================
// Middleware
// ============================================================================

fn recorder(log: Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> impl courier_framework::Middleware {
    middleware_fn(move |next: Next, event: BoxedEvent, data: Data| {
        let log = Arc::clone(&log);
        async move {
            log.lock().push(name);
            next.run(event, data).await
        }
    })
}

#[tokio::test]
async fn test_outer_middleware_runs_before_inner_regardless_of_registration_order() {
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut dp = Dispatcher::new();
    dp.middleware(recorder(log.clone(), "inner"));
    dp.outer_middleware(recorder(log.clone(), "outer"));
    let handler_log = log.clone();
    dp.message_created().handler(move || {
        let log = handler_log.clone();
        async move { log.lock().push("handler") }
    });

    dp.dispatch(message("x")).await.unwrap();
    assert_eq!(*log.lock(), vec!["outer", "inner", "handler"]);
}

#[tokio::test]
async fn test_outer_middleware_runs_without_match_and_inner_does_not() {
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut dp = Dispatcher::new();
    dp.outer_middleware(recorder(log.clone(), "outer"));
    dp.middleware(recorder(log.clone(), "inner"));
    dp.bot_started().handler(tagged("started"));

    let outcome = dp.dispatch(message("x")).await.unwrap();
    assert_eq!(outcome, Outcome::Unhandled);
    assert_eq!(*log.lock(), vec!["outer"]);
}

#[tokio::test]
async fn test_router_middlewares_wrap_only_their_router() {
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut first = Router::with_id("first");
    first.outer_middleware(recorder(log.clone(), "first:outer"));
    first.middleware(recorder(log.clone(), "first:inner"));
    first
        .message_created()
        .filter(filter_fn(|_| false))
        .handler(tagged("never"));

    let mut second = Router::with_id("second");
    second.outer_middleware(recorder(log.clone(), "second:outer"));
    second.middleware(recorder(log.clone(), "second:inner"));
    second.message_created().handler(tagged("second"));

    let mut dp = Dispatcher::new();
    dp.middleware(recorder(log.clone(), "dp:inner"));
    dp.include_routers([first, second]);

    assert_eq!(dp.dispatch(message("x")).await.unwrap(), Outcome::Handled(json!("second")));
    assert_eq!(
        *log.lock(),
        vec!["first:outer", "second:outer", "dp:inner", "second:inner"]
    );
}

#[tokio::test]
async fn test_middleware_short_circuit_returns_its_value() {
    let mut dp = Dispatcher::new();
    dp.outer_middleware(middleware_fn(|_next: Next, _event, _data| async {
        Ok(Outcome::Handled(json!("throttled")))
    }));
    dp.message_created().handler(tagged("handler"));

    assert_eq!(
        dp.dispatch(message("x")).await.unwrap(),
        Outcome::Handled(json!("throttled"))
    );
}

#[tokio::test]
async fn test_handler_error_surfaces_from_dispatch() {
    let mut dp = Dispatcher::new();
    dp.message_created()
        .handler(|| async { Err::<(), _>(ApiError::Other("send failed".into())) });

    let err = assert_err!(dp.dispatch(message("x")).await);
    assert!(matches!(err, DispatchError::Handler(_)));
}

// ============================================================================
// Contexts
// ============================================================================

#[tokio::test]
async fn test_one_context_per_conversation() {
    let mut dp = Dispatcher::new();
    dp.message_created().handler(tagged("ok"));

    let pairs = [(1, 1), (1, 2), (2, 1), (1, 1), (2, 1)];
    for (chat, user) in pairs {
        dp.dispatch(BoxedEvent::new(MessageCreated::text(chat, user, "x")))
            .await
            .unwrap();
    }
    assert_eq!(dp.contexts().len(), 3);

    let a = dp.contexts().get_or_create(Some(1), Some(1));
    let b = dp.contexts().get_or_create(Some(1), Some(1));
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(dp.contexts().len(), 3);
}

#[tokio::test]
async fn test_context_state_persists_between_events() {
    let mut dp = Dispatcher::new();
    dp.message_created()
        .command(Command::new(["name"]))
        .handler(|ctx: Arc<courier_framework::Context>| async move {
            ctx.set_state(Some("awaiting_name"));
            "What is your name?"
        });
    dp.message_created()
        .filter(filter_fn(|_| true))
        .handler(|ctx: Arc<courier_framework::Context>, event: BoxedEvent| async move {
            match ctx.state().as_deref() {
                Some("awaiting_name") => {
                    ctx.set_state(None);
                    format!("Nice to meet you, {}", event.text().unwrap_or_default())
                }
                _ => "Say /name first".to_string(),
            }
        });

    dp.dispatch(message("/name")).await.unwrap();
    let outcome = dp.dispatch(message("Ann")).await.unwrap();
    assert_eq!(outcome, Outcome::Handled(json!("Nice to meet you, Ann")));
    let outcome = dp.dispatch(message("Ann")).await.unwrap();
    assert_eq!(outcome, Outcome::Handled(json!("Say /name first")));
}

// ============================================================================
// Readiness
// ============================================================================

#[tokio::test]
async fn test_ready_binds_client_and_collects_commands() {
    let client = Arc::new(MockClient::new());
    let boxed: BoxedClient = client.clone();

    let mut r1 = Router::with_id("r1");
    r1.on(UpdateType::OnStarted)
        .command(Command::new(["start"]))
        .doc("\n        commands_info: Запустить бота\n        ")
        .handler(|| async {});

    let mut dp = Dispatcher::new();
    dp.include_router(r1);

    assert!(dp.routers()[0].client().is_none());
    assert!(client.commands().is_empty());

    let me = dp.ready(boxed).await.unwrap();
    assert_eq!(me.user_id, 42);
    assert_eq!(dp.me(), Some(me));
    assert!(dp.client().is_some());
    assert!(dp.routers()[0].client().is_some());
    assert_eq!(
        client.commands().snapshot(),
        vec![CommandsInfo::new(vec!["start".into()], Some("Запустить бота".into()))]
    );
}

#[tokio::test]
async fn test_commands_follow_router_then_handler_order() {
    let client = Arc::new(MockClient::new());

    let mut r1 = Router::with_id("r1");
    r1.started()
        .command(Command::new(["a"]))
        .info("info1")
        .handler(|| async {});
    let mut r2 = Router::with_id("r2");
    r2.started()
        .command(Command::new(["b", "c"]))
        .info("info2")
        .handler(|| async {});

    let mut dp = Dispatcher::new();
    dp.include_routers([r1, r2]);
    dp.ready(client.clone()).await.unwrap();

    assert_eq!(
        client.commands().snapshot(),
        vec![
            CommandsInfo::new(vec!["a".into()], Some("info1".into())),
            CommandsInfo::new(vec!["b".into(), "c".into()], Some("info2".into())),
        ]
    );
}

#[tokio::test]
async fn test_handler_without_commands_or_doc_adds_nothing_but_still_dispatches() {
    let client = Arc::new(MockClient::new());

    let mut router = Router::with_id("plain");
    router.message_created().handler(tagged("plain"));

    let mut dp = Dispatcher::new();
    dp.include_router(router);
    dp.ready(client.clone()).await.unwrap();

    assert!(client.commands().is_empty());
    assert_eq!(dp.dispatch(message("x")).await.unwrap(), Outcome::Handled(json!("plain")));
}

#[tokio::test]
async fn test_ready_is_idempotent() {
    let client = Arc::new(MockClient::new());
    let started = Arc::new(AtomicUsize::new(0));
    let started_count = Arc::clone(&started);

    let mut dp = Dispatcher::new();
    dp.message_created()
        .command(Command::new(["help"]))
        .info("Show help")
        .handler(tagged("help"));
    dp.include_router(Router::with_id("child"));
    dp.on_started(move || {
        let started = Arc::clone(&started_count);
        async move {
            started.fetch_add(1, Ordering::SeqCst);
        }
    });

    dp.ready(client.clone()).await.unwrap();
    dp.ready(client.clone()).await.unwrap();

    assert_eq!(client.commands().len(), 1);
    assert_eq!(dp.router_count(), 2);
    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(client.me_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_ready_keeps_the_first_client() {
    let first = Arc::new(MockClient::new());
    let second = Arc::new(MockClient::new());

    let mut dp = Dispatcher::new();
    dp.message_created()
        .command(Command::new(["start"]))
        .handler(tagged("start"));

    dp.ready(first.clone()).await.unwrap();
    dp.ready(second.clone()).await.unwrap();

    let bound = dp.client().cloned().unwrap();
    assert!(bound.as_any().downcast::<MockClient>().is_ok_and(|c| Arc::ptr_eq(&c, &first)));
    assert_eq!(second.me_calls.load(Ordering::SeqCst), 0);
    assert!(second.commands().is_empty());
}

#[tokio::test]
async fn test_identification_failure_is_fatal() {
    let client = Arc::new(MockClient {
        fail_me: true,
        ..MockClient::new()
    });

    let started = Arc::new(AtomicUsize::new(0));
    let started_count = Arc::clone(&started);
    let mut dp = Dispatcher::new();
    dp.on_started(move || {
        let started = Arc::clone(&started_count);
        async move {
            started.fetch_add(1, Ordering::SeqCst);
        }
    });

    let err = assert_err!(dp.ready(client).await);
    assert!(matches!(err, ReadyError::Identify(ApiError::Platform { code: 401, .. })));
    assert_eq!(dp.me(), None);
    assert_eq!(started.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_subscriptions_checked_only_when_polling() {
    let subscribed = || MockClient {
        subscriptions: vec![
            Subscription {
                url: "https://example.com/hook".into(),
                update_types: vec![],
            },
            Subscription {
                url: "https://example.org/other".into(),
                update_types: vec![],
            },
        ],
        ..MockClient::new()
    };

    let webhook_client = Arc::new(subscribed());
    Dispatcher::new().ready(webhook_client.clone()).await.unwrap();
    assert_eq!(webhook_client.subscription_calls.load(Ordering::SeqCst), 0);

    let polling_client = Arc::new(subscribed());
    let mut dp = Dispatcher::new();
    dp.set_polling(true);
    dp.ready(polling_client.clone()).await.unwrap();
    assert_eq!(polling_client.subscription_calls.load(Ordering::SeqCst), 1);

    let opted_out = Arc::new(MockClient {
        auto_check: false,
        ..subscribed()
    });
    let mut dp = Dispatcher::new();
    dp.set_polling(true);
    dp.ready(opted_out.clone()).await.unwrap();
    assert_eq!(opted_out.subscription_calls.load(Ordering::SeqCst), 0);
}

/// Collects formatted log lines written by a scoped subscriber.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

async fn ready_polling_with_logs(client: Arc<MockClient>) -> String {
    let logs = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer({
            let logs = logs.clone();
            move || logs.clone()
        })
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let mut dp = Dispatcher::new();
    dp.set_polling(true);
    dp.ready(client).await.unwrap();
    logs.contents()
}

#[tokio::test]
async fn test_active_subscriptions_are_listed_in_warning() {
    let client = Arc::new(MockClient {
        subscriptions: vec![
            Subscription {
                url: "https://a".into(),
                update_types: vec![],
            },
            Subscription {
                url: "https://b".into(),
                update_types: vec!["message_created".into()],
            },
        ],
        ..MockClient::new()
    });

    let logs = ready_polling_with_logs(client).await;
    let warning = logs
        .lines()
        .find(|line| line.contains("WARN"))
        .unwrap_or_default();
    assert!(warning.contains("https://a, https://b"), "logs: {logs}");
}

#[tokio::test]
async fn test_no_warning_without_subscriptions() {
    let logs = ready_polling_with_logs(Arc::new(MockClient::new())).await;
    assert!(!logs.contains("WARN"), "logs: {logs}");
}

#[tokio::test]
async fn test_subscription_lookup_failure_is_not_fatal() {
    let client = Arc::new(MockClient {
        fail_subscriptions: true,
        ..MockClient::new()
    });

    let mut dp = Dispatcher::new();
    dp.set_polling(true);
    let me = assert_ok!(dp.ready(client.clone()).await);

    assert_eq!(me.user_id, 42);
    assert_eq!(client.subscription_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_events_can_answer_through_the_bound_client() {
    let client = Arc::new(MockClient::new());

    let mut dp = Dispatcher::new();
    dp.message_created().handler(|event: BoxedEvent| async move {
        event.answer(event.text().unwrap_or_default()).await
    });
    dp.ready(client.clone()).await.unwrap();

    let outcome = dp.dispatch(message("echo me")).await.unwrap();
    assert_eq!(outcome, Outcome::Handled(json!({"ok": true})));

    let sent = client.sent.lock();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.chat_id, Some(100));
    assert_eq!(sent[0].1, "echo me");
}
