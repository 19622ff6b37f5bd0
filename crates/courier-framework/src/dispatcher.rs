//! Event dispatcher for Courier.
//!
//! The [`Dispatcher`] is the root of the routing tree. It owns its own
//! [`RoutingUnit`], the child [`Router`]s in include order, the conversation
//! [`ContextStore`] and the readiness state.
//!
//! # Dispatch
//!
//! For one event:
//!
//! 1. The conversation key is resolved and its [`Context`](crate::Context)
//!    fetched or created.
//! 2. The dispatcher's outer middlewares wrap the whole routing scan, so they
//!    run whether or not a handler ends up matching.
//! 3. The scan visits the dispatcher's own handlers first, then each child
//!    router (wrapped in that router's outer middlewares) in include order.
//!    Within a node, handlers are tried in registration order; only handlers
//!    registered for the event's update kind are considered.
//! 4. The node's base filters are checked once, before the first candidate
//!    handler. A rejecting base filter skips the whole node.
//! 5. The first handler whose own filters all match runs inside the inner
//!    middleware chain (dispatcher inner middlewares, then the node's). At most
//!    one handler runs per event.
//! 6. No match anywhere is [`Outcome::Unhandled`], not an error.
//!
//! ```rust,ignore
//! let mut dp = Dispatcher::new();
//! dp.message_created().command(Command::new(["start"])).handler(start);
//! dp.include_routers([admin_router, fallback_router]);
//!
//! dp.ready(client).await?;
//! let outcome = dp.dispatch(BoxedEvent::new(update)).await?;
//! ```

use std::fmt;
use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, OnceLock};
use std::task::{Context as TaskContext, Poll};

use courier_core::{BotInfo, BoxError, BoxedClient, BoxedEvent};
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Map;
use tower::util::BoxCloneSyncService;
use tokio_util::task::TaskTracker;
use tower::{Service, ServiceExt};
use tracing::{Instrument, Level, debug, error, span, trace};

use crate::context::{ContextKey, ContextStore, EvictionPolicy};
use crate::data::{Call, Data, Outcome};
use crate::error::DispatchError;
use crate::filter::FilterResult;
use crate::middleware::build_chain;
use crate::router::{Router, Routing, RoutingUnit};

/// The callback fired once readiness completes for the first time.
pub type OnStartedFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Internal data for a Dispatcher.
///
/// Wrapped in an `Arc` for cheap cloning; registration goes through
/// `Arc::make_mut`. State that must survive clones (client binding, cached
/// identity, one-shot flags) is itself shared.
#[derive(Clone)]
pub(crate) struct DispatcherInner {
    pub(crate) id: Option<String>,
    pub(crate) unit: RoutingUnit,
    pub(crate) routers: Vec<Router>,
    pub(crate) contexts: ContextStore,
    pub(crate) polling: bool,
    pub(crate) use_create_task: bool,
    pub(crate) on_started: Option<OnStartedFn>,
    pub(crate) client: Arc<OnceLock<BoxedClient>>,
    pub(crate) me: Arc<RwLock<Option<BotInfo>>>,
    pub(crate) commands_registered: Arc<AtomicBool>,
    pub(crate) started: Arc<AtomicBool>,
    pub(crate) tasks: TaskTracker,
}

/// The root router: routing tree, context store and readiness state.
///
/// # Cheap Cloning
///
/// `Dispatcher` wraps its state in an `Arc`. Clones share contexts, client
/// binding and readiness flags, which is what lets the spawn policy hand a
/// clone to every task.
#[derive(Clone)]
pub struct Dispatcher {
    pub(crate) inner: Arc<DispatcherInner>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Creates an empty dispatcher with the inline dispatch policy and a
    /// context store that never evicts.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                id: None,
                unit: RoutingUnit::new(),
                routers: Vec::new(),
                contexts: ContextStore::new(),
                polling: false,
                use_create_task: false,
                on_started: None,
                client: Arc::new(OnceLock::new()),
                me: Arc::new(RwLock::new(None)),
                commands_registered: Arc::new(AtomicBool::new(false)),
                started: Arc::new(AtomicBool::new(false)),
                tasks: TaskTracker::new(),
            }),
        }
    }

    fn inner_mut(&mut self) -> &mut DispatcherInner {
        Arc::make_mut(&mut self.inner)
    }

    /// Sets the dispatcher's identity string (builder pattern).
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.inner_mut().id = Some(id.into());
        self
    }

    /// Enables or disables the spawn policy (builder pattern).
    ///
    /// With the spawn policy, [`feed_update`](Self::feed_update) runs each
    /// dispatch as its own task. Dispatches for the same conversation may then
    /// overlap and race on that conversation's [`Context`](crate::Context).
    pub fn with_create_task(mut self, use_create_task: bool) -> Self {
        self.inner_mut().use_create_task = use_create_task;
        self
    }

    /// Replaces the context store with one using `policy` (builder pattern).
    pub fn with_context_policy<P: EvictionPolicy>(mut self, policy: P) -> Self {
        self.inner_mut().contexts = ContextStore::with_policy(policy);
        self
    }

    /// Marks whether updates arrive by long polling. Readiness only checks
    /// for conflicting push subscriptions in polling mode.
    pub fn set_polling(&mut self, polling: bool) {
        self.inner_mut().polling = polling;
    }

    /// Appends a child router. Routers are tried in include order, after the
    /// dispatcher's own handlers.
    pub fn include_router(&mut self, router: Router) -> &mut Self {
        self.inner_mut().routers.push(router);
        self
    }

    /// Appends several child routers, keeping their order.
    pub fn include_routers<I>(&mut self, routers: I) -> &mut Self
    where
        I: IntoIterator<Item = Router>,
    {
        self.inner_mut().routers.extend(routers);
        self
    }

    /// Registers the callback fired once, after the first successful
    /// readiness. A later registration replaces an earlier one.
    pub fn on_started<F, Fut>(&mut self, callback: F) -> &mut Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner_mut().on_started = Some(Arc::new(move || -> BoxFuture<'static, ()> {
            Box::pin(callback())
        }));
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.inner.id.as_deref()
    }

    pub fn routers(&self) -> &[Router] {
        &self.inner.routers
    }

    /// Number of routing nodes visited per dispatch: the dispatcher itself
    /// plus every child router.
    pub fn router_count(&self) -> usize {
        1 + self.inner.routers.len()
    }

    pub fn contexts(&self) -> &ContextStore {
        &self.inner.contexts
    }

    pub fn polling(&self) -> bool {
        self.inner.polling
    }

    pub fn use_create_task(&self) -> bool {
        self.inner.use_create_task
    }

    /// The client bound by readiness.
    pub fn client(&self) -> Option<&BoxedClient> {
        self.inner.client.get()
    }

    /// The identity cached by the last successful readiness.
    pub fn me(&self) -> Option<BotInfo> {
        self.inner.me.read().clone()
    }

    /// Dispatches one event through the routing tree.
    ///
    /// Returns [`Outcome::Unhandled`] when nothing matched. Filter, handler
    /// and middleware failures propagate unchanged.
    pub async fn dispatch(&self, event: BoxedEvent) -> Result<Outcome, DispatchError> {
        let update_type = event.update_type();
        let span = span!(Level::DEBUG, "dispatch", update_type = %update_type);

        async move {
            let client = self.client().cloned();
            let event = match &client {
                Some(client) if event.client().is_none() => event.with_client(Arc::clone(client)),
                _ => event,
            };

            let context = ContextKey::from_event(&*event)
                .map(|key| self.inner.contexts.get_or_create(key.chat_id, key.user_id));
            let data = Data::new().with_context(context).with_client(client);

            let scan = BoxCloneSyncService::new(RouteService {
                inner: Arc::clone(&self.inner),
            });
            let chain = build_chain(self.inner.unit.outer_middlewares(), scan);

            let outcome = chain
                .oneshot(Call::new(event, data))
                .await
                .map_err(DispatchError::from_boxed)?;

            if !outcome.is_handled() {
                trace!("no handler matched");
            }
            Ok(outcome)
        }
        .instrument(span)
        .await
    }

    /// Dispatches one event under the configured policy.
    ///
    /// Inline: awaits the dispatch. Spawn: launches it as a tracked tokio
    /// task and returns at once; [`wait_pending`](Self::wait_pending) waits
    /// for those tasks. Either way a failure is logged here, not retried.
    pub async fn feed_update(&self, event: BoxedEvent) {
        if self.inner.use_create_task {
            let dispatcher = self.clone();
            self.inner
                .tasks
                .spawn(async move { dispatcher.process(event).await });
        } else {
            self.process(event).await;
        }
    }

    /// Number of spawned dispatches still running.
    pub fn pending_tasks(&self) -> usize {
        self.inner.tasks.len()
    }

    /// Waits until every spawned dispatch has finished.
    ///
    /// New dispatches may be fed again once this returns.
    pub async fn wait_pending(&self) {
        let tasks = &self.inner.tasks;
        if tasks.is_empty() {
            return;
        }
        debug!(pending = tasks.len(), "waiting for spawned dispatches");
        tasks.close();
        tasks.wait().await;
        tasks.reopen();
    }

    async fn process(&self, event: BoxedEvent) {
        let update_type = event.update_type();
        if let Err(err) = self.dispatch(event).await {
            error!(%update_type, error = %err, "dispatch failed");
        }
    }
}

impl Routing for Dispatcher {
    fn unit(&self) -> &RoutingUnit {
        &self.inner.unit
    }

    fn unit_mut(&mut self) -> &mut RoutingUnit {
        &mut self.inner_mut().unit
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("id", &self.inner.id)
            .field("handler_count", &self.inner.unit.handlers().len())
            .field("router_count", &self.router_count())
            .field("contexts", &self.inner.contexts.len())
            .field("polling", &self.inner.polling)
            .field("use_create_task", &self.inner.use_create_task)
            .field("bound", &self.inner.client.get().is_some())
            .finish()
    }
}

// ============================================================================
// Routing scan
// ============================================================================

/// Which node of the routing tree a scan covers.
#[derive(Clone, Copy)]
enum Node {
    Root,
    Child(usize),
}

/// Terminal of the dispatcher's outer chain: scans every node in order.
#[derive(Clone)]
struct RouteService {
    inner: Arc<DispatcherInner>,
}

impl Service<Call> for RouteService {
    type Response = Outcome;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Outcome, BoxError>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: Call) -> Self::Future {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            let outcome = scan_node(&inner, Node::Root, call.clone()).await?;
            if outcome.is_handled() {
                return Ok(outcome);
            }

            for (index, router) in inner.routers.iter().enumerate() {
                let scan = BoxCloneSyncService::new(NodeService {
                    inner: Arc::clone(&inner),
                    index,
                });
                let chain = build_chain(router.unit().outer_middlewares(), scan);
                let outcome = chain.oneshot(call.clone()).await?;
                if outcome.is_handled() {
                    return Ok(outcome);
                }
            }

            Ok(Outcome::Unhandled)
        })
    }
}

/// Terminal of a child router's outer chain.
#[derive(Clone)]
struct NodeService {
    inner: Arc<DispatcherInner>,
    index: usize,
}

impl Service<Call> for NodeService {
    type Response = Outcome;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Outcome, BoxError>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: Call) -> Self::Future {
        let inner = Arc::clone(&self.inner);
        let index = self.index;
        Box::pin(async move { scan_node(&inner, Node::Child(index), call).await })
    }
}

/// Runs the first matching handler of one node, if any.
async fn scan_node(inner: &DispatcherInner, node: Node, call: Call) -> Result<Outcome, BoxError> {
    let (label, unit) = match node {
        Node::Root => (inner.id.as_deref().unwrap_or("dispatcher"), &inner.unit),
        Node::Child(index) => {
            let router = &inner.routers[index];
            (router.label(), router.unit())
        }
    };
    let update_type = call.event.update_type();

    // Base filter data, evaluated lazily on the first candidate handler.
    let mut base: Option<Map<_, _>> = None;

    for (position, handler) in unit.handlers().iter().enumerate() {
        if handler.update_type() != update_type {
            continue;
        }

        if base.is_none() {
            let mut merged = Map::new();
            for filter in unit.base_filters() {
                match filter.check(&call.event).await.map_err(filter_error)? {
                    FilterResult::NoMatch => {
                        trace!(router = label, "base filter rejected, skipping router");
                        return Ok(Outcome::Unhandled);
                    }
                    FilterResult::Match(extra) => merged.extend(extra),
                    FilterResult::Override(value) => {
                        debug!(router = label, "base filter answered the event");
                        return Ok(Outcome::Handled(value));
                    }
                }
            }
            base = Some(merged);
        }
        let base_data = base.clone().unwrap_or_default();

        let handler_name = handler.name().unwrap_or("anonymous");
        let mut data = call.data.clone();
        data.extend(base_data);

        let mut rejected = false;
        for filter in handler.filters() {
            match filter.check(&call.event).await.map_err(filter_error)? {
                FilterResult::NoMatch => {
                    rejected = true;
                    break;
                }
                FilterResult::Match(extra) => data.extend(extra),
                FilterResult::Override(value) => {
                    debug!(router = label, handler = handler_name, "filter answered the event");
                    return Ok(Outcome::Handled(value));
                }
            }
        }
        if rejected {
            trace!(router = label, handler = handler_name, position, "handler filter rejected");
            continue;
        }

        debug!(router = label, handler = handler_name, position, "handler selected");

        let terminal = BoxCloneSyncService::new(handler.service());
        let chain = match node {
            Node::Root => build_chain(inner.unit.middlewares(), terminal),
            Node::Child(_) => build_chain(
                inner.unit.middlewares().iter().chain(unit.middlewares()),
                terminal,
            ),
        };
        return chain.oneshot(Call::new(call.event, data)).await;
    }

    Ok(Outcome::Unhandled)
}

fn filter_error(err: BoxError) -> BoxError {
    Box::new(DispatchError::Filter(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Command, filter_fn};
    use crate::handler::Payload;
    use crate::middleware::{Next, middleware_fn};
    use courier_core::{MessageCreated, RawUpdate, UpdateType};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn message(text: &str) -> BoxedEvent {
        BoxedEvent::new(MessageCreated::text(10, 20, text))
    }

    #[tokio::test]
    async fn test_dispatch_no_handlers() {
        let dp = Dispatcher::new();
        let outcome = dp.dispatch(message("hi")).await.unwrap();
        assert_eq!(outcome, Outcome::Unhandled);
    }

    #[tokio::test]
    async fn test_only_first_matching_handler_runs() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (c1, c2) = (Arc::clone(&counter), Arc::clone(&counter));

        let mut dp = Dispatcher::new();
        dp.message_created().handler(move || {
            let c = Arc::clone(&c1);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });
        dp.message_created().handler(move || {
            let c = Arc::clone(&c2);
            async move {
                c.fetch_add(10, Ordering::SeqCst);
            }
        });

        let outcome = dp.dispatch(message("hi")).await.unwrap();
        assert!(outcome.is_handled());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_update_kind_must_match() {
        let mut dp = Dispatcher::new();
        dp.bot_started().handler(|| async { "started" });

        let outcome = dp.dispatch(message("hi")).await.unwrap();
        assert_eq!(outcome, Outcome::Unhandled);
    }

    #[tokio::test]
    async fn test_filter_data_reaches_handler() {
        let mut dp = Dispatcher::new();
        dp.filter(filter_fn(|_| true));
        dp.message_created()
            .command(Command::new(["echo"]))
            .handler(|data: Data| async move { data.get_str("args").unwrap_or_default().to_string() });

        let outcome = dp.dispatch(message("/echo hello world")).await.unwrap();
        assert_eq!(outcome, Outcome::Handled(json!("hello world")));
    }

    #[tokio::test]
    async fn test_context_injected_and_shared() {
        let mut dp = Dispatcher::new();
        dp.message_created()
            .handler(|ctx: Arc<crate::Context>| async move {
                let count = ctx.get("count").and_then(|v| v.as_i64()).unwrap_or(0) + 1;
                let mut update = Map::new();
                update.insert("count".into(), json!(count));
                ctx.update_data(update);
                json!(count)
            });

        dp.dispatch(message("a")).await.unwrap();
        let outcome = dp.dispatch(message("b")).await.unwrap();
        assert_eq!(outcome, Outcome::Handled(json!(2)));
        assert_eq!(dp.contexts().len(), 1);
    }

    #[tokio::test]
    async fn test_event_without_identity_gets_no_context() {
        let mut dp = Dispatcher::new();
        dp.dialog_cleared()
            .handler(|ctx: Option<Arc<crate::Context>>| async move { ctx.is_none() });

        let outcome = dp
            .dispatch(BoxedEvent::new(RawUpdate::new(UpdateType::DialogCleared)))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Handled(json!(true)));
        assert!(dp.contexts().is_empty());
    }

    #[tokio::test]
    async fn test_override_skips_handler() {
        let mut dp = Dispatcher::new();
        dp.message_created()
            .filter(crate::filter::filter_async(|_| async {
                Ok(FilterResult::Override(json!("claimed")))
            }))
            .handler(|| async { "handler" });

        let outcome = dp.dispatch(message("hi")).await.unwrap();
        assert_eq!(outcome, Outcome::Handled(json!("claimed")));
    }

    #[tokio::test]
    async fn test_filter_error_propagates() {
        let mut dp = Dispatcher::new();
        dp.message_created()
            .filter(crate::filter::filter_async(|_| async {
                Err::<FilterResult, BoxError>("broken filter".into())
            }))
            .handler(|| async {});

        let err = dp.dispatch(message("hi")).await.unwrap_err();
        assert!(matches!(err, DispatchError::Filter(_)));
    }

    #[tokio::test]
    async fn test_middleware_error_is_tagged() {
        let mut dp = Dispatcher::new();
        dp.middleware(middleware_fn(|_next: Next, _event, _data| async {
            Err::<Outcome, BoxError>("denied".into())
        }));
        dp.message_created().handler(|| async {});

        let err = dp.dispatch(message("hi")).await.unwrap_err();
        assert!(matches!(err, DispatchError::Middleware(_)));
    }

    #[tokio::test]
    async fn test_payload_extraction() {
        let mut dp = Dispatcher::new();
        dp.message_created().handler(|msg: Payload<MessageCreated>| async move {
            json!(msg.message.recipient.chat_id)
        });

        let outcome = dp.dispatch(message("hi")).await.unwrap();
        assert_eq!(outcome, Outcome::Handled(json!(10)));
    }

    #[tokio::test]
    async fn test_spawn_policy_runs_handler() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let mut dp = Dispatcher::new().with_create_task(true);
        dp.message_created().handler(move |event: BoxedEvent| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(event.text().map(str::to_owned));
            }
        });

        dp.feed_update(message("spawned")).await;
        assert_eq!(rx.recv().await, Some(Some("spawned".to_string())));
    }

    #[tokio::test]
    async fn test_wait_pending_drains_spawned_dispatches() {
        let done = Arc::new(AtomicUsize::new(0));

        let mut dp = Dispatcher::new().with_create_task(true);
        let counter = Arc::clone(&done);
        dp.message_created().handler(move || {
            let counter = Arc::clone(&counter);
            async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        for text in ["a", "b", "c"] {
            dp.feed_update(message(text)).await;
        }
        dp.wait_pending().await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(dp.pending_tasks(), 0);

        dp.feed_update(message("d")).await;
        dp.clone().wait_pending().await;
        assert_eq!(done.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_clone_shares_contexts() {
        let dp = Dispatcher::new();
        let clone = dp.clone();
        let a = dp.contexts().get_or_create(Some(1), Some(1));
        let b = clone.contexts().get_or_create(Some(1), Some(1));
        assert!(Arc::ptr_eq(&a, &b));
    }
}
