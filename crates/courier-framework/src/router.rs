//! Registration model: routing units, routers and registrars.
//!
//! A [`RoutingUnit`] is the part shared by every node of the routing tree:
//! an ordered handler list, base filters, and inner/outer middlewares. It is
//! embedded in both [`Router`] and [`Dispatcher`](crate::Dispatcher), and the
//! [`Routing`] trait gives both the same registration surface.
//!
//! All collections are append-only. Registration order is dispatch priority.
//!
//! ```rust,ignore
//! let mut admin = Router::with_id("admin");
//! admin.filter(filter_fn(|event| event.user_id() == Some(ADMIN_ID)));
//! admin
//!     .message_created()
//!     .command(Command::new(["ban"]))
//!     .info("Ban a user")
//!     .handler(ban);
//!
//! let mut dp = Dispatcher::new();
//! dp.include_router(admin);
//! ```

use std::fmt;
use std::sync::{Arc, OnceLock};

use courier_core::{BoxedClient, UpdateType};
use tracing::warn;

use crate::commands::parse_commands_info;
use crate::filter::{BoxedFilter, Command, Filter, HandlerFilter};
use crate::handler::{Handler, HandlerEntry, into_handler};
use crate::middleware::{BoxedMiddleware, Middleware};

// ============================================================================
// RoutingUnit
// ============================================================================

/// Handlers, base filters and middlewares of one routing node.
#[derive(Clone, Default)]
pub struct RoutingUnit {
    handlers: Vec<HandlerEntry>,
    base_filters: Vec<BoxedFilter>,
    middlewares: Vec<BoxedMiddleware>,
    outer_middlewares: Vec<BoxedMiddleware>,
}

impl RoutingUnit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handlers(&self) -> &[HandlerEntry] {
        &self.handlers
    }

    pub fn base_filters(&self) -> &[BoxedFilter] {
        &self.base_filters
    }

    /// Inner middlewares: they run only around a selected handler.
    pub fn middlewares(&self) -> &[BoxedMiddleware] {
        &self.middlewares
    }

    /// Outer middlewares: they run for every dispatch reaching this node.
    pub fn outer_middlewares(&self) -> &[BoxedMiddleware] {
        &self.outer_middlewares
    }

    pub fn push_handler(&mut self, entry: HandlerEntry) {
        self.handlers.push(entry);
    }

    pub fn push_filter(&mut self, filter: BoxedFilter) {
        self.base_filters.push(filter);
    }

    pub fn push_middleware(&mut self, middleware: BoxedMiddleware) {
        self.middlewares.push(middleware);
    }

    pub fn push_outer_middleware(&mut self, middleware: BoxedMiddleware) {
        self.outer_middlewares.push(middleware);
    }
}

impl fmt::Debug for RoutingUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingUnit")
            .field("handlers", &self.handlers)
            .field("base_filters", &self.base_filters.len())
            .field("middlewares", &self.middlewares.len())
            .field("outer_middlewares", &self.outer_middlewares.len())
            .finish()
    }
}

// ============================================================================
// Registrar
// ============================================================================

/// Collects the filters and description of one handler registration.
///
/// Returned by [`Routing::on`] and the per-kind shortcuts. Nothing is
/// registered until [`handler`](Self::handler) is called.
#[must_use = "a registrar registers nothing until `.handler(..)` is called"]
pub struct Registrar<'a> {
    unit: &'a mut RoutingUnit,
    update_type: UpdateType,
    filters: Vec<HandlerFilter>,
    info: Option<String>,
    name: Option<String>,
}

impl<'a> Registrar<'a> {
    pub(crate) fn new(unit: &'a mut RoutingUnit, update_type: UpdateType) -> Self {
        Self {
            unit,
            update_type,
            filters: Vec::new(),
            info: None,
            name: None,
        }
    }

    /// Adds a predicate filter.
    pub fn filter<F: Filter>(mut self, filter: F) -> Self {
        self.filters.push(HandlerFilter::predicate(filter));
        self
    }

    /// Adds a command filter. Its names end up in the client's command list.
    pub fn command(mut self, command: Command) -> Self {
        self.filters.push(HandlerFilter::Command(command));
        self
    }

    /// Sets the command description reported to the platform.
    pub fn info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }

    /// Takes the command description from free text containing a
    /// `commands_info:` label. Text without the label leaves the description
    /// unchanged.
    pub fn doc(mut self, doc: &str) -> Self {
        if let Some(info) = parse_commands_info(doc) {
            self.info = Some(info);
        }
        self
    }

    /// Names the handler in logs.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Registers `handler` with everything collected so far.
    pub fn handler<H, T>(self, handler: H)
    where
        H: Handler<T>,
        T: 'static,
    {
        self.unit.push_handler(HandlerEntry::new(
            self.update_type,
            self.filters,
            into_handler(handler),
            self.info,
            self.name,
        ));
    }
}

// ============================================================================
// Routing trait
// ============================================================================

macro_rules! registrars {
    ($($(#[$doc:meta])* $method:ident => $kind:ident;)*) => {
        $(
            $(#[$doc])*
            fn $method(&mut self) -> Registrar<'_> {
                self.on(UpdateType::$kind)
            }
        )*
    };
}

/// The registration surface shared by [`Router`] and
/// [`Dispatcher`](crate::Dispatcher).
pub trait Routing {
    fn unit(&self) -> &RoutingUnit;

    fn unit_mut(&mut self) -> &mut RoutingUnit;

    /// Starts a handler registration for `update_type`.
    fn on(&mut self, update_type: UpdateType) -> Registrar<'_> {
        Registrar::new(self.unit_mut(), update_type)
    }

    /// Appends a base filter, checked before every handler of this node.
    fn filter<F: Filter>(&mut self, filter: F) -> &mut Self
    where
        Self: Sized,
    {
        self.unit_mut().push_filter(Arc::new(filter));
        self
    }

    /// Appends an inner middleware.
    fn middleware<M: Middleware>(&mut self, middleware: M) -> &mut Self
    where
        Self: Sized,
    {
        self.unit_mut().push_middleware(Arc::new(middleware));
        self
    }

    /// Appends an outer middleware. Outer middlewares always run before inner
    /// ones, whatever the registration order.
    fn outer_middleware<M: Middleware>(&mut self, middleware: M) -> &mut Self
    where
        Self: Sized,
    {
        self.unit_mut().push_outer_middleware(Arc::new(middleware));
        self
    }

    fn handler_count(&self) -> usize {
        self.unit().handlers().len()
    }

    registrars! {
        message_created => MessageCreated;
        message_callback => MessageCallback;
        message_edited => MessageEdited;
        message_removed => MessageRemoved;
        message_chat_created => MessageChatCreated;
        bot_started => BotStarted;
        bot_stopped => BotStopped;
        bot_added => BotAdded;
        bot_removed => BotRemoved;
        user_added => UserAdded;
        user_removed => UserRemoved;
        chat_title_changed => ChatTitleChanged;
        dialog_cleared => DialogCleared;
        dialog_muted => DialogMuted;
        dialog_unmuted => DialogUnmuted;
        dialog_removed => DialogRemoved;
        /// Handlers for the synthetic `on_started` kind.
        started => OnStarted;
    }
}

// ============================================================================
// Router
// ============================================================================

/// A standalone routing node, included into a dispatcher with
/// [`Dispatcher::include_router`](crate::Dispatcher::include_router).
#[derive(Clone, Default)]
pub struct Router {
    id: Option<String>,
    unit: RoutingUnit,
    client: OnceLock<BoxedClient>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// The client bound during readiness.
    pub fn client(&self) -> Option<&BoxedClient> {
        self.client.get()
    }

    pub(crate) fn bind_client(&self, client: &BoxedClient) {
        bind_once(&self.client, client, self.label());
    }

    pub(crate) fn label(&self) -> &str {
        self.id.as_deref().unwrap_or("unnamed")
    }
}

impl Routing for Router {
    fn unit(&self) -> &RoutingUnit {
        &self.unit
    }

    fn unit_mut(&mut self) -> &mut RoutingUnit {
        &mut self.unit
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("id", &self.id)
            .field("unit", &self.unit)
            .field("bound", &self.client.get().is_some())
            .finish()
    }
}

/// Binds `client` into `slot` unless a client is already there.
///
/// Re-binding the same client is a no-op; a different one is refused.
pub(crate) fn bind_once(slot: &OnceLock<BoxedClient>, client: &BoxedClient, owner: &str) {
    match slot.get() {
        None => {
            // A concurrent winner is handled like an earlier binding.
            let _ = slot.set(Arc::clone(client));
        }
        Some(existing) if std::ptr::addr_eq(Arc::as_ptr(existing), Arc::as_ptr(client)) => {}
        Some(_) => {
            warn!(router = owner, "already bound to a different client, keeping the first");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::filter_fn;

    #[test]
    fn test_registration_appends_in_order() {
        let mut router = Router::with_id("r");
        router.message_created().name("first").handler(|| async {});
        router.bot_started().name("second").handler(|| async {});
        router
            .on(UpdateType::MessageCreated)
            .name("third")
            .handler(|| async {});

        let names: Vec<_> = router.unit().handlers().iter().map(|h| h.name()).collect();
        assert_eq!(names, vec![Some("first"), Some("second"), Some("third")]);
        assert_eq!(router.unit().handlers()[1].update_type(), UpdateType::BotStarted);
        assert_eq!(router.handler_count(), 3);
    }

    #[test]
    fn test_registrar_collects_filters_and_info() {
        let mut router = Router::new();
        router
            .message_created()
            .command(Command::new(["start"]))
            .filter(filter_fn(|_| true))
            .doc("Greets the user.\n\ncommands_info: Start the bot\n")
            .handler(|| async {});

        let entry = &router.unit().handlers()[0];
        assert_eq!(entry.filters().len(), 2);
        assert_eq!(entry.info(), Some("Start the bot"));
        assert_eq!(entry.filters()[0].commands(), Some(&["start".to_string()][..]));
    }

    #[test]
    fn test_base_filters_and_middlewares_append() {
        use crate::middleware::middleware_fn;

        let mut router = Router::new();
        router
            .filter(filter_fn(|_| true))
            .middleware(middleware_fn(|next, event, data| next.run(event, data)))
            .outer_middleware(middleware_fn(|next, event, data| next.run(event, data)));

        assert_eq!(router.unit().base_filters().len(), 1);
        assert_eq!(router.unit().middlewares().len(), 1);
        assert_eq!(router.unit().outer_middlewares().len(), 1);
    }
}
