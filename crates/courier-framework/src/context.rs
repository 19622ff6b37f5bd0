//! Per-conversation state.
//!
//! - [`ContextKey`]: the `(chat, user)` pair identifying one conversation.
//! - [`Context`]: the mutable state bag for that conversation, an FSM-style
//!   state name plus a JSON data map.
//! - [`ContextStore`]: the lazily populated `key -> Arc<Context>` cache held
//!   by the dispatcher, with a pluggable [`EvictionPolicy`].
//!
//! Each `Context` operation is atomic on its own. Nothing serializes a
//! sequence of operations, so two dispatches for the same key running under
//! the spawn policy can interleave their reads and writes.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use courier_core::Event;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::trace;

// =============================================================================
// ContextKey
// =============================================================================

/// Conversation identity: `(chat, user)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextKey {
    pub chat_id: Option<i64>,
    pub user_id: Option<i64>,
}

impl ContextKey {
    pub fn new(chat_id: Option<i64>, user_id: Option<i64>) -> Self {
        Self { chat_id, user_id }
    }

    /// Resolves the key for an event.
    ///
    /// Returns `None` when the event carries neither a chat nor a user; such
    /// events are dispatched without a context.
    pub fn from_event(event: &dyn Event) -> Option<Self> {
        match (event.chat_id(), event.user_id()) {
            (None, None) => None,
            (chat_id, user_id) => Some(Self { chat_id, user_id }),
        }
    }
}

// =============================================================================
// Context
// =============================================================================

#[derive(Default)]
struct ContextState {
    state: Option<String>,
    data: Map<String, Value>,
}

/// In-memory state for one conversation.
pub struct Context {
    key: ContextKey,
    inner: Mutex<ContextState>,
}

impl Context {
    pub fn new(key: ContextKey) -> Self {
        Self {
            key,
            inner: Mutex::new(ContextState::default()),
        }
    }

    pub fn key(&self) -> ContextKey {
        self.key
    }

    pub fn chat_id(&self) -> Option<i64> {
        self.key.chat_id
    }

    pub fn user_id(&self) -> Option<i64> {
        self.key.user_id
    }

    /// The current state name, if one is set.
    pub fn state(&self) -> Option<String> {
        self.inner.lock().state.clone()
    }

    /// Sets or clears the state name.
    pub fn set_state(&self, state: Option<&str>) {
        self.inner.lock().state = state.map(str::to_owned);
    }

    /// A snapshot of the data map.
    pub fn data(&self) -> Map<String, Value> {
        self.inner.lock().data.clone()
    }

    /// Returns one data value.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.lock().data.get(key).cloned()
    }

    /// Replaces the whole data map.
    pub fn set_data(&self, data: Map<String, Value>) {
        self.inner.lock().data = data;
    }

    /// Merges `data` into the data map; incoming keys overwrite existing ones.
    pub fn update_data(&self, data: Map<String, Value>) {
        self.inner.lock().data.extend(data);
    }

    /// Resets both the state and the data map.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.state = None;
        inner.data.clear();
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Context")
            .field("key", &self.key)
            .field("state", &inner.state)
            .field("data", &inner.data)
            .finish()
    }
}

// =============================================================================
// Eviction policy
// =============================================================================

/// Decides which contexts the store drops.
///
/// The store calls [`on_access`](Self::on_access) for every lookup hit and
/// [`on_insert`](Self::on_insert) for every miss; `on_insert` returns the key
/// to evict, if any. An evicted key gets a fresh context on its next lookup.
pub trait EvictionPolicy: Send + 'static {
    fn on_access(&mut self, key: &ContextKey);

    fn on_insert(&mut self, key: &ContextKey) -> Option<ContextKey>;
}

/// Keeps every context for the lifetime of the dispatcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverEvict;

impl EvictionPolicy for NeverEvict {
    fn on_access(&mut self, _key: &ContextKey) {}

    fn on_insert(&mut self, _key: &ContextKey) -> Option<ContextKey> {
        None
    }
}

/// Bounds the store to `capacity` contexts, dropping the least recently used.
#[derive(Debug, Clone)]
pub struct LruPolicy {
    capacity: usize,
    order: VecDeque<ContextKey>,
}

impl LruPolicy {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
        }
    }
}

impl EvictionPolicy for LruPolicy {
    fn on_access(&mut self, key: &ContextKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(*key);
    }

    fn on_insert(&mut self, key: &ContextKey) -> Option<ContextKey> {
        self.order.push_back(*key);
        if self.order.len() > self.capacity {
            self.order.pop_front()
        } else {
            None
        }
    }
}

// =============================================================================
// ContextStore
// =============================================================================

struct StoreInner {
    contexts: HashMap<ContextKey, Arc<Context>>,
    policy: Box<dyn EvictionPolicy>,
}

/// The dispatcher's conversation cache.
///
/// Cloning the store is cheap and every clone shares the same contexts.
#[derive(Clone)]
pub struct ContextStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextStore {
    /// Creates a store that never evicts.
    pub fn new() -> Self {
        Self::with_policy(NeverEvict)
    }

    pub fn with_policy<P: EvictionPolicy>(policy: P) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                contexts: HashMap::new(),
                policy: Box::new(policy),
            })),
        }
    }

    /// Returns the context for `(chat_id, user_id)`, creating it on first use.
    ///
    /// The same key yields the same instance until the policy evicts it.
    pub fn get_or_create(&self, chat_id: Option<i64>, user_id: Option<i64>) -> Arc<Context> {
        let key = ContextKey::new(chat_id, user_id);
        let mut inner = self.inner.lock();

        if let Some(context) = inner.contexts.get(&key).cloned() {
            inner.policy.on_access(&key);
            return context;
        }

        let context = Arc::new(Context::new(key));
        inner.contexts.insert(key, Arc::clone(&context));
        if let Some(victim) = inner.policy.on_insert(&key) {
            trace!(chat_id = ?victim.chat_id, user_id = ?victim.user_id, "evicting context");
            inner.contexts.remove(&victim);
        }
        context
    }

    /// Looks up an existing context without creating one.
    pub fn get(&self, key: &ContextKey) -> Option<Arc<Context>> {
        self.inner.lock().contexts.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().contexts.is_empty()
    }
}

impl fmt::Debug for ContextStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextStore")
            .field("len", &self.len())
            .finish()
    }
}
