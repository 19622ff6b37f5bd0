//! Call data: what travels alongside an event through the pipeline.

use std::fmt;
use std::sync::Arc;

use courier_core::{BoxedClient, BoxedEvent};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::context::Context;

/// Keyword data merged from filter results, plus the injected context and
/// client.
///
/// Filters contribute values with [`FilterResult::Match`](crate::FilterResult::Match);
/// middlewares may add or overwrite entries before calling `next`.
#[derive(Clone, Default)]
pub struct Data {
    values: Map<String, Value>,
    context: Option<Arc<Context>>,
    client: Option<BoxedClient>,
}

impl Data {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_context(mut self, context: Option<Arc<Context>>) -> Self {
        self.context = context;
        self
    }

    pub(crate) fn with_client(mut self, client: Option<BoxedClient>) -> Self {
        self.client = client;
        self
    }

    /// Returns the raw value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Deserializes the value stored under `key`.
    ///
    /// Returns `None` if the key is absent or the value has a different shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Returns the string stored under `key`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Inserts a value, returning the one it replaced.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    /// Merges `other` into this data. Later writes win on key conflicts.
    pub fn extend(&mut self, other: Map<String, Value>) {
        self.values.extend(other);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The conversation context for this dispatch, if the event has one.
    pub fn context(&self) -> Option<&Arc<Context>> {
        self.context.as_ref()
    }

    /// The client bound during readiness.
    pub fn client(&self) -> Option<&BoxedClient> {
        self.client.as_ref()
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Data")
            .field("values", &self.values)
            .field("context", &self.context.as_ref().map(|c| c.key()))
            .field("has_client", &self.client.is_some())
            .finish()
    }
}

/// One request through the pipeline.
#[derive(Debug, Clone)]
pub struct Call {
    pub event: BoxedEvent,
    pub data: Data,
}

impl Call {
    pub fn new(event: BoxedEvent, data: Data) -> Self {
        Self { event, data }
    }
}

/// What a dispatch produced.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Outcome {
    /// No handler claimed the event.
    #[default]
    Unhandled,
    /// A handler ran (or a filter or middleware answered in its place).
    Handled(Value),
}

impl Outcome {
    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Handled(_))
    }

    /// The handler's return value, if any.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Handled(v) => Some(v),
            Self::Unhandled => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extend_last_write_wins() {
        let mut data = Data::new();
        data.insert("a", 1);
        data.insert("b", "first");

        let mut later = Map::new();
        later.insert("b".into(), json!("second"));
        later.insert("c".into(), json!(true));
        data.extend(later);

        assert_eq!(data.len(), 3);
        assert_eq!(data.get_as::<i64>("a"), Some(1));
        assert_eq!(data.get_str("b"), Some("second"));
        assert_eq!(data.get("c"), Some(&json!(true)));
    }

    #[test]
    fn test_get_as_shape_mismatch() {
        let mut data = Data::new();
        data.insert("n", "not a number");
        assert_eq!(data.get_as::<i64>("n"), None);
        assert_eq!(data.get_as::<i64>("missing"), None);
    }

    #[test]
    fn test_outcome_value() {
        assert!(!Outcome::Unhandled.is_handled());
        assert_eq!(Outcome::Handled(json!(1)).into_value(), Some(json!(1)));
    }
}
