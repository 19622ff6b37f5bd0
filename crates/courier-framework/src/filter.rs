//! Filters decide whether a handler (or a whole router) sees an event.
//!
//! A filter returns one of three outcomes:
//!
//! - [`FilterResult::NoMatch`] rejects. A rejecting base filter skips every
//!   handler of its router; a rejecting handler filter skips only that
//!   handler.
//! - [`FilterResult::Match`] accepts and contributes keyword data, merged into
//!   the call [`Data`](crate::Data) with later writes winning.
//! - [`FilterResult::Override`] claims the event: dispatch stops and returns
//!   the value without running the handler.
//!
//! # Example
//!
//! ```rust,ignore
//! use courier_framework::prelude::*;
//!
//! dp.message_created()
//!     .command(Command::new(["start"]))
//!     .filter(filter_fn(|event| event.chat_id().is_some()))
//!     .handler(start);
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use courier_core::{BoxError, BoxedEvent};
use serde_json::{Map, Value};

// =============================================================================
// FilterResult
// =============================================================================

/// The outcome of a single filter check.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterResult {
    NoMatch,
    Match(Map<String, Value>),
    Override(Value),
}

impl FilterResult {
    /// Matched with no extra data.
    pub fn matched() -> Self {
        Self::Match(Map::new())
    }

    /// Matched, contributing a single key.
    pub fn with(key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut map = Map::new();
        map.insert(key.into(), value.into());
        Self::Match(map)
    }
}

impl From<bool> for FilterResult {
    fn from(matched: bool) -> Self {
        if matched { Self::matched() } else { Self::NoMatch }
    }
}

// =============================================================================
// Filter trait
// =============================================================================

/// A check applied to an event before a handler runs.
#[async_trait]
pub trait Filter: Send + Sync + 'static {
    async fn check(&self, event: &BoxedEvent) -> Result<FilterResult, BoxError>;
}

/// A shared filter trait object.
pub type BoxedFilter = Arc<dyn Filter>;

/// Adapts a synchronous predicate into a [`Filter`].
#[derive(Clone)]
pub struct FnFilter<F>(F);

/// Wraps a synchronous predicate: `true` matches, `false` rejects.
pub fn filter_fn<F>(f: F) -> FnFilter<F>
where
    F: Fn(&BoxedEvent) -> bool + Send + Sync + 'static,
{
    FnFilter(f)
}

#[async_trait]
impl<F> Filter for FnFilter<F>
where
    F: Fn(&BoxedEvent) -> bool + Send + Sync + 'static,
{
    async fn check(&self, event: &BoxedEvent) -> Result<FilterResult, BoxError> {
        Ok((self.0)(event).into())
    }
}

/// Adapts an async closure into a [`Filter`].
#[derive(Clone)]
pub struct AsyncFnFilter<F>(F);

/// Wraps an async closure that produces a full [`FilterResult`].
///
/// The closure receives its own clone of the event so the returned future
/// can be `'static`.
pub fn filter_async<F, Fut>(f: F) -> AsyncFnFilter<F>
where
    F: Fn(BoxedEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<FilterResult, BoxError>> + Send + 'static,
{
    AsyncFnFilter(f)
}

#[async_trait]
impl<F, Fut> Filter for AsyncFnFilter<F>
where
    F: Fn(BoxedEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<FilterResult, BoxError>> + Send + 'static,
{
    async fn check(&self, event: &BoxedEvent) -> Result<FilterResult, BoxError> {
        (self.0)(event.clone()).await
    }
}

// =============================================================================
// Command filter
// =============================================================================

/// Matches messages whose first word is one of the configured commands.
///
/// On match, contributes `command` (the configured name that matched) and
/// `args` (the rest of the text, trimmed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    commands: Vec<String>,
    prefix: String,
    ignore_case: bool,
}

impl Command {
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
            prefix: "/".to_string(),
            ignore_case: false,
        }
    }

    /// Sets the prefix expected before the command name. Defaults to `/`.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn ignore_case(mut self, ignore_case: bool) -> Self {
        self.ignore_case = ignore_case;
        self
    }

    /// The command names this filter answers to.
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    fn matching(&self, word: &str) -> Option<&str> {
        self.commands
            .iter()
            .find(|c| {
                if self.ignore_case {
                    c.to_lowercase() == word.to_lowercase()
                } else {
                    c.as_str() == word
                }
            })
            .map(String::as_str)
    }

    fn parse(&self, text: &str) -> Option<FilterResult> {
        let text = text.trim_start();
        let first = text.split_whitespace().next()?;
        let name = first.strip_prefix(self.prefix.as_str())?;
        let command = self.matching(name)?;
        let args = text[first.len()..].trim();

        let mut map = Map::new();
        map.insert("command".into(), Value::from(command));
        map.insert("args".into(), Value::from(args));
        Some(FilterResult::Match(map))
    }
}

#[async_trait]
impl Filter for Command {
    async fn check(&self, event: &BoxedEvent) -> Result<FilterResult, BoxError> {
        Ok(event
            .text()
            .and_then(|text| self.parse(text))
            .unwrap_or(FilterResult::NoMatch))
    }
}

// =============================================================================
// HandlerFilter
// =============================================================================

/// A filter attached to a single handler.
///
/// Command filters are kept apart from generic predicates so that command
/// extraction can find them without inspecting arbitrary filter objects.
#[derive(Clone)]
pub enum HandlerFilter {
    Command(Command),
    Predicate(BoxedFilter),
}

impl HandlerFilter {
    pub fn predicate<F: Filter>(filter: F) -> Self {
        Self::Predicate(Arc::new(filter))
    }

    /// The command names, for the command variant only.
    pub fn commands(&self) -> Option<&[String]> {
        match self {
            Self::Command(command) => Some(command.commands()),
            Self::Predicate(_) => None,
        }
    }

    pub async fn check(&self, event: &BoxedEvent) -> Result<FilterResult, BoxError> {
        match self {
            Self::Command(command) => command.check(event).await,
            Self::Predicate(filter) => filter.check(event).await,
        }
    }
}

impl From<Command> for HandlerFilter {
    fn from(command: Command) -> Self {
        Self::Command(command)
    }
}

impl fmt::Debug for HandlerFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(command) => f.debug_tuple("Command").field(command).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}
