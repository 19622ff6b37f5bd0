//! The inbound transport boundary.
//!
//! Polling loops and webhook servers live outside Courier. Whatever fetches
//! updates hands them to the runtime through [`UpdateSource`], already decoded
//! into [`BoxedEvent`]s.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportResult;
use crate::event::{BoxedEvent, UpdateType};

/// How a source should fetch: long-poll timeout, batch size and the update
/// kinds to request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub limit: usize,
    /// Empty means every kind.
    pub types: Vec<UpdateType>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            limit: 100,
            types: Vec::new(),
        }
    }
}

impl FetchOptions {
    /// Whether events of `kind` were asked for.
    pub fn accepts(&self, kind: UpdateType) -> bool {
        self.types.is_empty() || self.types.contains(&kind)
    }
}

/// A stream of decoded updates, fetched in batches.
#[async_trait]
pub trait UpdateSource: Send + 'static {
    /// Waits for the next batch of updates.
    ///
    /// Returns `Ok(None)` once the source is exhausted. An `Err` is a failed
    /// fetch; the caller decides whether to try again.
    async fn next_batch(&mut self) -> TransportResult<Option<Vec<BoxedEvent>>>;

    /// Applies fetch options before the first batch is requested. Sources
    /// that cannot honour them may ignore them.
    fn configure(&mut self, _options: &FetchOptions) {}
}

/// A boxed update source.
pub type BoxedUpdateSource = Box<dyn UpdateSource>;

#[async_trait]
impl UpdateSource for BoxedUpdateSource {
    async fn next_batch(&mut self) -> TransportResult<Option<Vec<BoxedEvent>>> {
        (**self).next_batch().await
    }

    fn configure(&mut self, options: &FetchOptions) {
        (**self).configure(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_types_accept_everything() {
        let options = FetchOptions::default();
        assert!(options.accepts(UpdateType::MessageCreated));
        assert!(options.accepts(UpdateType::BotStarted));

        let options = FetchOptions {
            types: vec![UpdateType::MessageCallback],
            ..FetchOptions::default()
        };
        assert!(options.accepts(UpdateType::MessageCallback));
        assert!(!options.accepts(UpdateType::MessageCreated));
    }
}
