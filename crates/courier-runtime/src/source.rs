//! Channel-backed update source.
//!
//! A webhook server, or any producer outside the runtime, pushes decoded
//! events into an mpsc channel; [`ChannelSource`] hands them to the runtime
//! in batches.

use std::time::Duration;

use async_trait::async_trait;
use courier_core::{BoxedEvent, FetchOptions, TransportResult, UpdateSource};
use tokio::sync::mpsc;

/// Default number of events drained into one batch.
const DEFAULT_BATCH_LIMIT: usize = 100;

/// An [`UpdateSource`] reading from an mpsc receiver.
///
/// Each batch waits for one event, then takes whatever else is already
/// queued, up to the batch limit. With a wait timeout set, an idle wait
/// yields an empty batch instead, like a long poll that came back empty.
/// The source ends once every sender is dropped and the queue is empty.
#[derive(Debug)]
pub struct ChannelSource {
    receiver: mpsc::Receiver<BoxedEvent>,
    limit: usize,
    timeout: Option<Duration>,
}

impl ChannelSource {
    pub fn new(receiver: mpsc::Receiver<BoxedEvent>) -> Self {
        Self {
            receiver,
            limit: DEFAULT_BATCH_LIMIT,
            timeout: None,
        }
    }

    /// Creates a bounded channel and the source reading from it. A zero
    /// buffer is treated as one.
    pub fn channel(buffer: usize) -> (mpsc::Sender<BoxedEvent>, Self) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (sender, Self::new(receiver))
    }

    /// Caps the batch size. Zero is treated as one.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Bounds how long one batch waits for its first event.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl UpdateSource for ChannelSource {
    async fn next_batch(&mut self) -> TransportResult<Option<Vec<BoxedEvent>>> {
        let first = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, self.receiver.recv()).await {
                Ok(first) => first,
                Err(_) => return Ok(Some(Vec::new())),
            },
            None => self.receiver.recv().await,
        };
        let Some(first) = first else {
            return Ok(None);
        };

        let mut batch = vec![first];
        while batch.len() < self.limit {
            match self.receiver.try_recv() {
                Ok(event) => batch.push(event),
                Err(_) => break,
            }
        }
        Ok(Some(batch))
    }

    fn configure(&mut self, options: &FetchOptions) {
        self.limit = options.limit.max(1);
        self.timeout = Some(options.timeout);
    }
}
