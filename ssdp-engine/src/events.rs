//! Engine events and the blocking receiver handed to subscribers
//!
//! Every call to `SsdpEngine::subscribe` creates its own channel, so each
//! subscriber sees every event emitted after it registered.

use std::sync::mpsc;
use std::time::Duration;

use serde::Serialize;

use crate::types::{DiscoveryResult, SearchQuery};

/// Notification emitted by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DiscoveryEvent {
    /// A USN entered the discovery cache
    NewService(DiscoveryResult),
    /// A USN left the cache, by byebye or TTL expiry
    RemovedService(DiscoveryResult),
    /// A remote control point sent an M-SEARCH
    NewSearchQuery(SearchQuery),
}

/// Blocking receiver over engine events
///
/// `next()` blocks until an event is available or the engine shuts down.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<DiscoveryEvent>,
}

impl EventReceiver {
    pub(crate) fn new(rx: mpsc::Receiver<DiscoveryEvent>) -> Self {
        Self { rx }
    }

    /// Create a connected sender/receiver pair.
    pub(crate) fn channel() -> (mpsc::Sender<DiscoveryEvent>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self::new(rx))
    }

    /// Block until an event is available
    ///
    /// Returns `None` once the engine has shut down.
    pub fn recv(&self) -> Option<DiscoveryEvent> {
        self.rx.recv().ok()
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&self) -> Option<DiscoveryEvent> {
        self.rx.try_recv().ok()
    }

    /// Block until an event is available or timeout expires
    pub fn recv_timeout(&self, timeout: Duration) -> Option<DiscoveryEvent> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Non-blocking iterator over currently queued events
    pub fn try_iter(&self) -> TryIterator<'_> {
        TryIterator { inner: self }
    }

    /// Blocking iterator that gives up after `timeout` without an event
    pub fn timeout_iter(&self, timeout: Duration) -> TimeoutIterator<'_> {
        TimeoutIterator {
            inner: self,
            timeout,
        }
    }
}

impl Iterator for EventReceiver {
    type Item = DiscoveryEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

/// Non-blocking iterator over queued events
pub struct TryIterator<'a> {
    inner: &'a EventReceiver,
}

impl<'a> Iterator for TryIterator<'a> {
    type Item = DiscoveryEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.try_recv()
    }
}

/// Blocking iterator with timeout
pub struct TimeoutIterator<'a> {
    inner: &'a EventReceiver,
    timeout: Duration,
}

impl<'a> Iterator for TimeoutIterator<'a> {
    type Item = DiscoveryEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.recv_timeout(self.timeout)
    }
}
