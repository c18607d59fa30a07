//! Discovery cache with per-entry TTL expiry
//!
//! The cache maps each USN to the last accepted [`DiscoveryResult`] and one
//! expiry timer. Timers are independent spawned tasks: they only carry the
//! USN and a generation number, and report back over a channel owned by the
//! cache's single writer. A notice whose generation no longer matches the
//! entry (the entry was refreshed or removed after the timer fired) is
//! ignored.
//!
//! Transitions:
//! - absent -> present on the first alive announce or query answer
//! - present -> present on a repeated alive (timer rescheduled from now
//!   using the entry's declared cache duration); a repeated query answer
//!   leaves the timer untouched
//! - present -> absent on byebye or timer expiry

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::events::DiscoveryEvent;
use crate::types::{DiscoveryResult, NotificationSubType};

/// Sent by an entry's timer when its deadline passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryNotice {
    pub usn: String,
    generation: u64,
}

#[derive(Debug)]
struct CacheEntry {
    result: DiscoveryResult,
    generation: u64,
    deadline: Instant,
    timer: JoinHandle<()>,
}

/// Authoritative map of currently visible remote services.
#[derive(Debug)]
pub struct DiscoveryCache {
    entries: HashMap<String, CacheEntry>,
    next_generation: u64,
    expiry_tx: mpsc::UnboundedSender<ExpiryNotice>,
}

impl DiscoveryCache {
    /// Create an empty cache whose timers report to `expiry_tx`.
    ///
    /// Timers are spawned on the current tokio runtime.
    pub fn new(expiry_tx: mpsc::UnboundedSender<ExpiryNotice>) -> Self {
        Self {
            entries: HashMap::new(),
            next_generation: 0,
            expiry_tx,
        }
    }

    /// Apply a NOTIFY. Alive inserts or refreshes, byebye removes, anything
    /// else is ignored.
    pub fn apply_announce(&mut self, result: DiscoveryResult) -> Option<DiscoveryEvent> {
        match result.nts {
            NotificationSubType::Alive => {
                if self.entries.contains_key(&result.usn) {
                    self.refresh(&result.usn);
                    None
                } else {
                    Some(self.insert(result))
                }
            }
            NotificationSubType::ByeBye => self.remove(&result.usn),
            NotificationSubType::Discover | NotificationSubType::Invalid => None,
        }
    }

    /// Apply an M-SEARCH answer. Inserts unknown USNs; a repeat for a known
    /// USN does not refresh its timer.
    pub fn apply_answer(&mut self, result: DiscoveryResult) -> Option<DiscoveryEvent> {
        if self.entries.contains_key(&result.usn) {
            tracing::trace!("Answer for cached {} left unchanged", result.usn);
            return None;
        }
        Some(self.insert(result))
    }

    /// Handle a timer notice. Stale notices are ignored.
    pub fn expire(&mut self, notice: ExpiryNotice) -> Option<DiscoveryEvent> {
        match self.entries.get(&notice.usn) {
            Some(entry) if entry.generation == notice.generation => {
                tracing::debug!("Cache entry {} expired", notice.usn);
                self.remove(&notice.usn)
            }
            _ => {
                tracing::trace!("Ignoring stale expiry for {}", notice.usn);
                None
            }
        }
    }

    /// Remove `usn`, cancelling its timer. Unknown USNs are a no-op.
    pub fn remove(&mut self, usn: &str) -> Option<DiscoveryEvent> {
        let entry = self.entries.remove(usn)?;
        entry.timer.abort();
        tracing::debug!("Cache entry {} removed", usn);
        Some(DiscoveryEvent::RemovedService(entry.result))
    }

    pub fn get(&self, usn: &str) -> Option<&DiscoveryResult> {
        self.entries.get(usn).map(|entry| &entry.result)
    }

    /// When `usn` is due to expire.
    pub fn deadline(&self, usn: &str) -> Option<Instant> {
        self.entries.get(usn).map(|entry| entry.deadline)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clone of every cached result.
    pub fn snapshot(&self) -> Vec<DiscoveryResult> {
        self.entries.values().map(|entry| entry.result.clone()).collect()
    }

    /// Drop every entry and cancel every timer without emitting events.
    pub fn clear(&mut self) {
        for (_, entry) in self.entries.drain() {
            entry.timer.abort();
        }
    }

    fn insert(&mut self, result: DiscoveryResult) -> DiscoveryEvent {
        let generation = self.bump_generation();
        let (deadline, timer) = self.schedule(&result.usn, result.cache_duration, generation);
        tracing::debug!(
            "Cache entry {} added (expires in {}s)",
            result.usn,
            result.cache_duration
        );

        self.entries.insert(
            result.usn.clone(),
            CacheEntry {
                result: result.clone(),
                generation,
                deadline,
                timer,
            },
        );
        DiscoveryEvent::NewService(result)
    }

    fn refresh(&mut self, usn: &str) {
        let generation = self.bump_generation();
        let Some(cache_duration) = self.entries.get(usn).map(|e| e.result.cache_duration) else {
            return;
        };
        let (deadline, timer) = self.schedule(usn, cache_duration, generation);

        if let Some(entry) = self.entries.get_mut(usn) {
            entry.timer.abort();
            entry.timer = timer;
            entry.generation = generation;
            entry.deadline = deadline;
            tracing::trace!("Cache entry {} refreshed", usn);
        }
    }

    fn schedule(&self, usn: &str, seconds: u32, generation: u64) -> (Instant, JoinHandle<()>) {
        let ttl = Duration::from_secs(u64::from(seconds));
        let deadline = Instant::now() + ttl;
        let notice = ExpiryNotice {
            usn: usn.to_string(),
            generation,
        };
        let tx = self.expiry_tx.clone();

        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = tx.send(notice);
        });
        (deadline, timer)
    }

    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }
}

impl Drop for DiscoveryCache {
    fn drop(&mut self) {
        self.clear();
    }
}
