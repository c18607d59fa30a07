//! Parse-and-route dispatcher
//!
//! The dispatcher is the single writer of the discovery cache. Datagrams are
//! parsed, queries are offered to the published local devices, and
//! announces/answers flow into the cache, whose transitions are fanned out
//! to every subscriber.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::cache::{DiscoveryCache, ExpiryNotice};
use crate::config::EngineConfig;
use crate::events::DiscoveryEvent;
use crate::message::MessageParser;
use crate::query::{LocalDevice, SearchQueryBuilder};
use crate::socket::Transport;
use crate::types::{DiscoveryResult, SearchQuery, SearchTargetType, SsdpMessage};

/// Upper bound applied to a requester's MX before picking a reply delay.
const MAX_REPLY_DELAY_SECS: u32 = 5;

pub(crate) struct Dispatcher<T: Transport> {
    parser: MessageParser,
    builder: SearchQueryBuilder,
    transport: Arc<T>,
    cache: DiscoveryCache,
    observers: Vec<std_mpsc::Sender<DiscoveryEvent>>,
    published: HashMap<String, LocalDevice>,
    pending_answers: JoinSet<()>,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(config: &EngineConfig, transport: Arc<T>, expiry_tx: mpsc::UnboundedSender<ExpiryNotice>) -> Self {
        Self {
            parser: MessageParser::new(config.default_max_age),
            builder: SearchQueryBuilder::new(
                config.multicast_addr,
                config.port,
                config.server_string.clone(),
            ),
            transport,
            cache: DiscoveryCache::new(expiry_tx),
            observers: Vec::new(),
            published: HashMap::new(),
            pending_answers: JoinSet::new(),
        }
    }

    pub fn subscribe(&mut self, observer: std_mpsc::Sender<DiscoveryEvent>) {
        self.observers.push(observer);
    }

    /// Broadcast an M-SEARCH.
    pub fn search(&self, target_type: SearchTargetType, target_value: &str, mx: u32) -> bool {
        let request = self.builder.build_search(target_type, target_value, mx);
        let sent = self.transport.send_to_all(&request);
        tracing::debug!(
            "M-SEARCH {} '{}' (MX={}) {}",
            target_type,
            target_value,
            mx,
            if sent { "sent" } else { "not sent" }
        );
        sent
    }

    /// Register `device` as a local responder and broadcast its alive set.
    pub fn publish(&mut self, device: LocalDevice) -> bool {
        let set = self.builder.build_announcement_set(&device);
        let sent = self.broadcast_set(&set);
        tracing::info!("Published {} ({} notifications)", device.udn, set.len());
        self.published.insert(device.udn.clone(), device);
        sent
    }

    /// Drop a local responder and broadcast its byebye set.
    pub fn unpublish(&mut self, udn: &str) -> bool {
        let udn = udn.strip_prefix("uuid:").unwrap_or(udn);
        match self.published.remove(udn) {
            Some(device) => {
                tracing::info!("Unpublished {}", udn);
                self.broadcast_set(&self.builder.build_byebye_set(&device))
            }
            None => {
                tracing::debug!("Unpublish for unknown device {}", udn);
                false
            }
        }
    }

    /// Re-broadcast the alive set of every published device.
    pub fn reannounce(&self) -> bool {
        let mut sent = false;
        for device in self.published.values() {
            let device_sent = self.broadcast_set(&self.builder.build_announcement_set(device));
            sent = sent || device_sent;
        }
        sent
    }

    pub fn handle_datagram(&mut self, payload: &[u8], from: SocketAddr) {
        let message = match self.parser.parse(payload, from) {
            Ok(message) => message,
            Err(e) => {
                tracing::trace!("Discarding datagram from {}: {}", from, e);
                return;
            }
        };

        match message {
            SsdpMessage::Query(query) => {
                self.answer_query(&query);
                self.emit(DiscoveryEvent::NewSearchQuery(query));
            }
            SsdpMessage::Announce(result) => {
                if let Some(event) = self.cache.apply_announce(result) {
                    self.emit(event);
                }
            }
            SsdpMessage::QueryAnswer(result) => {
                if let Some(event) = self.cache.apply_answer(result) {
                    self.emit(event);
                }
            }
        }
    }

    pub fn handle_expiry(&mut self, notice: ExpiryNotice) {
        if let Some(event) = self.cache.expire(notice) {
            self.emit(event);
        }
    }

    pub fn known_services(&self) -> Vec<DiscoveryResult> {
        self.cache.snapshot()
    }

    /// Cancel timers and pending answers, optionally saying byebye first.
    pub fn shutdown(&mut self, send_byebye: bool) {
        if send_byebye {
            for device in self.published.values() {
                self.broadcast_set(&self.builder.build_byebye_set(device));
            }
        }
        self.pending_answers.abort_all();
        self.cache.clear();
        self.published.clear();
        self.observers.clear();
    }

    fn answer_query(&mut self, query: &SearchQuery) {
        while self.pending_answers.try_join_next().is_some() {}

        let answers: Vec<Vec<u8>> = self
            .published
            .values()
            .flat_map(|device| {
                device
                    .matching_targets(query)
                    .into_iter()
                    .map(|st| self.builder.build_search_answer(device, &st))
                    .collect::<Vec<_>>()
            })
            .collect();

        if answers.is_empty() {
            return;
        }

        let max_delay_ms = u64::from(query.mx.min(MAX_REPLY_DELAY_SECS)) * 1000;
        let delay = Duration::from_millis(rand::rng().random_range(0..=max_delay_ms));
        let transport = Arc::clone(&self.transport);
        let requester = query.requester;
        tracing::debug!(
            "Answering {} '{}' from {} with {} message(s) in {:?}",
            query.target_type,
            query.target,
            requester,
            answers.len(),
            delay
        );

        self.pending_answers.spawn(async move {
            tokio::time::sleep(delay).await;
            for answer in &answers {
                transport.send_to(answer, requester);
            }
        });
    }

    fn broadcast_set(&self, set: &[Vec<u8>]) -> bool {
        set.iter().fold(false, |sent, payload| {
            let this_sent = self.transport.send_to_all(payload);
            sent || this_sent
        })
    }

    fn emit(&mut self, event: DiscoveryEvent) {
        self.observers.retain(|observer| observer.send(event.clone()).is_ok());
    }
}
