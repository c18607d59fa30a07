//! Sync-first SSDP engine
//!
//! Provides a fully synchronous API over the background worker. Searches
//! and publications return whether at least one socket transmitted; they
//! never promise that a remote peer will answer.

use std::sync::{mpsc as std_mpsc, Mutex};
use std::thread::JoinHandle;

use tokio::sync::mpsc;

use crate::config::EngineConfig;
use crate::error::{Result, SsdpError};
use crate::events::{DiscoveryEvent, EventReceiver};
use crate::query::LocalDevice;
use crate::types::{DiscoveryResult, SearchTargetType};
use crate::worker::{spawn_engine_worker, Command};

/// SSDP discovery engine
///
/// # Example
///
/// ```no_run
/// use ssdp_engine::{DiscoveryEvent, SsdpEngine};
/// use std::time::Duration;
///
/// let mut engine = SsdpEngine::new(Default::default())?;
/// let events = engine.subscribe();
/// engine.initialize()?;
///
/// engine.search_all_upnp_device(2);
/// for event in events.timeout_iter(Duration::from_secs(3)) {
///     if let DiscoveryEvent::NewService(service) = event {
///         println!("{} at {}", service.usn, service.location);
///     }
/// }
/// # Ok::<(), ssdp_engine::SsdpError>(())
/// ```
pub struct SsdpEngine {
    config: EngineConfig,

    /// Set once `initialize()` has started the worker
    running: Option<Running>,

    /// An engine is initialized at most once; set by `shutdown()`
    stopped: bool,

    /// Observers registered before the worker existed
    pending_observers: Mutex<Vec<std_mpsc::Sender<DiscoveryEvent>>>,
}

struct Running {
    command_tx: mpsc::UnboundedSender<Command>,
    socket_count: usize,
    worker: Option<JoinHandle<()>>,
}

impl SsdpEngine {
    /// Create an engine. No socket is opened until [`initialize`](Self::initialize).
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            running: None,
            stopped: false,
            pending_observers: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Open the sockets and start the worker.
    ///
    /// Returns the number of sockets opened. Zero leaves the engine inert:
    /// every search or publication then returns `false`. Calling this again
    /// is a no-op returning the same count. After [`shutdown`](Self::shutdown)
    /// the engine cannot be restarted and this returns
    /// [`SsdpError::WorkerDisconnected`]; create a new engine instead.
    pub fn initialize(&mut self) -> Result<usize> {
        if let Some(running) = &self.running {
            return Ok(running.socket_count);
        }
        if self.stopped {
            return Err(SsdpError::WorkerDisconnected);
        }

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let worker = spawn_engine_worker(self.config.clone(), command_rx, ready_tx)?;

        let socket_count = match ready_rx.recv() {
            Ok(count) => count,
            Err(_) => {
                let _ = worker.join();
                return Err(SsdpError::Runtime(
                    "worker exited before opening sockets".to_string(),
                ));
            }
        };

        let pending = match self.pending_observers.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for observer in pending {
            let _ = command_tx.send(Command::Subscribe { observer });
        }

        self.running = Some(Running {
            command_tx,
            socket_count,
            worker: Some(worker),
        });
        Ok(socket_count)
    }

    pub fn is_initialized(&self) -> bool {
        self.running.is_some()
    }

    /// Search for every UPnP device and service (`ssdp:all`).
    pub fn search_all_upnp_device(&self, max_delay: u32) -> bool {
        self.search(SearchTargetType::All, "", max_delay)
    }

    /// Search for root devices (`upnp:rootdevice`).
    pub fn search_all_root_device(&self, max_delay: u32) -> bool {
        self.search(SearchTargetType::RootDevice, "", max_delay)
    }

    /// Search for one device by UUID, with or without the `uuid:` prefix.
    pub fn search_by_device_uuid(&self, uuid: &str, max_delay: u32) -> bool {
        self.search(SearchTargetType::DeviceUuid, uuid, max_delay)
    }

    /// Search by device type, e.g. `schemas-upnp-org:device:MediaServer:1`.
    pub fn search_by_device_type(&self, device_type: &str, max_delay: u32) -> bool {
        self.search(SearchTargetType::DeviceType, device_type, max_delay)
    }

    /// Search by service type, e.g. `schemas-upnp-org:service:ContentDirectory:1`.
    pub fn search_by_service_type(&self, service_type: &str, max_delay: u32) -> bool {
        self.search(SearchTargetType::ServiceType, service_type, max_delay)
    }

    /// Broadcast the alive set of `device` and answer matching searches for it.
    ///
    /// Call again before `device.cache_control` lapses to keep remote caches
    /// alive, or configure `reannounce_interval`.
    pub fn publish_device(&self, device: &LocalDevice) -> bool {
        self.request(|reply| Command::Publish {
            device: device.clone(),
            reply,
        })
        .unwrap_or(false)
    }

    /// Broadcast the byebye set of a published device and stop answering for it.
    pub fn unpublish_device(&self, udn: &str) -> bool {
        self.request(|reply| Command::Unpublish {
            udn: udn.to_string(),
            reply,
        })
        .unwrap_or(false)
    }

    /// Register for `NewService`, `RemovedService` and `NewSearchQuery` events.
    ///
    /// May be called before `initialize()`; such subscribers see every event.
    pub fn subscribe(&self) -> EventReceiver {
        let (observer, receiver) = EventReceiver::channel();

        match &self.running {
            Some(running) => {
                if running.command_tx.send(Command::Subscribe { observer }).is_err() {
                    tracing::warn!("Subscribed to an engine whose worker has stopped");
                }
            }
            None => match self.pending_observers.lock() {
                Ok(mut pending) => pending.push(observer),
                Err(poisoned) => poisoned.into_inner().push(observer),
            },
        }
        receiver
    }

    /// Snapshot of the services currently in the discovery cache.
    pub fn known_services(&self) -> Vec<DiscoveryResult> {
        self.request(|reply| Command::KnownServices { reply })
            .unwrap_or_default()
    }

    /// Stop the worker: cancel every timer, close every socket.
    ///
    /// Called automatically on drop.
    pub fn shutdown(&mut self) {
        if let Some(mut running) = self.running.take() {
            self.stopped = true;
            let _ = running.command_tx.send(Command::Shutdown);
            if let Some(worker) = running.worker.take() {
                if worker.join().is_err() {
                    tracing::error!("SSDP worker panicked");
                }
            }
        }
    }

    fn search(&self, target_type: SearchTargetType, target_value: &str, mx: u32) -> bool {
        self.request(|reply| Command::Search {
            target_type,
            target_value: target_value.to_string(),
            mx,
            reply,
        })
        .unwrap_or(false)
    }

    /// Send a command and block for its reply.
    fn request<R>(&self, build: impl FnOnce(std_mpsc::Sender<R>) -> Command) -> Result<R> {
        let running = self.running.as_ref().ok_or(SsdpError::NotInitialized)?;
        let (reply_tx, reply_rx) = std_mpsc::channel();

        running
            .command_tx
            .send(build(reply_tx))
            .map_err(|_| SsdpError::WorkerDisconnected)?;
        reply_rx.recv().map_err(|_| SsdpError::WorkerDisconnected)
    }
}

impl Drop for SsdpEngine {
    fn drop(&mut self) {
        tracing::debug!("SsdpEngine dropping");
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inert_config() -> EngineConfig {
        EngineConfig {
            interfaces: Some(Vec::new()),
            bind_listener: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = SsdpEngine::new(EngineConfig::default().with_port(0));
        assert!(matches!(result, Err(SsdpError::Configuration(_))));
    }

    #[test]
    fn test_operations_before_initialize_fail() {
        let engine = SsdpEngine::new(inert_config()).unwrap();
        assert!(!engine.is_initialized());
        assert!(!engine.search_all_upnp_device(2));
        assert!(!engine.publish_device(&LocalDevice::new("abc", "urn:x:device:Basic:1", "http://a/")));
        assert!(engine.known_services().is_empty());
        assert!(matches!(
            engine.request(|reply| Command::KnownServices { reply }),
            Err(SsdpError::NotInitialized)
        ));
    }

    #[test]
    fn test_inert_engine_returns_false() {
        let mut engine = SsdpEngine::new(inert_config()).unwrap();
        assert_eq!(engine.initialize().unwrap(), 0);
        assert!(engine.is_initialized());

        assert!(!engine.search_all_upnp_device(2));
        assert!(!engine.search_all_root_device(2));
        assert!(!engine.search_by_device_uuid("1234", 2));
        assert!(!engine.search_by_device_type("schemas-upnp-org:device:MediaServer:1", 2));
        assert!(!engine.search_by_service_type("schemas-upnp-org:service:ContentDirectory:1", 2));
        assert!(!engine.publish_device(&LocalDevice::new("abc", "urn:x:device:Basic:1", "http://a/")));
        assert!(!engine.unpublish_device("abc"));
        assert!(engine.known_services().is_empty());
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let mut engine = SsdpEngine::new(inert_config()).unwrap();
        let first = engine.initialize().unwrap();
        let second = engine.initialize().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_shutdown_closes_subscriptions() {
        let mut engine = SsdpEngine::new(inert_config()).unwrap();
        let early = engine.subscribe();
        engine.initialize().unwrap();
        let late = engine.subscribe();

        engine.shutdown();
        assert!(!engine.is_initialized());
        assert!(early.recv().is_none());
        assert!(late.recv().is_none());

        // Second shutdown is harmless
        engine.shutdown();
    }

    #[test]
    fn test_initialize_after_shutdown_is_refused() {
        let mut engine = SsdpEngine::new(inert_config()).unwrap();
        engine.initialize().unwrap();
        engine.shutdown();

        assert!(matches!(engine.initialize(), Err(SsdpError::WorkerDisconnected)));
        assert!(!engine.is_initialized());
        assert!(!engine.search_all_upnp_device(2));
    }

    #[test]
    fn test_shutdown_before_initialize_does_not_block_initialize() {
        let mut engine = SsdpEngine::new(inert_config()).unwrap();
        engine.shutdown();
        assert_eq!(engine.initialize().unwrap(), 0);
    }
}
