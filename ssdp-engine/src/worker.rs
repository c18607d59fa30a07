//! Background worker thread for the SSDP engine
//!
//! Spawns a thread with its own tokio runtime. The runtime owns the sockets,
//! one reader task per socket, and the dispatcher loop, which is the only
//! place the discovery cache is mutated.

use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::config::EngineConfig;
use crate::dispatch::Dispatcher;
use crate::events::DiscoveryEvent;
use crate::query::LocalDevice;
use crate::socket::SocketManager;
use crate::types::{DiscoveryResult, SearchTargetType};

/// Commands sent from the sync SsdpEngine to the background worker
#[derive(Debug)]
pub(crate) enum Command {
    /// Broadcast an M-SEARCH
    Search {
        target_type: SearchTargetType,
        target_value: String,
        mx: u32,
        reply: std_mpsc::Sender<bool>,
    },
    /// Announce a local device and answer searches for it
    Publish {
        device: LocalDevice,
        reply: std_mpsc::Sender<bool>,
    },
    /// Say byebye for a local device and stop answering for it
    Unpublish {
        udn: String,
        reply: std_mpsc::Sender<bool>,
    },
    /// Register an event observer
    Subscribe {
        observer: std_mpsc::Sender<DiscoveryEvent>,
    },
    /// Snapshot the discovery cache
    KnownServices {
        reply: std_mpsc::Sender<Vec<DiscoveryResult>>,
    },
    /// Shutdown the worker
    Shutdown,
}

/// Spawns the background engine worker thread
///
/// The number of opened sockets is reported on `ready_tx` once setup is
/// done; if the runtime cannot be created, `ready_tx` is dropped unsent.
pub(crate) fn spawn_engine_worker(
    config: EngineConfig,
    command_rx: mpsc::UnboundedReceiver<Command>,
    ready_tx: std_mpsc::Sender<usize>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("ssdp-engine".to_string())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::error!("Failed to create tokio runtime for SSDP worker: {}", e);
                    return;
                }
            };

            rt.block_on(run_engine_loop(config, command_rx, ready_tx));
        })
}

/// Main loop running inside the tokio runtime
async fn run_engine_loop(
    config: EngineConfig,
    mut command_rx: mpsc::UnboundedReceiver<Command>,
    ready_tx: std_mpsc::Sender<usize>,
) {
    let sockets = Arc::new(SocketManager::initialize(&config));
    let socket_count = sockets.socket_count();
    if socket_count == 0 {
        tracing::warn!("No usable SSDP sockets, engine is inert");
    }
    let _ = ready_tx.send(socket_count);

    let (datagram_tx, mut datagram_rx) = mpsc::unbounded_channel();
    let readers = sockets.spawn_readers(datagram_tx);

    let (expiry_tx, mut expiry_rx) = mpsc::unbounded_channel();
    let mut dispatcher = Dispatcher::new(&config, Arc::clone(&sockets), expiry_tx);

    let mut reannounce = config.reannounce_interval.map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    tracing::info!("SSDP worker started on {:?}", sockets.interfaces());

    loop {
        tokio::select! {
            command = command_rx.recv() => {
                let Some(command) = command else {
                    tracing::debug!("Engine handle dropped, shutting down worker");
                    break;
                };
                match command {
                    Command::Search { target_type, target_value, mx, reply } => {
                        let _ = reply.send(dispatcher.search(target_type, &target_value, mx));
                    }
                    Command::Publish { device, reply } => {
                        let _ = reply.send(dispatcher.publish(device));
                    }
                    Command::Unpublish { udn, reply } => {
                        let _ = reply.send(dispatcher.unpublish(&udn));
                    }
                    Command::Subscribe { observer } => {
                        dispatcher.subscribe(observer);
                    }
                    Command::KnownServices { reply } => {
                        let _ = reply.send(dispatcher.known_services());
                    }
                    Command::Shutdown => {
                        tracing::info!("Worker received shutdown command");
                        break;
                    }
                }
            }

            Some(datagram) = datagram_rx.recv() => {
                dispatcher.handle_datagram(&datagram.payload, datagram.from);
            }

            Some(notice) = expiry_rx.recv() => {
                dispatcher.handle_expiry(notice);
            }

            _ = tick(&mut reannounce) => {
                if !dispatcher.reannounce() {
                    tracing::debug!("Periodic re-announcement sent nothing");
                }
            }
        }
    }

    dispatcher.shutdown(config.byebye_on_shutdown);
    for reader in readers {
        reader.abort();
    }
    tracing::info!("SSDP worker shut down");
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
