//! Multicast socket management
//!
//! Owns one query socket per active IPv4 interface (used to send searches
//! and announcements and to receive unicast answers) plus one shared
//! listener bound to the SSDP group port (receives announcements and
//! searches addressed to the group).
//!
//! Failures are per interface: an interface that cannot be bound or joined
//! is logged and skipped, and a manager with no sockets at all is inert.
//!
//! Each socket is registered with tokio for reading and keeps a cloned std
//! handle for writing. The std handle sends immediately on a non-blocking
//! fd, whereas tokio's `try_send_to` fails with `WouldBlock` until the
//! reactor has observed write readiness.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::EngineConfig;

/// Outbound side of the socket layer.
///
/// Sends are non-blocking and fire-and-forget; the return value only says
/// whether at least one socket accepted the datagram.
pub(crate) trait Transport: Send + Sync + 'static {
    /// Send `payload` to the multicast group on every query socket.
    fn send_to_all(&self, payload: &[u8]) -> bool;

    /// Unicast `payload` to `target`.
    fn send_to(&self, payload: &[u8], target: SocketAddr) -> bool;
}

/// A received datagram and its sender.
#[derive(Debug)]
pub(crate) struct Datagram {
    pub payload: Vec<u8>,
    pub from: SocketAddr,
}

/// Read and write halves of one bound socket.
#[derive(Debug)]
struct Endpoint {
    reader: Arc<UdpSocket>,
    writer: std::net::UdpSocket,
}

impl Endpoint {
    fn register(socket: std::net::UdpSocket) -> io::Result<Self> {
        let writer = socket.try_clone()?;
        let reader = Arc::new(UdpSocket::from_std(socket)?);
        Ok(Self { reader, writer })
    }
}

#[derive(Debug)]
struct QuerySocket {
    interface: Ipv4Addr,
    endpoint: Endpoint,
}

/// Owns every socket the engine reads from or writes to.
#[derive(Debug)]
pub(crate) struct SocketManager {
    group: SocketAddrV4,
    query_sockets: Vec<QuerySocket>,
    listener: Option<Endpoint>,
    recv_buffer_size: usize,
}

impl SocketManager {
    /// Open all sockets described by `config`.
    ///
    /// Must run inside a tokio runtime. Never fails: interfaces that cannot
    /// be set up are skipped.
    pub fn initialize(config: &EngineConfig) -> Self {
        let group = SocketAddrV4::new(config.multicast_addr, config.port);
        let interfaces = active_interfaces(config);

        let mut query_sockets = Vec::new();
        for interface in &interfaces {
            match open_query_socket(config, *interface).and_then(Endpoint::register) {
                Ok(endpoint) => {
                    tracing::debug!("SSDP: query socket ready on {}", interface);
                    query_sockets.push(QuerySocket {
                        interface: *interface,
                        endpoint,
                    });
                }
                Err(e) => {
                    tracing::warn!("SSDP: skipping interface {}: {}", interface, e);
                }
            }
        }

        let listener = if config.bind_listener {
            match open_listener(config, &interfaces).and_then(Endpoint::register) {
                Ok(endpoint) => Some(endpoint),
                Err(e) => {
                    tracing::warn!("SSDP: failed to bind listener on port {}: {}", config.port, e);
                    None
                }
            }
        } else {
            None
        };

        tracing::info!(
            "SSDP sockets ready: {} query socket(s), listener {}",
            query_sockets.len(),
            if listener.is_some() { "bound" } else { "absent" }
        );

        Self {
            group,
            query_sockets,
            listener,
            recv_buffer_size: config.recv_buffer_size,
        }
    }

    /// Number of open sockets, listener included.
    pub fn socket_count(&self) -> usize {
        self.query_sockets.len() + usize::from(self.listener.is_some())
    }

    /// Interfaces that have a query socket.
    pub fn interfaces(&self) -> Vec<Ipv4Addr> {
        self.query_sockets.iter().map(|q| q.interface).collect()
    }

    /// Spawn one reader task per socket, each forwarding into `tx`.
    ///
    /// Datagrams from one socket are forwarded in arrival order.
    pub fn spawn_readers(&self, tx: mpsc::UnboundedSender<Datagram>) -> Vec<JoinHandle<()>> {
        self.query_sockets
            .iter()
            .map(|q| &q.endpoint)
            .chain(self.listener.iter())
            .map(|endpoint| Arc::clone(&endpoint.reader))
            .map(|socket| {
                let tx = tx.clone();
                let buffer_size = self.recv_buffer_size;
                tokio::spawn(read_loop(socket, buffer_size, tx))
            })
            .collect()
    }
}

impl Transport for SocketManager {
    fn send_to_all(&self, payload: &[u8]) -> bool {
        let target = SocketAddr::V4(self.group);
        let mut sent = false;
        for query in &self.query_sockets {
            match query.endpoint.writer.send_to(payload, target) {
                Ok(_) => sent = true,
                Err(e) => {
                    tracing::warn!("SSDP: send to {} via {} failed: {}", target, query.interface, e);
                }
            }
        }
        sent
    }

    fn send_to(&self, payload: &[u8], target: SocketAddr) -> bool {
        let sockets = self
            .query_sockets
            .iter()
            .map(|q| &q.endpoint)
            .chain(self.listener.iter());

        for endpoint in sockets {
            match endpoint.writer.send_to(payload, target) {
                Ok(_) => return true,
                Err(e) => tracing::debug!("SSDP: unicast to {} failed: {}", target, e),
            }
        }
        tracing::warn!("SSDP: no socket could reach {}", target);
        false
    }
}

/// Drain every pending datagram each time the socket becomes readable.
async fn read_loop(socket: Arc<UdpSocket>, buffer_size: usize, tx: mpsc::UnboundedSender<Datagram>) {
    let mut buf = vec![0u8; buffer_size];
    loop {
        if let Err(e) = socket.readable().await {
            tracing::warn!("SSDP: socket readiness failed: {}", e);
            return;
        }

        loop {
            match socket.try_recv_from(&mut buf) {
                Ok((n, from)) => {
                    let datagram = Datagram {
                        payload: buf[..n].to_vec(),
                        from,
                    };
                    if tx.send(datagram).is_err() {
                        tracing::debug!("SSDP: dispatcher gone, stopping reader");
                        return;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    tracing::warn!("SSDP: read error: {}", e);
                    break;
                }
            }
        }
    }
}

/// Active IPv4 interface addresses, filtered by `config`.
fn active_interfaces(config: &EngineConfig) -> Vec<Ipv4Addr> {
    let discovered = match get_if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            tracing::warn!("SSDP: failed to enumerate interfaces: {}", e);
            return Vec::new();
        }
    };

    let mut addresses: Vec<Ipv4Addr> = discovered
        .iter()
        .filter_map(|iface| match iface.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        })
        .filter(|ip| config.include_loopback || !ip.is_loopback())
        .filter(|ip| {
            config
                .interfaces
                .as_ref()
                .map_or(true, |allowed| allowed.contains(ip))
        })
        .collect();

    addresses.sort();
    addresses.dedup();
    addresses
}

fn open_query_socket(config: &EngineConfig, interface: Ipv4Addr) -> io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_multicast_loop_v4(config.multicast_loop)?;
    socket.set_multicast_ttl_v4(config.multicast_ttl)?;
    socket.set_multicast_if_v4(&interface)?;
    socket.join_multicast_v4(&config.multicast_addr, &interface)?;
    socket.bind(&SocketAddrV4::new(interface, 0).into())?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

fn open_listener(config: &EngineConfig, interfaces: &[Ipv4Addr]) -> io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket.set_reuse_port(true)?;
    socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port).into())?;

    let mut joined = 0;
    for interface in interfaces {
        match socket.join_multicast_v4(&config.multicast_addr, interface) {
            Ok(()) => {
                tracing::debug!("SSDP: listener joined {} on {}", config.multicast_addr, interface);
                joined += 1;
            }
            Err(e) => {
                tracing::warn!(
                    "SSDP: listener failed to join {} on {}: {}",
                    config.multicast_addr,
                    interface,
                    e
                );
            }
        }
    }
    if joined == 0 {
        // Let the kernel pick the interface; unicast searches still arrive
        // if this fails too
        if let Err(e) = socket.join_multicast_v4(&config.multicast_addr, &Ipv4Addr::UNSPECIFIED) {
            tracing::warn!(
                "SSDP: listener on port {} receives unicast only: {}",
                config.port,
                e
            );
        }
    }

    socket.set_nonblocking(true)?;
    Ok(socket.into())
}
