//! Configuration types for the SSDP engine
//!
//! [`EngineConfig`] controls the multicast group, socket options, the
//! identification string sent in outbound messages and the optional
//! re-announcement of published devices.

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::error::SsdpError;
use crate::{DEFAULT_MAX_AGE, SSDP_MULTICAST_ADDR, SSDP_PORT};

/// Smallest receive buffer that still holds a typical SSDP datagram.
const MIN_RECV_BUFFER: usize = 512;

/// Configuration for the SsdpEngine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// SSDP multicast group
    /// Default: 239.255.255.250
    pub multicast_addr: Ipv4Addr,

    /// SSDP port, used for the shared listener and as the send destination
    /// Default: 1900
    pub port: u16,

    /// IP_MULTICAST_TTL on query sockets
    /// Default: 2
    pub multicast_ttl: u32,

    /// IP_MULTICAST_LOOP on query sockets
    /// Default: true
    pub multicast_loop: bool,

    /// Open query sockets on loopback interfaces too
    /// Default: false
    pub include_loopback: bool,

    /// Restrict query sockets to these interface addresses
    /// Default: None (all active IPv4 interfaces)
    pub interfaces: Option<Vec<Ipv4Addr>>,

    /// Bind the shared group/port listener that receives announcements
    /// Default: true
    pub bind_listener: bool,

    /// `SERVER` header value for announcements and answers
    /// Default: "<os>/<version> UPnP/1.0 upnp-ssdp-engine/<version>"
    pub server_string: String,

    /// Cache duration assumed when a message has no usable `CACHE-CONTROL`
    /// Default: 1800 seconds
    pub default_max_age: u32,

    /// Period for re-broadcasting published devices
    /// Default: None (re-announcement is left to the caller)
    pub reannounce_interval: Option<Duration>,

    /// Broadcast byebye for every published device on shutdown
    /// Default: true
    pub byebye_on_shutdown: bool,

    /// Receive buffer size per socket
    /// Default: 8192
    pub recv_buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            multicast_addr: SSDP_MULTICAST_ADDR,
            port: SSDP_PORT,
            multicast_ttl: 2,
            multicast_loop: true,
            include_loopback: false,
            interfaces: None,
            bind_listener: true,
            server_string: default_server_string(),
            default_max_age: DEFAULT_MAX_AGE,
            reannounce_interval: None,
            byebye_on_shutdown: true,
            recv_buffer_size: 8192,
        }
    }
}

impl EngineConfig {
    /// Create a new EngineConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// A control-point configuration: no shared listener, so only unicast
    /// answers to our own searches are received
    pub fn control_point() -> Self {
        Self {
            bind_listener: false,
            byebye_on_shutdown: false,
            ..Default::default()
        }
    }

    /// A configuration for hosts advertising devices, re-announcing at half
    /// the default cache duration
    pub fn device_host() -> Self {
        Self {
            reannounce_interval: Some(Duration::from_secs(u64::from(DEFAULT_MAX_AGE / 2))),
            ..Default::default()
        }
    }

    /// A configuration restricted to loopback, for local development
    pub fn loopback_only() -> Self {
        Self {
            include_loopback: true,
            interfaces: Some(vec![Ipv4Addr::LOCALHOST]),
            ..Default::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_server_string(mut self, server: impl Into<String>) -> Self {
        self.server_string = server.into();
        self
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), SsdpError> {
        if !self.multicast_addr.is_multicast() {
            return Err(SsdpError::Configuration(format!(
                "{} is not a multicast address",
                self.multicast_addr
            )));
        }

        if self.port == 0 {
            return Err(SsdpError::Configuration(
                "Port must be greater than 0".to_string(),
            ));
        }

        if self.multicast_ttl == 0 {
            return Err(SsdpError::Configuration(
                "Multicast TTL must be greater than 0".to_string(),
            ));
        }

        if self.recv_buffer_size < MIN_RECV_BUFFER {
            return Err(SsdpError::Configuration(format!(
                "Receive buffer must be at least {} bytes",
                MIN_RECV_BUFFER
            )));
        }

        if self.reannounce_interval == Some(Duration::ZERO) {
            return Err(SsdpError::Configuration(
                "Re-announce interval must be greater than 0".to_string(),
            ));
        }

        if self.server_string.trim().is_empty() {
            return Err(SsdpError::Configuration(
                "Server string must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// `<os>/<version> UPnP/1.0 <product>/<version>`
pub(crate) fn default_server_string() -> String {
    format!(
        "{}/{} UPnP/1.0 {}/{}",
        std::env::consts::OS,
        env!("CARGO_PKG_VERSION"),
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    )
}
