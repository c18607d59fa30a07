//! Data model shared by the parser, the cache and the engine façade.

use serde::Serialize;
use std::fmt;
use std::net::SocketAddr;

/// Notification sub-type carried by the `NTS` header of an announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NotificationSubType {
    /// `ssdp:alive`
    Alive,
    /// `ssdp:byebye`
    ByeBye,
    /// `ssdp:discover`
    Discover,
    /// No `NTS` header (always the case for query answers) or an unknown value
    Invalid,
}

impl NotificationSubType {
    /// Resolve an `NTS` header value by suffix match.
    pub fn from_header(value: &str) -> Self {
        let value = value.trim();
        if value.ends_with("ssdp:alive") {
            Self::Alive
        } else if value.ends_with("ssdp:byebye") {
            Self::ByeBye
        } else if value.ends_with("ssdp:discover") {
            Self::Discover
        } else {
            Self::Invalid
        }
    }

    /// The wire form, or `None` for `Invalid`.
    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            Self::Alive => Some("ssdp:alive"),
            Self::ByeBye => Some("ssdp:byebye"),
            Self::Discover => Some("ssdp:discover"),
            Self::Invalid => None,
        }
    }
}

/// A remote service as seen through an announce or a query answer.
///
/// Keyed by [`usn`](Self::usn); the cache holds at most one live entry per USN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryResult {
    /// Notification type (announce) or search target (answer)
    pub nt: String,
    /// Unique service name, e.g. `uuid:<udn>::upnp:rootdevice`
    pub usn: String,
    /// URL of the device description
    pub location: String,
    /// Sub-type; always `Invalid` for query answers
    pub nts: NotificationSubType,
    /// `DATE` header, kept opaque
    pub announce_date: String,
    /// Advertised validity in seconds (`CACHE-CONTROL: max-age`)
    pub cache_duration: u32,
    /// `SERVER` header, when present
    pub server: Option<String>,
}

/// Category of an M-SEARCH target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SearchTargetType {
    /// `ssdp:all`
    All,
    /// `upnp:rootdevice`
    RootDevice,
    /// `uuid:<udn>`
    DeviceUuid,
    /// `urn:<domain>:device:<type>:<version>`
    DeviceType,
    /// `urn:<domain>:service:<type>:<version>`
    ServiceType,
}

impl SearchTargetType {
    /// Derive the category of a raw `ST` value.
    pub fn classify(st: &str) -> Option<Self> {
        if st.contains("ssdp:all") {
            Some(Self::All)
        } else if st.contains("upnp:rootdevice") {
            Some(Self::RootDevice)
        } else if st.starts_with("uuid:") {
            Some(Self::DeviceUuid)
        } else if st.starts_with("urn:") && st.contains("device:") {
            Some(Self::DeviceType)
        } else if st.starts_with("urn:") && st.contains("service:") {
            Some(Self::ServiceType)
        } else {
            None
        }
    }
}

/// An M-SEARCH received from a remote control point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchQuery {
    /// Category derived from `ST`
    pub target_type: SearchTargetType,
    /// Raw `ST` value
    pub target: String,
    /// Value of the `HOST` header
    pub host: String,
    /// Endpoint the datagram came from; answers are unicast here
    pub requester: SocketAddr,
    /// Maximum reply delay in seconds
    pub mx: u32,
}

/// Classification of a datagram, not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsdpMessageType {
    Query,
    QueryAnswer,
    Announce,
    Invalid,
}

impl SsdpMessageType {
    /// Classify a start line.
    pub fn from_start_line(line: &str) -> Self {
        match line.trim() {
            "M-SEARCH * HTTP/1.1" => Self::Query,
            "HTTP/1.1 200 OK" => Self::QueryAnswer,
            "NOTIFY * HTTP/1.1" => Self::Announce,
            _ => Self::Invalid,
        }
    }
}

/// A validated, typed SSDP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsdpMessage {
    Query(SearchQuery),
    QueryAnswer(DiscoveryResult),
    Announce(DiscoveryResult),
}

impl SsdpMessage {
    pub fn message_type(&self) -> SsdpMessageType {
        match self {
            Self::Query(_) => SsdpMessageType::Query,
            Self::QueryAnswer(_) => SsdpMessageType::QueryAnswer,
            Self::Announce(_) => SsdpMessageType::Announce,
        }
    }
}

impl fmt::Display for SearchTargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::All => "all",
            Self::RootDevice => "root-device",
            Self::DeviceUuid => "device-uuid",
            Self::DeviceType => "device-type",
            Self::ServiceType => "service-type",
        };
        f.write_str(name)
    }
}
