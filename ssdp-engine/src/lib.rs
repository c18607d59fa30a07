//! SSDP discovery engine
//!
//! This crate discovers and announces UPnP devices and services on the local
//! network segment using SSDP (Simple Service Discovery Protocol), the
//! multicast-UDP discovery layer of UPnP.
//!
//! # Quick Start
//!
//! ```no_run
//! use ssdp_engine::{DiscoveryEvent, EngineConfig, SsdpEngine};
//! use std::time::Duration;
//!
//! let mut engine = SsdpEngine::new(EngineConfig::default())?;
//! let events = engine.subscribe();
//! engine.initialize()?;
//!
//! engine.search_all_root_device(2);
//! for event in events.timeout_iter(Duration::from_secs(3)) {
//!     match event {
//!         DiscoveryEvent::NewService(service) => println!("+ {}", service.usn),
//!         DiscoveryEvent::RemovedService(service) => println!("- {}", service.usn),
//!         DiscoveryEvent::NewSearchQuery(query) => println!("? {}", query.target),
//!     }
//! }
//! # Ok::<(), ssdp_engine::SsdpError>(())
//! ```
//!
//! # Publishing a device
//!
//! ```no_run
//! use ssdp_engine::{LocalDevice, SsdpEngine};
//!
//! let mut engine = SsdpEngine::new(Default::default())?;
//! engine.initialize()?;
//!
//! let device = LocalDevice::new(
//!     "4d696e69-444c-164e-9d41-ecf4bb9c317e",
//!     "urn:schemas-upnp-org:device:MediaServer:1",
//!     "http://192.168.1.10:8200/rootDesc.xml",
//! )
//! .with_service("urn:schemas-upnp-org:service:ContentDirectory:1");
//!
//! engine.publish_device(&device);
//! # Ok::<(), ssdp_engine::SsdpError>(())
//! ```
//!
//! # Architecture
//!
//! - [`MessageParser`] classifies and validates datagrams
//! - [`SearchQueryBuilder`] formats searches, announcements and answers
//! - the socket manager owns one query socket per IPv4 interface plus a
//!   shared listener on the group port
//! - [`DiscoveryCache`] tracks visible services with per-entry TTL timers
//! - [`SsdpEngine`] drives all of the above from one background worker
//!   thread and fans events out to subscribers

use std::net::Ipv4Addr;

pub mod cache;
pub mod config;
mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod message;
pub mod query;
mod socket;
pub mod types;
mod worker;

pub use cache::{DiscoveryCache, ExpiryNotice};
pub use config::EngineConfig;
pub use engine::SsdpEngine;
pub use error::{ParseError, Result, SsdpError};
pub use events::{DiscoveryEvent, EventReceiver};
pub use message::MessageParser;
pub use query::{LocalDevice, SearchQueryBuilder};
pub use types::{
    DiscoveryResult, NotificationSubType, SearchQuery, SearchTargetType, SsdpMessage,
    SsdpMessageType,
};

/// SSDP multicast group
pub const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// Default SSDP port
pub const SSDP_PORT: u16 = 1900;

/// Cache duration assumed when `CACHE-CONTROL` is absent (seconds)
pub const DEFAULT_MAX_AGE: u32 = 1800;
