//! Outbound message formatting
//!
//! Builds M-SEARCH requests, NOTIFY announcement sets and unicast search
//! answers for locally hosted devices.

use std::net::Ipv4Addr;

use crate::types::{SearchQuery, SearchTargetType};
use crate::{DEFAULT_MAX_AGE, SSDP_MULTICAST_ADDR, SSDP_PORT};

/// A device hosted by this process and advertised over SSDP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDevice {
    /// Unique device name without the `uuid:` prefix
    pub udn: String,
    /// Full device type, e.g. `urn:schemas-upnp-org:device:MediaServer:1`
    pub device_type: String,
    /// URL of the device description
    pub location: String,
    /// Advertised validity in seconds
    pub cache_control: u32,
    /// Full service types exposed by the device
    pub services: Vec<String>,
}

impl LocalDevice {
    pub fn new(udn: impl Into<String>, device_type: impl Into<String>, location: impl Into<String>) -> Self {
        let udn = udn.into();
        let udn = udn.strip_prefix("uuid:").map(str::to_string).unwrap_or(udn);
        Self {
            udn,
            device_type: device_type.into(),
            location: location.into(),
            cache_control: DEFAULT_MAX_AGE,
            services: Vec::new(),
        }
    }

    pub fn with_cache_control(mut self, seconds: u32) -> Self {
        self.cache_control = seconds;
        self
    }

    /// Add a service type; duplicates are ignored.
    pub fn with_service(mut self, service_type: impl Into<String>) -> Self {
        let service_type = service_type.into();
        if !self.services.contains(&service_type) {
            self.services.push(service_type);
        }
        self
    }

    /// Notification types in announcement order: root device, bare UUID,
    /// device type, then one per service.
    pub fn notification_types(&self) -> Vec<String> {
        let mut types = vec![
            "upnp:rootdevice".to_string(),
            format!("uuid:{}", self.udn),
            self.device_type.clone(),
        ];
        types.extend(self.services.iter().cloned());
        types
    }

    /// USN advertised alongside `nt`.
    pub fn usn_for(&self, nt: &str) -> String {
        if nt.starts_with("uuid:") {
            nt.to_string()
        } else {
            format!("uuid:{}::{}", self.udn, nt)
        }
    }

    /// Notification types this device should answer for `query`, or an
    /// empty list when it does not match.
    pub fn matching_targets(&self, query: &SearchQuery) -> Vec<String> {
        match query.target_type {
            SearchTargetType::All => self.notification_types(),
            SearchTargetType::RootDevice => vec!["upnp:rootdevice".to_string()],
            SearchTargetType::DeviceUuid if query.target == format!("uuid:{}", self.udn) => {
                vec![query.target.clone()]
            }
            SearchTargetType::DeviceType if query.target == self.device_type => {
                vec![query.target.clone()]
            }
            SearchTargetType::ServiceType if self.services.contains(&query.target) => {
                vec![query.target.clone()]
            }
            _ => Vec::new(),
        }
    }
}

/// Formats outbound SSDP datagrams.
#[derive(Debug, Clone)]
pub struct SearchQueryBuilder {
    multicast_addr: Ipv4Addr,
    port: u16,
    server: String,
}

impl Default for SearchQueryBuilder {
    fn default() -> Self {
        Self::new(SSDP_MULTICAST_ADDR, SSDP_PORT, crate::config::default_server_string())
    }
}

impl SearchQueryBuilder {
    pub fn new(multicast_addr: Ipv4Addr, port: u16, server: impl Into<String>) -> Self {
        Self {
            multicast_addr,
            port,
            server: server.into(),
        }
    }

    /// Build an M-SEARCH request.
    ///
    /// For `DeviceType` and `ServiceType` the caller supplies the
    /// schema-qualified suffix (`schemas-upnp-org:device:MediaServer:1`);
    /// a value that already carries the `urn:` prefix is used as-is.
    pub fn build_search(&self, target_type: SearchTargetType, target_value: &str, max_delay: u32) -> Vec<u8> {
        let st = match target_type {
            SearchTargetType::All => "ssdp:all".to_string(),
            SearchTargetType::RootDevice => "upnp:rootdevice".to_string(),
            SearchTargetType::DeviceUuid => prefixed("uuid:", target_value),
            SearchTargetType::DeviceType | SearchTargetType::ServiceType => {
                prefixed("urn:", target_value)
            }
        };

        format!(
            "M-SEARCH * HTTP/1.1\r\n\
             HOST: {}:{}\r\n\
             MAN: \"ssdp:discover\"\r\n\
             MX: {}\r\n\
             ST: {}\r\n\
             \r\n",
            self.multicast_addr, self.port, max_delay, st
        )
        .into_bytes()
    }

    /// Build the `ssdp:alive` NOTIFY set for `device`, one datagram per
    /// notification type.
    pub fn build_announcement_set(&self, device: &LocalDevice) -> Vec<Vec<u8>> {
        device
            .notification_types()
            .iter()
            .map(|nt| {
                format!(
                    "NOTIFY * HTTP/1.1\r\n\
                     HOST: {}:{}\r\n\
                     CACHE-CONTROL: max-age={}\r\n\
                     LOCATION: {}\r\n\
                     NT: {}\r\n\
                     NTS: ssdp:alive\r\n\
                     SERVER: {}\r\n\
                     USN: {}\r\n\
                     \r\n",
                    self.multicast_addr,
                    self.port,
                    device.cache_control,
                    device.location,
                    nt,
                    self.server,
                    device.usn_for(nt)
                )
                .into_bytes()
            })
            .collect()
    }

    /// Build the `ssdp:byebye` NOTIFY set for `device`, same order as the
    /// announcement set.
    pub fn build_byebye_set(&self, device: &LocalDevice) -> Vec<Vec<u8>> {
        device
            .notification_types()
            .iter()
            .map(|nt| {
                format!(
                    "NOTIFY * HTTP/1.1\r\n\
                     HOST: {}:{}\r\n\
                     LOCATION: {}\r\n\
                     NT: {}\r\n\
                     NTS: ssdp:byebye\r\n\
                     USN: {}\r\n\
                     \r\n",
                    self.multicast_addr,
                    self.port,
                    device.location,
                    nt,
                    device.usn_for(nt)
                )
                .into_bytes()
            })
            .collect()
    }

    /// Build the unicast `HTTP/1.1 200 OK` answer for one search target.
    pub fn build_search_answer(&self, device: &LocalDevice, st: &str) -> Vec<u8> {
        let date = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT");

        format!(
            "HTTP/1.1 200 OK\r\n\
             CACHE-CONTROL: max-age={}\r\n\
             DATE: {}\r\n\
             EXT:\r\n\
             LOCATION: {}\r\n\
             SERVER: {}\r\n\
             ST: {}\r\n\
             USN: {}\r\n\
             \r\n",
            device.cache_control,
            date,
            device.location,
            self.server,
            st,
            device.usn_for(st)
        )
        .into_bytes()
    }
}

fn prefixed(prefix: &str, value: &str) -> String {
    if value.starts_with(prefix) {
        value.to_string()
    } else {
        format!("{}{}", prefix, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageParser;
    use crate::types::{NotificationSubType, SsdpMessage};
    use proptest::prelude::*;
    use std::net::SocketAddr;

    fn media_server() -> LocalDevice {
        LocalDevice::new(
            "4d696e69-444c-164e-9d41-ecf4bb9c317e",
            "urn:schemas-upnp-org:device:MediaServer:1",
            "http://127.0.0.1:8200/rootDesc.xml",
        )
        .with_service("urn:schemas-upnp-org:service:ContentDirectory:1")
        .with_service("urn:schemas-upnp-org:service:ConnectionManager:1")
    }

    fn sender() -> SocketAddr {
        "192.168.1.20:50000".parse().unwrap()
    }

    fn query(target_type: SearchTargetType, target: &str) -> SearchQuery {
        SearchQuery {
            target_type,
            target: target.to_string(),
            host: "239.255.255.250:1900".to_string(),
            requester: sender(),
            mx: 1,
        }
    }

    #[test]
    fn test_build_search_all() {
        let bytes = SearchQueryBuilder::default().build_search(SearchTargetType::All, "", 2);
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "M-SEARCH * HTTP/1.1\r\n\
             HOST: 239.255.255.250:1900\r\n\
             MAN: \"ssdp:discover\"\r\n\
             MX: 2\r\n\
             ST: ssdp:all\r\n\
             \r\n"
        );
    }

    #[test]
    fn test_build_search_uses_configured_port() {
        let builder = SearchQueryBuilder::new(SSDP_MULTICAST_ADDR, 1901, "test/1.0 UPnP/1.0 test/1.0");
        let text = String::from_utf8(builder.build_search(SearchTargetType::RootDevice, "", 1)).unwrap();
        assert!(text.contains("HOST: 239.255.255.250:1901\r\n"));
        assert!(text.contains("ST: upnp:rootdevice\r\n"));
    }

    #[test]
    fn test_build_search_service_type() {
        let bytes = SearchQueryBuilder::default().build_search(
            SearchTargetType::ServiceType,
            "schemas-upnp-org:service:ContentDirectory:1",
            3,
        );
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("ST: urn:schemas-upnp-org:service:ContentDirectory:1\r\n"));
    }

    #[test]
    fn test_build_search_uuid_roundtrip() {
        let bytes = SearchQueryBuilder::default().build_search(SearchTargetType::DeviceUuid, "1234", 2);
        let message = MessageParser::default().parse(&bytes, sender()).unwrap();
        let SsdpMessage::Query(parsed) = message else {
            panic!("expected a query");
        };
        assert_eq!(parsed.target_type, SearchTargetType::DeviceUuid);
        assert_eq!(parsed.target, "uuid:1234");
        assert_eq!(parsed.mx, 2);
    }

    proptest! {
        #[test]
        fn prop_device_uuid_search_reparses(uuid in "[0-9a-f]{8}(-[0-9a-f]{4}){3}-[0-9a-f]{12}", mx in 1u32..120) {
            let bytes = SearchQueryBuilder::default().build_search(SearchTargetType::DeviceUuid, &uuid, mx);
            let message = MessageParser::default().parse(&bytes, sender()).unwrap();
            let SsdpMessage::Query(parsed) = message else {
                panic!("expected a query");
            };
            prop_assert_eq!(parsed.target_type, SearchTargetType::DeviceUuid);
            prop_assert_eq!(parsed.target, format!("uuid:{}", uuid));
            prop_assert_eq!(parsed.mx, mx);
        }
    }

    #[test]
    fn test_announcement_set_order_and_headers() {
        let set = SearchQueryBuilder::default().build_announcement_set(&media_server().with_cache_control(900));
        assert_eq!(set.len(), 5);

        let expected = [
            (
                "upnp:rootdevice",
                "uuid:4d696e69-444c-164e-9d41-ecf4bb9c317e::upnp:rootdevice",
            ),
            (
                "uuid:4d696e69-444c-164e-9d41-ecf4bb9c317e",
                "uuid:4d696e69-444c-164e-9d41-ecf4bb9c317e",
            ),
            (
                "urn:schemas-upnp-org:device:MediaServer:1",
                "uuid:4d696e69-444c-164e-9d41-ecf4bb9c317e::urn:schemas-upnp-org:device:MediaServer:1",
            ),
            (
                "urn:schemas-upnp-org:service:ContentDirectory:1",
                "uuid:4d696e69-444c-164e-9d41-ecf4bb9c317e::urn:schemas-upnp-org:service:ContentDirectory:1",
            ),
            (
                "urn:schemas-upnp-org:service:ConnectionManager:1",
                "uuid:4d696e69-444c-164e-9d41-ecf4bb9c317e::urn:schemas-upnp-org:service:ConnectionManager:1",
            ),
        ];

        for (bytes, (nt, usn)) in set.iter().zip(expected) {
            let message = MessageParser::default().parse(bytes, sender()).unwrap();
            let SsdpMessage::Announce(result) = message else {
                panic!("expected an announce");
            };
            assert_eq!(result.nt, nt);
            assert_eq!(result.usn, usn);
            assert_eq!(result.nts, NotificationSubType::Alive);
            assert_eq!(result.cache_duration, 900);
            assert_eq!(result.location, "http://127.0.0.1:8200/rootDesc.xml");
            assert!(result.server.is_some());
        }
    }

    #[test]
    fn test_byebye_set_parses_as_byebye() {
        let set = SearchQueryBuilder::default().build_byebye_set(&media_server());
        assert_eq!(set.len(), 5);
        for bytes in &set {
            let message = MessageParser::default().parse(bytes, sender()).unwrap();
            let SsdpMessage::Announce(result) = message else {
                panic!("expected an announce");
            };
            assert_eq!(result.nts, NotificationSubType::ByeBye);
        }
    }

    #[test]
    fn test_search_answer_parses_as_answer() {
        let device = media_server();
        let bytes = SearchQueryBuilder::default().build_search_answer(&device, "upnp:rootdevice");
        let message = MessageParser::default().parse(&bytes, sender()).unwrap();
        let SsdpMessage::QueryAnswer(result) = message else {
            panic!("expected an answer");
        };
        assert_eq!(result.nt, "upnp:rootdevice");
        assert_eq!(result.usn, "uuid:4d696e69-444c-164e-9d41-ecf4bb9c317e::upnp:rootdevice");
        assert_eq!(result.nts, NotificationSubType::Invalid);
        assert!(result.announce_date.ends_with("GMT"));
    }

    #[test]
    fn test_local_device_strips_uuid_prefix() {
        let device = LocalDevice::new("uuid:abc", "urn:schemas-upnp-org:device:Basic:1", "http://a/");
        assert_eq!(device.udn, "abc");
        assert_eq!(device.usn_for("uuid:abc"), "uuid:abc");
    }

    #[test]
    fn test_with_service_ignores_duplicates() {
        let device = media_server().with_service("urn:schemas-upnp-org:service:ContentDirectory:1");
        assert_eq!(device.services.len(), 2);
    }

    #[test]
    fn test_matching_targets() {
        let device = media_server();

        assert_eq!(device.matching_targets(&query(SearchTargetType::All, "ssdp:all")).len(), 5);
        assert_eq!(
            device.matching_targets(&query(SearchTargetType::RootDevice, "upnp:rootdevice")),
            vec!["upnp:rootdevice".to_string()]
        );
        assert_eq!(
            device
                .matching_targets(&query(
                    SearchTargetType::DeviceUuid,
                    "uuid:4d696e69-444c-164e-9d41-ecf4bb9c317e"
                ))
                .len(),
            1
        );
        assert!(device
            .matching_targets(&query(SearchTargetType::DeviceUuid, "uuid:other"))
            .is_empty());
        assert_eq!(
            device
                .matching_targets(&query(
                    SearchTargetType::DeviceType,
                    "urn:schemas-upnp-org:device:MediaServer:1"
                ))
                .len(),
            1
        );
        assert!(device
            .matching_targets(&query(
                SearchTargetType::DeviceType,
                "urn:schemas-upnp-org:device:MediaRenderer:1"
            ))
            .is_empty());
        assert_eq!(
            device
                .matching_targets(&query(
                    SearchTargetType::ServiceType,
                    "urn:schemas-upnp-org:service:ConnectionManager:1"
                ))
                .len(),
            1
        );
    }
}
