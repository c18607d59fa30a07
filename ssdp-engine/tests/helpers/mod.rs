//! Test helpers for fixture-based integration tests

#![allow(dead_code)]

use std::net::SocketAddr;

pub const MEDIA_SERVER_UUID: &str = "4d696e69-444c-164e-9d41-ecf4bb9c317e";
pub const MEDIA_SERVER_LOCATION: &str = "http://127.0.0.1:8200/rootDesc.xml";

/// A remote device that answers searches and announces itself
#[derive(Debug, Clone)]
pub struct DeviceFixture {
    pub uuid: String,
    pub location: String,
    pub max_age: u32,
    pub targets: Vec<String>,
}

impl DeviceFixture {
    /// MiniDLNA-style media server with ContentDirectory and ConnectionManager
    pub fn media_server() -> Self {
        Self {
            uuid: MEDIA_SERVER_UUID.to_string(),
            location: MEDIA_SERVER_LOCATION.to_string(),
            max_age: 1800,
            targets: vec![
                format!("uuid:{}", MEDIA_SERVER_UUID),
                "upnp:rootdevice".to_string(),
                "urn:schemas-upnp-org:device:MediaServer:1".to_string(),
                "urn:schemas-upnp-org:service:ContentDirectory:1".to_string(),
                "urn:schemas-upnp-org:service:ConnectionManager:1".to_string(),
            ],
        }
    }

    pub fn with_max_age(mut self, max_age: u32) -> Self {
        self.max_age = max_age;
        self
    }

    /// USN advertised for `target`
    pub fn usn(&self, target: &str) -> String {
        if target.starts_with("uuid:") {
            target.to_string()
        } else {
            format!("uuid:{}::{}", self.uuid, target)
        }
    }

    /// The `HTTP/1.1 200 OK` answer for one target
    pub fn answer(&self, target: &str) -> Vec<u8> {
        format!(
            "HTTP/1.1 200 OK\r\n\
             CACHE-CONTROL: max-age={}\r\n\
             DATE: Thu, 15 Oct 2026 10:00:00 GMT\r\n\
             ST: {}\r\n\
             USN: {}\r\n\
             EXT:\r\n\
             SERVER: Linux/6.1 DLNADOC/1.50 UPnP/1.0 MiniDLNA/1.3.0\r\n\
             LOCATION: {}\r\n\
             Content-Length: 0\r\n\
             \r\n",
            self.max_age,
            target,
            self.usn(target),
            self.location
        )
        .into_bytes()
    }

    /// Answers to a search for `st`, in advertisement order
    pub fn answers_for(&self, st: &str) -> Vec<Vec<u8>> {
        self.targets
            .iter()
            .filter(|target| st == "ssdp:all" || target.as_str() == st)
            .map(|target| self.answer(target))
            .collect()
    }

    /// A NOTIFY for one target with the given sub-type
    pub fn notify(&self, target: &str, nts: &str) -> Vec<u8> {
        format!(
            "NOTIFY * HTTP/1.1\r\n\
             HOST: 239.255.255.250:1900\r\n\
             CACHE-CONTROL: max-age={}\r\n\
             LOCATION: {}\r\n\
             NT: {}\r\n\
             NTS: {}\r\n\
             SERVER: Linux/6.1 DLNADOC/1.50 UPnP/1.0 MiniDLNA/1.3.0\r\n\
             USN: {}\r\n\
             \r\n",
            self.max_age,
            self.location,
            target,
            nts,
            self.usn(target)
        )
        .into_bytes()
    }
}

pub fn responder_addr() -> SocketAddr {
    "127.0.0.1:1900".parse().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answers_for_all() {
        assert_eq!(DeviceFixture::media_server().answers_for("ssdp:all").len(), 5);
    }

    #[test]
    fn test_answers_for_uuid() {
        let fixture = DeviceFixture::media_server();
        let answers = fixture.answers_for(&format!("uuid:{}", MEDIA_SERVER_UUID));
        assert_eq!(answers.len(), 1);
    }

    #[test]
    fn test_usn() {
        let fixture = DeviceFixture::media_server();
        assert_eq!(
            fixture.usn("upnp:rootdevice"),
            format!("uuid:{}::upnp:rootdevice", MEDIA_SERVER_UUID)
        );
    }
}
