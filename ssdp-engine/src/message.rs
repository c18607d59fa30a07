//! SSDP message parsing and classification
//!
//! Turns one raw datagram into a typed [`SsdpMessage`] or rejects it with a
//! [`ParseError`]. Header names are matched case-insensitively and values are
//! trimmed of the whitespace run following the colon.

use std::net::SocketAddr;

use crate::error::ParseError;
use crate::types::{
    DiscoveryResult, NotificationSubType, SearchQuery, SearchTargetType, SsdpMessage,
    SsdpMessageType,
};
use crate::DEFAULT_MAX_AGE;

/// Stateless datagram parser.
#[derive(Debug, Clone, Copy)]
pub struct MessageParser {
    default_max_age: u32,
}

impl Default for MessageParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_AGE)
    }
}

impl MessageParser {
    /// Create a parser that assumes `default_max_age` seconds when an
    /// announce or answer carries no usable `CACHE-CONTROL`.
    pub fn new(default_max_age: u32) -> Self {
        Self { default_max_age }
    }

    /// Classify and validate one datagram received from `from`.
    pub fn parse(&self, datagram: &[u8], from: SocketAddr) -> Result<SsdpMessage, ParseError> {
        let text = std::str::from_utf8(datagram).map_err(|_| ParseError::NotUtf8)?;

        // Splitting on '\n' must leave an empty trailing segment
        if !text.ends_with('\n') {
            return Err(ParseError::Unterminated);
        }

        let mut lines = text.split('\n');
        let start_line = lines.next().unwrap_or_default();
        let headers = Headers::parse(lines);

        match SsdpMessageType::from_start_line(start_line) {
            SsdpMessageType::Query => self.parse_query(&headers, from),
            SsdpMessageType::QueryAnswer => self
                .parse_discovery(&headers, "ST", false)
                .map(SsdpMessage::QueryAnswer),
            SsdpMessageType::Announce => self
                .parse_discovery(&headers, "NT", true)
                .map(SsdpMessage::Announce),
            SsdpMessageType::Invalid => Err(ParseError::UnknownStartLine(
                start_line.trim().to_string(),
            )),
        }
    }

    fn parse_query(&self, headers: &Headers<'_>, from: SocketAddr) -> Result<SsdpMessage, ParseError> {
        let host = headers.require("HOST")?;

        let man = headers.get("MAN").unwrap_or_default();
        if !man.contains("ssdp:discover") {
            return Err(ParseError::NotDiscover);
        }

        let mx_raw = headers.require("MX")?;
        let mx = mx_raw
            .parse::<u32>()
            .map_err(|_| ParseError::InvalidMx(mx_raw.to_string()))?;

        let st = headers.require("ST")?;
        let target_type = SearchTargetType::classify(st)
            .ok_or_else(|| ParseError::UnsupportedSearchTarget(st.to_string()))?;

        Ok(SsdpMessage::Query(SearchQuery {
            target_type,
            target: st.to_string(),
            host: host.to_string(),
            requester: from,
            mx,
        }))
    }

    fn parse_discovery(
        &self,
        headers: &Headers<'_>,
        target_header: &'static str,
        is_announce: bool,
    ) -> Result<DiscoveryResult, ParseError> {
        let location = headers.require("LOCATION")?;
        let usn = headers.require("USN")?;
        let nt = headers.require(target_header)?;

        let nts = if is_announce {
            let raw = headers.require("NTS")?;
            match NotificationSubType::from_header(raw) {
                NotificationSubType::Invalid => {
                    return Err(ParseError::UnresolvedNts(raw.to_string()))
                }
                resolved => resolved,
            }
        } else {
            NotificationSubType::Invalid
        };

        let cache_duration = headers
            .get("CACHE-CONTROL")
            .and_then(parse_max_age)
            .unwrap_or(self.default_max_age);

        Ok(DiscoveryResult {
            nt: nt.to_string(),
            usn: usn.to_string(),
            location: location.to_string(),
            nts,
            announce_date: headers.get("DATE").unwrap_or_default().to_string(),
            cache_duration,
            server: headers.get("SERVER").map(str::to_string),
        })
    }
}

/// Header block of one message, in wire order.
struct Headers<'a> {
    entries: Vec<(&'a str, &'a str)>,
}

impl<'a> Headers<'a> {
    fn parse<I>(lines: I) -> Self
    where
        I: Iterator<Item = &'a str>,
    {
        let mut entries = Vec::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                entries.push((name.trim(), value.trim()));
            } else {
                tracing::trace!("Skipping header line without colon: '{}'", line);
            }
        }
        Self { entries }
    }

    /// First value for `name`, compared case-insensitively.
    fn get(&self, name: &str) -> Option<&'a str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| *value)
    }

    /// Like [`get`](Self::get) but empty values count as absent.
    fn require(&self, name: &'static str) -> Result<&'a str, ParseError> {
        match self.get(name) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(ParseError::MissingHeader(name)),
        }
    }
}

/// Extract the integer following `max-age=` in a `CACHE-CONTROL` value.
///
/// Tolerates whitespace around the `=` and any casing of the directive.
pub(crate) fn parse_max_age(value: &str) -> Option<u32> {
    let lower = value.to_ascii_lowercase();
    let idx = lower.find("max-age")?;
    let after_key = value[idx + "max-age".len()..].trim_start();
    let after_eq = after_key.strip_prefix('=')?.trim_start();
    let digits: String = after_eq.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
