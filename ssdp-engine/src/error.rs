//! Error types for the SSDP engine.

use thiserror::Error;

/// Error type for engine operations.
///
/// Transport failures on individual interfaces and malformed datagrams are
/// never surfaced here; they are logged and the engine degrades instead.
#[derive(Error, Debug)]
pub enum SsdpError {
    /// I/O failure while setting up the worker or a socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The background runtime could not be created
    #[error("Failed to start engine runtime: {0}")]
    Runtime(String),

    /// An operation was attempted before `initialize()`
    #[error("Engine has not been initialized")]
    NotInitialized,

    /// The background worker has shut down
    #[error("Engine worker is no longer running")]
    WorkerDisconnected,
}

/// Reasons a datagram is rejected by the message parser.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Datagram is not valid UTF-8
    #[error("datagram is not valid UTF-8")]
    NotUtf8,

    /// The final CRLF is missing
    #[error("message is not terminated by a line feed")]
    Unterminated,

    /// The request/status line is not an SSDP start line
    #[error("unrecognised start line: {0}")]
    UnknownStartLine(String),

    /// A required header is absent
    #[error("missing required header {0}")]
    MissingHeader(&'static str),

    /// `MAN` does not contain `"ssdp:discover"`
    #[error("MAN header does not request ssdp:discover")]
    NotDiscover,

    /// `MX` is not an integer
    #[error("invalid MX value: {0}")]
    InvalidMx(String),

    /// `ST` of a query matches no known search target form
    #[error("unsupported search target: {0}")]
    UnsupportedSearchTarget(String),

    /// `NTS` of an announce is not alive/byebye/discover
    #[error("unresolved notification sub-type: {0}")]
    UnresolvedNts(String),
}

/// Convenience Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, SsdpError>;
