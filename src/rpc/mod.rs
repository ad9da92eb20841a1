//! The inter-replica RPC surface.
//!
//! Binary, length-prefixed, request/response, with one task per inbound
//! connection — the shape spec.md treats as an external transport, given a
//! concrete (if minimal) realization here since the crate has to actually
//! move bytes between replicas to run. See [`wire`] for the framing, and
//! [`message`] for the thirteen operations in spec.md §6's RPC surface
//! table.

pub mod client;
pub mod message;
pub mod server;
pub mod wire;

/// Errors common to the RPC layer: malformed frames, unexpected opcodes, and
/// connection-level failures (including timeouts).
#[derive(Debug)]
pub enum Error {
    /// The peer sent bytes that did not decode as a known message.
    Protocol(String),
    /// The outbound connect/read/write did not complete before the fixed
    /// RPC timeout (~2s, per spec.md §5).
    Timeout,
    Io(std::io::ErrorKind),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.kind())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Timeout
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Fixed connect/read timeout used for every outbound RPC (spec.md §5).
pub const RPC_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);
