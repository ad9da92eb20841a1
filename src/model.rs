//! Wire-level value types shared by every inter-replica operation.
//!
//! These mirror the `ContactInfo` / `FileInfo` / `CompleteInfo` / `Request` /
//! `Response` shapes of the replication protocol. They carry no behavior of
//! their own; `storage`, `coordinator`, and `quorum` build the actual
//! semantics on top of them.

use std::net::Ipv4Addr;

/// A replica's network identity. Compared by value, not by liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContactInfo {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl ContactInfo {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    pub fn socket_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::from((self.ip, self.port))
    }
}

impl std::fmt::Display for ContactInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// A named file and the version a replica believes it holds.
///
/// Version `0` means "no known copy". Versions only increase for a given
/// name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub version: u64,
}

/// A replica's identity paired with its full inventory snapshot. Used only
/// by `list_files`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteInfo {
    pub contact: ContactInfo,
    pub files: Vec<FileInfo>,
}

/// The two operations the coordinator serializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Read,
    Write,
}

/// A single coordinator-serialized operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub kind: RequestType,
    pub filename: String,
}

/// The coordinator's answer to a [`Request`]: the version currently believed
/// to be freshest among the polled quorum, and the peer that holds it.
///
/// `contact` is `None` iff `version == 0` (no quorum member has the file
/// yet).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub version: u64,
    pub contact: Option<ContactInfo>,
}

impl Response {
    pub fn none() -> Self {
        Self { version: 0, contact: None }
    }
}
