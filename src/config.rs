//! Cluster membership & config loader.
//!
//! Parses the static cluster descriptor file:
//!
//! ```text
//! <NR>,<NW>
//! <ip>,<port>,<role>
//! <ip>,<port>,<role>
//! ...
//! ```
//!
//! `role` is `1` for exactly one line (the coordinator) and `0` otherwise.
//! Quorum sizes must satisfy `NR + NW > N` and `NW > N / 2`; a descriptor
//! violating either is rejected before any replica starts serving.

use std::io;
use std::net::Ipv4Addr;
use std::path::Path;
use std::str::FromStr;

use crate::model::ContactInfo;

/// Failures while loading the cluster descriptor. Fatal: the owning process
/// must abort startup rather than try to recover.
#[derive(Debug)]
pub enum Error {
    /// No line had `role == 1`.
    MissingCoordinator,
    /// More than one line had `role == 1`.
    MultipleCoordinators,
    /// `NR + NW <= N` or `NW <= N / 2`.
    InvalidQuorum { nr: usize, nw: usize, n: usize },
    /// A line did not parse as `ip,port,role`.
    Malformed { line: usize },
    /// The descriptor file itself could not be read.
    Io(io::ErrorKind),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err.kind())
    }
}

/// This process's role within the cluster, decided by comparing its own
/// contact info against the descriptor's coordinator line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Coordinator,
    Follower,
}

/// Parsed cluster membership, shared by every replica regardless of role.
#[derive(Debug, Clone)]
pub struct Membership {
    /// All replicas, in descriptor order. Includes this process's own entry.
    pub server_list: Vec<ContactInfo>,
    pub nr: usize,
    pub nw: usize,
    pub coordinator_contact: ContactInfo,
}

impl Membership {
    /// Total replica count, `N`.
    pub fn n(&self) -> usize {
        self.server_list.len()
    }

    /// The role `info` plays in this cluster.
    pub fn role_of(&self, info: ContactInfo) -> Role {
        if info == self.coordinator_contact {
            Role::Coordinator
        } else {
            Role::Follower
        }
    }

    /// Parses the descriptor at `path`.
    ///
    /// Validates the quorum invariant `NR + NW > N && NW > N / 2` and that
    /// exactly one line is marked as coordinator before returning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parses the descriptor's text directly; split out from [`Self::load`]
    /// so tests don't need a filesystem fixture for every case.
    pub fn parse(contents: &str) -> Result<Self, Error> {
        let mut lines = contents.lines().enumerate();

        let (_, header) = lines.next().ok_or(Error::Malformed { line: 1 })?;
        let (nr, nw) = parse_pair(header).ok_or(Error::Malformed { line: 1 })?;

        let mut server_list = Vec::new();
        let mut coordinator_contact = None;

        for (idx, raw) in lines {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let (ip, port, role) = parse_member(raw).ok_or(Error::Malformed { line: idx + 1 })?;
            let info = ContactInfo::new(ip, port);
            server_list.push(info);
            if role {
                if coordinator_contact.is_some() {
                    return Err(Error::MultipleCoordinators);
                }
                coordinator_contact = Some(info);
            }
        }

        let coordinator_contact = coordinator_contact.ok_or(Error::MissingCoordinator)?;

        let n = server_list.len();
        if !(nr + nw > n && nw > n / 2) {
            return Err(Error::InvalidQuorum { nr, nw, n });
        }

        Ok(Membership { server_list, nr, nw, coordinator_contact })
    }
}

fn parse_pair(line: &str) -> Option<(usize, usize)> {
    let mut parts = line.trim().split(',');
    let nr = parts.next()?.trim().parse().ok()?;
    let nw = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((nr, nw))
}

fn parse_member(line: &str) -> Option<(Ipv4Addr, u16, bool)> {
    let mut parts = line.split(',');
    let ip = Ipv4Addr::from_str(parts.next()?.trim()).ok()?;
    let port = parts.next()?.trim().parse().ok()?;
    let role = match parts.next()?.trim() {
        "0" => false,
        "1" => true,
        _ => return None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some((ip, port, role))
}
