//! Coordinator-side quorum selection and version probing.
//!
//! `cord_read_file`/`cord_write_file` pick `NR`/`NW` peers out of the full
//! membership (the coordinator is itself an eligible peer), probe each for
//! its current version, and report the freshest one found. Selection is
//! injected as a function so tests can supply a fixed ordering instead of
//! `rand`'s default thread-local RNG.

use rand::seq::index::sample;
use rand::thread_rng;

use crate::config::Membership;
use crate::model::{ContactInfo, Response};
use crate::rpc::client;
use crate::rpc::message::{Call, ReplyOk};

/// Failures specific to a single quorum probe round.
#[derive(Debug)]
pub enum Error {
    /// A chosen peer did not answer `get_version` within the RPC timeout,
    /// or answered with something other than a version. No partial result
    /// is reported; the whole task fails.
    Quorum,
}

/// Picks `count` peers out of `servers` without replacement. Boxed and
/// stored on [`crate::coordinator::Coordinator`] so it can be swapped for a
/// deterministic stub in tests (spec.md §9).
pub type SelectFn = dyn Fn(&[ContactInfo], usize) -> Vec<ContactInfo> + Send + Sync;

/// Default selection: uniform sampling via `rand::thread_rng`.
pub fn random_select(servers: &[ContactInfo], count: usize) -> Vec<ContactInfo> {
    let count = count.min(servers.len());
    let mut rng = thread_rng();
    sample(&mut rng, servers.len(), count).iter().map(|i| servers[i]).collect()
}

/// spec.md §4.5, read path: selects `NR` peers, returns the max version
/// found (and the peers actually polled, for the coordinator to remember as
/// `chosen_servers`).
pub async fn cord_read_file(
    membership: &Membership,
    name: &str,
    select: &SelectFn,
) -> Result<(Response, Vec<ContactInfo>), Error> {
    let chosen = select(&membership.server_list, membership.nr);
    probe_quorum(chosen, name).await
}

/// spec.md §4.5, write path: identical to the read path but with `NW` peers.
/// The caller (the initiating follower) stores `response.version + 1`.
pub async fn cord_write_file(
    membership: &Membership,
    name: &str,
    select: &SelectFn,
) -> Result<(Response, Vec<ContactInfo>), Error> {
    let chosen = select(&membership.server_list, membership.nw);
    probe_quorum(chosen, name).await
}

async fn probe_quorum(chosen: Vec<ContactInfo>, name: &str) -> Result<(Response, Vec<ContactInfo>), Error> {
    let mut best: Option<(u64, ContactInfo)> = None;
    for peer in &chosen {
        let version = probe_version(*peer, name).await?;
        if version > 0 {
            let replace = match best {
                Some((current, _)) => version > current,
                None => true,
            };
            if replace {
                best = Some((version, *peer));
            }
        }
    }
    let response = match best {
        // ties go to the peer polled first, which `replace` above preserves
        // since later equal versions do not win.
        Some((version, contact)) => Response { version, contact: Some(contact) },
        None => Response::none(),
    };
    Ok((response, chosen))
}

async fn probe_version(peer: ContactInfo, name: &str) -> Result<u64, Error> {
    match client::call(peer, Call::GetVersion { name: name.to_string() }).await {
        Ok(Ok(ReplyOk::Version(version))) => Ok(version),
        _ => Err(Error::Quorum),
    }
}
