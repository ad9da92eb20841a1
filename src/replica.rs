//! Client-facing operations (spec.md §4.6): `list_files`, `read_file`,
//! `write_file`, plus the coordinator-only `cord_list_files`. These are thin
//! wrappers that delegate the serialized part of the work to the
//! coordinator (locally if this replica *is* the coordinator, over RPC
//! otherwise) and handle the local pull/copy around it.

use crate::config::{Membership, Role};
use crate::coordinator::{self, Coordinator};
use crate::model::{CompleteInfo, ContactInfo, FileInfo, Request, RequestType, Response};
use crate::rpc::client;
use crate::rpc::message::{Call, ReplyOk};
use crate::rpc::{self, message};
use crate::storage::{self, Storage};
use crate::transfer;
use std::sync::Arc;

/// The taxonomy from spec.md §7, local to one replica operation.
#[derive(Debug)]
pub enum Error {
    NotFound,
    Protocol(String),
    Quorum,
    Transfer(String),
    Timeout,
    Io(String),
}

impl From<storage::Error> for Error {
    fn from(err: storage::Error) -> Self {
        match err {
            storage::Error::NotFound => Error::NotFound,
            storage::Error::Io(kind) => Error::Io(format!("{kind:?}")),
        }
    }
}

impl From<transfer::Error> for Error {
    fn from(err: transfer::Error) -> Self {
        match err {
            transfer::Error::Transfer => Error::Transfer("chunked pull failed".into()),
            transfer::Error::Io(kind) => Error::Io(format!("{kind:?}")),
        }
    }
}

impl From<coordinator::Error> for Error {
    fn from(err: coordinator::Error) -> Self {
        match err {
            coordinator::Error::Quorum => Error::Quorum,
        }
    }
}

impl From<rpc::Error> for Error {
    fn from(err: rpc::Error) -> Self {
        match err {
            rpc::Error::Protocol(msg) => Error::Protocol(msg),
            rpc::Error::Timeout => Error::Timeout,
            rpc::Error::Io(kind) => Error::Io(format!("{kind:?}")),
        }
    }
}

impl From<message::RemoteError> for Error {
    fn from(err: message::RemoteError) -> Self {
        match err {
            message::RemoteError::NotFound => Error::NotFound,
            message::RemoteError::Protocol(msg) => Error::Protocol(msg),
            message::RemoteError::Quorum => Error::Quorum,
            message::RemoteError::Transfer(msg) => Error::Transfer(msg),
            message::RemoteError::Io(msg) => Error::Io(msg),
            message::RemoteError::Timeout => Error::Timeout,
        }
    }
}

/// The reverse direction: used by `rpc::server` to carry a local operation's
/// failure back to the calling peer over the wire.
impl From<Error> for message::RemoteError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound => message::RemoteError::NotFound,
            Error::Protocol(msg) => message::RemoteError::Protocol(msg),
            Error::Quorum => message::RemoteError::Quorum,
            Error::Transfer(msg) => message::RemoteError::Transfer(msg),
            Error::Timeout => message::RemoteError::Timeout,
            Error::Io(msg) => message::RemoteError::Io(msg),
        }
    }
}

/// Per-process replica state (spec.md §3). `coordinator` is `Some` only on
/// the replica elected coordinator by [`Membership::role_of`].
pub struct Replica {
    pub info: ContactInfo,
    pub storage: Storage,
    pub membership: Membership,
    pub coordinator: Option<Arc<Coordinator>>,
}

impl Replica {
    pub fn new(info: ContactInfo, storage: Storage, membership: Membership, watchdog: std::time::Duration) -> Self {
        let coordinator = match membership.role_of(info) {
            Role::Coordinator => Some(Coordinator::new(membership.clone(), watchdog)),
            Role::Follower => None,
        };
        Self { info, storage, membership, coordinator }
    }

    /// spec.md §4.6 `list_files`: delegates to the coordinator if this
    /// replica is a follower; otherwise runs `cord_list_files` directly.
    pub async fn list_files(&self) -> Result<Vec<CompleteInfo>, Error> {
        match &self.coordinator {
            Some(_) => Ok(self.cord_list_files().await),
            None => match client::call(self.membership.coordinator_contact, Call::ListFiles).await? {
                Ok(ReplyOk::ListFiles(infos)) => Ok(infos),
                Ok(_) => Err(Error::Protocol("unexpected reply to list_files".into())),
                Err(remote) => Err(remote.into()),
            },
        }
    }

    /// spec.md §4.6 `cord_list_files`: contacts every other peer for its
    /// inventory and wraps each (plus this replica's own) in a
    /// `CompleteInfo`. Never touches `coord_lock` — best-effort, not
    /// serialized.
    pub async fn cord_list_files(&self) -> Vec<CompleteInfo> {
        let mut infos = vec![CompleteInfo { contact: self.info, files: self.storage.get_all_files().await }];
        for &peer in self.membership.server_list.iter().filter(|&&peer| peer != self.info) {
            let files = match client::call(peer, Call::GetAllFiles).await {
                Ok(Ok(ReplyOk::GetAllFiles(files))) => files,
                _ => {
                    tracing::warn!(%peer, "list_files: peer did not answer, omitting from result");
                    Vec::<FileInfo>::new()
                }
            };
            infos.push(CompleteInfo { contact: peer, files });
        }
        infos
    }

    /// spec.md §4.6 `read_file`: serializes through the coordinator, pulls a
    /// fresher copy if one was found (read-repair), and always calls
    /// `finish_read` even if the pull failed.
    pub async fn read_file(&self, name: &str) -> Result<String, Error> {
        let request = Request { kind: RequestType::Read, filename: name.to_string() };
        let response = self.insert_job(request).await?;

        let repair_result = if self.storage.get_version(name).await < response.version {
            match response.contact {
                Some(src) => transfer::copy_file(&self.storage, response.version, name, src).await.map_err(Error::from),
                None => Ok(()),
            }
        } else {
            Ok(())
        };

        self.finish_read().await;
        repair_result?;

        Ok(self.storage.local_path(name).display().to_string())
    }

    /// spec.md §4.6 `write_file`: serializes through the coordinator, copies
    /// the client-supplied file into local storage, bumps the version, and
    /// reports completion with self as both source and origin.
    pub async fn write_file(&self, name: &str, external_path: &str) -> Result<(), Error> {
        let request = Request { kind: RequestType::Write, filename: name.to_string() };
        let response = self.insert_job(request).await?;
        let version = response.version + 1;

        self.storage.store_local(name, external_path).await.map_err(|err| Error::Io(format!("{err}")))?;
        self.storage.update_file_metadata(name, version).await;

        self.finish_write(version, name, self.info, self.info).await;
        Ok(())
    }

    async fn insert_job(&self, request: Request) -> Result<Response, Error> {
        match &self.coordinator {
            Some(coordinator) => Ok(Coordinator::insert_job(coordinator, request).await?),
            None => match client::call(self.membership.coordinator_contact, Call::InsertJob(request)).await? {
                Ok(ReplyOk::InsertJob(response)) => Ok(response),
                Ok(_) => Err(Error::Protocol("unexpected reply to insert_job".into())),
                Err(remote) => Err(remote.into()),
            },
        }
    }

    async fn finish_read(&self) {
        match &self.coordinator {
            Some(coordinator) => coordinator.finish_read().await,
            None => {
                if let Err(err) = client::call(self.membership.coordinator_contact, Call::FinishRead).await {
                    tracing::warn!(?err, "finish_read notification failed");
                }
            }
        }
    }

    async fn finish_write(&self, version: u64, name: &str, src: ContactInfo, origin: ContactInfo) {
        match &self.coordinator {
            Some(coordinator) => coordinator.finish_write(version, name, src, origin).await,
            None => {
                let directive = Call::FinishWrite {
                    version,
                    name: name.to_string(),
                    src_ip: src.ip,
                    src_port: src.port,
                    origin_ip: origin.ip,
                    origin_port: origin.port,
                };
                if let Err(err) = client::call(self.membership.coordinator_contact, directive).await {
                    tracing::warn!(?err, "finish_write notification failed");
                }
            }
        }
    }
}
