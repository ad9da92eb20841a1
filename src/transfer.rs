//! Chunked inter-replica file transfer (spec.md §4.3).
//!
//! `copy_file` pulls a named file from a peer in fixed 2048-byte chunks,
//! writing them straight through to the destination replica's storage. A
//! transfer that fails partway leaves whatever bytes already landed on disk
//! in place — the next successful pull overwrites them — and does not touch
//! the inventory.

use crate::model::ContactInfo;
use crate::rpc::client;
use crate::rpc::message::{Call, ReplyOk};
use crate::storage::Storage;

/// Fixed chunk size, compiled in (spec.md §6).
pub const CHUNK_SIZE: u32 = 2048;

/// Failures local to one `copy_file` call.
#[derive(Debug)]
pub enum Error {
    /// The source peer did not answer, or answered with a malformed/mismatched
    /// reply, at any point during the pull.
    Transfer,
    Io(std::io::ErrorKind),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.kind())
    }
}

/// Pulls `name` at `version` from `peer` into `storage`, 2048 bytes at a
/// time, then records the version in the local inventory. Queries the
/// source's file size once up front; trailing chunks shorter than
/// `CHUNK_SIZE` at EOF are expected and not an error.
pub async fn copy_file(storage: &Storage, version: u64, name: &str, peer: ContactInfo) -> Result<(), Error> {
    let size = match client::call(peer, Call::GetFileSize { name: name.to_string() }).await {
        Ok(Ok(ReplyOk::FileSize(size))) => size,
        _ => return Err(Error::Transfer),
    };

    let mut file = storage.create_for_write(name).await?;
    let mut offset = 0u64;
    while offset < size {
        let chunk = match client::call(
            peer,
            Call::RequestData { name: name.to_string(), offset, size: CHUNK_SIZE },
        )
        .await
        {
            Ok(Ok(ReplyOk::Data(chunk))) => chunk,
            _ => return Err(Error::Transfer),
        };
        if chunk.is_empty() {
            break;
        }
        storage.append_chunk(&mut file, &chunk).await?;
        offset += chunk.len() as u64;
    }

    storage.update_file_metadata(name, version).await;
    Ok(())
}
