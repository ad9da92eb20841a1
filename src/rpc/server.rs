//! The inbound accept loop and per-connection dispatch.
//!
//! One `tokio::spawn`ed task per accepted connection, mirroring the teacher
//! crate's `handle_forever`/`process_socket` shape (`src/lib.rs` there), but
//! simplified to the request/response shape this protocol actually needs: no
//! further split into read/vfs/write tasks, since each call on a connection
//! is handled to completion (including any outbound RPCs it triggers) before
//! the next frame on that same connection is read.

use std::io::ErrorKind;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};

use super::message::{self, Call, Reply, ReplyOk, RemoteError};
use super::wire;
use super::Error;
use crate::coordinator::Coordinator;
use crate::model::ContactInfo;
use crate::replica::{self, Replica};
use crate::transfer;

/// Accepts connections on `listener` until the process exits, spawning one
/// task per connection.
pub async fn serve(listener: TcpListener, replica: Arc<Replica>) -> std::io::Result<()> {
    loop {
        let (socket, peer_addr) = listener.accept().await?;
        socket.set_nodelay(true)?;
        let replica = Arc::clone(&replica);
        tokio::spawn(async move {
            tracing::debug!(%peer_addr, "connection accepted");
            if let Err(err) = handle_connection(socket, replica).await {
                tracing::warn!(%peer_addr, ?err, "connection closed");
            }
        });
    }
}

async fn handle_connection(mut socket: TcpStream, replica: Arc<Replica>) -> super::Result<()> {
    loop {
        let payload = match wire::read_frame(&mut socket).await {
            Ok(payload) => payload,
            Err(Error::Io(ErrorKind::UnexpectedEof)) => return Ok(()),
            Err(err) => return Err(err),
        };
        let call = match message::decode_call(&payload) {
            Ok(call) => call,
            Err(err) => {
                tracing::warn!(?err, "malformed call, closing connection");
                return Err(err);
            }
        };
        let reply = dispatch(&replica, call).await;
        let encoded = message::encode_reply(&reply);
        wire::write_frame(&mut socket, &encoded).await?;
    }
}

async fn dispatch(replica: &Replica, call: Call) -> Reply {
    match call {
        Call::ListFiles => replica.list_files().await.map(ReplyOk::ListFiles).map_err(RemoteError::from),
        Call::GetAllFiles => Ok(ReplyOk::GetAllFiles(replica.storage.get_all_files().await)),
        Call::ReadFile { name } => replica.read_file(&name).await.map(ReplyOk::Path).map_err(RemoteError::from),
        Call::WriteFile { name, external_path } => {
            replica.write_file(&name, &external_path).await.map(|()| ReplyOk::Unit).map_err(RemoteError::from)
        }
        Call::CordListFiles => Ok(ReplyOk::ListFiles(replica.cord_list_files().await)),
        Call::InsertJob(request) => match &replica.coordinator {
            Some(coordinator) => Coordinator::insert_job(coordinator, request)
                .await
                .map(ReplyOk::InsertJob)
                .map_err(|err| RemoteError::from(replica::Error::from(err))),
            None => Err(RemoteError::Protocol("this replica is not the coordinator".into())),
        },
        Call::GetVersion { name } => Ok(ReplyOk::Version(replica.storage.get_version(&name).await)),
        Call::GetFileSize { name } => replica
            .storage
            .get_file_size(&name)
            .await
            .map(ReplyOk::FileSize)
            .map_err(|err| RemoteError::from(replica::Error::from(err))),
        Call::RequestData { name, offset, size } => replica
            .storage
            .request_data(&name, offset, size)
            .await
            .map(ReplyOk::Data)
            .map_err(|err| RemoteError::from(replica::Error::from(err))),
        Call::CopyFile { version, name, ip, port } => {
            let peer = ContactInfo::new(ip, port);
            transfer::copy_file(&replica.storage, version, &name, peer)
                .await
                .map(|()| ReplyOk::Unit)
                .map_err(|err| RemoteError::from(replica::Error::from(err)))
        }
        Call::FinishRead => match &replica.coordinator {
            Some(coordinator) => {
                coordinator.finish_read().await;
                Ok(ReplyOk::Unit)
            }
            None => Err(RemoteError::Protocol("this replica is not the coordinator".into())),
        },
        Call::FinishWrite { version, name, src_ip, src_port, origin_ip, origin_port } => match &replica.coordinator {
            Some(coordinator) => {
                let src = ContactInfo::new(src_ip, src_port);
                let origin = ContactInfo::new(origin_ip, origin_port);
                coordinator.finish_write(version, &name, src, origin).await;
                Ok(ReplyOk::Unit)
            }
            None => Err(RemoteError::Protocol("this replica is not the coordinator".into())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Membership;
    use crate::rpc::client;
    use crate::storage::Storage;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn serves_get_version_for_an_unknown_file_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).await.unwrap();
        let info = ContactInfo::new(Ipv4Addr::LOCALHOST, 0);
        let membership =
            Membership { server_list: vec![info], nr: 1, nw: 1, coordinator_contact: info };
        let replica = Arc::new(Replica::new(info, storage, membership, std::time::Duration::from_secs(5)));

        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, replica));

        let peer = ContactInfo::new(Ipv4Addr::LOCALHOST, addr.port());
        let reply = client::call(peer, Call::GetVersion { name: "missing".into() }).await.unwrap();
        assert_eq!(reply, Ok(ReplyOk::Version(0)));
    }

    #[tokio::test]
    async fn a_follower_rejects_finish_read_with_protocol_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).await.unwrap();
        let self_info = ContactInfo::new(Ipv4Addr::LOCALHOST, 0);
        let coordinator_info = ContactInfo::new(Ipv4Addr::new(127, 0, 0, 1), 9999);
        let membership = Membership {
            server_list: vec![coordinator_info, self_info],
            nr: 1,
            nw: 2,
            coordinator_contact: coordinator_info,
        };
        let replica = Arc::new(Replica::new(self_info, storage, membership, std::time::Duration::from_secs(5)));

        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, replica));

        let peer = ContactInfo::new(Ipv4Addr::LOCALHOST, addr.port());
        let reply = client::call(peer, Call::FinishRead).await.unwrap();
        assert!(matches!(reply, Err(RemoteError::Protocol(_))));
    }
}
