//! End-to-end coverage of the literal scenarios in spec.md §8, run against
//! real `Replica`s talking over real loopback TCP connections (no mocked
//! transport) rather than calling the quorum/coordinator internals directly.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use quorum_store::config::Membership;
use quorum_store::coordinator::Coordinator;
use quorum_store::model::{ContactInfo, Request, RequestType};
use quorum_store::replica::Replica;
use quorum_store::rpc::client;
use quorum_store::rpc::message::{Call, ReplyOk};
use quorum_store::storage::Storage;
use tokio::net::TcpListener;

/// Binds `n` loopback listeners, builds a `Membership` naming node `0` as
/// coordinator, spawns a serving `Replica` behind each listener, and returns
/// their contact infos, the `Replica`s themselves (for white-box assertions
/// that don't go over the wire), and the temp directories backing their
/// storage (kept alive for the caller's duration).
async fn spin_up_cluster(
    n: usize,
    nr: usize,
    nw: usize,
) -> (Vec<ContactInfo>, Vec<Arc<Replica>>, Vec<tempfile::TempDir>) {
    let mut listeners = Vec::with_capacity(n);
    let mut contacts = Vec::with_capacity(n);
    for _ in 0..n {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        contacts.push(ContactInfo::new(Ipv4Addr::LOCALHOST, addr.port()));
        listeners.push(listener);
    }

    let membership = Membership { server_list: contacts.clone(), nr, nw, coordinator_contact: contacts[0] };

    let mut replicas = Vec::with_capacity(n);
    let mut dirs = Vec::with_capacity(n);
    for (info, listener) in contacts.iter().zip(listeners) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).await.unwrap();
        let replica = Arc::new(Replica::new(*info, storage, membership.clone(), Duration::from_secs(5)));
        tokio::spawn(quorum_store::rpc::server::serve(listener, Arc::clone(&replica)));
        replicas.push(replica);
        dirs.push(dir);
    }

    (contacts, replicas, dirs)
}

/// Scenario 1: basic write-then-read. N=3, NR=2, NW=2, coordinator is node 0.
#[tokio::test]
async fn basic_write_then_read() {
    let (contacts, _replicas, _dirs) = spin_up_cluster(3, 2, 2).await;

    let write_path = tempfile::NamedTempFile::new().unwrap();
    tokio::fs::write(write_path.path(), b"hi\n").await.unwrap();
    let call = Call::WriteFile {
        name: "hello.txt".into(),
        external_path: write_path.path().to_string_lossy().into_owned(),
    };
    let reply = client::call(contacts[1], call).await.unwrap();
    assert_eq!(reply, Ok(ReplyOk::Unit));

    let reply = client::call(contacts[2], Call::ReadFile { name: "hello.txt".into() }).await.unwrap();
    let Ok(ReplyOk::Path(path)) = reply else { panic!("unexpected reply: {reply:?}") };
    let content = tokio::fs::read(&path).await.unwrap();
    assert_eq!(content, b"hi\n");

    for &node in &contacts {
        let reply = client::call(node, Call::GetVersion { name: "hello.txt".into() }).await.unwrap();
        assert_eq!(reply, Ok(ReplyOk::Version(1)), "node {node} did not end up at version 1");
    }
}

/// Scenario 3: read freshness via read-repair. N=5, NR=3, NW=3. A node that
/// never stored the file still returns the right content because
/// `read_file`'s read-repair pulls it in before replying.
#[tokio::test]
async fn read_repair_serves_content_the_reader_never_stored_locally() {
    let (contacts, _replicas, _dirs) = spin_up_cluster(5, 3, 3).await;

    let write_path = tempfile::NamedTempFile::new().unwrap();
    tokio::fs::write(write_path.path(), b"v1").await.unwrap();
    let call = Call::WriteFile { name: "f".into(), external_path: write_path.path().to_string_lossy().into_owned() };
    assert_eq!(client::call(contacts[4], call).await.unwrap(), Ok(ReplyOk::Unit));

    // node 0 is the coordinator and may or may not have been chosen into the
    // write quorum; either way it must read back v1 via read-repair.
    let reply = client::call(contacts[0], Call::ReadFile { name: "f".into() }).await.unwrap();
    let Ok(ReplyOk::Path(path)) = reply else { panic!("unexpected reply: {reply:?}") };
    assert_eq!(tokio::fs::read(&path).await.unwrap(), b"v1");
}

/// Scenario 5: list surfaces per-replica inventories. N=3; each node writes a
/// distinct file; `list_files` from node 2 must report all three names.
#[tokio::test]
async fn list_files_surfaces_every_replicas_inventory() {
    let (contacts, _replicas, _dirs) = spin_up_cluster(3, 2, 2).await;

    for (node, (name, content)) in contacts.iter().zip([("a", b"A"), ("b", b"B"), ("c", b"C")]) {
        let path = tempfile::NamedTempFile::new().unwrap();
        tokio::fs::write(path.path(), content).await.unwrap();
        let call = Call::WriteFile { name: name.to_string(), external_path: path.path().to_string_lossy().into_owned() };
        assert_eq!(client::call(*node, call).await.unwrap(), Ok(ReplyOk::Unit));
    }

    let reply = client::call(contacts[2], Call::ListFiles).await.unwrap();
    let Ok(ReplyOk::ListFiles(infos)) = reply else { panic!("unexpected reply: {reply:?}") };
    assert_eq!(infos.len(), 3);

    let mut names: Vec<&str> = infos.iter().flat_map(|info| info.files.iter().map(|f| f.name.as_str())).collect();
    names.sort();
    assert_eq!(names, vec!["a", "b", "c"]);
    for info in &infos {
        assert!(info.files.iter().all(|f| f.version == 1));
    }
}

/// Scenario 2: concurrent writers to the same file serialize through the
/// coordinator; the final version is 2, and the file's content equals
/// whichever of A/B was serviced second by the coordinator. Because the
/// entry replica stores its own content+version locally before the
/// coordinator ever lets the next ticket dispatch (the lock isn't released
/// until `finish_write` completes), the writer whose local version ends up
/// at 2 is by construction the one the coordinator admitted second, and its
/// content is the one the rest of the cluster converges on.
#[tokio::test]
async fn concurrent_writes_to_the_same_file_serialize_to_version_two() {
    let (contacts, _replicas, dirs) = spin_up_cluster(3, 2, 2).await;

    let path_a = tempfile::NamedTempFile::new().unwrap();
    tokio::fs::write(path_a.path(), b"A").await.unwrap();
    let path_b = tempfile::NamedTempFile::new().unwrap();
    tokio::fs::write(path_b.path(), b"B").await.unwrap();

    let call_a = Call::WriteFile { name: "x".into(), external_path: path_a.path().to_string_lossy().into_owned() };
    let call_b = Call::WriteFile { name: "x".into(), external_path: path_b.path().to_string_lossy().into_owned() };

    let (ra, rb) = tokio::join!(client::call(contacts[1], call_a), client::call(contacts[2], call_b));
    assert_eq!(ra.unwrap(), Ok(ReplyOk::Unit));
    assert_eq!(rb.unwrap(), Ok(ReplyOk::Unit));

    let reply = client::call(contacts[0], Call::GetVersion { name: "x".into() }).await.unwrap();
    assert_eq!(reply, Ok(ReplyOk::Version(2)), "two serialized writes to the same file must land at version 2");

    let v1 = client::call(contacts[1], Call::GetVersion { name: "x".into() }).await.unwrap();
    let v2 = client::call(contacts[2], Call::GetVersion { name: "x".into() }).await.unwrap();
    let (second_writer_dir, second_content) = match (v1, v2) {
        (Ok(ReplyOk::Version(2)), Ok(ReplyOk::Version(1))) => (&dirs[1], &b"A"[..]),
        (Ok(ReplyOk::Version(1)), Ok(ReplyOk::Version(2))) => (&dirs[2], &b"B"[..]),
        other => panic!("expected one writer at version 1 and the other at version 2, got {other:?}"),
    };

    let on_disk = tokio::fs::read(second_writer_dir.path().join("x")).await.unwrap();
    assert_eq!(on_disk, second_content, "final content must be whichever write was admitted second");
}

/// Scenario 6: FIFO serialization. Submit 10 writes to the same file back to
/// back from distinct concurrent tasks. Each write's assigned version is
/// `insert_job`'s response version + 1; ticket admission order is strictly
/// FIFO (spec.md §5: "if task A's ticket < task B's ticket, A enters RUNNING
/// strictly before B"), so the versions handed out must be exactly
/// `{1, 2, ..., 10}` with no gaps or duplicates.
#[tokio::test]
async fn ten_concurrent_writes_get_strictly_increasing_versions_in_ticket_order() {
    let (_, replicas, _dirs) = spin_up_cluster(1, 1, 1).await;
    let replica = Arc::clone(&replicas[0]);
    let coordinator = replica.coordinator.clone().expect("single node is its own coordinator");

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let replica = Arc::clone(&replica);
        let coordinator = Arc::clone(&coordinator);
        tasks.push(tokio::spawn(async move {
            let request = Request { kind: RequestType::Write, filename: "f".into() };
            let response = Coordinator::insert_job(&coordinator, request).await.unwrap();
            let version = response.version + 1;
            // Mirrors `Replica::write_file`'s own local-store-then-finish
            // sequence without re-running `insert_job`, so each task's
            // assigned version is captured exactly once.
            replica.storage.update_file_metadata("f", version).await;
            coordinator.finish_write(version, "f", replica.info, replica.info).await;
            version
        }));
    }

    let mut versions: Vec<u64> = Vec::new();
    for task in tasks {
        versions.push(task.await.unwrap());
    }
    versions.sort_unstable();
    assert_eq!(versions, (1..=10).collect::<Vec<u64>>(), "ticket-ordered writes must claim every version exactly once");
}

/// Scenario 4: a configuration violating the quorum invariant must never let
/// a replica start. N=4, NR=1, NW=2: NR+NW=3<=N and NW=2<=N/2.
#[test]
fn quorum_violating_configuration_is_rejected_at_startup() {
    let descriptor = "1,2\n\
         127.0.0.1,9001,1\n\
         127.0.0.1,9002,0\n\
         127.0.0.1,9003,0\n\
         127.0.0.1,9004,0\n";
    let err = Membership::parse(descriptor).unwrap_err();
    assert!(matches!(err, quorum_store::config::Error::InvalidQuorum { nr: 1, nw: 2, n: 4 }));
}
