//! Runs one replica process: loads the cluster descriptor, figures out
//! whether this process is the coordinator, and serves the inter-replica RPC
//! surface until killed.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use quorum_store::config::{Membership, Role};
use quorum_store::model::ContactInfo;
use quorum_store::replica::Replica;
use quorum_store::rpc::server;
use quorum_store::storage::Storage;

#[derive(Parser, Debug)]
#[command(name = "replica", about = "Runs one replica of a quorum-store cluster")]
struct Args {
    /// Path to the cluster descriptor file (spec.md §6).
    #[arg(long)]
    config: PathBuf,

    /// Directory this replica stores its file bytes under.
    #[arg(long)]
    storage: PathBuf,

    /// Address this replica listens on. Must match one of the
    /// `ip,port` lines in `--config`.
    #[arg(long)]
    listen: SocketAddr,

    /// Coordinator watchdog timeout in milliseconds (spec.md §9).
    #[arg(long, default_value_t = 10_000)]
    watchdog_ms: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let membership = Membership::load(&args.config).unwrap_or_else(|err| {
        tracing::error!(?err, config = ?args.config, "failed to load cluster descriptor");
        std::process::exit(1);
    });

    let ip = match args.listen.ip() {
        std::net::IpAddr::V4(ip) => ip,
        std::net::IpAddr::V6(_) => {
            tracing::error!("--listen must be an IPv4 address");
            std::process::exit(1);
        }
    };
    let info = ContactInfo::new(ip, args.listen.port());

    match membership.role_of(info) {
        Role::Coordinator => tracing::info!(%info, "starting as coordinator"),
        Role::Follower => tracing::info!(%info, coordinator = %membership.coordinator_contact, "starting as follower"),
    }

    let storage = Storage::open(args.storage.clone()).await.unwrap_or_else(|err| {
        tracing::error!(?err, storage = ?args.storage, "failed to open storage directory");
        std::process::exit(1);
    });

    let watchdog = Duration::from_millis(args.watchdog_ms);
    let replica = Arc::new(Replica::new(info, storage, membership, watchdog));

    let listener = TcpListener::bind(args.listen).await.unwrap_or_else(|err| {
        tracing::error!(?err, addr = %args.listen, "failed to bind listen address");
        std::process::exit(1);
    });
    tracing::info!(addr = %args.listen, "listening");

    if let Err(err) = server::serve(listener, replica).await {
        tracing::error!(?err, "accept loop exited");
        std::process::exit(1);
    }
}
