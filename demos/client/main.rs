//! Thin demo of the client-facing surface: `list`, `read`, `write` against any
//! one replica in the cluster. This is the out-of-scope "command-line client
//! process" from spec.md §1 — it exists only to exercise the replication
//! core from outside, not as part of it.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use quorum_store::model::ContactInfo;
use quorum_store::rpc::client;
use quorum_store::rpc::message::{Call, ReplyOk};

#[derive(Parser, Debug)]
#[command(name = "client", about = "Talks to one replica of a quorum-store cluster")]
struct Args {
    /// Any replica's listen address; the cluster forwards to the coordinator
    /// as needed.
    #[arg(long)]
    replica: SocketAddr,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lists every replica's file inventory.
    List,
    /// Reads a file, printing the local path the replica served it from.
    Read { name: String },
    /// Writes a local file's bytes under `name` in the cluster.
    Write { name: String, path: PathBuf },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let peer = match args.replica.ip() {
        std::net::IpAddr::V4(ip) => ContactInfo::new(ip, args.replica.port()),
        std::net::IpAddr::V6(_) => {
            eprintln!("--replica must be an IPv4 address");
            std::process::exit(1);
        }
    };

    let result = match args.command {
        Command::List => run_list(peer).await,
        Command::Read { name } => run_read(peer, &name).await,
        Command::Write { name, path } => run_write(peer, &name, &path).await,
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run_list(peer: ContactInfo) -> Result<(), String> {
    match client::call(peer, Call::ListFiles).await.map_err(|err| format!("{err:?}"))? {
        Ok(ReplyOk::ListFiles(infos)) => {
            for info in infos {
                println!("{}:", info.contact);
                for file in info.files {
                    println!("  {} v{}", file.name, file.version);
                }
            }
            Ok(())
        }
        Ok(other) => Err(format!("unexpected reply: {other:?}")),
        Err(err) => Err(format!("{err:?}")),
    }
}

async fn run_read(peer: ContactInfo, name: &str) -> Result<(), String> {
    let call = Call::ReadFile { name: name.to_string() };
    match client::call(peer, call).await.map_err(|err| format!("{err:?}"))? {
        Ok(ReplyOk::Path(path)) => {
            println!("{path}");
            Ok(())
        }
        Ok(other) => Err(format!("unexpected reply: {other:?}")),
        Err(err) => Err(format!("{err:?}")),
    }
}

async fn run_write(peer: ContactInfo, name: &str, path: &PathBuf) -> Result<(), String> {
    let external_path = path.to_string_lossy().into_owned();
    let call = Call::WriteFile { name: name.to_string(), external_path };
    match client::call(peer, call).await.map_err(|err| format!("{err:?}"))? {
        Ok(ReplyOk::Unit) => Ok(()),
        Ok(other) => Err(format!("unexpected reply: {other:?}")),
        Err(err) => Err(format!("{err:?}")),
    }
}
