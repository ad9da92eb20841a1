//! Outbound calls to peer replicas.
//!
//! One short-lived TCP connection per call: connect, write one framed
//! [`message::Call`], read back one framed [`message::Reply`]. Every step
//! runs under [`super::RPC_TIMEOUT`], mirroring the teacher crate's fixed
//! per-call deadline rather than a connection pool.

use tokio::net::TcpStream;
use tokio::time::timeout;

use super::message::{self, Call, Opcode, Reply};
use super::{Error, Result, RPC_TIMEOUT};
use crate::model::ContactInfo;

/// Issues `call` to `peer` and returns its decoded reply.
///
/// `opcode` must match `call`'s own opcode; it is threaded through
/// separately because [`message::decode_reply`] needs it to disambiguate
/// reply shapes that share a wire representation (`Version`/`FileSize`).
/// Callers always have it to hand since they just built `call`.
pub async fn call(peer: ContactInfo, call: Call) -> Result<Reply> {
    let opcode = message::opcode_of(&call);
    timeout(RPC_TIMEOUT, call_inner(peer, call, opcode)).await?
}

async fn call_inner(peer: ContactInfo, request: Call, opcode: Opcode) -> Result<Reply> {
    let mut stream = TcpStream::connect(peer.socket_addr()).await?;
    let payload = message::encode_call(&request);
    super::wire::write_frame(&mut stream, &payload).await?;
    let response = super::wire::read_frame(&mut stream).await?;
    message::decode_reply(&response, opcode)
}
