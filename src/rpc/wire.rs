//! Frame and primitive encoding for the RPC wire format.
//!
//! A frame is a `u32` big-endian length prefix followed by that many bytes
//! of payload. Primitive encode/decode helpers mirror the teacher crate's
//! `parser::primitive` module: small free functions over `Read`/`Write`
//! rather than a derive-based serializer, each returning this module's
//! `Result`.

use std::io::{Read, Write};
use std::net::Ipv4Addr;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::{Error, Result};

/// Frames larger than this are rejected as malformed rather than allocated.
/// Generous relative to the 2048-byte chunk size used by the transfer
/// layer, but still a bound.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Reads one length-prefixed frame from `stream`.
pub async fn read_frame<S: tokio::io::AsyncRead + Unpin>(stream: &mut S) -> Result<Vec<u8>> {
    let len = stream.read_u32().await?;
    if len > MAX_FRAME_LEN {
        return Err(Error::Protocol(format!("frame length {len} exceeds maximum")));
    }
    let mut buf = vec![0u8; len as usize];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Writes `payload` as one length-prefixed frame to `stream`.
pub async fn write_frame<S: tokio::io::AsyncWrite + Unpin>(stream: &mut S, payload: &[u8]) -> Result<()> {
    stream.write_u32(payload.len() as u32).await?;
    stream.write_all(payload).await?;
    stream.flush().await?;
    Ok(())
}

pub fn u8(src: &mut impl Read) -> Result<u8> {
    src.read_u8().map_err(|e| Error::Io(e.kind()))
}

pub fn write_u8(dest: &mut impl Write, v: u8) -> Result<()> {
    dest.write_u8(v).map_err(|e| Error::Io(e.kind()))
}

pub fn u16(src: &mut impl Read) -> Result<u16> {
    src.read_u16::<BigEndian>().map_err(|e| Error::Io(e.kind()))
}

pub fn write_u16(dest: &mut impl Write, v: u16) -> Result<()> {
    dest.write_u16::<BigEndian>(v).map_err(|e| Error::Io(e.kind()))
}

pub fn u32(src: &mut impl Read) -> Result<u32> {
    src.read_u32::<BigEndian>().map_err(|e| Error::Io(e.kind()))
}

pub fn write_u32(dest: &mut impl Write, v: u32) -> Result<()> {
    dest.write_u32::<BigEndian>(v).map_err(|e| Error::Io(e.kind()))
}

pub fn u64(src: &mut impl Read) -> Result<u64> {
    src.read_u64::<BigEndian>().map_err(|e| Error::Io(e.kind()))
}

pub fn write_u64(dest: &mut impl Write, v: u64) -> Result<()> {
    dest.write_u64::<BigEndian>(v).map_err(|e| Error::Io(e.kind()))
}

/// A `u32`-length-prefixed byte vector.
pub fn bytes(src: &mut impl Read) -> Result<Vec<u8>> {
    let len = u32(src)?;
    let mut buf = vec![0u8; len as usize];
    src.read_exact(&mut buf).map_err(|e| Error::Io(e.kind()))?;
    Ok(buf)
}

pub fn write_bytes(dest: &mut impl Write, data: &[u8]) -> Result<()> {
    write_u32(dest, data.len() as u32)?;
    dest.write_all(data).map_err(|e| Error::Io(e.kind()))
}

/// A `u32`-length-prefixed UTF-8 string.
pub fn string(src: &mut impl Read) -> Result<String> {
    let raw = bytes(src)?;
    String::from_utf8(raw).map_err(|e| Error::Protocol(format!("invalid utf-8: {e}")))
}

pub fn write_string(dest: &mut impl Write, s: &str) -> Result<()> {
    write_bytes(dest, s.as_bytes())
}

pub fn ipv4(src: &mut impl Read) -> Result<Ipv4Addr> {
    let raw = u32(src)?;
    Ok(Ipv4Addr::from(raw))
}

pub fn write_ipv4(dest: &mut impl Write, ip: Ipv4Addr) -> Result<()> {
    write_u32(dest, u32::from(ip))
}

pub fn bool(src: &mut impl Read) -> Result<bool> {
    match u8(src)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(Error::Protocol(format!("invalid bool discriminant {other}"))),
    }
}

pub fn write_bool(dest: &mut impl Write, v: bool) -> Result<()> {
    write_u8(dest, if v { 1 } else { 0 })
}

