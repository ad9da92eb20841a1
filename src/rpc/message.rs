//! Request/response payloads for the thirteen operations in spec.md §6's RPC
//! surface table, and their encoding over the [`super::wire`] primitives.

use std::io::Cursor;
use std::net::Ipv4Addr;

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use super::wire;
use super::{Error, Result};
use crate::model::{CompleteInfo, ContactInfo, FileInfo, Request, RequestType, Response};

/// Opcode discriminant, decoded the same way the teacher crate decodes
/// `AuthFlavor`: a `u8` run through `num_traits::FromPrimitive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum Opcode {
    ListFiles = 0,
    GetAllFiles = 1,
    ReadFile = 2,
    WriteFile = 3,
    CordListFiles = 4,
    InsertJob = 5,
    GetVersion = 6,
    GetFileSize = 7,
    RequestData = 8,
    CopyFile = 9,
    FinishRead = 10,
    FinishWrite = 11,
}

/// A decoded inbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListFiles,
    GetAllFiles,
    ReadFile { name: String },
    WriteFile { name: String, external_path: String },
    CordListFiles,
    InsertJob(Request),
    GetVersion { name: String },
    GetFileSize { name: String },
    RequestData { name: String, offset: u64, size: u32 },
    CopyFile { version: u64, name: String, ip: Ipv4Addr, port: u16 },
    FinishRead,
    FinishWrite {
        version: u64,
        name: String,
        src_ip: Ipv4Addr,
        src_port: u16,
        origin_ip: Ipv4Addr,
        origin_port: u16,
    },
}

/// A successful reply payload, one variant per [`Call`] shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOk {
    Unit,
    ListFiles(Vec<CompleteInfo>),
    GetAllFiles(Vec<FileInfo>),
    Path(String),
    Version(u64),
    FileSize(u64),
    Data(Vec<u8>),
    InsertJob(Response),
}

/// The taxonomy from spec.md §7, carried back over the wire so a follower
/// can distinguish "the peer says this file doesn't exist" from "the
/// connection failed".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    NotFound,
    Protocol(String),
    Quorum,
    Transfer(String),
    Io(String),
    Timeout,
}

pub type Reply = std::result::Result<ReplyOk, RemoteError>;

pub fn opcode_of(call: &Call) -> Opcode {
    match call {
        Call::ListFiles => Opcode::ListFiles,
        Call::GetAllFiles => Opcode::GetAllFiles,
        Call::ReadFile { .. } => Opcode::ReadFile,
        Call::WriteFile { .. } => Opcode::WriteFile,
        Call::CordListFiles => Opcode::CordListFiles,
        Call::InsertJob(_) => Opcode::InsertJob,
        Call::GetVersion { .. } => Opcode::GetVersion,
        Call::GetFileSize { .. } => Opcode::GetFileSize,
        Call::RequestData { .. } => Opcode::RequestData,
        Call::CopyFile { .. } => Opcode::CopyFile,
        Call::FinishRead => Opcode::FinishRead,
        Call::FinishWrite { .. } => Opcode::FinishWrite,
    }
}

pub fn encode_call(call: &Call) -> Vec<u8> {
    let mut buf = Vec::new();
    wire::write_u8(&mut buf, opcode_of(call) as u8).expect("write to an in-memory buffer cannot fail");
    match call {
        Call::ListFiles | Call::GetAllFiles | Call::CordListFiles | Call::FinishRead => {}
        Call::ReadFile { name } | Call::GetVersion { name } | Call::GetFileSize { name } => {
            wire::write_string(&mut buf, name).expect("write to an in-memory buffer cannot fail");
        }
        Call::WriteFile { name, external_path } => {
            wire::write_string(&mut buf, name).expect("write to an in-memory buffer cannot fail");
            wire::write_string(&mut buf, external_path).expect("write to an in-memory buffer cannot fail");
        }
        Call::InsertJob(request) => {
            let kind = matches!(request.kind, RequestType::Write);
            wire::write_bool(&mut buf, kind).expect("write to an in-memory buffer cannot fail");
            wire::write_string(&mut buf, &request.filename).expect("write to an in-memory buffer cannot fail");
        }
        Call::RequestData { name, offset, size } => {
            wire::write_string(&mut buf, name).expect("write to an in-memory buffer cannot fail");
            wire::write_u64(&mut buf, *offset).expect("write to an in-memory buffer cannot fail");
            wire::write_u32(&mut buf, *size).expect("write to an in-memory buffer cannot fail");
        }
        Call::CopyFile { version, name, ip, port } => {
            wire::write_u64(&mut buf, *version).expect("write to an in-memory buffer cannot fail");
            wire::write_string(&mut buf, name).expect("write to an in-memory buffer cannot fail");
            wire::write_ipv4(&mut buf, *ip).expect("write to an in-memory buffer cannot fail");
            wire::write_u16(&mut buf, *port).expect("write to an in-memory buffer cannot fail");
        }
        Call::FinishWrite { version, name, src_ip, src_port, origin_ip, origin_port } => {
            wire::write_u64(&mut buf, *version).expect("write to an in-memory buffer cannot fail");
            wire::write_string(&mut buf, name).expect("write to an in-memory buffer cannot fail");
            wire::write_ipv4(&mut buf, *src_ip).expect("write to an in-memory buffer cannot fail");
            wire::write_u16(&mut buf, *src_port).expect("write to an in-memory buffer cannot fail");
            wire::write_ipv4(&mut buf, *origin_ip).expect("write to an in-memory buffer cannot fail");
            wire::write_u16(&mut buf, *origin_port).expect("write to an in-memory buffer cannot fail");
        }
    }
    buf
}

pub fn decode_call(payload: &[u8]) -> Result<Call> {
    let mut src = Cursor::new(payload);
    let raw_opcode = wire::u8(&mut src)?;
    let opcode = Opcode::from_u8(raw_opcode)
        .ok_or_else(|| Error::Protocol(format!("unknown opcode {raw_opcode}")))?;
    let call = match opcode {
        Opcode::ListFiles => Call::ListFiles,
        Opcode::GetAllFiles => Call::GetAllFiles,
        Opcode::CordListFiles => Call::CordListFiles,
        Opcode::FinishRead => Call::FinishRead,
        Opcode::ReadFile => Call::ReadFile { name: wire::string(&mut src)? },
        Opcode::GetVersion => Call::GetVersion { name: wire::string(&mut src)? },
        Opcode::GetFileSize => Call::GetFileSize { name: wire::string(&mut src)? },
        Opcode::WriteFile => {
            let name = wire::string(&mut src)?;
            let external_path = wire::string(&mut src)?;
            Call::WriteFile { name, external_path }
        }
        Opcode::InsertJob => {
            let is_write = wire::bool(&mut src)?;
            let filename = wire::string(&mut src)?;
            let kind = if is_write { RequestType::Write } else { RequestType::Read };
            Call::InsertJob(Request { kind, filename })
        }
        Opcode::RequestData => {
            let name = wire::string(&mut src)?;
            let offset = wire::u64(&mut src)?;
            let size = wire::u32(&mut src)?;
            Call::RequestData { name, offset, size }
        }
        Opcode::CopyFile => {
            let version = wire::u64(&mut src)?;
            let name = wire::string(&mut src)?;
            let ip = wire::ipv4(&mut src)?;
            let port = wire::u16(&mut src)?;
            Call::CopyFile { version, name, ip, port }
        }
        Opcode::FinishWrite => {
            let version = wire::u64(&mut src)?;
            let name = wire::string(&mut src)?;
            let src_ip = wire::ipv4(&mut src)?;
            let src_port = wire::u16(&mut src)?;
            let origin_ip = wire::ipv4(&mut src)?;
            let origin_port = wire::u16(&mut src)?;
            Call::FinishWrite { version, name, src_ip, src_port, origin_ip, origin_port }
        }
    };
    Ok(call)
}

fn write_contact(buf: &mut Vec<u8>, contact: &ContactInfo) {
    wire::write_ipv4(buf, contact.ip).expect("write to an in-memory buffer cannot fail");
    wire::write_u16(buf, contact.port).expect("write to an in-memory buffer cannot fail");
}

fn read_contact(src: &mut Cursor<&[u8]>) -> Result<ContactInfo> {
    let ip = wire::ipv4(src)?;
    let port = wire::u16(src)?;
    Ok(ContactInfo::new(ip, port))
}

fn write_file_info(buf: &mut Vec<u8>, info: &FileInfo) {
    wire::write_string(buf, &info.name).expect("write to an in-memory buffer cannot fail");
    wire::write_u64(buf, info.version).expect("write to an in-memory buffer cannot fail");
}

fn read_file_info(src: &mut Cursor<&[u8]>) -> Result<FileInfo> {
    let name = wire::string(src)?;
    let version = wire::u64(src)?;
    Ok(FileInfo { name, version })
}

fn write_file_list(buf: &mut Vec<u8>, files: &[FileInfo]) {
    wire::write_u32(buf, files.len() as u32).expect("write to an in-memory buffer cannot fail");
    for info in files {
        write_file_info(buf, info);
    }
}

fn read_file_list(src: &mut Cursor<&[u8]>) -> Result<Vec<FileInfo>> {
    let len = wire::u32(src)?;
    (0..len).map(|_| read_file_info(src)).collect()
}

fn write_complete_info(buf: &mut Vec<u8>, info: &CompleteInfo) {
    write_contact(buf, &info.contact);
    write_file_list(buf, &info.files);
}

fn read_complete_info(src: &mut Cursor<&[u8]>) -> Result<CompleteInfo> {
    let contact = read_contact(src)?;
    let files = read_file_list(src)?;
    Ok(CompleteInfo { contact, files })
}

/// Result-kind discriminant for the reply envelope: `0` = ok, `1` = error.
fn encode_remote_error(buf: &mut Vec<u8>, err: &RemoteError) {
    match err {
        RemoteError::NotFound => wire::write_u8(buf, 0).expect("write to an in-memory buffer cannot fail"),
        RemoteError::Protocol(msg) => {
            wire::write_u8(buf, 1).expect("write to an in-memory buffer cannot fail");
            wire::write_string(buf, msg).expect("write to an in-memory buffer cannot fail");
        }
        RemoteError::Quorum => wire::write_u8(buf, 2).expect("write to an in-memory buffer cannot fail"),
        RemoteError::Transfer(msg) => {
            wire::write_u8(buf, 3).expect("write to an in-memory buffer cannot fail");
            wire::write_string(buf, msg).expect("write to an in-memory buffer cannot fail");
        }
        RemoteError::Io(msg) => {
            wire::write_u8(buf, 4).expect("write to an in-memory buffer cannot fail");
            wire::write_string(buf, msg).expect("write to an in-memory buffer cannot fail");
        }
        RemoteError::Timeout => wire::write_u8(buf, 5).expect("write to an in-memory buffer cannot fail"),
    }
}

fn decode_remote_error(src: &mut Cursor<&[u8]>) -> Result<RemoteError> {
    let tag = wire::u8(src)?;
    Ok(match tag {
        0 => RemoteError::NotFound,
        1 => RemoteError::Protocol(wire::string(src)?),
        2 => RemoteError::Quorum,
        3 => RemoteError::Transfer(wire::string(src)?),
        4 => RemoteError::Io(wire::string(src)?),
        5 => RemoteError::Timeout,
        other => return Err(Error::Protocol(format!("unknown remote error tag {other}"))),
    })
}

pub fn encode_reply(reply: &Reply) -> Vec<u8> {
    let mut buf = Vec::new();
    match reply {
        Ok(ok) => {
            wire::write_u8(&mut buf, 0).expect("write to an in-memory buffer cannot fail");
            match ok {
                ReplyOk::Unit => {}
                ReplyOk::ListFiles(infos) => {
                    wire::write_u32(&mut buf, infos.len() as u32).expect("write to an in-memory buffer cannot fail");
                    for info in infos {
                        write_complete_info(&mut buf, info);
                    }
                }
                ReplyOk::GetAllFiles(files) => write_file_list(&mut buf, files),
                ReplyOk::Path(path) => wire::write_string(&mut buf, path).expect("write to an in-memory buffer cannot fail"),
                ReplyOk::Version(v) => wire::write_u64(&mut buf, *v).expect("write to an in-memory buffer cannot fail"),
                ReplyOk::FileSize(size) => wire::write_u64(&mut buf, *size).expect("write to an in-memory buffer cannot fail"),
                ReplyOk::Data(data) => wire::write_bytes(&mut buf, data).expect("write to an in-memory buffer cannot fail"),
                ReplyOk::InsertJob(response) => {
                    wire::write_u64(&mut buf, response.version).expect("write to an in-memory buffer cannot fail");
                    match &response.contact {
                        Some(contact) => {
                            wire::write_bool(&mut buf, true).expect("write to an in-memory buffer cannot fail");
                            write_contact(&mut buf, contact);
                        }
                        None => wire::write_bool(&mut buf, false).expect("write to an in-memory buffer cannot fail"),
                    }
                }
            }
        }
        Err(err) => {
            wire::write_u8(&mut buf, 1).expect("write to an in-memory buffer cannot fail");
            encode_remote_error(&mut buf, err);
        }
    }
    buf
}

/// Decodes a reply payload. The caller must already know which [`Opcode`]
/// it corresponds to, since variants like `ReplyOk::Version`/`FileSize`
/// share the same on-wire shape (`u64`).
pub fn decode_reply(payload: &[u8], opcode: Opcode) -> Result<Reply> {
    let mut src = Cursor::new(payload);
    let tag = wire::u8(&mut src)?;
    if tag == 1 {
        return Ok(Err(decode_remote_error(&mut src)?));
    }
    let ok = match opcode {
        Opcode::FinishRead
        | Opcode::FinishWrite
        | Opcode::CopyFile
        | Opcode::WriteFile => ReplyOk::Unit,
        Opcode::ListFiles | Opcode::CordListFiles => {
            let len = wire::u32(&mut src)?;
            let mut infos = Vec::with_capacity(len as usize);
            for _ in 0..len {
                infos.push(read_complete_info(&mut src)?);
            }
            ReplyOk::ListFiles(infos)
        }
        Opcode::GetAllFiles => ReplyOk::GetAllFiles(read_file_list(&mut src)?),
        Opcode::ReadFile => ReplyOk::Path(wire::string(&mut src)?),
        Opcode::GetVersion => ReplyOk::Version(wire::u64(&mut src)?),
        Opcode::GetFileSize => ReplyOk::FileSize(wire::u64(&mut src)?),
        Opcode::RequestData => ReplyOk::Data(wire::bytes(&mut src)?),
        Opcode::InsertJob => {
            let version = wire::u64(&mut src)?;
            let contact = if wire::bool(&mut src)? { Some(read_contact(&mut src)?) } else { None };
            ReplyOk::InsertJob(Response { version, contact })
        }
    };
    Ok(Ok(ok))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_insert_job_call_and_reply() {
        let call = Call::InsertJob(Request { kind: RequestType::Write, filename: "a.txt".into() });
        let encoded = encode_call(&call);
        assert_eq!(decode_call(&encoded).unwrap(), call);

        let reply: Reply = Ok(ReplyOk::InsertJob(Response {
            version: 3,
            contact: Some(ContactInfo::new(Ipv4Addr::new(10, 0, 0, 1), 9001)),
        }));
        let encoded = encode_reply(&reply);
        assert_eq!(decode_reply(&encoded, Opcode::InsertJob).unwrap(), reply);
    }

    #[test]
    fn round_trips_list_files_reply() {
        let reply: Reply = Ok(ReplyOk::ListFiles(vec![CompleteInfo {
            contact: ContactInfo::new(Ipv4Addr::new(127, 0, 0, 1), 9000),
            files: vec![FileInfo { name: "x".into(), version: 2 }],
        }]));
        let encoded = encode_reply(&reply);
        assert_eq!(decode_reply(&encoded, Opcode::ListFiles).unwrap(), reply);
    }

    #[test]
    fn round_trips_remote_error() {
        let reply: Reply = Err(RemoteError::NotFound);
        let encoded = encode_reply(&reply);
        assert_eq!(decode_reply(&encoded, Opcode::GetVersion).unwrap(), reply);
    }

    #[test]
    fn round_trips_copy_file_call() {
        let call = Call::CopyFile {
            version: 7,
            name: "f".into(),
            ip: Ipv4Addr::new(192, 168, 0, 1),
            port: 9100,
        };
        let encoded = encode_call(&call);
        assert_eq!(decode_call(&encoded).unwrap(), call);
    }
}
