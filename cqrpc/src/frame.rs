//! Wire frame format for the socket transports.
//!
//! Every message is one length-delimited frame: a fixed 24-byte header
//! followed by the status message, the metadata entries, and the payload.
//! The in-process transport moves [`Frame`] values directly and never
//! touches this codec.

use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::metadata::{MetadataMap, MetadataValue};
use crate::status::{Status, StatusCode};

/// Frame header size in bytes.
pub const FRAME_HDR_SIZE: usize = 24;

/// Magic number for valid frames.
pub const CQRPC_MAGIC: u8 = 0xC9;

/// Wire format version.
pub const WIRE_VERSION: u8 = 0;

/// Maximum metadata entries per frame.
pub const MAX_METADATA_ENTRIES: usize = 1024;

/// Maximum metadata key length in bytes.
pub const MAX_METADATA_KEY_LEN: usize = 255;

/// Frame kind (request or response).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// Client-to-server unary request.
    Request = 0,
    /// Server-to-client unary response.
    Response = 1,
}

impl TryFrom<u8> for FrameKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(FrameKind::Request),
            1 => Ok(FrameKind::Response),
            _ => Err(Error::InvalidFrameKind(value)),
        }
    }
}

/// One decoded message.
///
/// Header layout:
/// ```text
/// Offset  Size  Field
/// 0       1     magic
/// 1       1     version
/// 2       1     kind
/// 3       1     status code
/// 4       2     metadata entry count (LE)
/// 6       2     status message length (LE)
/// 8       8     call id (LE)
/// 16      8     payload length (LE)
/// ```
/// Each metadata entry is encoded as: key length (u16 LE), key bytes,
/// value flag (0 = ascii, 1 = binary), value length (u32 LE), value bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    /// Correlates a response with its request.
    pub call_id: u64,
    /// Meaningful on responses; requests carry `Status::ok()`.
    pub status: Status,
    pub metadata: MetadataMap,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a request frame.
    pub fn request(call_id: u64, metadata: MetadataMap, payload: Vec<u8>) -> Self {
        Self {
            kind: FrameKind::Request,
            call_id,
            status: Status::ok(),
            metadata,
            payload,
        }
    }

    /// Create a response frame.
    pub fn response(call_id: u64, status: Status, metadata: MetadataMap, payload: Vec<u8>) -> Self {
        Self {
            kind: FrameKind::Response,
            call_id,
            status,
            metadata,
            payload,
        }
    }

    /// Append the encoded frame to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        let msg = self.status.message().as_bytes();
        debug_assert!(msg.len() <= u16::MAX as usize);
        debug_assert!(self.metadata.len() <= MAX_METADATA_ENTRIES);

        buf.push(CQRPC_MAGIC);
        buf.push(WIRE_VERSION);
        buf.push(self.kind as u8);
        buf.push(self.status.code() as u8);
        buf.extend_from_slice(&(self.metadata.len() as u16).to_le_bytes());
        buf.extend_from_slice(&(msg.len() as u16).to_le_bytes());
        buf.extend_from_slice(&self.call_id.to_le_bytes());
        buf.extend_from_slice(&(self.payload.len() as u64).to_le_bytes());

        buf.extend_from_slice(msg);
        for entry in self.metadata.iter() {
            debug_assert!(entry.key.len() <= MAX_METADATA_KEY_LEN);
            buf.extend_from_slice(&(entry.key.len() as u16).to_le_bytes());
            buf.extend_from_slice(entry.key.as_bytes());
            match &entry.value {
                MetadataValue::Ascii(v) => {
                    buf.push(0);
                    buf.extend_from_slice(&(v.len() as u32).to_le_bytes());
                    buf.extend_from_slice(v.as_bytes());
                }
                MetadataValue::Binary(v) => {
                    buf.push(1);
                    buf.extend_from_slice(&(v.len() as u32).to_le_bytes());
                    buf.extend_from_slice(v);
                }
            }
        }
        buf.extend_from_slice(&self.payload);
    }

    /// Encode the frame and write it to `w`.
    pub fn write_to(&self, w: &mut impl Write, scratch: &mut Vec<u8>) -> Result<()> {
        scratch.clear();
        self.encode_into(scratch);
        w.write_all(scratch)?;
        Ok(())
    }

    /// Read and decode one frame from `r`.
    ///
    /// `max_payload` bounds the accepted payload length; anything larger is
    /// rejected before allocation.
    pub fn read_from(r: &mut impl Read, max_payload: usize) -> Result<Frame> {
        let mut hdr = [0u8; FRAME_HDR_SIZE];
        r.read_exact(&mut hdr)?;

        if hdr[0] != CQRPC_MAGIC {
            return Err(Error::InvalidMagic {
                expected: CQRPC_MAGIC,
                got: hdr[0],
            });
        }
        let kind = FrameKind::try_from(hdr[2])?;
        let code = StatusCode::try_from(hdr[3])?;
        let meta_count = u16::from_le_bytes([hdr[4], hdr[5]]) as usize;
        let msg_len = u16::from_le_bytes([hdr[6], hdr[7]]) as usize;
        let call_id = u64::from_le_bytes([
            hdr[8], hdr[9], hdr[10], hdr[11], hdr[12], hdr[13], hdr[14], hdr[15],
        ]);
        let payload_len = u64::from_le_bytes([
            hdr[16], hdr[17], hdr[18], hdr[19], hdr[20], hdr[21], hdr[22], hdr[23],
        ]) as usize;

        if payload_len > max_payload {
            return Err(Error::MessageTooLarge {
                size: payload_len,
                max: max_payload,
            });
        }
        if meta_count > MAX_METADATA_ENTRIES {
            return Err(Error::InvalidMetadata("too many entries"));
        }

        let mut msg = vec![0u8; msg_len];
        r.read_exact(&mut msg)?;
        let message =
            String::from_utf8(msg).map_err(|_| Error::InvalidMetadata("status message"))?;

        let mut metadata = MetadataMap::new();
        for _ in 0..meta_count {
            let mut len2 = [0u8; 2];
            r.read_exact(&mut len2)?;
            let key_len = u16::from_le_bytes(len2) as usize;
            if key_len > MAX_METADATA_KEY_LEN {
                return Err(Error::InvalidMetadata("key too long"));
            }
            let mut key = vec![0u8; key_len];
            r.read_exact(&mut key)?;
            let key = String::from_utf8(key).map_err(|_| Error::InvalidMetadata("key utf-8"))?;

            let mut flag = [0u8; 1];
            r.read_exact(&mut flag)?;
            let mut len4 = [0u8; 4];
            r.read_exact(&mut len4)?;
            let val_len = u32::from_le_bytes(len4) as usize;
            if val_len > max_payload {
                return Err(Error::MessageTooLarge {
                    size: val_len,
                    max: max_payload,
                });
            }
            let mut val = vec![0u8; val_len];
            r.read_exact(&mut val)?;
            match flag[0] {
                0 => {
                    let val = String::from_utf8(val)
                        .map_err(|_| Error::InvalidMetadata("ascii value utf-8"))?;
                    metadata.insert_ascii(key, val);
                }
                1 => metadata.insert_binary(key, val),
                _ => return Err(Error::InvalidMetadata("value flag")),
            }
        }

        let mut payload = vec![0u8; payload_len];
        r.read_exact(&mut payload)?;

        Ok(Frame {
            kind,
            call_id,
            status: Status::new(code, message),
            metadata,
            payload,
        })
    }
}
