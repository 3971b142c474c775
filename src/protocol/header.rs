//! Fixed-size headers of the admin protocol.
//!
//! Single-result replies and streaming records put different things at the
//! same byte offsets, so each layout gets its own type.
use bincode::{
    Decode, Encode,
    config::{BigEndian, Configuration, Fixint},
    decode_from_slice, encode_into_slice,
};

use crate::AdminError;

use super::{
    ADMIN_HEADER_SIZE, MAX_PAYLOAD_SIZE, MSG_TYPE, MSG_VERSION, Opcode, PROTO_HEADER_SIZE,
    REPLY_HEADER_SIZE,
};

const SIZE_MASK: u64 = MAX_PAYLOAD_SIZE;

pub(crate) fn wire_config() -> Configuration<BigEndian, Fixint> {
    bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
}

fn decode_exact<T: Decode<()>>(bytes: &[u8], size: usize) -> Result<T, AdminError> {
    if bytes.len() < size {
        return Err(AdminError::Malformed(format!(
            "header needs {size} bytes, got {}",
            bytes.len()
        )));
    }
    let (header, _) = decode_from_slice(&bytes[..size], wire_config())?;
    Ok(header)
}

fn encode_exact<T: Encode>(header: T, dst: &mut [u8], size: usize) -> Result<(), AdminError> {
    if dst.len() < size {
        return Err(AdminError::Argument(format!(
            "header needs {size} bytes of room, got {}",
            dst.len()
        )));
    }
    encode_into_slice(header, &mut dst[..size], wire_config())?;
    Ok(())
}

/// 8-byte envelope: version in the top byte, message type in the second,
/// payload length in the low 48 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct ProtoHeader {
    word: u64,
}

impl ProtoHeader {
    pub fn new(size: usize) -> Result<Self, AdminError> {
        let size = size as u64;
        if size > MAX_PAYLOAD_SIZE {
            return Err(AdminError::Argument(format!(
                "payload of {size} bytes does not fit a 48-bit length"
            )));
        }
        let word = ((MSG_VERSION as u64) << 56) | ((MSG_TYPE as u64) << 48) | size;
        Ok(Self { word })
    }

    pub fn version(&self) -> u8 {
        (self.word >> 56) as u8
    }

    pub fn kind(&self) -> u8 {
        (self.word >> 48) as u8
    }

    pub fn size(&self) -> Result<usize, AdminError> {
        usize::try_from(self.word & SIZE_MASK)
            .map_err(|_| AdminError::Malformed("block size exceeds address space".into()))
    }

    pub fn encode_into(self, dst: &mut [u8]) -> Result<(), AdminError> {
        encode_exact(self, dst, PROTO_HEADER_SIZE)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, AdminError> {
        decode_exact(bytes, PROTO_HEADER_SIZE)
    }
}

/// First 16 bytes of a request payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct CommandHeader {
    reserved: [u8; 2],
    pub opcode: u8,
    pub field_count: u8,
    unused: [u8; 12],
}

impl CommandHeader {
    pub fn new(opcode: Opcode, field_count: u8) -> Self {
        Self {
            reserved: [0; 2],
            opcode: opcode as u8,
            field_count,
            unused: [0; 12],
        }
    }

    pub fn encode_into(self, dst: &mut [u8]) -> Result<(), AdminError> {
        encode_exact(self, dst, ADMIN_HEADER_SIZE)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, AdminError> {
        decode_exact(bytes, ADMIN_HEADER_SIZE)
    }
}

/// Header in front of every record of a streaming reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct RecordHeader {
    reserved: u8,
    pub result_code: u8,
    info: u8,
    pub field_count: u8,
    unused: [u8; 12],
}

impl RecordHeader {
    pub fn new(result_code: u8, field_count: u8) -> Self {
        Self {
            reserved: 0,
            result_code,
            info: 0,
            field_count,
            unused: [0; 12],
        }
    }

    pub fn encode_into(self, dst: &mut [u8]) -> Result<(), AdminError> {
        encode_exact(self, dst, ADMIN_HEADER_SIZE)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, AdminError> {
        decode_exact(bytes, ADMIN_HEADER_SIZE)
    }
}

/// The whole 24-byte reply to a single-result command, proto header
/// included. The result code lands at byte 9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct ReplyHeader {
    pub proto: ProtoHeader,
    reserved: u8,
    pub result_code: u8,
    unused: [u8; 14],
}

impl ReplyHeader {
    pub fn new(result_code: u8) -> Result<Self, AdminError> {
        Ok(Self {
            proto: ProtoHeader::new(ADMIN_HEADER_SIZE)?,
            reserved: 0,
            result_code,
            unused: [0; 14],
        })
    }

    pub fn encode(self) -> Result<[u8; REPLY_HEADER_SIZE], AdminError> {
        let mut buf = [0; REPLY_HEADER_SIZE];
        encode_exact(self, &mut buf, REPLY_HEADER_SIZE)?;
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, AdminError> {
        decode_exact(bytes, REPLY_HEADER_SIZE)
    }
}
