//! Admin wire protocol.
//!
//! This module implements the binary protocol used to manage users, roles
//! and credentials on a cluster node. It covers encoding of commands,
//! framing, deadline-bounded transport and decoding of both single-result
//! and streaming replies.
//!
//! # Binary Format
//!
//! All multi-byte integers are big-endian.
//!
//! - Every message starts with an 8-byte [`ProtoHeader`]: version, message
//!   type and a 48-bit payload length.
//! - The payload starts with a 16-byte admin header. On requests byte 2 is
//!   the opcode and byte 3 the field count ([`CommandHeader`]).
//! - Fields follow: a 4-byte length (payload size + 1), a 1-byte field id,
//!   then the payload.
//! - A single-result reply is exactly 24 bytes ([`ReplyHeader`]) with the
//!   result code at byte 9.
//! - A streaming reply is a sequence of proto-framed blocks. Each block holds
//!   records, each starting with a [`RecordHeader`] (result code at byte 1,
//!   field count at byte 3). A zero-length block or result code 50 ends the
//!   stream.
//!
//! # Key Components
//!
//! - [`AdminCommand`]: request builder for every opcode.
//! - [`FrameTransport`]: framing plus deadline-bounded send and receive.
//! - [`UserBlockReader`]: streaming reply state machine.
//! - [`parse_user_block`]: record decoder for one block.
mod command;
mod field;
mod header;
mod parser;
mod stream;
mod transport;

pub use command::AdminCommand;
pub use field::{FieldReader, FieldWriter};
pub use header::{CommandHeader, ProtoHeader, RecordHeader, ReplyHeader};
pub use parser::{BlockStatus, parse_user_block};
pub use stream::{ReadState, UserBlockReader};
pub use transport::{DeadlineStream, FrameTransport, read_exact_by, write_all_by};

pub const MSG_VERSION: u8 = 0;
pub const MSG_TYPE: u8 = 2;

pub const PROTO_HEADER_SIZE: usize = 8;
pub const ADMIN_HEADER_SIZE: usize = 16;
pub const REPLY_HEADER_SIZE: usize = PROTO_HEADER_SIZE + ADMIN_HEADER_SIZE;
pub const FIELD_HEADER_SIZE: usize = 5;
/// Position of the result code in a single-result reply.
pub const RESULT_CODE_OFFSET: usize = 9;
/// Largest payload a 48-bit length can describe.
pub const MAX_PAYLOAD_SIZE: u64 = (1 << 48) - 1;
/// Largest streaming block the reader will buffer.
pub const MAX_BLOCK_SIZE: usize = 128 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Authenticate = 0,
    CreateUser = 1,
    DropUser = 2,
    SetPassword = 3,
    ChangePassword = 4,
    GrantRoles = 5,
    RevokeRoles = 6,
    ReplaceRoles = 7,
    CreateRole = 8,
    QueryUsers = 9,
    QueryRoles = 10,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FieldId {
    User = 0,
    Password = 1,
    OldPassword = 2,
    Credential = 3,
    Roles = 10,
    Privileges = 11,
}

impl TryFrom<u8> for FieldId {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FieldId::User),
            1 => Ok(FieldId::Password),
            2 => Ok(FieldId::OldPassword),
            3 => Ok(FieldId::Credential),
            10 => Ok(FieldId::Roles),
            11 => Ok(FieldId::Privileges),
            other => Err(other),
        }
    }
}
