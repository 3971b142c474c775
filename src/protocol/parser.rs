use log::trace;

use crate::{
    AdminError, ResultCode,
    user::{ROLE_NAME_MAX, USER_NAME_MAX, UserRoles, truncate_name},
};

use super::{ADMIN_HEADER_SIZE, FieldId, FieldReader, RecordHeader};

/// What the reader should do after a block has been parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// Block consumed, more blocks follow.
    Continue,
    /// The terminal sentinel was seen.
    End,
}

/// Decodes every record of one block into `users`.
///
/// A record whose result code is non-zero stops the block: the query-end
/// sentinel yields [`BlockStatus::End`], anything else is returned as
/// [`AdminError::Protocol`]. Records before it are kept in `users`.
pub fn parse_user_block(
    block: &[u8],
    users: &mut Vec<UserRoles>,
) -> Result<BlockStatus, AdminError> {
    let mut reader = FieldReader::new(block);

    while !reader.is_empty() {
        let header = RecordHeader::decode(reader.take(ADMIN_HEADER_SIZE)?)?;
        let code = ResultCode(header.result_code);

        if code == ResultCode::QUERY_END {
            return Ok(BlockStatus::End);
        }
        if !code.is_ok() {
            return Err(AdminError::Protocol(code));
        }

        let record = parse_record(&mut reader, header.field_count)?;
        if record.is_empty() {
            trace!("skipping empty record");
            continue;
        }
        users.push(record);
    }

    Ok(BlockStatus::Continue)
}

fn parse_record(reader: &mut FieldReader<'_>, field_count: u8) -> Result<UserRoles, AdminError> {
    let mut record = UserRoles::default();

    for _ in 0..field_count {
        let (id, payload) = reader.read_field()?;
        match FieldId::try_from(id) {
            Ok(FieldId::User) => record.user = truncate_name(payload, USER_NAME_MAX),
            Ok(FieldId::Roles) => record.roles = parse_roles(payload)?,
            // Unknown and unused fields were skipped by length.
            _ => {}
        }
    }

    Ok(record)
}

fn parse_roles(payload: &[u8]) -> Result<Vec<String>, AdminError> {
    let mut reader = FieldReader::new(payload);
    let count = reader.read_u8()?;

    let mut roles = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let len = reader.read_u8()? as usize;
        roles.push(truncate_name(reader.take(len)?, ROLE_NAME_MAX));
    }
    Ok(roles)
}
