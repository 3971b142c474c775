//! Field codec.
//!
//! A field on the wire is a 4-byte big-endian length, a 1-byte id and the
//! payload. The length counts the id byte, so it is always `payload + 1`.
use crate::AdminError;

use super::{FIELD_HEADER_SIZE, FieldId};

/// Growable request buffer with an explicit write cursor (its length).
#[derive(Debug, Default, Clone)]
pub struct FieldWriter {
    buf: Vec<u8>,
}

impl FieldWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with `reserved` zero bytes, e.g. room for the proto header.
    pub fn with_reserved(reserved: usize) -> Self {
        Self {
            buf: vec![0; reserved],
        }
    }

    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> usize {
        self.buf.extend_from_slice(bytes);
        self.position()
    }

    /// Writes length, id and payload. Returns the position right after the
    /// payload.
    pub fn write_field(&mut self, id: FieldId, payload: &[u8]) -> Result<usize, AdminError> {
        let len = u32::try_from(payload.len() + 1).map_err(|_| {
            AdminError::Argument(format!("field {id:?} of {} bytes is too large", payload.len()))
        })?;
        self.buf.reserve(FIELD_HEADER_SIZE + payload.len());
        self.buf.extend_from_slice(&len.to_be_bytes());
        self.buf.push(id as u8);
        Ok(self.write_bytes(payload))
    }

    /// Raw string bytes, no terminator.
    pub fn write_string_field(&mut self, id: FieldId, value: &str) -> Result<usize, AdminError> {
        self.write_field(id, value.as_bytes())
    }

    /// `count || (len || bytes)*`. More than 255 roles, or a role longer
    /// than 255 bytes, is rejected rather than narrowed.
    pub fn write_roles_field<S: AsRef<str>>(&mut self, roles: &[S]) -> Result<usize, AdminError> {
        let count = u8::try_from(roles.len()).map_err(|_| {
            AdminError::Argument(format!("{} roles exceed the limit of 255", roles.len()))
        })?;

        let size = roles.iter().map(|r| r.as_ref().len() + 1).sum::<usize>();
        let mut payload = Vec::with_capacity(1 + size);
        payload.push(count);
        for role in roles {
            let role = role.as_ref().as_bytes();
            let len = u8::try_from(role.len()).map_err(|_| {
                AdminError::Argument(format!("role of {} bytes exceeds 255", role.len()))
            })?;
            payload.push(len);
            payload.extend_from_slice(role);
        }
        self.write_field(FieldId::Roles, &payload)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Bounds-checked cursor over a received payload.
#[derive(Debug)]
pub struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], AdminError> {
        if n > self.remaining() {
            return Err(AdminError::Malformed(format!(
                "need {n} bytes at offset {}, only {} left",
                self.pos,
                self.remaining()
            )));
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), AdminError> {
        self.take(n).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8, AdminError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32, AdminError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads length and id; returns the id byte and the payload size.
    pub fn read_field_header(&mut self) -> Result<(u8, usize), AdminError> {
        let len = self.read_u32()?;
        let id = self.read_u8()?;
        if len == 0 {
            return Err(AdminError::Malformed(format!("field {id} has zero length")));
        }
        Ok((id, (len - 1) as usize))
    }

    /// Header plus payload of the next field.
    pub fn read_field(&mut self) -> Result<(u8, &'a [u8]), AdminError> {
        let (id, len) = self.read_field_header()?;
        Ok((id, self.take(len)?))
    }
}
