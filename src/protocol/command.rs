use crate::{AdminError, session::PasswordHash};

use super::{ADMIN_HEADER_SIZE, CommandHeader, FieldId, FieldWriter, Opcode, PROTO_HEADER_SIZE};

/// An encoded admin request.
///
/// The buffer starts with [`PROTO_HEADER_SIZE`] zero bytes that the
/// transport fills in at send time, followed by the command header and the
/// fields in opcode-specific order.
#[derive(Debug, Clone)]
pub struct AdminCommand {
    opcode: Opcode,
    field_count: u8,
    writer: FieldWriter,
}

impl AdminCommand {
    fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            field_count: 0,
            writer: FieldWriter::with_reserved(PROTO_HEADER_SIZE + ADMIN_HEADER_SIZE),
        }
    }

    fn string(mut self, id: FieldId, value: &str) -> Result<Self, AdminError> {
        self.writer.write_string_field(id, value)?;
        self.field_count += 1;
        Ok(self)
    }

    fn roles<S: AsRef<str>>(mut self, roles: &[S]) -> Result<Self, AdminError> {
        self.writer.write_roles_field(roles)?;
        self.field_count += 1;
        Ok(self)
    }

    fn privileges(mut self, privileges: &[u8]) -> Result<Self, AdminError> {
        let count = u8::try_from(privileges.len()).map_err(|_| {
            AdminError::Argument(format!("{} privileges exceed 255", privileges.len()))
        })?;
        let mut payload = Vec::with_capacity(1 + privileges.len());
        payload.push(count);
        payload.extend_from_slice(privileges);
        self.writer.write_field(FieldId::Privileges, &payload)?;
        self.field_count += 1;
        Ok(self)
    }

    fn finish(mut self) -> Result<Self, AdminError> {
        let header = CommandHeader::new(self.opcode, self.field_count);
        header.encode_into(&mut self.writer.as_mut_slice()[PROTO_HEADER_SIZE..])?;
        Ok(self)
    }

    pub fn authenticate(user: &str, credential: &PasswordHash) -> Result<Self, AdminError> {
        Self::new(Opcode::Authenticate)
            .string(FieldId::User, user)?
            .string(FieldId::Credential, credential.as_str())?
            .finish()
    }

    pub fn create_user<S: AsRef<str>>(
        user: &str,
        password: &PasswordHash,
        roles: &[S],
    ) -> Result<Self, AdminError> {
        Self::new(Opcode::CreateUser)
            .string(FieldId::User, user)?
            .string(FieldId::Password, password.as_str())?
            .roles(roles)?
            .finish()
    }

    pub fn drop_user(user: &str) -> Result<Self, AdminError> {
        Self::new(Opcode::DropUser)
            .string(FieldId::User, user)?
            .finish()
    }

    pub fn set_password(user: &str, password: &PasswordHash) -> Result<Self, AdminError> {
        Self::new(Opcode::SetPassword)
            .string(FieldId::User, user)?
            .string(FieldId::Password, password.as_str())?
            .finish()
    }

    pub fn change_password(
        user: &str,
        old_password: &PasswordHash,
        password: &PasswordHash,
    ) -> Result<Self, AdminError> {
        Self::new(Opcode::ChangePassword)
            .string(FieldId::User, user)?
            .string(FieldId::OldPassword, old_password.as_str())?
            .string(FieldId::Password, password.as_str())?
            .finish()
    }

    pub fn grant_roles<S: AsRef<str>>(user: &str, roles: &[S]) -> Result<Self, AdminError> {
        Self::user_roles(Opcode::GrantRoles, user, roles)
    }

    pub fn revoke_roles<S: AsRef<str>>(user: &str, roles: &[S]) -> Result<Self, AdminError> {
        Self::user_roles(Opcode::RevokeRoles, user, roles)
    }

    pub fn replace_roles<S: AsRef<str>>(user: &str, roles: &[S]) -> Result<Self, AdminError> {
        Self::user_roles(Opcode::ReplaceRoles, user, roles)
    }

    fn user_roles<S: AsRef<str>>(
        opcode: Opcode,
        user: &str,
        roles: &[S],
    ) -> Result<Self, AdminError> {
        Self::new(opcode)
            .string(FieldId::User, user)?
            .roles(roles)?
            .finish()
    }

    /// New role holding the given privilege codes.
    pub fn create_role(role: &str, privileges: &[u8]) -> Result<Self, AdminError> {
        Self::new(Opcode::CreateRole)
            .roles(&[role])?
            .privileges(privileges)?
            .finish()
    }

    /// Query one user, or every user when `user` is `None`.
    pub fn query_users(user: Option<&str>) -> Result<Self, AdminError> {
        let command = Self::new(Opcode::QueryUsers);
        match user {
            Some(user) => command.string(FieldId::User, user)?.finish(),
            None => command.finish(),
        }
    }

    pub fn query_roles(role: Option<&str>) -> Result<Self, AdminError> {
        let command = Self::new(Opcode::QueryRoles);
        match role {
            Some(role) => command.roles(&[role])?.finish(),
            None => command.finish(),
        }
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn field_count(&self) -> u8 {
        self.field_count
    }

    /// Full request, proto header region still zeroed.
    pub fn as_bytes(&self) -> &[u8] {
        self.writer.as_slice()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.writer.into_inner()
    }

    /// Request fields, after both headers.
    pub fn fields(&self) -> &[u8] {
        &self.as_bytes()[PROTO_HEADER_SIZE + ADMIN_HEADER_SIZE..]
    }
}
