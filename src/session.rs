//! Credentials of the authenticated session.
//!
//! Passwords never leave the client in cleartext. A [`PasswordHasher`] turns
//! them into the fixed-size hash the server stores, and the [`Session`] keeps
//! the hash of the current login so that `change_password` can prove the old
//! one.
use std::fmt;

use crate::AdminError;

/// Salt shared by every client of the cluster: `7EqJtq98hPqEX7fNZaFWoO` in
/// bcrypt's base64 alphabet.
const CONSTANT_SALT: [u8; 16] = [
    0xf4, 0x6b, 0x0b, 0xbe, 0xcf, 0xfe, 0x8d, 0x1b, 0x06, 0x67, 0xd8, 0x4f, 0x6d, 0xc1, 0xd8, 0xa9,
];
const BCRYPT_COST: u32 = 10;

/// Size of a hash written by [`BcryptHasher`].
pub const PASSWORD_HASH_SIZE: usize = 60;

#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Hashes stay out of logs.
impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PasswordHash(..)")
    }
}

pub trait PasswordHasher {
    fn hash(&self, password: &str) -> Result<PasswordHash, AdminError>;
}

/// Constant-salt bcrypt, as expected by the server.
#[derive(Debug, Default, Clone, Copy)]
pub struct BcryptHasher;

impl PasswordHasher for BcryptHasher {
    fn hash(&self, password: &str) -> Result<PasswordHash, AdminError> {
        let parts = bcrypt::hash_with_salt(password, BCRYPT_COST, CONSTANT_SALT)?;
        Ok(PasswordHash(parts.format_for_version(bcrypt::Version::TwoA)))
    }
}

/// Identity the client is logged in with.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Session {
    user: Option<String>,
    password_hash: Option<PasswordHash>,
}

impl Session {
    pub fn new(user: impl Into<String>, password_hash: PasswordHash) -> Self {
        Self {
            user: Some(user.into()),
            password_hash: Some(password_hash),
        }
    }

    /// Session for clusters running without security.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn password_hash(&self) -> Option<&PasswordHash> {
        self.password_hash.as_ref()
    }

    /// Picks `user` or falls back to the session's own user.
    pub fn resolve_user<'a>(&'a self, user: Option<&'a str>) -> Result<&'a str, AdminError> {
        user.or(self.user())
            .ok_or_else(|| AdminError::Argument("no user given and session is anonymous".into()))
    }

    /// Records a confirmed password change. Changes to other users leave
    /// the session untouched.
    pub(crate) fn password_changed(&mut self, user: &str, hash: PasswordHash) {
        if self.user.as_deref() == Some(user) {
            self.password_hash = Some(hash);
        }
    }
}
