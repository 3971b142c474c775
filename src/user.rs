use std::fmt;

/// Longest user name kept from a reply, in bytes.
pub const USER_NAME_MAX: usize = 31;
/// Longest role name kept from a reply, in bytes.
pub const ROLE_NAME_MAX: usize = 31;

/// A user and the roles granted to it, in server order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserRoles {
    pub user: String,
    pub roles: Vec<String>,
}

impl UserRoles {
    pub fn new(user: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            user: user.into(),
            roles,
        }
    }

    /// Records with neither a user nor roles are padding.
    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.roles.is_empty()
    }
}

impl fmt::Display for UserRoles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.roles.is_empty() {
            write!(f, "{}: (no roles)", self.user)
        } else {
            write!(f, "{}: {}", self.user, self.roles.join(", "))
        }
    }
}

/// Keeps at most `max` bytes of a wire name. Oversized names are cut, not
/// rejected. A cut through a multi-byte character is replaced lossily.
pub(crate) fn truncate_name(bytes: &[u8], max: usize) -> String {
    let kept = &bytes[..bytes.len().min(max)];
    String::from_utf8_lossy(kept).into_owned()
}
