use std::{fmt, io, net::SocketAddr};

use thiserror::Error;

/// Status byte returned by the server for every admin command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultCode(pub u8);

impl ResultCode {
    pub const OK: ResultCode = ResultCode(0);
    /// Clean end of a streaming query.
    pub const QUERY_END: ResultCode = ResultCode(50);

    pub fn is_ok(self) -> bool {
        self == Self::OK
    }

    /// Maps every non-zero code to [`AdminError::Protocol`].
    pub fn into_result(self) -> Result<(), AdminError> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(AdminError::Protocol(self))
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for ResultCode {
    fn from(value: u8) -> Self {
        ResultCode(value)
    }
}

/// List of possible errors an admin call can return.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("no cluster node available")]
    NoAvailableNode,

    #[error("failed to open connection to {address}: {source}")]
    Connection {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("deadline elapsed before the operation completed")]
    Timeout,

    #[error("transport IO error: {0}")]
    Io(#[from] io::Error),

    #[error("server returned result code {0}")]
    Protocol(ResultCode),

    #[error("invalid argument, {0}")]
    Argument(String),

    #[error("malformed reply, {0}")]
    Malformed(String),

    #[error("failed to encode header: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("failed to decode header: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("failed to hash password: {0}")]
    Credential(#[from] bcrypt::BcryptError),
}

impl AdminError {
    /// True when the connection's byte stream can no longer be trusted.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AdminError::Timeout | AdminError::Io(_) | AdminError::Connection { .. }
        )
    }
}
