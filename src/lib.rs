//! Client for the cluster's user and role administration protocol.
//!
//! Commands are encoded by [`protocol`], sent over a connection leased from
//! a [`Cluster`], and executed by [`AdminClient`].
pub mod cli;
pub mod client;
pub mod cluster;
mod error;
pub mod policy;
pub mod protocol;
pub mod session;
pub mod user;

#[cfg(test)]
mod testing;

pub use client::AdminClient;
pub use cluster::{Cluster, ClusterConfig, TcpCluster};
pub use error::{AdminError, ResultCode};
pub use policy::AdminPolicy;
pub use session::{BcryptHasher, PasswordHash, PasswordHasher, Session};
pub use user::UserRoles;
