//! Cluster collaborator.
//!
//! Admin calls only need a node to talk to and a connection leased from
//! it. The [`Cluster`] trait is that seam; [`TcpCluster`] is a plain TCP
//! implementation over a list of seed addresses.
mod tcp;

pub use tcp::{ClusterConfig, TcpCluster, TcpNode};

use crate::{AdminError, Session, protocol::DeadlineStream};

/// Node selection and connection pooling.
///
/// Implementations must be safe to call from several admin calls at once.
/// Every acquired node is released exactly once, and every leased
/// connection is either returned or closed exactly once.
pub trait Cluster {
    type Node;
    type Connection: DeadlineStream;

    fn acquire_node(&self) -> Option<Self::Node>;

    fn lease_connection(&self, node: &Self::Node) -> Result<Self::Connection, AdminError>;

    /// Puts a healthy connection back into the node's pool.
    fn return_connection(&self, node: &Self::Node, connection: Self::Connection);

    /// Discards a connection whose stream position is unknown.
    fn close_connection(&self, connection: Self::Connection);

    fn release_node(&self, node: Self::Node);

    /// Called after the session's password changed, so new connections
    /// authenticate with the new hash.
    fn password_changed(&self, _session: &Session) {}
}
