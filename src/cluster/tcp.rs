use std::{
    net::{Shutdown, SocketAddr, TcpStream},
    sync::{
        Arc, Mutex, PoisonError, RwLock,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use log::{debug, info, trace, warn};

use crate::{AdminError, Session, client::authenticate};

use super::Cluster;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_MAX_IDLE: usize = 16;

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub seeds: Vec<SocketAddr>,
    /// Bound for opening and authenticating a new connection.
    pub connect_timeout: Duration,
    /// Idle connections kept per node; extras are dropped on return.
    pub max_idle_connections: usize,
}

impl ClusterConfig {
    pub fn new(seeds: Vec<SocketAddr>) -> Self {
        Self {
            seeds,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_idle_connections: DEFAULT_MAX_IDLE,
        }
    }
}

#[derive(Debug)]
pub struct TcpNode {
    address: SocketAddr,
    idle: Mutex<Vec<TcpStream>>,
}

impl TcpNode {
    fn new(address: SocketAddr) -> Self {
        Self {
            address,
            idle: Mutex::new(Vec::new()),
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn idle_connections(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Round-robin over the seed nodes, with a small idle pool per node.
#[derive(Debug)]
pub struct TcpCluster {
    config: ClusterConfig,
    nodes: Vec<Arc<TcpNode>>,
    next: AtomicUsize,
    credentials: RwLock<Session>,
}

impl TcpCluster {
    pub fn new(config: ClusterConfig, credentials: Session) -> Self {
        let nodes = config
            .seeds
            .iter()
            .map(|address| Arc::new(TcpNode::new(*address)))
            .collect();
        info!("cluster configured with {} seed(s)", config.seeds.len());

        Self {
            config,
            nodes,
            next: AtomicUsize::new(0),
            credentials: RwLock::new(credentials),
        }
    }

    pub fn nodes(&self) -> &[Arc<TcpNode>] {
        &self.nodes
    }

    fn connect(&self, node: &TcpNode) -> Result<TcpStream, AdminError> {
        let address = node.address;
        let connection_error = |source| AdminError::Connection { address, source };

        let mut stream = TcpStream::connect_timeout(&address, self.config.connect_timeout)
            .map_err(connection_error)?;
        stream.set_nodelay(true).map_err(connection_error)?;

        let credentials = self
            .credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let (Some(user), Some(hash)) = (credentials.user(), credentials.password_hash()) {
            let deadline = Instant::now() + self.config.connect_timeout;
            if let Err(e) = authenticate(&mut stream, user, hash, deadline) {
                warn!("authentication with {address} failed: {e}");
                let _ = stream.shutdown(Shutdown::Both);
                return Err(e);
            }
        }

        debug!("opened connection to {address}");
        Ok(stream)
    }
}

impl Cluster for TcpCluster {
    type Node = Arc<TcpNode>;
    type Connection = TcpStream;

    fn acquire_node(&self) -> Option<Arc<TcpNode>> {
        if self.nodes.is_empty() {
            return None;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.nodes.len();
        let node = Arc::clone(&self.nodes[index]);
        trace!("acquired node {}", node.address);
        Some(node)
    }

    fn lease_connection(&self, node: &Arc<TcpNode>) -> Result<TcpStream, AdminError> {
        let pooled = node
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        match pooled {
            Some(stream) => {
                trace!("reusing pooled connection to {}", node.address);
                Ok(stream)
            }
            None => self.connect(node),
        }
    }

    fn return_connection(&self, node: &Arc<TcpNode>, connection: TcpStream) {
        let mut idle = node.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.config.max_idle_connections {
            idle.push(connection);
        } else {
            debug!("pool for {} is full, dropping connection", node.address);
        }
    }

    fn close_connection(&self, connection: TcpStream) {
        debug!("closing connection to {:?}", connection.peer_addr().ok());
        let _ = connection.shutdown(Shutdown::Both);
    }

    fn release_node(&self, node: Arc<TcpNode>) {
        trace!("released node {}", node.address);
    }

    fn password_changed(&self, session: &Session) {
        *self
            .credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner) = session.clone();
    }
}
