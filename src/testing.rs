//! Scripted connections and a recording cluster for unit tests.
use std::{
    collections::VecDeque,
    io::{self, Cursor, Read, Write},
    sync::Mutex,
    thread,
    time::Duration,
};

use crate::{
    AdminError, Cluster, PasswordHash, PasswordHasher, Session,
    protocol::{DeadlineStream, PROTO_HEADER_SIZE, ProtoHeader, RecordHeader},
};

/// Readable stand-in for bcrypt.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct PlainHasher;

impl PasswordHasher for PlainHasher {
    fn hash(&self, password: &str) -> Result<PasswordHash, AdminError> {
        Ok(PasswordHash::new(format!("hash({password})")))
    }
}

/// In-memory connection replaying a fixed reply.
#[derive(Debug, Default)]
pub(crate) struct ScriptedStream {
    input: Cursor<Vec<u8>>,
    output: Vec<u8>,
    timeout: Duration,
    read_stall: Duration,
    write_stall: Duration,
    broken: bool,
    reads: usize,
}

impl ScriptedStream {
    pub fn new(input: Vec<u8>) -> Self {
        Self {
            input: Cursor::new(input),
            timeout: Duration::from_secs(1),
            ..Default::default()
        }
    }

    /// Every read waits this long in total before any data shows up.
    pub fn stall_reads(mut self, stall: Duration) -> Self {
        self.read_stall = stall;
        self
    }

    pub fn stall_writes(mut self, stall: Duration) -> Self {
        self.write_stall = stall;
        self
    }

    /// Fails every read and write with a reset.
    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    pub fn written(&self) -> &[u8] {
        &self.output
    }

    pub fn reads(&self) -> usize {
        self.reads
    }

    fn wait(stall: &mut Duration, timeout: Duration) -> io::Result<()> {
        if stall.is_zero() {
            return Ok(());
        }
        let wait = (*stall).min(timeout);
        thread::sleep(wait);
        *stall -= wait;
        if stall.is_zero() {
            Ok(())
        } else {
            Err(io::ErrorKind::WouldBlock.into())
        }
    }

    fn check_broken(&self) -> io::Result<()> {
        if self.broken {
            return Err(io::ErrorKind::ConnectionReset.into());
        }
        Ok(())
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reads += 1;
        self.check_broken()?;
        Self::wait(&mut self.read_stall, self.timeout)?;
        self.input.read(buf)
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_broken()?;
        Self::wait(&mut self.write_stall, self.timeout)?;
        self.output.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl DeadlineStream for ScriptedStream {
    fn set_io_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        assert!(!timeout.is_zero());
        self.timeout = timeout;
        Ok(())
    }
}

/// Builds streaming replies block by block.
#[derive(Debug, Default)]
pub(crate) struct BlockBuilder {
    bytes: Vec<u8>,
    block: Vec<u8>,
}

impl BlockBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn field(&mut self, id: u8, payload: &[u8]) {
        self.block
            .extend_from_slice(&(payload.len() as u32 + 1).to_be_bytes());
        self.block.push(id);
        self.block.extend_from_slice(payload);
    }

    fn header(&mut self, result_code: u8, field_count: u8) {
        let mut header = [0; 16];
        RecordHeader::new(result_code, field_count)
            .encode_into(&mut header)
            .unwrap();
        self.block.extend_from_slice(&header);
    }

    /// Appends a user record; `None` leaves out the roles field.
    pub fn user(mut self, user: &str, roles: Option<&[&str]>) -> Self {
        self.header(0, if roles.is_some() { 2 } else { 1 });
        self.field(0, user.as_bytes());
        if let Some(roles) = roles {
            let mut payload = vec![roles.len() as u8];
            for role in roles {
                payload.push(role.len() as u8);
                payload.extend_from_slice(role.as_bytes());
            }
            self.field(10, &payload);
        }
        self
    }

    /// Appends a field-less record carrying `result_code`.
    pub fn status(mut self, result_code: u8) -> Self {
        self.header(result_code, 0);
        self
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.block.extend_from_slice(bytes);
        self
    }

    /// Frames the pending records as one block.
    pub fn end_block(mut self) -> Self {
        let block = std::mem::take(&mut self.block);
        let mut proto = [0; PROTO_HEADER_SIZE];
        ProtoHeader::new(block.len())
            .unwrap()
            .encode_into(&mut proto)
            .unwrap();
        self.bytes.extend_from_slice(&proto);
        self.bytes.extend_from_slice(&block);
        self
    }

    /// Pending records of the current block, unframed.
    pub fn block_bytes(&self) -> &[u8] {
        &self.block
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Events {
    pub acquired: usize,
    pub released: usize,
    pub leased: usize,
    pub returned: usize,
    pub closed: usize,
    pub password_changes: usize,
}

/// Cluster handing out pre-scripted connections and counting lifecycle
/// calls.
#[derive(Debug, Default)]
pub(crate) struct MockCluster {
    no_nodes: bool,
    lease_fails: bool,
    connections: Mutex<VecDeque<ScriptedStream>>,
    returned: Mutex<Vec<ScriptedStream>>,
    closed: Mutex<Vec<ScriptedStream>>,
    events: Mutex<Events>,
}

impl MockCluster {
    pub fn with_connections(connections: Vec<ScriptedStream>) -> Self {
        Self {
            connections: Mutex::new(connections.into()),
            ..Default::default()
        }
    }

    pub fn without_nodes() -> Self {
        Self {
            no_nodes: true,
            ..Default::default()
        }
    }

    pub fn failing_leases() -> Self {
        Self {
            lease_fails: true,
            ..Default::default()
        }
    }

    pub fn events(&self) -> Events {
        self.events.lock().unwrap().clone()
    }

    /// Bytes written on the most recently returned or closed connection.
    pub fn last_request(&self) -> Vec<u8> {
        let returned = self.returned.lock().unwrap();
        let closed = self.closed.lock().unwrap();
        returned
            .last()
            .or(closed.last())
            .map(|s| s.written().to_vec())
            .unwrap_or_default()
    }
}

impl Cluster for MockCluster {
    type Node = usize;
    type Connection = ScriptedStream;

    fn acquire_node(&self) -> Option<usize> {
        if self.no_nodes {
            return None;
        }
        let mut events = self.events.lock().unwrap();
        events.acquired += 1;
        Some(events.acquired)
    }

    fn lease_connection(&self, _node: &usize) -> Result<ScriptedStream, AdminError> {
        if self.lease_fails {
            return Err(AdminError::Connection {
                address: "127.0.0.1:3000".parse().unwrap(),
                source: io::ErrorKind::ConnectionRefused.into(),
            });
        }
        self.events.lock().unwrap().leased += 1;
        Ok(self
            .connections
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ScriptedStream::new(vec![])))
    }

    fn return_connection(&self, _node: &usize, connection: ScriptedStream) {
        self.events.lock().unwrap().returned += 1;
        self.returned.lock().unwrap().push(connection);
    }

    fn close_connection(&self, connection: ScriptedStream) {
        self.events.lock().unwrap().closed += 1;
        self.closed.lock().unwrap().push(connection);
    }

    fn release_node(&self, _node: usize) {
        self.events.lock().unwrap().released += 1;
    }

    fn password_changed(&self, _session: &Session) {
        self.events.lock().unwrap().password_changes += 1;
    }
}
