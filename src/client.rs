//! Admin command execution.
//!
//! [`AdminClient`] owns the whole lifecycle of one admin call: it picks a
//! node, leases a connection, sends the encoded command, reads the reply
//! and then decides the connection's fate. Healthy connections go back to
//! the pool; a connection that failed mid-exchange is closed because its
//! byte stream can no longer be trusted. The node is released exactly once
//! on every path.
//!
//! # Example
//! ```no_run
//! use warden::{AdminClient, ClusterConfig, Session, TcpCluster};
//!
//! let config = ClusterConfig::new(vec!["127.0.0.1:3000".parse().unwrap()]);
//! let client = AdminClient::new(TcpCluster::new(config, Session::anonymous()), Session::anonymous());
//!
//! client.create_user("alice", "secret", &["read-write"]).unwrap();
//! for user in client.query_users().unwrap() {
//!     println!("{}: {:?}", user.user, user.roles);
//! }
//! ```
use std::time::Instant;

use log::{debug, warn};

use crate::{
    AdminError, AdminPolicy, ResultCode,
    cluster::Cluster,
    protocol::{AdminCommand, DeadlineStream, FrameTransport, UserBlockReader},
    session::{BcryptHasher, PasswordHash, PasswordHasher, Session},
    user::UserRoles,
};

/// Authenticates a freshly opened connection. Runs before the connection
/// joins any pool, so no node or pool is involved.
pub fn authenticate<S: DeadlineStream + ?Sized>(
    stream: &mut S,
    user: &str,
    credential: &PasswordHash,
    deadline: Instant,
) -> Result<(), AdminError> {
    let command = AdminCommand::authenticate(user, credential)?;
    let code = FrameTransport::new(stream, deadline).round_trip(command)?;
    if !code.is_ok() {
        warn!("authentication of '{user}' rejected with result code {code}");
    }
    code.into_result()
}

pub struct AdminClient<C: Cluster, H: PasswordHasher = BcryptHasher> {
    cluster: C,
    session: Session,
    policy: AdminPolicy,
    hasher: H,
}

impl<C: Cluster> AdminClient<C> {
    pub fn new(cluster: C, session: Session) -> Self {
        Self::with_hasher(cluster, session, BcryptHasher)
    }
}

impl<C: Cluster, H: PasswordHasher> AdminClient<C, H> {
    pub fn with_hasher(cluster: C, session: Session, hasher: H) -> Self {
        Self {
            cluster,
            session,
            policy: AdminPolicy::default(),
            hasher,
        }
    }

    /// Default policy for every call made through this client.
    pub fn with_policy(mut self, policy: AdminPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn cluster(&self) -> &C {
        &self.cluster
    }

    pub fn policy(&self) -> &AdminPolicy {
        &self.policy
    }

    fn on_connection<T, F>(&self, policy: &AdminPolicy, exchange: F) -> Result<T, AdminError>
    where
        F: FnOnce(&mut C::Connection, Instant) -> Result<T, AdminError>,
    {
        let deadline = policy.deadline();
        let node = self
            .cluster
            .acquire_node()
            .ok_or(AdminError::NoAvailableNode)?;

        let result = self.on_leased(&node, deadline, exchange);
        self.cluster.release_node(node);
        result
    }

    fn on_leased<T, F>(&self, node: &C::Node, deadline: Instant, exchange: F) -> Result<T, AdminError>
    where
        F: FnOnce(&mut C::Connection, Instant) -> Result<T, AdminError>,
    {
        let mut connection = self.cluster.lease_connection(node)?;
        match exchange(&mut connection, deadline) {
            Ok(value) => {
                self.cluster.return_connection(node, connection);
                Ok(value)
            }
            Err(e) => {
                warn!("closing connection after failed exchange: {e}");
                self.cluster.close_connection(connection);
                Err(e)
            }
        }
    }

    /// Runs a single-result command and returns the server's result code.
    /// A non-zero code is not an error at this level.
    pub fn execute(
        &self,
        command: AdminCommand,
        policy: &AdminPolicy,
    ) -> Result<ResultCode, AdminError> {
        let opcode = command.opcode();
        let code = self.on_connection(policy, |connection, deadline| {
            FrameTransport::new(connection, deadline).round_trip(command)
        })?;
        debug!("{opcode:?} returned result code {code}");
        Ok(code)
    }

    /// Runs a query and collects every record of its streaming reply.
    /// Either all records are returned or none are.
    pub fn execute_streaming(
        &self,
        command: AdminCommand,
        policy: &AdminPolicy,
    ) -> Result<Vec<UserRoles>, AdminError> {
        self.on_connection(policy, |connection, deadline| {
            FrameTransport::new(&mut *connection, deadline).send(command)?;
            UserBlockReader::new(connection, deadline).read_all()
        })
    }

    fn run(&self, command: AdminCommand) -> Result<(), AdminError> {
        self.execute(command, &self.policy)?.into_result()
    }

    pub fn create_user<S: AsRef<str>>(
        &self,
        user: &str,
        password: &str,
        roles: &[S],
    ) -> Result<(), AdminError> {
        let hash = self.hasher.hash(password)?;
        self.run(AdminCommand::create_user(user, &hash, roles)?)
    }

    pub fn drop_user(&self, user: &str) -> Result<(), AdminError> {
        self.run(AdminCommand::drop_user(user)?)
    }

    /// Sets the password of `user`, or of the session's user when `None`.
    /// The session keeps the new hash only once the server accepted it.
    pub fn set_password(&mut self, user: Option<&str>, password: &str) -> Result<(), AdminError> {
        let user = self.session.resolve_user(user)?.to_string();
        let hash = self.hasher.hash(password)?;
        self.run(AdminCommand::set_password(&user, &hash)?)?;
        self.password_changed(&user, hash);
        Ok(())
    }

    /// Like [`set_password`](Self::set_password), proving the session's
    /// current hash to the server.
    pub fn change_password(&mut self, user: Option<&str>, password: &str) -> Result<(), AdminError> {
        let user = self.session.resolve_user(user)?.to_string();
        let old = self
            .session
            .password_hash()
            .cloned()
            .ok_or_else(|| AdminError::Argument("session holds no password to change".into()))?;
        let hash = self.hasher.hash(password)?;
        self.run(AdminCommand::change_password(&user, &old, &hash)?)?;
        self.password_changed(&user, hash);
        Ok(())
    }

    fn password_changed(&mut self, user: &str, hash: PasswordHash) {
        self.session.password_changed(user, hash);
        self.cluster.password_changed(&self.session);
    }

    pub fn grant_roles<S: AsRef<str>>(&self, user: &str, roles: &[S]) -> Result<(), AdminError> {
        self.run(AdminCommand::grant_roles(user, roles)?)
    }

    pub fn revoke_roles<S: AsRef<str>>(&self, user: &str, roles: &[S]) -> Result<(), AdminError> {
        self.run(AdminCommand::revoke_roles(user, roles)?)
    }

    pub fn replace_roles<S: AsRef<str>>(&self, user: &str, roles: &[S]) -> Result<(), AdminError> {
        self.run(AdminCommand::replace_roles(user, roles)?)
    }

    pub fn create_role(&self, role: &str, privileges: &[u8]) -> Result<(), AdminError> {
        self.run(AdminCommand::create_role(role, privileges)?)
    }

    /// Roles of `user`, or of the session's user when `None`. A user the
    /// server does not know is `Ok(None)`.
    pub fn query_user(&self, user: Option<&str>) -> Result<Option<UserRoles>, AdminError> {
        let user = self.session.resolve_user(user)?;
        let users = self.execute_streaming(AdminCommand::query_users(Some(user))?, &self.policy)?;
        Ok(users.into_iter().next())
    }

    pub fn query_users(&self) -> Result<Vec<UserRoles>, AdminError> {
        self.execute_streaming(AdminCommand::query_users(None)?, &self.policy)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::{
        protocol::{
            ADMIN_HEADER_SIZE, CommandHeader, FieldId, FieldReader, Opcode, PROTO_HEADER_SIZE,
            ProtoHeader, ReplyHeader,
        },
        testing::{BlockBuilder, Events, MockCluster, PlainHasher, ScriptedStream},
    };

    use super::*;

    fn reply(code: u8) -> ScriptedStream {
        ScriptedStream::new(ReplyHeader::new(code).unwrap().encode().unwrap().to_vec())
    }

    fn client(cluster: MockCluster) -> AdminClient<MockCluster, PlainHasher> {
        let session = Session::new("admin", PasswordHash::new("hash(admin)"));
        AdminClient::with_hasher(cluster, session, PlainHasher)
    }

    fn request_fields(request: &[u8]) -> (CommandHeader, Vec<(u8, Vec<u8>)>) {
        let header = CommandHeader::decode(&request[PROTO_HEADER_SIZE..]).unwrap();
        let mut reader = FieldReader::new(&request[PROTO_HEADER_SIZE + ADMIN_HEADER_SIZE..]);
        let mut fields = Vec::new();
        while !reader.is_empty() {
            let (id, payload) = reader.read_field().unwrap();
            fields.push((id, payload.to_vec()));
        }
        (header, fields)
    }

    fn events(acquired: usize, returned: usize, closed: usize) -> Events {
        Events {
            acquired,
            released: acquired,
            leased: returned + closed,
            returned,
            closed,
            password_changes: 0,
        }
    }

    #[test]
    fn create_user_round_trip() {
        let client = client(MockCluster::with_connections(vec![reply(0)]));
        client.create_user("alice", "secret", &["read-write"]).unwrap();

        let (header, fields) = request_fields(&client.cluster().last_request());
        assert_eq!(header.opcode, Opcode::CreateUser as u8);
        assert_eq!(header.field_count, 3);
        assert_eq!(fields[0], (FieldId::User as u8, b"alice".to_vec()));
        assert_eq!(fields[1], (FieldId::Password as u8, b"hash(secret)".to_vec()));

        let mut roles = Vec::new();
        let mut reader = FieldReader::new(&fields[2].1);
        for _ in 0..reader.read_u8().unwrap() {
            let len = reader.read_u8().unwrap() as usize;
            roles.push(String::from_utf8(reader.take(len).unwrap().to_vec()).unwrap());
        }
        assert_eq!(fields[2].0, FieldId::Roles as u8);
        assert_eq!(roles, vec!["read-write"]);

        assert_eq!(client.cluster().events(), events(1, 1, 0));
    }

    #[test]
    fn execute_returns_raw_result_code() {
        let client = client(MockCluster::with_connections(vec![reply(61)]));
        let code = client
            .execute(AdminCommand::drop_user("bob").unwrap(), &AdminPolicy::default())
            .unwrap();
        assert_eq!(code, ResultCode(61));
    }

    #[test]
    fn server_rejection_keeps_connection() {
        let client = client(MockCluster::with_connections(vec![reply(60)]));
        let err = client.drop_user("ghost").unwrap_err();
        assert!(matches!(err, AdminError::Protocol(ResultCode(60))));
        assert_eq!(client.cluster().events(), events(1, 1, 0));
    }

    #[test]
    fn no_node_fails_without_lease() {
        let client = client(MockCluster::without_nodes());
        assert!(matches!(client.drop_user("bob"), Err(AdminError::NoAvailableNode)));
        assert_eq!(client.cluster().events(), Events::default());
    }

    #[test]
    fn failed_lease_releases_node() {
        let client = client(MockCluster::failing_leases());
        let err = client.drop_user("bob").unwrap_err();
        assert!(matches!(err, AdminError::Connection { .. }));

        let events = client.cluster().events();
        assert_eq!((events.acquired, events.released, events.leased), (1, 1, 0));
    }

    #[test]
    fn timeout_closes_connection() {
        let stalled = reply(0).stall_reads(Duration::from_millis(500));
        let client = client(MockCluster::with_connections(vec![stalled]))
            .with_policy(AdminPolicy::with_timeout(Duration::from_millis(100)));

        assert!(matches!(client.drop_user("bob"), Err(AdminError::Timeout)));
        assert_eq!(client.cluster().events(), events(1, 0, 1));
    }

    #[test]
    fn stalled_write_closes_connection() {
        let stalled = reply(0).stall_writes(Duration::from_millis(500));
        let client = client(MockCluster::with_connections(vec![stalled]))
            .with_policy(AdminPolicy::with_timeout(Duration::from_millis(100)));

        assert!(matches!(client.drop_user("bob"), Err(AdminError::Timeout)));
        assert_eq!(client.cluster().events(), events(1, 0, 1));
    }

    #[test]
    fn stalled_query_closes_connection() {
        let stream = BlockBuilder::new().user("bob", None).end_block().end_block().build();
        let stalled = ScriptedStream::new(stream).stall_reads(Duration::from_millis(500));
        let client = client(MockCluster::with_connections(vec![stalled]))
            .with_policy(AdminPolicy::with_timeout(Duration::from_millis(100)));

        assert!(matches!(client.query_users(), Err(AdminError::Timeout)));
        assert_eq!(client.cluster().events(), events(1, 0, 1));
    }

    #[test]
    fn stalled_query_write_closes_connection() {
        let stream = BlockBuilder::new().end_block().build();
        let stalled = ScriptedStream::new(stream).stall_writes(Duration::from_millis(500));
        let client = client(MockCluster::with_connections(vec![stalled]))
            .with_policy(AdminPolicy::with_timeout(Duration::from_millis(100)));

        assert!(matches!(client.query_users(), Err(AdminError::Timeout)));
        assert_eq!(client.cluster().events(), events(1, 0, 1));
    }

    #[test]
    fn trailing_reply_bytes_close_connection() {
        let mut header = ReplyHeader::new(0).unwrap();
        header.proto = ProtoHeader::new(ADMIN_HEADER_SIZE + 10).unwrap();
        let mut bytes = header.encode().unwrap().to_vec();
        bytes.extend_from_slice(&[0; 10]);
        let client = client(MockCluster::with_connections(vec![ScriptedStream::new(bytes)]));

        assert!(matches!(client.drop_user("bob"), Err(AdminError::Malformed(_))));
        assert_eq!(client.cluster().events(), events(1, 0, 1));
    }

    #[test]
    fn io_fault_closes_connection() {
        let client = client(MockCluster::with_connections(vec![reply(0).broken()]));
        assert!(matches!(client.drop_user("bob"), Err(AdminError::Io(_))));
        assert_eq!(client.cluster().events(), events(1, 0, 1));
    }

    #[test]
    fn query_users_across_blocks() {
        let stream = BlockBuilder::new()
            .user("bob", Some(&["read"]))
            .user("carol", Some(&[]))
            .end_block()
            .end_block()
            .build();
        let client = client(MockCluster::with_connections(vec![ScriptedStream::new(stream)]));

        let users = client.query_users().unwrap();
        assert_eq!(
            users,
            vec![
                UserRoles::new("bob", vec!["read".into()]),
                UserRoles::new("carol", vec![]),
            ]
        );

        let (header, fields) = request_fields(&client.cluster().last_request());
        assert_eq!(header.opcode, Opcode::QueryUsers as u8);
        assert!(fields.is_empty());
        assert_eq!(client.cluster().events(), events(1, 1, 0));
    }

    #[test]
    fn query_error_returns_no_partial_result() {
        let stream = BlockBuilder::new()
            .user("bob", None)
            .end_block()
            .status(70)
            .end_block()
            .build();
        let client = client(MockCluster::with_connections(vec![ScriptedStream::new(stream)]));

        let err = client.query_users().unwrap_err();
        assert!(matches!(err, AdminError::Protocol(ResultCode(70))));
        assert_eq!(client.cluster().events(), events(1, 0, 1));
    }

    #[test]
    fn empty_query_is_not_an_error() {
        let stream = BlockBuilder::new().status(50).end_block().build();
        let client = client(MockCluster::with_connections(vec![ScriptedStream::new(stream)]));
        assert!(client.query_users().unwrap().is_empty());
    }

    #[test]
    fn query_user_defaults_to_session_user() {
        let stream = BlockBuilder::new()
            .user("admin", Some(&["sys-admin"]))
            .user("extra", None)
            .status(50)
            .end_block()
            .build();
        let client = client(MockCluster::with_connections(vec![ScriptedStream::new(stream)]));

        let user = client.query_user(None).unwrap();
        assert_eq!(user, Some(UserRoles::new("admin", vec!["sys-admin".into()])));

        let (header, fields) = request_fields(&client.cluster().last_request());
        assert_eq!(header.field_count, 1);
        assert_eq!(fields[0], (FieldId::User as u8, b"admin".to_vec()));
    }

    #[test]
    fn query_unknown_user_is_none() {
        let stream = BlockBuilder::new().end_block().build();
        let client = client(MockCluster::with_connections(vec![ScriptedStream::new(stream)]));
        assert_eq!(client.query_user(Some("nobody")).unwrap(), None);
    }

    #[test]
    fn set_password_updates_session_on_success() {
        let mut client = client(MockCluster::with_connections(vec![reply(0)]));
        client.set_password(None, "newpass").unwrap();

        let (header, fields) = request_fields(&client.cluster().last_request());
        assert_eq!(header.opcode, Opcode::SetPassword as u8);
        assert_eq!(fields[0], (FieldId::User as u8, b"admin".to_vec()));
        assert_eq!(
            client.session().password_hash(),
            Some(&PasswordHash::new("hash(newpass)"))
        );
        assert_eq!(client.cluster().events().password_changes, 1);
    }

    #[test]
    fn set_password_rejected_keeps_session() {
        let mut client = client(MockCluster::with_connections(vec![reply(62)]));
        assert!(client.set_password(None, "newpass").is_err());
        assert_eq!(
            client.session().password_hash(),
            Some(&PasswordHash::new("hash(admin)"))
        );
        assert_eq!(client.cluster().events().password_changes, 0);
    }

    #[test]
    fn change_password_proves_old_hash() {
        let mut client = client(MockCluster::with_connections(vec![reply(0)]));
        client.change_password(None, "rotated").unwrap();

        let (header, fields) = request_fields(&client.cluster().last_request());
        assert_eq!(header.opcode, Opcode::ChangePassword as u8);
        assert_eq!(
            fields,
            vec![
                (FieldId::User as u8, b"admin".to_vec()),
                (FieldId::OldPassword as u8, b"hash(admin)".to_vec()),
                (FieldId::Password as u8, b"hash(rotated)".to_vec()),
            ]
        );
        assert_eq!(
            client.session().password_hash(),
            Some(&PasswordHash::new("hash(rotated)"))
        );
    }

    #[test]
    fn anonymous_password_change_needs_user() {
        let mut client = AdminClient::with_hasher(
            MockCluster::with_connections(vec![reply(0)]),
            Session::anonymous(),
            PlainHasher,
        );
        assert!(matches!(
            client.set_password(None, "x"),
            Err(AdminError::Argument(_))
        ));
        assert_eq!(client.cluster().events(), Events::default());
    }

    #[test]
    fn too_many_roles_never_reaches_cluster() {
        let client = client(MockCluster::with_connections(vec![reply(0)]));
        let roles = vec!["r"; 256];
        assert!(matches!(
            client.grant_roles("bob", &roles),
            Err(AdminError::Argument(_))
        ));
        assert_eq!(client.cluster().events(), Events::default());
    }

    #[test]
    fn authenticate_checks_result_code() {
        let hash = PasswordHash::new("cred");
        let deadline = Instant::now() + Duration::from_secs(1);

        let mut accepted = reply(0);
        authenticate(&mut accepted, "admin", &hash, deadline).unwrap();
        let (header, fields) = request_fields(accepted.written());
        assert_eq!(header.opcode, Opcode::Authenticate as u8);
        assert_eq!(fields[1], (FieldId::Credential as u8, b"cred".to_vec()));

        let mut rejected = reply(65);
        let err = authenticate(&mut rejected, "admin", &hash, deadline).unwrap_err();
        assert!(matches!(err, AdminError::Protocol(ResultCode(65))));
    }
}
