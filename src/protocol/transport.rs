use std::{
    io::{self, Read, Write},
    net::TcpStream,
    time::{Duration, Instant},
};

use log::trace;

use crate::{AdminError, ResultCode};

use super::{
    ADMIN_HEADER_SIZE, AdminCommand, PROTO_HEADER_SIZE, ProtoHeader, REPLY_HEADER_SIZE,
    ReplyHeader,
};

/// A byte stream whose blocking calls can be bounded in time.
pub trait DeadlineStream: Read + Write {
    /// Upper bound for the next read or write. Never called with zero.
    fn set_io_timeout(&mut self, timeout: Duration) -> io::Result<()>;
}

impl DeadlineStream for TcpStream {
    fn set_io_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_read_timeout(Some(timeout))?;
        self.set_write_timeout(Some(timeout))
    }
}

fn remaining(deadline: Instant) -> Result<Duration, AdminError> {
    let now = Instant::now();
    if now >= deadline {
        return Err(AdminError::Timeout);
    }
    Ok(deadline - now)
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

/// Fills `buf` completely or fails with `Timeout` once `deadline` passes.
pub fn read_exact_by<S: DeadlineStream + ?Sized>(
    stream: &mut S,
    buf: &mut [u8],
    deadline: Instant,
) -> Result<(), AdminError> {
    let mut filled = 0;
    while filled < buf.len() {
        stream.set_io_timeout(remaining(deadline)?)?;
        match stream.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(AdminError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("connection closed after {filled} of {} bytes", buf.len()),
                )));
            }
            Ok(n) => filled += n,
            Err(e) if is_timeout(&e) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Writes all of `buf` or fails with `Timeout` once `deadline` passes.
pub fn write_all_by<S: DeadlineStream + ?Sized>(
    stream: &mut S,
    buf: &[u8],
    deadline: Instant,
) -> Result<(), AdminError> {
    let mut written = 0;
    while written < buf.len() {
        stream.set_io_timeout(remaining(deadline)?)?;
        match stream.write(&buf[written..]) {
            Ok(0) => {
                return Err(AdminError::Io(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "connection refused further bytes",
                )));
            }
            Ok(n) => written += n,
            Err(e) if is_timeout(&e) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    stream.flush()?;
    Ok(())
}

/// Framing over one leased connection, bounded by a single deadline.
pub struct FrameTransport<'a, T: DeadlineStream + ?Sized> {
    stream: &'a mut T,
    deadline: Instant,
}

impl<'a, T: DeadlineStream + ?Sized> FrameTransport<'a, T> {
    pub fn new(stream: &'a mut T, deadline: Instant) -> Self {
        Self { stream, deadline }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn stream(&mut self) -> &mut T {
        &mut *self.stream
    }

    /// Fills in the proto header and writes the whole request.
    pub fn send(&mut self, command: AdminCommand) -> Result<(), AdminError> {
        let opcode = command.opcode();
        let mut buf = command.into_bytes();
        let header = ProtoHeader::new(buf.len() - PROTO_HEADER_SIZE)?;
        header.encode_into(&mut buf)?;

        trace!("sending {opcode:?} ({} bytes)", buf.len());
        write_all_by(&mut *self.stream, &buf, self.deadline)
    }

    /// Reads the fixed 24-byte reply of a single-result command. A reply
    /// declaring any other payload size leaves the stream position unknown
    /// and is rejected as malformed.
    pub fn receive_fixed(&mut self) -> Result<ReplyHeader, AdminError> {
        let mut buf = [0; REPLY_HEADER_SIZE];
        read_exact_by(&mut *self.stream, &mut buf, self.deadline)?;
        let reply = ReplyHeader::decode(&buf)?;

        let size = reply.proto.size()?;
        if size != ADMIN_HEADER_SIZE {
            return Err(AdminError::Malformed(format!(
                "single reply declares {size} payload bytes, expected {ADMIN_HEADER_SIZE}"
            )));
        }
        Ok(reply)
    }

    /// Sends `command` and returns the result code of its reply.
    pub fn round_trip(&mut self, command: AdminCommand) -> Result<ResultCode, AdminError> {
        self.send(command)?;
        let reply = self.receive_fixed()?;
        trace!("reply result code {}", reply.result_code);
        Ok(ResultCode(reply.result_code))
    }
}
