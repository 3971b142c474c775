//! Streaming reply reader.
//!
//! Query replies arrive as any number of proto-framed blocks. The reader
//! moves through [`ReadState`] until the stream ends cleanly or fails:
//!
//! ```text
//! AwaitBlockHeader -> ReadBlock -> ParseBlock -> AwaitBlockHeader
//!        |                |            |-> Done    (query-end sentinel)
//!        |-> Done (size 0) |-> Failed   |-> Failed  (error result code)
//! ```
//!
//! One deadline covers the whole stream; it is not extended per block.
use std::time::Instant;

use log::{debug, trace};

use crate::{AdminError, user::UserRoles};

use super::{
    BlockStatus, DeadlineStream, MAX_BLOCK_SIZE, PROTO_HEADER_SIZE, ProtoHeader, parse_user_block,
    read_exact_by,
};

#[derive(Debug)]
pub enum ReadState {
    AwaitBlockHeader,
    ReadBlock(usize),
    ParseBlock(usize),
    Done,
    Failed(AdminError),
}

pub struct UserBlockReader<'a, S: DeadlineStream + ?Sized> {
    stream: &'a mut S,
    deadline: Instant,
    buffer: Vec<u8>,
    users: Vec<UserRoles>,
    blocks: usize,
}

impl<'a, S: DeadlineStream + ?Sized> UserBlockReader<'a, S> {
    pub fn new(stream: &'a mut S, deadline: Instant) -> Self {
        Self {
            stream,
            deadline,
            buffer: Vec::new(),
            users: Vec::new(),
            blocks: 0,
        }
    }

    fn step(&mut self, state: ReadState) -> ReadState {
        match state {
            ReadState::AwaitBlockHeader => {
                let mut proto = [0; PROTO_HEADER_SIZE];
                let size = read_exact_by(&mut *self.stream, &mut proto, self.deadline)
                    .and_then(|_| ProtoHeader::decode(&proto)?.size());
                match size {
                    Ok(0) => ReadState::Done,
                    Ok(size) if size > MAX_BLOCK_SIZE => ReadState::Failed(AdminError::Malformed(
                        format!("block of {size} bytes exceeds {MAX_BLOCK_SIZE}"),
                    )),
                    Ok(size) => ReadState::ReadBlock(size),
                    Err(e) => ReadState::Failed(e),
                }
            }
            ReadState::ReadBlock(size) => {
                if size > self.buffer.len() {
                    self.buffer.resize(size, 0);
                }
                match read_exact_by(&mut *self.stream, &mut self.buffer[..size], self.deadline) {
                    Ok(()) => ReadState::ParseBlock(size),
                    Err(e) => ReadState::Failed(e),
                }
            }
            ReadState::ParseBlock(size) => {
                self.blocks += 1;
                trace!("parsing block {} ({size} bytes)", self.blocks);
                match parse_user_block(&self.buffer[..size], &mut self.users) {
                    Ok(BlockStatus::Continue) => ReadState::AwaitBlockHeader,
                    Ok(BlockStatus::End) => ReadState::Done,
                    Err(e) => ReadState::Failed(e),
                }
            }
            terminal => terminal,
        }
    }

    /// Runs the stream to completion. Records are only handed out when the
    /// stream finished cleanly.
    pub fn read_all(mut self) -> Result<Vec<UserRoles>, AdminError> {
        let mut state = ReadState::AwaitBlockHeader;
        loop {
            state = match self.step(state) {
                ReadState::Done => {
                    debug!(
                        "query done: {} user(s) in {} block(s)",
                        self.users.len(),
                        self.blocks
                    );
                    return Ok(self.users);
                }
                ReadState::Failed(e) => {
                    debug!("query failed after {} block(s): {e}", self.blocks);
                    return Err(e);
                }
                next => next,
            };
        }
    }
}
