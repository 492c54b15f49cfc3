use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use meridian_serde::{BitReader, Serde};

use crate::{messages::system_messages::RpcReply, rpc::error::RpcReplyError};

type Continuation = Box<dyn FnOnce(Result<Box<[u8]>, RpcReplyError>) + Send>;

struct PendingReply {
    issued: Instant,
    continuation: Continuation,
}

/// Calls awaiting a reply on one connection, keyed by reply id
pub struct ReplyTable {
    next_reply_id: u32,
    pending: HashMap<u32, PendingReply>,
}

impl Default for ReplyTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplyTable {
    pub fn new() -> Self {
        Self {
            next_reply_id: 1,
            pending: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Stores a continuation that receives the raw reply payload and
    /// returns the reply id to send with the call
    pub fn register<F>(&mut self, continuation: F, now: Instant) -> u32
    where
        F: FnOnce(Result<Box<[u8]>, RpcReplyError>) + Send + 'static,
    {
        let mut reply_id = self.next_reply_id;
        while reply_id == 0 || self.pending.contains_key(&reply_id) {
            reply_id = reply_id.wrapping_add(1);
        }
        self.next_reply_id = reply_id.wrapping_add(1);

        self.pending.insert(
            reply_id,
            PendingReply {
                issued: now,
                continuation: Box::new(continuation),
            },
        );
        reply_id
    }

    /// Same as `register`, decoding the payload as `R` first
    pub fn register_typed<R, F>(&mut self, continuation: F, now: Instant) -> u32
    where
        R: Serde + 'static,
        F: FnOnce(Result<R, RpcReplyError>) + Send + 'static,
    {
        self.register(
            move |result: Result<Box<[u8]>, RpcReplyError>| {
                let decoded = result.and_then(|payload| {
                    let mut reader = BitReader::new(&payload);
                    R::de(&mut reader).map_err(RpcReplyError::from)
                });
                continuation(decoded);
            },
            now,
        )
    }

    /// Hands a reply to its continuation. Returns false when no call with
    /// that id is pending.
    pub fn resolve(&mut self, reply: RpcReply) -> bool {
        let Some(pending) = self.pending.remove(&reply.reply_id) else {
            return false;
        };

        let result = if reply.success {
            Ok(reply.payload)
        } else {
            let mut reader = BitReader::new(&reply.payload);
            let reason = String::de(&mut reader).unwrap_or_default();
            Err(RpcReplyError::Failed { reason })
        };
        (pending.continuation)(result);
        true
    }

    /// Fails every call older than `timeout` with `TimedOut` and returns
    /// how many expired
    pub fn sweep(&mut self, now: Instant, timeout: Duration) -> usize {
        let expired: Vec<u32> = self
            .pending
            .iter()
            .filter(|(_, pending)| now.saturating_duration_since(pending.issued) >= timeout)
            .map(|(reply_id, _)| *reply_id)
            .collect();

        for reply_id in &expired {
            if let Some(pending) = self.pending.remove(reply_id) {
                (pending.continuation)(Err(RpcReplyError::TimedOut));
            }
        }
        expired.len()
    }

    /// Fails every pending call with `Disconnected`
    pub fn fail_all(&mut self) {
        for (_, pending) in self.pending.drain() {
            (pending.continuation)(Err(RpcReplyError::Disconnected));
        }
    }
}
