//! Tracker RPC contract and the in-process transport adapter.
//!
//! The transport itself is an external collaborator: this module names the
//! messages the authority endpoint understands, the consume-once reply
//! channel handed to the dispatcher, and the ask-style reference workers use
//! to reach the endpoint. [`InProcessTrackerRef`] is the local-mode/test
//! adapter, pairing the two over an mpsc channel.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use fsh_common::{FshError, Result};

use crate::authority::TrackerAuthority;

/// Well-known name the authority endpoint registers under.
pub const TRACKER_ENDPOINT_NAME: &str = "MapOutputTracker";

/// Messages understood by the authority endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerMessage {
    /// Request the framed catalog for one shuffle.
    GetMapOutputStatuses {
        /// Shuffle whose catalog is requested.
        shuffle_id: i32,
    },
    /// Ask the authority to shut down its dispatcher pool.
    StopMapOutputTracker,
}

/// Replies produced by the authority endpoint.
#[derive(Debug)]
pub enum TrackerReply {
    /// Framed catalog bytes for a fetch request.
    MapOutputStatuses(Vec<u8>),
    /// Acknowledgement of a stop request.
    Stopped(bool),
}

/// One-shot reply channel enqueued with each pending fetch request and
/// consumed by whichever dispatcher thread serves it.
pub trait ReplyContext: Send {
    /// Deliver a successful reply.
    fn send_bytes(self: Box<Self>, bytes: Vec<u8>);
    /// Deliver a failure reply.
    fn send_failure(self: Box<Self>, err: FshError);
}

/// Ask-style reference to the authority endpoint, as seen from a worker.
pub trait TrackerEndpointRef: Send + Sync {
    /// Send `message` and block for the reply, subject to the transport's
    /// ask timeout.
    fn ask(&self, message: TrackerMessage) -> Result<TrackerReply>;
}

/// Reply context backed by a std mpsc sender.
pub struct ChannelReplyContext {
    tx: mpsc::Sender<Result<Vec<u8>>>,
}

impl ChannelReplyContext {
    /// Build a context/receiver pair for one ask.
    pub fn pair() -> (Self, mpsc::Receiver<Result<Vec<u8>>>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }
}

impl ReplyContext for ChannelReplyContext {
    fn send_bytes(self: Box<Self>, bytes: Vec<u8>) {
        let _ = self.tx.send(Ok(bytes));
    }

    fn send_failure(self: Box<Self>, err: FshError) {
        let _ = self.tx.send(Err(err));
    }
}

/// In-process endpoint reference wired straight into an authority's request
/// queue. Used in local mode and tests, where driver and worker share a
/// process.
pub struct InProcessTrackerRef {
    authority: Arc<TrackerAuthority>,
    ask_timeout: Duration,
}

impl InProcessTrackerRef {
    /// Reference `authority` with the given ask timeout.
    pub fn new(authority: Arc<TrackerAuthority>, ask_timeout: Duration) -> Self {
        Self {
            authority,
            ask_timeout,
        }
    }
}

impl TrackerEndpointRef for InProcessTrackerRef {
    fn ask(&self, message: TrackerMessage) -> Result<TrackerReply> {
        match message {
            TrackerMessage::GetMapOutputStatuses { shuffle_id } => {
                let (context, rx) = ChannelReplyContext::pair();
                self.authority
                    .post_fetch_request(shuffle_id, Box::new(context))?;
                match rx.recv_timeout(self.ask_timeout) {
                    Ok(Ok(bytes)) => Ok(TrackerReply::MapOutputStatuses(bytes)),
                    Ok(Err(err)) => Err(err),
                    Err(_) => Err(FshError::Rpc(format!(
                        "catalog fetch for shuffle {shuffle_id} timed out after {:?}",
                        self.ask_timeout
                    ))),
                }
            }
            TrackerMessage::StopMapOutputTracker => {
                self.authority.stop();
                Ok(TrackerReply::Stopped(true))
            }
        }
    }
}
