//! One-shot streaming chunk server.
//!
//! Each registered stream is a lazy sequence of buffers served strictly in
//! index order to a single associated connection. Streams deregister
//! themselves on drain; a lost connection releases every undrained buffer
//! of its streams.

use std::collections::HashMap;
use std::iter::Peekable;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use fsh_common::{global_metrics, FshError, Result};
use rand::Rng;
use tracing::{debug, info, trace};

use crate::buffer::ManagedBuffer;

/// Transport connection identity as seen by the chunk server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

/// Identity the transport attaches to a consuming client.
#[derive(Debug, Clone, Default)]
pub struct TransportClient {
    /// Authenticated application id, when the transport performed auth.
    pub client_id: Option<String>,
}

type BufferIter = Peekable<Box<dyn Iterator<Item = Box<dyn ManagedBuffer>> + Send>>;

struct StreamState {
    app_id: Option<String>,
    buffers: BufferIter,
    associated_connection: Option<ConnectionId>,
    // Next index the single consumer is allowed to request. The at-most-one
    // consumer contract makes this a per-stream cursor, not a shared one.
    cur_chunk: u64,
    // Updated from transport send callbacks, which may race the consumer.
    chunks_in_flight: u64,
}

/// Registry of active chunk streams.
pub struct StreamChunkServer {
    next_stream_id: AtomicU64,
    streams: Mutex<HashMap<u64, StreamState>>,
}

impl StreamChunkServer {
    /// Create a server with a randomized stream-id space.
    ///
    /// Ids start at a random 32-bit seed times 1000 so distinct process runs
    /// are visually separable in logs; uniqueness only matters within one
    /// server instance.
    pub fn new() -> Self {
        let seed = rand::thread_rng().gen_range(0..i32::MAX as u64) * 1000;
        Self {
            next_stream_id: AtomicU64::new(seed),
            streams: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, StreamState>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a lazy buffer sequence to be served as individual chunks.
    ///
    /// Buffers are released by the transport after each send; if the
    /// consuming connection dies before the sequence is drained, the
    /// remainder is released by [`Self::connection_terminated`]. When
    /// `app_id` is given, only clients authenticated as that app may read
    /// the stream.
    pub fn register_stream(
        &self,
        app_id: Option<String>,
        buffers: Box<dyn Iterator<Item = Box<dyn ManagedBuffer>> + Send>,
    ) -> u64 {
        let stream_id = self.next_stream_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(
            stream_id,
            StreamState {
                app_id,
                buffers: buffers.peekable(),
                associated_connection: None,
                cur_chunk: 0,
                chunks_in_flight: 0,
            },
        );
        global_metrics().add_active_streams(1.0);
        debug!(stream_id, "registered chunk stream");
        stream_id
    }

    /// Associate the stream with its consuming connection. At most one
    /// connection per stream; the associated connection is the sole allowed
    /// consumer.
    pub fn register_channel(&self, connection: ConnectionId, stream_id: u64) {
        if let Some(state) = self.lock().get_mut(&stream_id) {
            state.associated_connection = Some(connection);
        }
    }

    /// Produce the next chunk of `stream_id`.
    ///
    /// `chunk_index` must equal the stream's next expected index; the stream
    /// deregisters itself once its sequence is drained (the returned buffer
    /// stays valid, the transport releases it after the send).
    pub fn get_chunk(&self, stream_id: u64, chunk_index: u64) -> Result<Box<dyn ManagedBuffer>> {
        let mut streams = self.lock();
        let state = streams
            .get_mut(&stream_id)
            .ok_or(FshError::UnknownStream(stream_id))?;
        if chunk_index != state.cur_chunk {
            return Err(FshError::OutOfOrderChunk {
                chunk_index,
                expected: state.cur_chunk,
            });
        }
        if state.buffers.peek().is_none() {
            return Err(FshError::PastEndChunk {
                stream_id,
                chunk_index,
            });
        }
        state.cur_chunk += 1;
        let chunk = match state.buffers.next() {
            Some(chunk) => chunk,
            None => {
                return Err(FshError::PastEndChunk {
                    stream_id,
                    chunk_index,
                })
            }
        };
        if state.buffers.peek().is_none() {
            trace!(stream_id, "stream drained, removing from registry");
            streams.remove(&stream_id);
            global_metrics().add_active_streams(-1.0);
        }
        Ok(chunk)
    }

    /// Resolve a `<streamId>_<chunkIndex>` key and produce that chunk.
    pub fn open_stream(&self, stream_chunk_id: &str) -> Result<Box<dyn ManagedBuffer>> {
        let (stream_id, chunk_index) = parse_stream_chunk_id(stream_chunk_id)?;
        self.get_chunk(stream_id, chunk_index)
    }

    /// Verify `client` may read `stream_id`. Clients without an identity
    /// pass; identified clients must match the stream's app id.
    pub fn check_authorization(&self, client: &TransportClient, stream_id: u64) -> Result<()> {
        let Some(client_id) = &client.client_id else {
            return Ok(());
        };
        let streams = self.lock();
        let state = streams
            .get(&stream_id)
            .ok_or(FshError::UnknownStream(stream_id))?;
        if state.app_id.as_deref() != Some(client_id.as_str()) {
            return Err(FshError::Unauthorized {
                client_id: client_id.clone(),
                stream_id,
            });
        }
        Ok(())
    }

    /// Note a chunk handed to the transport. Unknown streams are a no-op:
    /// the stream may already have drained.
    pub fn chunk_being_sent(&self, stream_id: u64) {
        if let Some(state) = self.lock().get_mut(&stream_id) {
            state.chunks_in_flight += 1;
            global_metrics().add_chunks_in_flight(1.0);
        }
    }

    /// Note a chunk the transport finished sending. Unknown streams are a
    /// no-op.
    pub fn chunk_sent(&self, stream_id: u64) {
        if let Some(state) = self.lock().get_mut(&stream_id) {
            state.chunks_in_flight = state.chunks_in_flight.saturating_sub(1);
            global_metrics().add_chunks_in_flight(-1.0);
        }
    }

    /// String-keyed variant of [`Self::chunk_being_sent`].
    pub fn stream_being_sent(&self, stream_chunk_id: &str) -> Result<()> {
        let (stream_id, _) = parse_stream_chunk_id(stream_chunk_id)?;
        self.chunk_being_sent(stream_id);
        Ok(())
    }

    /// String-keyed variant of [`Self::chunk_sent`].
    pub fn stream_sent(&self, stream_chunk_id: &str) -> Result<()> {
        let (stream_id, _) = parse_stream_chunk_id(stream_chunk_id)?;
        self.chunk_sent(stream_id);
        Ok(())
    }

    /// Chunks currently handed to the transport across all active streams.
    pub fn chunks_being_transferred(&self) -> u64 {
        self.lock().values().map(|s| s.chunks_in_flight).sum()
    }

    /// Deregister every stream associated with `connection` and release all
    /// of their undrained buffers.
    pub fn connection_terminated(&self, connection: ConnectionId) {
        let mut streams = self.lock();
        let dead: Vec<u64> = streams
            .iter()
            .filter(|(_, state)| state.associated_connection == Some(connection))
            .map(|(&stream_id, _)| stream_id)
            .collect();
        let mut released = 0u64;
        for stream_id in dead {
            if let Some(state) = streams.remove(&stream_id) {
                global_metrics().add_active_streams(-1.0);
                for buffer in state.buffers {
                    buffer.release();
                    released += 1;
                }
                info!(
                    stream_id,
                    connection = connection.0,
                    released,
                    "released stream after connection loss"
                );
            }
        }
        if released > 0 {
            global_metrics().inc_buffers_released(released);
        }
    }

    /// Number of streams currently registered.
    pub fn active_stream_count(&self) -> usize {
        self.lock().len()
    }
}

impl Default for StreamChunkServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the `<streamId>_<chunkIndex>` textual key.
pub fn gen_stream_chunk_id(stream_id: u64, chunk_index: u64) -> String {
    format!("{stream_id}_{chunk_index}")
}

/// Parse a `<streamId>_<chunkIndex>` textual key.
pub fn parse_stream_chunk_id(stream_chunk_id: &str) -> Result<(u64, u64)> {
    let mut parts = stream_chunk_id.splitn(2, '_');
    let stream = parts.next().and_then(|p| p.parse::<u64>().ok());
    let chunk = parts.next().and_then(|p| p.parse::<u64>().ok());
    match (stream, chunk) {
        (Some(stream_id), Some(chunk_index)) => Ok((stream_id, chunk_index)),
        _ => Err(FshError::Protocol(format!(
            "malformed stream chunk id {stream_chunk_id:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    /// Buffer double that counts releases through a shared ledger.
    #[derive(Debug)]
    struct TrackedBuffer {
        label: &'static str,
        releases: Arc<AtomicUsize>,
    }

    impl ManagedBuffer for TrackedBuffer {
        fn size(&self) -> u64 {
            self.label.len() as u64
        }

        fn release(self: Box<Self>) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn tracked_stream(
        labels: &[&'static str],
    ) -> (
        Box<dyn Iterator<Item = Box<dyn ManagedBuffer>> + Send>,
        Arc<AtomicUsize>,
    ) {
        let releases = Arc::new(AtomicUsize::new(0));
        let buffers: Vec<Box<dyn ManagedBuffer>> = labels
            .iter()
            .map(|&label| {
                Box::new(TrackedBuffer {
                    label,
                    releases: Arc::clone(&releases),
                }) as Box<dyn ManagedBuffer>
            })
            .collect();
        (Box::new(buffers.into_iter()), releases)
    }

    #[test]
    fn chunks_are_served_strictly_in_order() {
        let server = StreamChunkServer::new();
        let (buffers, _) = tracked_stream(&["b0", "b1", "b2"]);
        let stream_id = server.register_stream(None, buffers);

        let b0 = server.get_chunk(stream_id, 0).expect("chunk 0");
        assert_eq!(b0.size(), 2);

        let err = server.get_chunk(stream_id, 2).expect_err("skip ahead");
        assert!(matches!(
            err,
            FshError::OutOfOrderChunk {
                chunk_index: 2,
                expected: 1,
            }
        ));

        server.get_chunk(stream_id, 1).expect("chunk 1");
        server.get_chunk(stream_id, 2).expect("chunk 2");
        // Drained stream is gone from the registry.
        assert!(matches!(
            server.get_chunk(stream_id, 3),
            Err(FshError::UnknownStream(_))
        ));
        assert_eq!(server.active_stream_count(), 0);
    }

    #[test]
    fn requesting_past_the_end_fails_before_drain_removal() {
        let server = StreamChunkServer::new();
        let empty: Vec<Box<dyn ManagedBuffer>> = Vec::new();
        let stream_id = server.register_stream(None, Box::new(empty.into_iter()));
        let err = server.get_chunk(stream_id, 0).expect_err("empty stream");
        assert!(matches!(err, FshError::PastEndChunk { chunk_index: 0, .. }));
    }

    #[test]
    fn connection_loss_releases_every_undrained_buffer_once() {
        let server = StreamChunkServer::new();
        let (buffers, releases) = tracked_stream(&["b0", "b1", "b2"]);
        let stream_id = server.register_stream(None, buffers);
        let c1 = ConnectionId(1);
        server.register_channel(c1, stream_id);

        server.get_chunk(stream_id, 0).expect("chunk 0");
        server.get_chunk(stream_id, 1).expect("chunk 1");

        server.connection_terminated(c1);
        assert_eq!(releases.load(Ordering::SeqCst), 1, "only b2 was undrained");
        assert_eq!(server.active_stream_count(), 0);

        // Terminating again is a no-op.
        server.connection_terminated(c1);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn connection_loss_only_touches_its_own_streams() {
        let server = StreamChunkServer::new();
        let (buffers_a, releases_a) = tracked_stream(&["a0"]);
        let (buffers_b, releases_b) = tracked_stream(&["b0"]);
        let stream_a = server.register_stream(None, buffers_a);
        let stream_b = server.register_stream(None, buffers_b);
        server.register_channel(ConnectionId(1), stream_a);
        server.register_channel(ConnectionId(2), stream_b);

        server.connection_terminated(ConnectionId(1));
        assert_eq!(releases_a.load(Ordering::SeqCst), 1);
        assert_eq!(releases_b.load(Ordering::SeqCst), 0);
        server.get_chunk(stream_b, 0).expect("stream b still serves");
    }

    #[test]
    fn authorization_matches_client_identity_against_app_id() {
        let server = StreamChunkServer::new();
        let (buffers, _) = tracked_stream(&["b0"]);
        let stream_id = server.register_stream(Some("app-1".to_string()), buffers);

        let anonymous = TransportClient::default();
        server
            .check_authorization(&anonymous, stream_id)
            .expect("anonymous clients pass");

        let owner = TransportClient {
            client_id: Some("app-1".to_string()),
        };
        server
            .check_authorization(&owner, stream_id)
            .expect("matching identity");

        let intruder = TransportClient {
            client_id: Some("app-2".to_string()),
        };
        assert!(matches!(
            server.check_authorization(&intruder, stream_id),
            Err(FshError::Unauthorized { .. })
        ));
        assert!(matches!(
            server.check_authorization(&owner, stream_id + 999),
            Err(FshError::UnknownStream(_))
        ));
    }

    #[test]
    fn in_flight_accounting_tolerates_unknown_streams() {
        let server = StreamChunkServer::new();
        let (buffers_a, _) = tracked_stream(&["a0", "a1"]);
        let (buffers_b, _) = tracked_stream(&["b0"]);
        let stream_a = server.register_stream(None, buffers_a);
        let stream_b = server.register_stream(None, buffers_b);

        server.chunk_being_sent(stream_a);
        server.chunk_being_sent(stream_a);
        server.chunk_being_sent(stream_b);
        assert_eq!(server.chunks_being_transferred(), 3);

        server.chunk_sent(stream_a);
        assert_eq!(server.chunks_being_transferred(), 2);

        // Unknown stream ids are tolerated in both directions.
        server.chunk_being_sent(stream_b + 999);
        server.chunk_sent(stream_b + 999);
        assert_eq!(server.chunks_being_transferred(), 2);
    }

    #[test]
    fn string_keyed_paths_parse_the_textual_form() {
        let server = StreamChunkServer::new();
        let (buffers, _) = tracked_stream(&["b0", "b1"]);
        let stream_id = server.register_stream(None, buffers);

        let key = gen_stream_chunk_id(stream_id, 0);
        assert_eq!(parse_stream_chunk_id(&key).expect("parse"), (stream_id, 0));

        server.open_stream(&key).expect("open stream");
        server
            .stream_being_sent(&gen_stream_chunk_id(stream_id, 0))
            .expect("being sent");
        assert_eq!(server.chunks_being_transferred(), 1);
        server
            .stream_sent(&gen_stream_chunk_id(stream_id, 0))
            .expect("sent");
        assert_eq!(server.chunks_being_transferred(), 0);

        assert!(matches!(
            parse_stream_chunk_id("not-a-key"),
            Err(FshError::Protocol(_))
        ));
        assert!(matches!(
            parse_stream_chunk_id("12_x"),
            Err(FshError::Protocol(_))
        ));
    }

    #[test]
    fn stream_ids_are_distinct_and_monotonic_within_a_server() {
        let server = StreamChunkServer::new();
        let (buffers_a, _) = tracked_stream(&["a"]);
        let (buffers_b, _) = tracked_stream(&["b"]);
        let first = server.register_stream(None, buffers_a);
        let second = server.register_stream(None, buffers_b);
        assert_eq!(second, first + 1);
    }
}
