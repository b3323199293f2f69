use thiserror::Error;

/// Canonical FlowShuffle error taxonomy used across crates.
///
/// Classification guidance:
/// - [`FshError::UnknownShuffle`] / [`FshError::AlreadyRegistered`]: catalog
///   directory contract violations; fatal to the caller, not to the authority
/// - [`FshError::OutOfOrderChunk`] / [`FshError::PastEndChunk`] /
///   [`FshError::UnknownStream`] / [`FshError::Unauthorized`]: chunk-server
///   contract violations; surfaced to the transport, which closes the
///   offending connection
/// - [`FshError::MetadataFetchFailed`]: worker could not obtain a coherent
///   catalog; poisons the worker cache and propagates so the scheduler can
///   retry the task
/// - [`FshError::InvalidConfig`]: construction-time configuration violations
/// - [`FshError::Protocol`]: malformed wire framing
/// - [`FshError::Rpc`]: transport ask failures and timeouts
/// - [`FshError::Io`]: raw IO failures from std APIs
#[derive(Debug, Error)]
pub enum FshError {
    /// Operation targets a shuffle id that is not registered.
    #[error("shuffle {0} is not registered")]
    UnknownShuffle(i32),

    /// Duplicate `register_shuffle` for an id that is already present.
    #[error("shuffle {0} is already registered")]
    AlreadyRegistered(i32),

    /// Chunk requested out of the strict in-order sequence.
    #[error("received out-of-order chunk index {chunk_index} (expected {expected})")]
    OutOfOrderChunk {
        /// Index the consumer asked for.
        chunk_index: u64,
        /// Index the stream expected next.
        expected: u64,
    },

    /// Chunk requested after the stream's buffer sequence was drained.
    #[error("requested chunk index {chunk_index} beyond end of stream {stream_id}")]
    PastEndChunk {
        /// Stream the request targeted.
        stream_id: u64,
        /// Index the consumer asked for.
        chunk_index: u64,
    },

    /// Stream id is not present in the chunk-server registry.
    #[error("stream {0} is not registered")]
    UnknownStream(u64),

    /// Stream access with a mismatched client identity.
    #[error("client {client_id} is not authorized to read stream {stream_id}")]
    Unauthorized {
        /// Identity presented by the client.
        client_id: String,
        /// Stream the client tried to read.
        stream_id: u64,
    },

    /// Worker could not obtain a usable map-output location.
    ///
    /// `partition_id` is the first reduce partition of the failed request,
    /// or `-1` when the whole catalog fetch came back empty.
    #[error("missing map output location for shuffle {shuffle_id} partition {partition_id}")]
    MetadataFetchFailed {
        /// Shuffle whose catalog was requested.
        shuffle_id: i32,
        /// First reduce partition of the failed request.
        partition_id: i32,
    },

    /// Invalid or inconsistent configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unknown framing tag or malformed payload on deserialize.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Transport ask failure or timeout.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// Transparent std IO failures.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Standard FlowShuffle result alias.
pub type Result<T> = std::result::Result<T, FshError>;
