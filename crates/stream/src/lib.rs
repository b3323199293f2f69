//! One-shot streaming chunk delivery for shuffle bytes.
//!
//! Architecture role:
//! - lives on whichever node physically hosts the shuffle bytes,
//!   independent of the catalog path;
//! - guarantees in-order, single-consumer chunk delivery over a persistent
//!   connection and reclaims buffers on connection loss.
//!
//! Key modules:
//! - [`buffer`]
//! - [`chunk_server`]

pub mod buffer;
pub mod chunk_server;

pub use buffer::{HeapBuffer, ManagedBuffer};
pub use chunk_server::{
    gen_stream_chunk_id, parse_stream_chunk_id, ConnectionId, StreamChunkServer, TransportClient,
};
