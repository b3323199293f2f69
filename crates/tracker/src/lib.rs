//! Map-output tracking: the authoritative registry of where every map
//! output lives and how large each reduce partition within it is.
//!
//! Architecture role:
//! - driver side: [`TrackerAuthority`] owns every per-stage catalog, serves
//!   bulk metadata fetches through a dispatcher pool, and maintains the
//!   topology epoch;
//! - worker side: [`TrackerClient`] caches immutable catalog snapshots,
//!   coalesces concurrent first fetches, and honors epoch invalidation;
//! - between them: a tag-framed GZIP wire form with direct or broadcast
//!   delivery chosen by reply size.
//!
//! Key modules:
//! - [`status`]
//! - [`codec`]
//! - [`authority`]
//! - [`client`]
//! - [`broadcast`]
//! - [`rpc`]

pub mod authority;
pub mod broadcast;
pub mod client;
pub mod codec;
pub mod rpc;
pub mod status;

pub use authority::{
    MapOutputStatistics, ShuffleDependency, TrackerAuthority, REDUCER_PREF_LOCS_FRACTION,
    SHUFFLE_PREF_MAP_THRESHOLD, SHUFFLE_PREF_REDUCE_THRESHOLD,
};
pub use broadcast::{Broadcast, BroadcastManager, InMemoryBroadcastManager};
pub use client::{convert_map_statuses, TrackerClient};
pub use rpc::{
    InProcessTrackerRef, ReplyContext, TrackerEndpointRef, TrackerMessage, TrackerReply,
    TRACKER_ENDPOINT_NAME,
};
pub use status::{MapStatus, ShuffleStatus, SUMMARY_STATUS_MIN_PARTITIONS};
