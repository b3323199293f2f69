//! Per-map sizing records and the per-stage map-output catalog.
//!
//! Contract:
//! - one [`ShuffleStatus`] per registered shuffle, owned by the authority;
//! - all catalog accesses serialize on the instance's internal lock;
//! - any slot mutation clears the cached serialized form and destroys any
//!   pinned broadcast artifact.

use std::sync::{Arc, Mutex, PoisonError};

use fsh_common::{global_metrics, BlockManagerId, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::broadcast::{Broadcast, BroadcastManager};
use crate::codec;

/// Reduce fan-out at which registration switches to the summarized variant.
pub const SUMMARY_STATUS_MIN_PARTITIONS: usize = 2000;

const SIZE_LOG_BASE: f64 = 1.1;

/// Bucket a size into a single log-scale byte.
///
/// Sizes up to ~33 GB are representable with at most ~10% error; 0 maps to
/// 0 so emptiness survives the encoding.
pub fn compress_size(size: u64) -> u8 {
    if size == 0 {
        0
    } else if size <= 1 {
        1
    } else {
        let bucket = ((size as f64).ln() / SIZE_LOG_BASE.ln()).ceil();
        bucket.min(255.0) as u8
    }
}

/// Recover the approximate size for a log-scale bucket.
pub fn decompress_size(compressed: u8) -> u64 {
    if compressed == 0 {
        0
    } else {
        SIZE_LOG_BASE.powi(compressed as i32) as u64
    }
}

/// Output record for one completed map task: where its bytes live and how
/// large each reduce partition within them is.
///
/// The variant is fixed at registration time and preserved end-to-end by the
/// catalog codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MapStatus {
    /// Exact per-reduce-partition sizes, for narrow fan-out.
    Dense {
        /// Block store holding the map output.
        location: BlockManagerId,
        /// Bytes per reduce partition, indexed by reduce partition id.
        sizes: Vec<u64>,
    },
    /// Empty-partition set plus a log-bucketed average size of the non-empty
    /// ones, for wide fan-out where per-partition exactness is not worth the
    /// catalog bytes.
    Summarized {
        /// Block store holding the map output.
        location: BlockManagerId,
        /// Total reduce partition count.
        num_partitions: u32,
        /// Sorted ids of reduce partitions with no bytes.
        empty_partitions: Vec<u32>,
        /// Log-bucketed average size of the non-empty partitions.
        avg_size_log: u8,
    },
}

impl MapStatus {
    /// Build a status from raw per-partition sizes, choosing the variant by
    /// fan-out width.
    pub fn new(location: BlockManagerId, sizes: &[u64]) -> Self {
        if sizes.len() >= SUMMARY_STATUS_MIN_PARTITIONS {
            Self::summarized(location, sizes)
        } else {
            Self::Dense {
                location,
                sizes: sizes.to_vec(),
            }
        }
    }

    /// Build the summarized variant regardless of fan-out width.
    pub fn summarized(location: BlockManagerId, sizes: &[u64]) -> Self {
        let mut empty_partitions = Vec::new();
        let mut total: u64 = 0;
        let mut non_empty: u64 = 0;
        for (partition, &size) in sizes.iter().enumerate() {
            if size == 0 {
                empty_partitions.push(partition as u32);
            } else {
                total = total.saturating_add(size);
                non_empty += 1;
            }
        }
        let avg = if non_empty > 0 { total / non_empty } else { 0 };
        Self::Summarized {
            location,
            num_partitions: sizes.len() as u32,
            empty_partitions,
            avg_size_log: compress_size(avg),
        }
    }

    /// Block store holding this map output.
    pub fn location(&self) -> &BlockManagerId {
        match self {
            Self::Dense { location, .. } => location,
            Self::Summarized { location, .. } => location,
        }
    }

    /// Size estimate for one reduce partition of this map output.
    pub fn size_for_partition(&self, partition: usize) -> u64 {
        match self {
            Self::Dense { sizes, .. } => sizes.get(partition).copied().unwrap_or(0),
            Self::Summarized {
                empty_partitions,
                avg_size_log,
                ..
            } => {
                if empty_partitions.binary_search(&(partition as u32)).is_ok() {
                    0
                } else {
                    decompress_size(*avg_size_log)
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct ShuffleStatusInner {
    map_statuses: Vec<Option<MapStatus>>,
    num_available_outputs: usize,
    cached_serialized: Option<Vec<u8>>,
    cached_broadcast: Option<Broadcast>,
}

/// Per-stage catalog of map outputs with a cached serialized form.
#[derive(Debug)]
pub struct ShuffleStatus {
    shuffle_id: i32,
    num_maps: usize,
    inner: Mutex<ShuffleStatusInner>,
}

impl ShuffleStatus {
    /// Create an empty catalog with `num_maps` slots.
    pub fn new(shuffle_id: i32, num_maps: usize) -> Self {
        Self {
            shuffle_id,
            num_maps,
            inner: Mutex::new(ShuffleStatusInner {
                map_statuses: vec![None; num_maps],
                num_available_outputs: 0,
                cached_serialized: None,
                cached_broadcast: None,
            }),
        }
    }

    /// Shuffle this catalog belongs to.
    pub fn shuffle_id(&self) -> i32 {
        self.shuffle_id
    }

    /// Fixed map-partition count of the upstream stage.
    pub fn num_maps(&self) -> usize {
        self.num_maps
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ShuffleStatusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register the output of one map task, replacing any previous
    /// registration for the same slot. The latest registration wins.
    pub fn add_map_output(&self, map_id: usize, status: MapStatus) {
        let mut inner = self.lock();
        if inner.map_statuses[map_id].is_none() {
            inner.num_available_outputs += 1;
        }
        inner.map_statuses[map_id] = Some(status);
        Self::invalidate_cache(self.shuffle_id, &mut inner);
    }

    /// Forget one map output, but only if the slot still points at
    /// `bm_address`. A stale removal must not clobber a re-registration at a
    /// different location.
    pub fn remove_map_output(&self, map_id: usize, bm_address: &BlockManagerId) {
        let mut inner = self.lock();
        let matches = inner.map_statuses[map_id]
            .as_ref()
            .is_some_and(|s| s.location() == bm_address);
        if matches {
            inner.map_statuses[map_id] = None;
            inner.num_available_outputs -= 1;
            Self::invalidate_cache(self.shuffle_id, &mut inner);
        }
    }

    /// Clear every slot whose location satisfies `pred`.
    pub fn remove_outputs_by_filter(&self, pred: impl Fn(&BlockManagerId) -> bool) {
        let mut inner = self.lock();
        let mut removed = 0usize;
        for slot in inner.map_statuses.iter_mut() {
            if slot.as_ref().is_some_and(|s| pred(s.location())) {
                *slot = None;
                removed += 1;
            }
        }
        if removed > 0 {
            inner.num_available_outputs -= removed;
            Self::invalidate_cache(self.shuffle_id, &mut inner);
        }
    }

    /// Clear every slot whose output lives on `host`.
    pub fn remove_outputs_on_host(&self, host: &str) {
        self.remove_outputs_by_filter(|loc| loc.host == host);
    }

    /// Clear every slot whose output was produced by executor `exec_id`.
    pub fn remove_outputs_on_executor(&self, exec_id: &str) {
        self.remove_outputs_by_filter(|loc| loc.executor_id == exec_id);
    }

    /// Number of slots currently holding an output.
    pub fn num_available_outputs(&self) -> usize {
        self.lock().num_available_outputs
    }

    /// Map partition ids with no registered output.
    pub fn find_missing_partitions(&self) -> Vec<i32> {
        let inner = self.lock();
        let missing: Vec<i32> = inner
            .map_statuses
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(id, _)| id as i32)
            .collect();
        debug_assert_eq!(
            missing.len(),
            self.num_maps - inner.num_available_outputs,
            "missing count diverged from available-output counter"
        );
        missing
    }

    /// Serialized catalog, computing and caching it on first demand.
    ///
    /// The instance lock is held across the encode, so concurrent callers
    /// serialize at most once and contenders block until the cache is
    /// filled. May pin a broadcast artifact when the direct form exceeds
    /// `min_broadcast_size`.
    pub fn serialized_map_status(
        &self,
        broadcasts: &Arc<dyn BroadcastManager>,
        is_local: bool,
        min_broadcast_size: usize,
    ) -> Result<Vec<u8>> {
        let mut inner = self.lock();
        if let Some(bytes) = &inner.cached_serialized {
            return Ok(bytes.clone());
        }
        let (bytes, broadcast) =
            codec::serialize_map_statuses(&inner.map_statuses, broadcasts, is_local, min_broadcast_size)?;
        let delivery = if broadcast.is_some() {
            "broadcast"
        } else {
            "direct"
        };
        debug!(
            shuffle_id = self.shuffle_id,
            bytes = bytes.len(),
            delivery,
            "serialized map output statuses"
        );
        global_metrics().inc_catalog_serialized(delivery);
        inner.cached_serialized = Some(bytes.clone());
        inner.cached_broadcast = broadcast;
        Ok(bytes)
    }

    /// Run `f` against the slot array under the instance lock. `f` must not
    /// mutate.
    pub fn with_map_statuses<T>(&self, f: impl FnOnce(&[Option<MapStatus>]) -> T) -> T {
        let inner = self.lock();
        f(&inner.map_statuses)
    }

    /// Drop the cached serialized form and destroy any pinned broadcast.
    pub fn invalidate_serialized_map_output_status_cache(&self) {
        let mut inner = self.lock();
        Self::invalidate_cache(self.shuffle_id, &mut inner);
    }

    // Broadcast destruction is best-effort: it RPCs to workers that may be
    // gone, and a failure there must not abort the mutating path.
    fn invalidate_cache(shuffle_id: i32, inner: &mut ShuffleStatusInner) {
        inner.cached_serialized = None;
        if let Some(broadcast) = inner.cached_broadcast.take() {
            if let Err(err) = broadcast.destroy(false) {
                warn!(
                    shuffle_id,
                    broadcast_id = broadcast.id(),
                    error = %err,
                    "failed to destroy cached catalog broadcast"
                );
            }
        }
    }
}
