//! Worker-resident catalog cache with coalesced first fetches.
//!
//! Contract:
//! - cached catalogs are immutable snapshots shared by reference;
//! - concurrent cold fetches for one shuffle collapse into a single RPC,
//!   with late arrivals blocking on the `fetching` monitor;
//! - observing a newer epoch flushes every cached catalog;
//! - a conversion failure poisons the whole cache before propagating, so
//!   the retried task starts from a clean slate.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};

use fsh_common::{BlockManagerId, FshError, Result, ShuffleBlockId};
use tracing::{debug, info, warn};

use crate::broadcast::BroadcastManager;
use crate::codec;
use crate::rpc::{TrackerEndpointRef, TrackerMessage, TrackerReply};
use crate::status::MapStatus;

/// Worker-side view of the map-output catalogs.
pub struct TrackerClient {
    tracker: Arc<dyn TrackerEndpointRef>,
    broadcasts: Arc<dyn BroadcastManager>,
    map_statuses: RwLock<HashMap<i32, Arc<Vec<Option<MapStatus>>>>>,
    fetching: Mutex<HashSet<i32>>,
    fetching_cv: Condvar,
    epoch: Mutex<u64>,
}

impl TrackerClient {
    /// Build a client talking to `tracker` and resolving broadcast replies
    /// through `broadcasts`.
    pub fn new(
        tracker: Arc<dyn TrackerEndpointRef>,
        broadcasts: Arc<dyn BroadcastManager>,
    ) -> Self {
        Self {
            tracker,
            broadcasts,
            map_statuses: RwLock::new(HashMap::new()),
            fetching: Mutex::new(HashSet::new()),
            fetching_cv: Condvar::new(),
            epoch: Mutex::new(0),
        }
    }

    /// Fetch-plan view for reduce partitions `[start_partition,
    /// end_partition)`: per block-store location, the blocks to pull and
    /// their size estimates, grouped in first-seen map order.
    pub fn get_map_sizes_by_executor_id(
        &self,
        shuffle_id: i32,
        start_partition: i32,
        end_partition: i32,
    ) -> Result<Vec<(BlockManagerId, Vec<(ShuffleBlockId, u64)>)>> {
        debug!(
            shuffle_id,
            start_partition, end_partition, "planning shuffle block fetches"
        );
        let statuses = self.get_statuses(shuffle_id)?;
        match convert_map_statuses(shuffle_id, start_partition, end_partition, &statuses) {
            Ok(sizes) => Ok(sizes),
            Err(err) => {
                // A missing slot means the cached view is stale; drop all of
                // it so the retry re-fetches from the authority.
                warn!(shuffle_id, error = %err, "map statuses unusable, clearing cache");
                self.map_statuses
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clear();
                Err(err)
            }
        }
    }

    fn cached(&self, shuffle_id: i32) -> Option<Arc<Vec<Option<MapStatus>>>> {
        self.map_statuses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&shuffle_id)
            .cloned()
    }

    /// Catalog snapshot for `shuffle_id`, fetching it from the authority at
    /// most once per cold shuffle regardless of concurrent caller count.
    pub fn get_statuses(&self, shuffle_id: i32) -> Result<Arc<Vec<Option<MapStatus>>>> {
        if let Some(statuses) = self.cached(shuffle_id) {
            return Ok(statuses);
        }
        info!(shuffle_id, "no cached map outputs, fetching from authority");

        let mut fetching = self.fetching.lock().unwrap_or_else(PoisonError::into_inner);
        while fetching.contains(&shuffle_id) {
            fetching = self
                .fetching_cv
                .wait(fetching)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if let Some(statuses) = self.cached(shuffle_id) {
            // Another caller finished the fetch while this one waited.
            return Ok(statuses);
        }
        fetching.insert(shuffle_id);
        drop(fetching);

        let fetched = self.fetch_remote(shuffle_id);

        // Cache placement, election cleanup, and waiter wakeup stay together
        // even when the fetch failed.
        let mut fetching = self.fetching.lock().unwrap_or_else(PoisonError::into_inner);
        if let Ok(statuses) = &fetched {
            self.map_statuses
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(shuffle_id, Arc::clone(statuses));
        }
        fetching.remove(&shuffle_id);
        self.fetching_cv.notify_all();
        drop(fetching);

        fetched
    }

    fn fetch_remote(&self, shuffle_id: i32) -> Result<Arc<Vec<Option<MapStatus>>>> {
        let reply = self
            .tracker
            .ask(TrackerMessage::GetMapOutputStatuses { shuffle_id })?;
        let bytes = match reply {
            TrackerReply::MapOutputStatuses(bytes) => bytes,
            other => {
                return Err(FshError::Rpc(format!(
                    "unexpected reply to catalog fetch: {other:?}"
                )))
            }
        };
        let statuses = codec::deserialize_map_statuses(&bytes, &self.broadcasts)?;
        debug!(
            shuffle_id,
            entries = statuses.len(),
            "decoded map output statuses"
        );
        Ok(Arc::new(statuses))
    }

    /// Adopt a newer epoch observed on task dispatch, flushing every cached
    /// catalog when it advanced. Epochs only move forward.
    pub fn update_epoch(&self, new_epoch: u64) {
        let mut epoch = self.epoch.lock().unwrap_or_else(PoisonError::into_inner);
        if new_epoch > *epoch {
            info!(
                old_epoch = *epoch,
                new_epoch, "observed newer tracker epoch, clearing cached catalogs"
            );
            *epoch = new_epoch;
            self.map_statuses
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }
    }

    /// Epoch this worker last observed; piggybacked on task launches.
    pub fn get_epoch(&self) -> u64 {
        *self.epoch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the cached catalog for one shuffle.
    pub fn unregister_shuffle(&self, shuffle_id: i32) {
        self.map_statuses
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&shuffle_id);
    }
}

/// Turn a catalog snapshot into a per-location fetch plan for reduce
/// partitions `[start_partition, end_partition)`.
///
/// Any empty slot fails the whole conversion: a reducer cannot run with a
/// partial input set.
pub fn convert_map_statuses(
    shuffle_id: i32,
    start_partition: i32,
    end_partition: i32,
    statuses: &[Option<MapStatus>],
) -> Result<Vec<(BlockManagerId, Vec<(ShuffleBlockId, u64)>)>> {
    let mut order: Vec<BlockManagerId> = Vec::new();
    let mut blocks: HashMap<BlockManagerId, Vec<(ShuffleBlockId, u64)>> = HashMap::new();
    for (map_id, slot) in statuses.iter().enumerate() {
        let Some(status) = slot else {
            return Err(FshError::MetadataFetchFailed {
                shuffle_id,
                partition_id: start_partition,
            });
        };
        for partition in start_partition..end_partition {
            let location = status.location();
            let entry = blocks.entry(location.clone()).or_insert_with(|| {
                order.push(location.clone());
                Vec::new()
            });
            entry.push((
                ShuffleBlockId::new(shuffle_id, map_id as i32, partition),
                status.size_for_partition(partition as usize),
            ));
        }
    }
    Ok(order
        .into_iter()
        .map(|location| {
            let entries = blocks.remove(&location).unwrap_or_default();
            (location, entries)
        })
        .collect())
}
