//! Driver-resident authority over every per-stage map-output catalog.
//!
//! Responsibilities:
//! - own the catalog directory and serve bulk metadata fetches through a
//!   fixed dispatcher pool, off the transport's own threads;
//! - maintain the topology epoch workers use to invalidate their caches;
//! - compute locality hints and per-reducer aggregate statistics for the
//!   scheduler.
//!
//! Topology events (`remove_outputs_on_host` / `remove_outputs_on_executor`,
//! single-output unregistration) bump the epoch; plain registration never
//! does.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use fsh_common::{global_metrics, BlockManagerId, FshError, Result, TrackerConfig};
use tracing::{debug, info, warn};

use crate::broadcast::BroadcastManager;
use crate::rpc::{ReplyContext, TRACKER_ENDPOINT_NAME};
use crate::status::{MapStatus, ShuffleStatus};

/// Map-side width above which locality hints are skipped entirely.
pub const SHUFFLE_PREF_MAP_THRESHOLD: usize = 1000;
/// Reduce-side width above which locality hints are skipped entirely.
pub const SHUFFLE_PREF_REDUCE_THRESHOLD: usize = 1000;
/// Fraction of a reducer's input a location must hold to be preferred.
pub const REDUCER_PREF_LOCS_FRACTION: f64 = 0.2;

// Shutdown sentinel understood by every dispatcher thread. Each consumer
// re-offers it before exiting, so one post drains the whole pool without
// knowing its size.
const POISON_PILL_SHUFFLE_ID: i32 = -99;

/// Downstream dependency descriptor used by statistics and locality queries.
#[derive(Debug, Clone, Copy)]
pub struct ShuffleDependency {
    /// Shuffle produced by the upstream map stage.
    pub shuffle_id: i32,
    /// Reduce partition count of the downstream stage.
    pub num_reduce_partitions: usize,
}

/// Total bytes per reduce partition across all maps of one shuffle.
#[derive(Debug, Clone)]
pub struct MapOutputStatistics {
    /// Shuffle the totals describe.
    pub shuffle_id: i32,
    /// Summed output bytes, indexed by reduce partition id.
    pub bytes_by_partition: Vec<u64>,
}

struct PendingRequest {
    shuffle_id: i32,
    context: Option<Box<dyn ReplyContext>>,
}

impl PendingRequest {
    fn poison() -> Self {
        Self {
            shuffle_id: POISON_PILL_SHUFFLE_ID,
            context: None,
        }
    }
}

/// Driver-resident map-output tracking authority.
pub struct TrackerAuthority {
    config: TrackerConfig,
    broadcasts: Arc<dyn BroadcastManager>,
    is_local: bool,
    shuffle_statuses: RwLock<HashMap<i32, Arc<ShuffleStatus>>>,
    epoch: Mutex<u64>,
    request_tx: Sender<PendingRequest>,
    message_loops: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl TrackerAuthority {
    /// Validate `config`, then start the dispatcher pool and return the
    /// shared authority handle.
    pub fn new(
        config: TrackerConfig,
        broadcasts: Arc<dyn BroadcastManager>,
        is_local: bool,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let (request_tx, request_rx) = unbounded();
        let authority = Arc::new(Self {
            config,
            broadcasts,
            is_local,
            shuffle_statuses: RwLock::new(HashMap::new()),
            epoch: Mutex::new(0),
            request_tx,
            message_loops: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        });

        let mut loops = Vec::with_capacity(authority.config.dispatcher_threads);
        for i in 0..authority.config.dispatcher_threads {
            let rx = request_rx.clone();
            let auth = Arc::clone(&authority);
            let handle = thread::Builder::new()
                .name(format!("map-output-dispatcher-{i}"))
                .spawn(move || auth.message_loop(rx))?;
            loops.push(handle);
        }
        *authority
            .message_loops
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = loops;
        info!(
            endpoint = TRACKER_ENDPOINT_NAME,
            dispatcher_threads = authority.config.dispatcher_threads,
            "started map output tracker authority"
        );
        Ok(authority)
    }

    fn message_loop(&self, rx: Receiver<PendingRequest>) {
        loop {
            let request = match rx.recv() {
                Ok(request) => request,
                // Channel closed; nothing more to serve.
                Err(_) => return,
            };
            if request.shuffle_id == POISON_PILL_SHUFFLE_ID {
                let _ = self.request_tx.send(request);
                return;
            }
            self.handle_fetch(request);
        }
    }

    fn handle_fetch(&self, request: PendingRequest) {
        let PendingRequest {
            shuffle_id,
            context,
        } = request;
        let Some(context) = context else {
            return;
        };
        let status = self.lookup(shuffle_id);
        match status {
            Some(status) => {
                let serialized = status.serialized_map_status(
                    &self.broadcasts,
                    self.is_local,
                    self.config.min_broadcast_size_bytes,
                );
                match serialized {
                    Ok(bytes) => {
                        debug!(shuffle_id, bytes = bytes.len(), "serving catalog fetch");
                        global_metrics().inc_fetch_request("served");
                        context.send_bytes(bytes);
                    }
                    Err(err) => {
                        warn!(shuffle_id, error = %err, "failed to serialize catalog for fetch");
                        global_metrics().inc_fetch_request("failed");
                        context.send_failure(err);
                    }
                }
            }
            None => {
                warn!(shuffle_id, "catalog fetch for unknown shuffle");
                global_metrics().inc_fetch_request("unknown");
                context.send_failure(FshError::UnknownShuffle(shuffle_id));
            }
        }
    }

    /// Enqueue a catalog fetch for the dispatcher pool. Called from the
    /// transport's dispatch thread; never serves the request inline.
    pub fn post_fetch_request(
        &self,
        shuffle_id: i32,
        context: Box<dyn ReplyContext>,
    ) -> Result<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(FshError::Rpc("tracker authority is stopped".to_string()));
        }
        self.request_tx
            .send(PendingRequest {
                shuffle_id,
                context: Some(context),
            })
            .map_err(|_| FshError::Rpc("tracker authority is stopped".to_string()))
    }

    fn lookup(&self, shuffle_id: i32) -> Option<Arc<ShuffleStatus>> {
        self.shuffle_statuses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&shuffle_id)
            .cloned()
    }

    fn lookup_or_unknown(&self, shuffle_id: i32) -> Result<Arc<ShuffleStatus>> {
        self.lookup(shuffle_id)
            .ok_or(FshError::UnknownShuffle(shuffle_id))
    }

    /// Create an empty catalog for a new shuffle.
    pub fn register_shuffle(&self, shuffle_id: i32, num_maps: usize) -> Result<()> {
        let mut statuses = self
            .shuffle_statuses
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if statuses.contains_key(&shuffle_id) {
            return Err(FshError::AlreadyRegistered(shuffle_id));
        }
        info!(shuffle_id, num_maps, "registered shuffle");
        statuses.insert(shuffle_id, Arc::new(ShuffleStatus::new(shuffle_id, num_maps)));
        Ok(())
    }

    /// Record the output of one completed map task. Does not touch the
    /// epoch: registrations are not topology events.
    pub fn register_map_output(
        &self,
        shuffle_id: i32,
        map_id: usize,
        status: MapStatus,
    ) -> Result<()> {
        self.lookup_or_unknown(shuffle_id)?
            .add_map_output(map_id, status);
        Ok(())
    }

    /// Forget one map output if it still lives at `bm_address`, then bump
    /// the epoch.
    pub fn unregister_map_output(
        &self,
        shuffle_id: i32,
        map_id: usize,
        bm_address: &BlockManagerId,
    ) -> Result<()> {
        self.lookup_or_unknown(shuffle_id)?
            .remove_map_output(map_id, bm_address);
        self.increment_epoch();
        Ok(())
    }

    /// Drop a whole catalog. The evicted catalog's cache is invalidated so a
    /// pinned broadcast artifact is released with it.
    pub fn unregister_shuffle(&self, shuffle_id: i32) {
        let removed = self
            .shuffle_statuses
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&shuffle_id);
        if let Some(status) = removed {
            status.invalidate_serialized_map_output_status_cache();
            info!(shuffle_id, "unregistered shuffle");
        }
    }

    /// Clear every output on `host` across all catalogs, then bump the
    /// epoch once.
    pub fn remove_outputs_on_host(&self, host: &str) {
        warn!(host, "removing all map outputs on lost host");
        self.remove_outputs_by_filter(|loc| loc.host == host);
    }

    /// Clear every output produced by `exec_id` across all catalogs, then
    /// bump the epoch once.
    pub fn remove_outputs_on_executor(&self, exec_id: &str) {
        warn!(executor_id = exec_id, "removing all map outputs on lost executor");
        self.remove_outputs_by_filter(|loc| loc.executor_id == exec_id);
    }

    fn remove_outputs_by_filter(&self, pred: impl Fn(&BlockManagerId) -> bool) {
        let statuses: Vec<Arc<ShuffleStatus>> = self
            .shuffle_statuses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for status in statuses {
            status.remove_outputs_by_filter(&pred);
        }
        self.increment_epoch();
    }

    /// Whether a catalog exists for `shuffle_id`.
    pub fn contains_shuffle(&self, shuffle_id: i32) -> bool {
        self.lookup(shuffle_id).is_some()
    }

    /// Registered-output count for `shuffle_id`, zero when unknown.
    pub fn get_num_available_outputs(&self, shuffle_id: i32) -> usize {
        self.lookup(shuffle_id)
            .map(|s| s.num_available_outputs())
            .unwrap_or(0)
    }

    /// Map partitions still missing an output, or `None` when the shuffle is
    /// unknown.
    pub fn find_missing_partitions(&self, shuffle_id: i32) -> Option<Vec<i32>> {
        self.lookup(shuffle_id).map(|s| s.find_missing_partitions())
    }

    /// Sum output bytes per reduce partition across every map of `dep`.
    ///
    /// Large `num_maps * num_reducers` products fan the summation out over
    /// contiguous reducer sub-ranges; the workers are joined before this
    /// returns, and the catalog lock is held for the whole aggregation so
    /// the statuses cannot mutate mid-sum.
    pub fn get_statistics(&self, dep: &ShuffleDependency) -> Result<MapOutputStatistics> {
        let status = self.lookup_or_unknown(dep.shuffle_id)?;
        let num_reducers = dep.num_reduce_partitions;
        let stats = status.with_map_statuses(|statuses| {
            let mut bytes_by_partition = vec![0u64; num_reducers];
            let parallelism = self.statistics_parallelism(statuses.len(), num_reducers);
            if parallelism <= 1 {
                for status in statuses.iter().flatten() {
                    for (partition, total) in bytes_by_partition.iter_mut().enumerate() {
                        *total += status.size_for_partition(partition);
                    }
                }
            } else {
                debug!(
                    shuffle_id = dep.shuffle_id,
                    parallelism, "parallelizing statistics aggregation"
                );
                let chunk_len = num_reducers.div_ceil(parallelism);
                thread::scope(|scope| {
                    for (chunk_index, chunk) in
                        bytes_by_partition.chunks_mut(chunk_len).enumerate()
                    {
                        let base = chunk_index * chunk_len;
                        scope.spawn(move || {
                            for status in statuses.iter().flatten() {
                                for (offset, total) in chunk.iter_mut().enumerate() {
                                    *total += status.size_for_partition(base + offset);
                                }
                            }
                        });
                    }
                });
            }
            bytes_by_partition
        });
        Ok(MapOutputStatistics {
            shuffle_id: dep.shuffle_id,
            bytes_by_partition: stats,
        })
    }

    fn statistics_parallelism(&self, num_maps: usize, num_reducers: usize) -> usize {
        if num_reducers == 0 {
            return 1;
        }
        let product = num_maps as u64 * num_reducers as u64;
        let threshold = self.config.parallel_aggregation_threshold;
        if threshold == 0 || product <= threshold {
            return 1;
        }
        let hardware = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        let wanted = (product / threshold + 1) as usize;
        hardware.min(wanted).max(1)
    }

    /// Hosts holding at least [`REDUCER_PREF_LOCS_FRACTION`] of the bytes
    /// reducer `reducer_id` will read. Empty when locality is disabled, the
    /// job is too wide on either side, or no location qualifies.
    ///
    /// Location computation is linear in the map count per reducer, so wide
    /// jobs skip it to keep scheduling cheap.
    pub fn get_preferred_locations_for_shuffle(
        &self,
        dep: &ShuffleDependency,
        reducer_id: usize,
    ) -> Vec<String> {
        if !self.config.shuffle_locality_enabled
            || dep.num_reduce_partitions >= SHUFFLE_PREF_REDUCE_THRESHOLD
        {
            return Vec::new();
        }
        let num_maps = match self.lookup(dep.shuffle_id) {
            Some(status) => status.num_maps(),
            None => return Vec::new(),
        };
        if num_maps >= SHUFFLE_PREF_MAP_THRESHOLD {
            return Vec::new();
        }
        self.get_locations_with_largest_outputs(
            dep.shuffle_id,
            reducer_id,
            REDUCER_PREF_LOCS_FRACTION,
        )
        .map(|locations| locations.into_iter().map(|loc| loc.host).collect())
        .unwrap_or_default()
    }

    /// Locations whose share of reducer `reducer_id`'s total input is at
    /// least `fraction_threshold`. `None` when the shuffle is unknown or no
    /// location qualifies.
    pub fn get_locations_with_largest_outputs(
        &self,
        shuffle_id: i32,
        reducer_id: usize,
        fraction_threshold: f64,
    ) -> Option<Vec<BlockManagerId>> {
        let status = self.lookup(shuffle_id)?;
        status.with_map_statuses(|statuses| {
            let mut by_location: HashMap<&BlockManagerId, u64> = HashMap::new();
            let mut total: u64 = 0;
            for status in statuses.iter().flatten() {
                let size = status.size_for_partition(reducer_id);
                if size > 0 {
                    total += size;
                    *by_location.entry(status.location()).or_insert(0) += size;
                }
            }
            if total == 0 {
                return None;
            }
            let top: Vec<BlockManagerId> = by_location
                .into_iter()
                .filter(|(_, bytes)| *bytes as f64 / total as f64 >= fraction_threshold)
                .map(|(location, _)| location.clone())
                .collect();
            if top.is_empty() {
                None
            } else {
                Some(top)
            }
        })
    }

    /// Current topology epoch.
    pub fn get_epoch(&self) -> u64 {
        *self.epoch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bump the topology epoch. Workers observing the new value flush their
    /// cached catalogs.
    pub fn increment_epoch(&self) {
        let mut epoch = self.epoch.lock().unwrap_or_else(PoisonError::into_inner);
        *epoch += 1;
        info!(epoch = *epoch, "incrementing tracker epoch");
        global_metrics().record_epoch(*epoch);
    }

    /// Shut the dispatcher pool down and release every catalog.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.request_tx.send(PendingRequest::poison());
        let handles: Vec<JoinHandle<()>> = self
            .message_loops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            let _ = handle.join();
        }
        let statuses: Vec<Arc<ShuffleStatus>> = self
            .shuffle_statuses
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, status)| status)
            .collect();
        for status in &statuses {
            status.invalidate_serialized_map_output_status_cache();
        }
        info!("map output tracker authority stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::InMemoryBroadcastManager;
    use crate::rpc::ChannelReplyContext;
    use std::time::Duration;

    fn new_authority(config: TrackerConfig) -> Arc<TrackerAuthority> {
        let broadcasts: Arc<dyn BroadcastManager> = Arc::new(InMemoryBroadcastManager::new());
        TrackerAuthority::new(config, broadcasts, true).expect("authority")
    }

    fn bm(executor: &str, host: &str) -> BlockManagerId {
        BlockManagerId::new(executor, host, 7337)
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let authority = new_authority(TrackerConfig::default());
        authority.register_shuffle(1, 2).expect("register");
        assert!(matches!(
            authority.register_shuffle(1, 2),
            Err(FshError::AlreadyRegistered(1))
        ));
        assert!(authority.contains_shuffle(1));
        authority.stop();
    }

    #[test]
    fn operations_on_unknown_shuffle_fail() {
        let authority = new_authority(TrackerConfig::default());
        assert!(matches!(
            authority.register_map_output(5, 0, MapStatus::new(bm("a", "host-a"), &[1])),
            Err(FshError::UnknownShuffle(5))
        ));
        assert!(matches!(
            authority.unregister_map_output(5, 0, &bm("a", "host-a")),
            Err(FshError::UnknownShuffle(5))
        ));
        assert!(authority.find_missing_partitions(5).is_none());
        assert_eq!(authority.get_num_available_outputs(5), 0);
        authority.stop();
    }

    #[test]
    fn host_sweep_clears_both_shuffles_and_bumps_epoch_once() {
        let authority = new_authority(TrackerConfig::default());
        for shuffle_id in [10, 11] {
            authority.register_shuffle(shuffle_id, 2).expect("register");
            authority
                .register_map_output(shuffle_id, 0, MapStatus::new(bm("x", "host-x"), &[1]))
                .expect("map 0");
            authority
                .register_map_output(shuffle_id, 1, MapStatus::new(bm("y", "host-y"), &[1]))
                .expect("map 1");
        }
        // Drive the epoch to a known starting point.
        while authority.get_epoch() < 3 {
            authority.increment_epoch();
        }

        authority.remove_outputs_on_host("host-x");

        for shuffle_id in [10, 11] {
            assert_eq!(authority.get_num_available_outputs(shuffle_id), 1);
            assert_eq!(
                authority.find_missing_partitions(shuffle_id),
                Some(vec![0])
            );
        }
        assert_eq!(authority.get_epoch(), 4);
        authority.stop();
    }

    #[test]
    fn registration_does_not_bump_epoch_but_unregistration_does() {
        let authority = new_authority(TrackerConfig::default());
        authority.register_shuffle(1, 1).expect("register");
        let before = authority.get_epoch();
        authority
            .register_map_output(1, 0, MapStatus::new(bm("a", "host-a"), &[1]))
            .expect("map 0");
        assert_eq!(authority.get_epoch(), before);

        authority
            .unregister_map_output(1, 0, &bm("a", "host-a"))
            .expect("unregister output");
        assert_eq!(authority.get_epoch(), before + 1);
        authority.stop();
    }

    #[test]
    fn statistics_sum_per_reduce_partition() {
        let authority = new_authority(TrackerConfig::default());
        authority.register_shuffle(7, 3).expect("register");
        authority
            .register_map_output(7, 0, MapStatus::new(bm("a", "host-a"), &[10, 20, 30]))
            .expect("map 0");
        authority
            .register_map_output(7, 1, MapStatus::new(bm("b", "host-b"), &[5, 5, 5]))
            .expect("map 1");
        authority
            .register_map_output(7, 2, MapStatus::new(bm("a", "host-a"), &[0, 100, 0]))
            .expect("map 2");

        let dep = ShuffleDependency {
            shuffle_id: 7,
            num_reduce_partitions: 3,
        };
        let stats = authority.get_statistics(&dep).expect("stats");
        assert_eq!(stats.bytes_by_partition, vec![15, 125, 35]);
        authority.stop();
    }

    #[test]
    fn parallel_and_serial_aggregation_agree() {
        // Threshold of 1 forces the parallel path regardless of size.
        let parallel = new_authority(TrackerConfig {
            parallel_aggregation_threshold: 1,
            ..TrackerConfig::default()
        });
        let serial = new_authority(TrackerConfig::default());
        for authority in [&parallel, &serial] {
            authority.register_shuffle(1, 4).expect("register");
            for map_id in 0..4usize {
                let sizes: Vec<u64> = (0..64).map(|r| (map_id as u64 + 1) * r).collect();
                authority
                    .register_map_output(1, map_id, MapStatus::new(bm("a", "host-a"), &sizes))
                    .expect("map output");
            }
        }
        let dep = ShuffleDependency {
            shuffle_id: 1,
            num_reduce_partitions: 64,
        };
        let expected = serial.get_statistics(&dep).expect("serial");
        let actual = parallel.get_statistics(&dep).expect("parallel");
        assert_eq!(actual.bytes_by_partition, expected.bytes_by_partition);
        parallel.stop();
        serial.stop();
    }

    #[test]
    fn preferred_locations_follow_fraction_threshold() {
        let authority = new_authority(TrackerConfig::default());
        authority.register_shuffle(7, 3).expect("register");
        authority
            .register_map_output(7, 0, MapStatus::new(bm("a", "host-a"), &[10, 20, 30]))
            .expect("map 0");
        authority
            .register_map_output(7, 1, MapStatus::new(bm("b", "host-b"), &[5, 5, 5]))
            .expect("map 1");
        authority
            .register_map_output(7, 2, MapStatus::new(bm("a", "host-a"), &[0, 100, 0]))
            .expect("map 2");

        // Reducer 1 reads 125 bytes total; host-a holds 120 of them and
        // host-b only 4%, below the 20% preference cut.
        let dep = ShuffleDependency {
            shuffle_id: 7,
            num_reduce_partitions: 3,
        };
        assert_eq!(
            authority.get_preferred_locations_for_shuffle(&dep, 1),
            vec!["host-a".to_string()]
        );

        let locations = authority
            .get_locations_with_largest_outputs(7, 1, REDUCER_PREF_LOCS_FRACTION)
            .expect("locations");
        assert_eq!(locations, vec![bm("a", "host-a")]);
        authority.stop();
    }

    #[test]
    fn locality_disabled_or_unknown_shuffle_yields_no_hints() {
        let authority = new_authority(TrackerConfig {
            shuffle_locality_enabled: false,
            ..TrackerConfig::default()
        });
        authority.register_shuffle(7, 1).expect("register");
        authority
            .register_map_output(7, 0, MapStatus::new(bm("a", "host-a"), &[10]))
            .expect("map 0");
        let dep = ShuffleDependency {
            shuffle_id: 7,
            num_reduce_partitions: 1,
        };
        assert!(authority
            .get_preferred_locations_for_shuffle(&dep, 0)
            .is_empty());
        assert!(authority
            .get_locations_with_largest_outputs(99, 0, 0.2)
            .is_none());
        authority.stop();
    }

    #[test]
    fn dispatcher_serves_and_rejects_unknown_shuffles() {
        let authority = new_authority(TrackerConfig::default());
        authority.register_shuffle(3, 1).expect("register");
        authority
            .register_map_output(3, 0, MapStatus::new(bm("a", "host-a"), &[8]))
            .expect("map 0");

        let (context, rx) = ChannelReplyContext::pair();
        authority
            .post_fetch_request(3, Box::new(context))
            .expect("post");
        let bytes = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("reply")
            .expect("served");
        assert_eq!(bytes[0], crate::codec::DIRECT_TAG);

        let (context, rx) = ChannelReplyContext::pair();
        authority
            .post_fetch_request(42, Box::new(context))
            .expect("post");
        let err = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("reply")
            .expect_err("unknown shuffle");
        assert!(matches!(err, FshError::UnknownShuffle(42)));
        authority.stop();
    }

    #[test]
    fn stop_drains_the_pool_and_rejects_new_requests() {
        let authority = new_authority(TrackerConfig {
            dispatcher_threads: 3,
            ..TrackerConfig::default()
        });
        authority.stop();
        let (context, _rx) = ChannelReplyContext::pair();
        assert!(matches!(
            authority.post_fetch_request(1, Box::new(context)),
            Err(FshError::Rpc(_))
        ));
    }

    #[test]
    fn invalid_config_fails_construction() {
        let broadcasts: Arc<dyn BroadcastManager> = Arc::new(InMemoryBroadcastManager::new());
        let config = TrackerConfig {
            min_broadcast_size_bytes: 2,
            max_rpc_message_size_bytes: 1,
            ..TrackerConfig::default()
        };
        assert!(matches!(
            TrackerAuthority::new(config, broadcasts, true),
            Err(FshError::InvalidConfig(_))
        ));
    }
}
