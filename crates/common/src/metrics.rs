use std::sync::{Arc, OnceLock};

use prometheus::{Counter, CounterVec, Encoder, Gauge, Opts, Registry, TextEncoder};

/// Shared metrics registry for tracker and chunk-server components.
#[derive(Clone, Debug)]
pub struct MetricsRegistry {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    registry: Registry,
    catalog_serializations: CounterVec,
    fetch_requests: CounterVec,
    epoch_bumps: Counter,
    tracker_epoch: Gauge,
    active_streams: Gauge,
    chunks_in_flight: Gauge,
    buffers_released: Counter,
}

impl MetricsRegistry {
    /// Create a registry with all metric families registered.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::new()),
        }
    }

    /// Record one catalog serialization and its delivery form.
    pub fn inc_catalog_serialized(&self, delivery: &str) {
        self.inner
            .catalog_serializations
            .with_label_values(&[delivery])
            .inc();
    }

    /// Record one dispatcher-served catalog fetch request and its outcome.
    pub fn inc_fetch_request(&self, outcome: &str) {
        self.inner
            .fetch_requests
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record a topology-induced epoch bump and publish the new value.
    pub fn record_epoch(&self, epoch: u64) {
        self.inner.epoch_bumps.inc();
        self.inner.tracker_epoch.set(epoch as f64);
    }

    /// Adjust the number of registered chunk streams.
    pub fn add_active_streams(&self, delta: f64) {
        self.inner.active_streams.add(delta);
    }

    /// Adjust the number of chunks currently being transferred.
    pub fn add_chunks_in_flight(&self, delta: f64) {
        self.inner.chunks_in_flight.add(delta);
    }

    /// Record buffers released during connection-loss reclamation.
    pub fn inc_buffers_released(&self, count: u64) {
        self.inner.buffers_released.inc_by(count as f64);
    }

    /// Render all families in the Prometheus text exposition format.
    pub fn render_prometheus(&self) -> String {
        let metric_families = self.inner.registry.gather();
        let mut out = Vec::new();
        let enc = TextEncoder::new();
        if enc.encode(&metric_families, &mut out).is_err() {
            return String::new();
        }
        String::from_utf8_lossy(&out).to_string()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsInner {
    fn new() -> Self {
        let registry = Registry::new();

        let catalog_serializations = counter_vec(
            &registry,
            "fsh_tracker_catalog_serializations_total",
            "Catalog serializations by delivery form",
            &["delivery"],
        );
        let fetch_requests = counter_vec(
            &registry,
            "fsh_tracker_fetch_requests_total",
            "Dispatcher-served catalog fetch requests by outcome",
            &["outcome"],
        );
        let epoch_bumps = counter(
            &registry,
            "fsh_tracker_epoch_bumps_total",
            "Topology-induced epoch increments",
        );
        let tracker_epoch = gauge(
            &registry,
            "fsh_tracker_epoch",
            "Current authority epoch value",
        );
        let active_streams = gauge(
            &registry,
            "fsh_stream_active_streams",
            "Registered chunk streams not yet drained",
        );
        let chunks_in_flight = gauge(
            &registry,
            "fsh_stream_chunks_in_flight",
            "Chunks handed to the transport and not yet sent",
        );
        let buffers_released = counter(
            &registry,
            "fsh_stream_buffers_released_total",
            "Buffers released during connection-loss reclamation",
        );

        Self {
            registry,
            catalog_serializations,
            fetch_requests,
            epoch_bumps,
            tracker_epoch,
            active_streams,
            chunks_in_flight,
            buffers_released,
        }
    }
}

fn counter_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let c = CounterVec::new(Opts::new(name, help), labels).expect("counter vec");
    registry
        .register(Box::new(c.clone()))
        .expect("register counter");
    c
}

fn counter(registry: &Registry, name: &str, help: &str) -> Counter {
    let c = Counter::with_opts(Opts::new(name, help)).expect("counter");
    registry
        .register(Box::new(c.clone()))
        .expect("register counter");
    c
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Gauge {
    let g = Gauge::with_opts(Opts::new(name, help)).expect("gauge");
    registry
        .register(Box::new(g.clone()))
        .expect("register gauge");
    g
}

static GLOBAL_METRICS: OnceLock<MetricsRegistry> = OnceLock::new();

/// Process-wide metrics registry.
pub fn global_metrics() -> &'static MetricsRegistry {
    GLOBAL_METRICS.get_or_init(MetricsRegistry::new)
}
