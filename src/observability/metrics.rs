use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub ride_transitions_total: IntCounterVec,
    pub active_rides: IntGauge,
    pub pending_matches: IntGauge,
    pub location_updates_total: IntCounterVec,
    pub ws_connections: IntGauge,
    pub accept_latency_seconds: HistogramVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let ride_transitions_total = IntCounterVec::new(
            Opts::new(
                "ride_transitions_total",
                "Ride lifecycle transitions by kind and outcome",
            ),
            &["transition", "outcome"],
        )
        .expect("valid ride_transitions_total metric");

        let active_rides = IntGauge::new("active_rides", "Rides not yet completed or cancelled")
            .expect("valid active_rides metric");

        let pending_matches = IntGauge::new(
            "pending_matches",
            "Ride requests currently offered to drivers",
        )
        .expect("valid pending_matches metric");

        let location_updates_total = IntCounterVec::new(
            Opts::new("location_updates_total", "Location samples by outcome"),
            &["outcome"],
        )
        .expect("valid location_updates_total metric");

        let ws_connections = IntGauge::new("ws_connections", "Open websocket connections")
            .expect("valid ws_connections metric");

        let accept_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "accept_latency_seconds",
                "Time from ride request to driver acceptance in seconds",
            )
            .buckets(vec![1.0, 5.0, 10.0, 20.0, 30.0, 45.0, 60.0, 120.0]),
            &["vehicle_type"],
        )
        .expect("valid accept_latency_seconds metric");

        registry
            .register(Box::new(ride_transitions_total.clone()))
            .expect("register ride_transitions_total");
        registry
            .register(Box::new(active_rides.clone()))
            .expect("register active_rides");
        registry
            .register(Box::new(pending_matches.clone()))
            .expect("register pending_matches");
        registry
            .register(Box::new(location_updates_total.clone()))
            .expect("register location_updates_total");
        registry
            .register(Box::new(ws_connections.clone()))
            .expect("register ws_connections");
        registry
            .register(Box::new(accept_latency_seconds.clone()))
            .expect("register accept_latency_seconds");

        Self {
            registry,
            ride_transitions_total,
            active_rides,
            pending_matches,
            location_updates_total,
            ws_connections,
            accept_latency_seconds,
        }
    }

    pub fn record_transition(&self, transition: &str, ok: bool) {
        let outcome = if ok { "success" } else { "error" };
        self.ride_transitions_total
            .with_label_values(&[transition, outcome])
            .inc();
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
